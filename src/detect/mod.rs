pub mod header;
mod mapping;
mod store;

pub use header::{
    DecodedHeader, HeaderParser, HeaderStrategy, NormalizedJson, PairScan, StrictJson,
    DETECTED_OBJECTS_HEADER,
};
pub use mapping::DetectionMapping;
pub use store::DetectionResultStore;
