use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::mapping::DetectionMapping;

#[derive(Debug, Default)]
struct StoreInner {
    latest: DetectionMapping,
    updated_at: Option<Instant>,
}

/// Latest detection result, shared between the session and presenters.
///
/// Cloning yields another handle to the same slot. No history is kept.
#[derive(Clone, Debug, Default)]
pub struct DetectionResultStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl DetectionResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored mapping.
    pub fn set(&self, mapping: DetectionMapping) {
        let mut inner = self.lock();
        inner.latest = mapping;
        inner.updated_at = Some(Instant::now());
    }

    pub fn get(&self) -> DetectionMapping {
        self.lock().latest.clone()
    }

    /// When the mapping was last replaced; `None` before the first result.
    pub fn updated_at(&self) -> Option<Instant> {
        self.lock().updated_at
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        // Writers never leave the slot half-updated.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
