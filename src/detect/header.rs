//! Decoding of the `x-detected-objects` response header.
//!
//! The detection server writes the header with Python's `str(dict)`, so the
//! value is usually `{'person': 1, 'chair': 2}` rather than JSON. Decoding
//! runs an ordered list of strategies and keeps the first one that succeeds:
//!
//! 1. strict JSON object of label → non-negative integer
//! 2. the same after normalizing quotes and bare keys
//! 3. a `'label': count` pair scan that skips pairs it cannot coerce

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::mapping::DetectionMapping;
use crate::DetectError;

/// Response header carrying the detection counts.
pub const DETECTED_OBJECTS_HEADER: &str = "x-detected-objects";

/// One decoding attempt. Implementations never panic; `None` means the
/// strategy could not make sense of the input.
pub trait HeaderStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn decode(&self, raw: &str) -> Option<DetectionMapping>;
}

/// Result of a successful decode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedHeader {
    pub mapping: DetectionMapping,
    /// Strategy that produced the mapping; `None` for an empty header.
    pub strategy: Option<&'static str>,
}

pub struct StrictJson;

impl HeaderStrategy for StrictJson {
    fn name(&self) -> &'static str {
        "strict_json"
    }

    fn decode(&self, raw: &str) -> Option<DetectionMapping> {
        decode_json_counts(raw)
    }
}

/// Rewrites a Python dict literal into JSON before decoding.
pub struct NormalizedJson;

impl HeaderStrategy for NormalizedJson {
    fn name(&self) -> &'static str {
        "normalized_json"
    }

    fn decode(&self, raw: &str) -> Option<DetectionMapping> {
        decode_json_counts(&normalize_dict_literal(raw))
    }
}

pub struct PairScan;

impl HeaderStrategy for PairScan {
    fn name(&self) -> &'static str {
        "pair_scan"
    }

    fn decode(&self, raw: &str) -> Option<DetectionMapping> {
        let mut mapping = DetectionMapping::new();
        for caps in quoted_pair_re().captures_iter(raw) {
            let label = &caps[1];
            match caps[2].parse::<u32>() {
                Ok(count) => {
                    mapping.insert(label, count);
                }
                Err(_) => log::debug!("skipping non-integer count for '{}'", label),
            }
        }
        if mapping.is_empty() {
            None
        } else {
            Some(mapping)
        }
    }
}

/// Ordered fallback chain over header strategies.
pub struct HeaderParser {
    strategies: Vec<Box<dyn HeaderStrategy>>,
}

impl HeaderParser {
    pub fn new() -> Self {
        Self::with_strategies(vec![
            Box::new(StrictJson),
            Box::new(NormalizedJson),
            Box::new(PairScan),
        ])
    }

    pub fn with_strategies(strategies: Vec<Box<dyn HeaderStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Decode a header value, reporting `MalformedHeader` when a non-empty
    /// value defeats every strategy.
    pub fn decode(&self, raw: &str) -> Result<DecodedHeader, DetectError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(DecodedHeader {
                mapping: DetectionMapping::new(),
                strategy: None,
            });
        }
        for (idx, strategy) in self.strategies.iter().enumerate() {
            if let Some(mapping) = strategy.decode(raw) {
                if idx > 0 {
                    log::debug!("detection header decoded by fallback '{}'", strategy.name());
                }
                return Ok(DecodedHeader {
                    mapping,
                    strategy: Some(strategy.name()),
                });
            }
            log::debug!("header strategy '{}' rejected input", strategy.name());
        }
        Err(DetectError::MalformedHeader(format!(
            "no strategy accepted header value {:?}",
            truncate(raw, 120)
        )))
    }

    /// Total variant of [`decode`](Self::decode): any failure yields an empty mapping.
    pub fn parse(&self, raw: Option<&str>) -> DetectionMapping {
        let Some(raw) = raw else {
            return DetectionMapping::new();
        };
        match self.decode(raw) {
            Ok(decoded) => decoded.mapping,
            Err(err) => {
                log::warn!("{}", err);
                DetectionMapping::new()
            }
        }
    }
}

impl Default for HeaderParser {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_json_counts(text: &str) -> Option<DetectionMapping> {
    let object: Map<String, Value> = serde_json::from_str(text).ok()?;
    let mut mapping = DetectionMapping::new();
    for (label, value) in object {
        let count = value.as_u64().and_then(|c| u32::try_from(c).ok())?;
        mapping.insert(label, count);
    }
    Some(mapping)
}

/// `'` → `"`, then `key:` → `"key":` for bare identifiers.
pub fn normalize_dict_literal(raw: &str) -> String {
    let quoted = raw.replace('\'', "\"");
    bare_key_re().replace_all(&quoted, "\"${1}\":").into_owned()
}

fn bare_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\w+):").expect("valid bare key regex"))
}

fn quoted_pair_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"'([^']+)'\s*:\s*([^,}\s]+)").expect("valid quoted pair regex")
    })
}

fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn pairs(mapping: &DetectionMapping) -> Vec<(String, u32)> {
        mapping.iter().map(|(l, c)| (l.to_string(), c)).collect()
    }

    #[test]
    fn strategies_run_in_fixed_order() {
        assert_eq!(
            HeaderParser::new().strategy_names(),
            vec!["strict_json", "normalized_json", "pair_scan"]
        );
    }

    #[test]
    fn strict_json_is_tried_first() {
        let decoded = HeaderParser::new().decode(r#"{"a":1,"b":2}"#).unwrap();
        assert_eq!(decoded.strategy, Some("strict_json"));
        assert_eq!(
            pairs(&decoded.mapping),
            vec![("a".to_string(), 1), ("b".to_string(), 2)]
        );
    }

    #[test]
    fn python_dict_falls_back_to_normalized_json() {
        let decoded = HeaderParser::new().decode("{'a': 1, 'b': 2}").unwrap();
        assert_eq!(decoded.strategy, Some("normalized_json"));
        assert_eq!(decoded.mapping.get("a"), Some(1));
        assert_eq!(decoded.mapping.get("b"), Some(2));
    }

    #[test]
    fn bare_keys_are_quoted() {
        assert_eq!(normalize_dict_literal("{cup: 3}"), r#"{"cup": 3}"#);
        let mapping = HeaderParser::new().parse(Some("{cup: 3, tv: 1}"));
        assert_eq!(mapping.get("cup"), Some(3));
        assert_eq!(mapping.get("tv"), Some(1));
    }

    #[test]
    fn pair_scan_skips_uncoercible_counts() {
        let decoded = HeaderParser::new()
            .decode("{'person': 1, 'chair': two, 'dining table': 3}")
            .unwrap();
        assert_eq!(decoded.strategy, Some("pair_scan"));
        assert_eq!(
            pairs(&decoded.mapping),
            vec![("person".to_string(), 1), ("dining table".to_string(), 3)]
        );
    }

    #[test]
    fn garbage_is_malformed_and_parses_to_empty() {
        let parser = HeaderParser::new();
        let err = parser.decode("garbage{not parseable at all").unwrap_err();
        assert!(matches!(err, DetectError::MalformedHeader(_)));
        assert!(parser.parse(Some("garbage{not parseable at all")).is_empty());
    }

    #[test]
    fn zero_counts_are_dropped_after_decoding() {
        let mapping = HeaderParser::new().parse(Some(r#"{"person": 0, "cat": 1}"#));
        assert_eq!(pairs(&mapping), vec![("cat".to_string(), 1)]);
    }

    #[test]
    fn negative_or_fractional_counts_fail_json_strategies() {
        assert!(StrictJson.decode(r#"{"a": -1}"#).is_none());
        assert!(StrictJson.decode(r#"{"a": 1.5}"#).is_none());
        assert!(StrictJson.decode("[1, 2]").is_none());
    }

    struct Counting(Arc<AtomicUsize>);

    impl HeaderStrategy for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn decode(&self, _raw: &str) -> Option<DetectionMapping> {
            self.0.fetch_add(1, Ordering::SeqCst);
            None
        }
    }

    #[test]
    fn empty_input_skips_every_strategy() {
        let calls = Arc::new(AtomicUsize::new(0));
        let parser = HeaderParser::with_strategies(vec![Box::new(Counting(calls.clone()))]);
        assert!(parser.parse(None).is_empty());
        assert!(parser.parse(Some("")).is_empty());
        assert!(parser.parse(Some("   ")).is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert!(parser.parse(Some("{}")).is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
