//! Module Overrides
//!
//! Normalizes raw per-module override maps down to the two meaningful
//! states ("on" / "off"), reports which keys were dropped, and renders
//! the surviving map in a canonical key-sorted form suitable for
//! persistence and change detection.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use crate::types::{NormalizedOverrides, OverrideState};

/// Normalize a raw override map.
///
/// Only entries whose value is exactly the string "on" or "off"
/// survive; every other entry is dropped and its key reported in
/// `dropped`. A non-object input normalizes to an empty map.
pub fn normalize_overrides(raw: &Value) -> NormalizedOverrides {
    let mut overrides: BTreeMap<String, OverrideState> = BTreeMap::new();
    let mut dropped: Vec<String> = Vec::new();

    if let Some(map) = raw.as_object() {
        for (key, value) in map {
            match value.as_str() {
                Some("on") => {
                    overrides.insert(key.clone(), OverrideState::On);
                }
                Some("off") => {
                    overrides.insert(key.clone(), OverrideState::Off);
                }
                _ => dropped.push(key.clone()),
            }
        }
    }

    if !dropped.is_empty() {
        debug!(
            "Dropped {} malformed override entr{}: {}",
            dropped.len(),
            if dropped.len() == 1 { "y" } else { "ies" },
            dropped.join(", ")
        );
    }

    NormalizedOverrides { overrides, dropped }
}

/// Render an override map in canonical form: normalized, then
/// serialized as JSON with keys in sorted order. Two maps with the
/// same surviving entries always produce the same string regardless of
/// input ordering or junk entries.
pub fn serialize_module_overrides(raw: &Value) -> String {
    let normalized = normalize_overrides(raw);
    // BTreeMap iterates in key order, so the JSON comes out sorted.
    serde_json::to_string(&normalized.overrides).unwrap_or_else(|_| "{}".to_string())
}

/// Parse a previously persisted override string back into a normalized
/// map. Unparseable input yields an empty map rather than an error so
/// a corrupt row cannot wedge startup.
pub fn parse_override_map(stored: &str) -> NormalizedOverrides {
    match serde_json::from_str::<Value>(stored) {
        Ok(value) => normalize_overrides(&value),
        Err(_) => NormalizedOverrides::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keeps_only_on_and_off() {
        let normalized = normalize_overrides(&json!({
            "alpha": "on",
            "beta": "off",
            "gamma": "maybe",
            "delta": 1,
            "epsilon": null,
        }));
        assert_eq!(normalized.overrides.len(), 2);
        assert_eq!(normalized.overrides["alpha"], OverrideState::On);
        assert_eq!(normalized.overrides["beta"], OverrideState::Off);
        let mut dropped = normalized.dropped.clone();
        dropped.sort();
        assert_eq!(dropped, vec!["delta", "epsilon", "gamma"]);
    }

    #[test]
    fn test_non_object_input_normalizes_empty() {
        assert!(normalize_overrides(&json!("on")).is_empty());
        assert!(normalize_overrides(&json!(null)).is_empty());
        assert!(normalize_overrides(&json!([1, 2])).is_empty());
    }

    #[test]
    fn test_serialization_is_order_independent() {
        let a = serialize_module_overrides(&json!({ "zeta": "off", "alpha": "on" }));
        let b = serialize_module_overrides(&json!({ "alpha": "on", "zeta": "off" }));
        assert_eq!(a, b);
        assert_eq!(a, r#"{"alpha":"on","zeta":"off"}"#);
    }

    #[test]
    fn test_serialization_ignores_junk_entries() {
        let a = serialize_module_overrides(&json!({ "alpha": "on", "junk": "blue" }));
        let b = serialize_module_overrides(&json!({ "alpha": "on" }));
        assert_eq!(a, b);
    }

    #[test]
    fn test_parse_roundtrips_canonical_form() {
        let canonical = serialize_module_overrides(&json!({ "m1": "on", "m2": "off" }));
        let parsed = parse_override_map(&canonical);
        assert_eq!(parsed.overrides["m1"], OverrideState::On);
        assert_eq!(parsed.overrides["m2"], OverrideState::Off);
        assert!(parsed.dropped.is_empty());
    }

    #[test]
    fn test_parse_tolerates_garbage() {
        assert!(parse_override_map("not json at all").is_empty());
    }
}
