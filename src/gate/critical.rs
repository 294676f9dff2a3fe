//! Critical Path Classification
//!
//! A module path is critical when it sits under one of the configured
//! critical prefixes. Critical loads require approval in supervised
//! modes and always go through sandboxed verification.

/// Returns `true` when `path` starts with any of `prefixes`.
pub fn is_critical_path(path: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DEFAULT_CRITICAL_PREFIXES;

    fn prefixes(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_matches_configured_prefixes() {
        let p = prefixes(&["core/", "runtime/"]);
        assert!(is_critical_path("core/kernel.mod", &p));
        assert!(is_critical_path("runtime/scheduler.mod", &p));
        assert!(!is_critical_path("modules/ui.mod", &p));
    }

    #[test]
    fn test_prefix_match_is_exact_not_substring() {
        let p = prefixes(&["core/"]);
        assert!(!is_critical_path("encore/kernel.mod", &p));
        assert!(!is_critical_path("modules/core/helper.mod", &p));
    }

    #[test]
    fn test_empty_prefix_set_marks_nothing_critical() {
        assert!(!is_critical_path("core/kernel.mod", &[]));
    }

    #[test]
    fn test_default_prefixes_cover_infrastructure() {
        let p: Vec<String> = DEFAULT_CRITICAL_PREFIXES
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(is_critical_path("core/kernel.mod", &p));
        assert!(is_critical_path("infra/storage.mod", &p));
        assert!(is_critical_path("capabilities/net.mod", &p));
        assert!(!is_critical_path("widgets/clock.mod", &p));
    }
}
