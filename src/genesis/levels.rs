//! Genesis Levels
//!
//! Walks the `extends` chain of a genesis level and concatenates the
//! module lists root-first, so a child's modules follow everything it
//! inherited. Inheritance cycles are detected before any recursion can
//! run away and reported with the full offending chain.

use std::collections::HashSet;

use thiserror::Error;

use crate::types::GenesisConfig;

/// A genesis level's `extends` chain loops back on itself.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("circular genesis level inheritance: {}", .chain.join(" -> "))]
pub struct CycleError {
    /// The walked chain, ending with the level that was revisited.
    pub chain: Vec<String>,
}

/// Resolve the base module sequence for `level_name`.
///
/// The chain is walked child -> parent with a visited set; the module
/// lists are then concatenated parent-first, duplicates preserved. An
/// unknown level name resolves to an empty sequence, and an `extends`
/// target missing from the config simply ends the walk.
pub fn resolve_base_modules(
    level_name: &str,
    config: &GenesisConfig,
) -> Result<Vec<String>, CycleError> {
    let mut chain: Vec<String> = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut current = if config.level(level_name).is_some() {
        Some(level_name.to_string())
    } else {
        None
    };

    while let Some(name) = current {
        if !visited.insert(name.clone()) {
            chain.push(name);
            return Err(CycleError { chain });
        }
        chain.push(name.clone());
        current = config
            .level(&name)
            .and_then(|level| level.extends.clone())
            .filter(|parent| config.level(parent).is_some());
    }

    let mut modules: Vec<String> = Vec::new();
    for name in chain.iter().rev() {
        if let Some(level) = config.level(name) {
            modules.extend(level.modules.iter().cloned());
        }
    }
    Ok(modules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GenesisLevel;

    fn level(extends: Option<&str>, modules: &[&str]) -> GenesisLevel {
        GenesisLevel {
            extends: extends.map(|s| s.to_string()),
            modules: modules.iter().map(|m| m.to_string()).collect(),
        }
    }

    fn config(levels: &[(&str, GenesisLevel)]) -> GenesisConfig {
        GenesisConfig {
            levels: levels
                .iter()
                .map(|(name, l)| (name.to_string(), l.clone()))
                .collect(),
        }
    }

    #[test]
    fn test_single_level_yields_own_modules() {
        let cfg = config(&[("seed", level(None, &["kernel", "shell"]))]);
        let modules = resolve_base_modules("seed", &cfg).unwrap();
        assert_eq!(modules, vec!["kernel", "shell"]);
    }

    #[test]
    fn test_parent_modules_precede_child_modules() {
        let cfg = config(&[
            ("seed", level(None, &["kernel"])),
            ("sprout", level(Some("seed"), &["shell"])),
            ("grove", level(Some("sprout"), &["ui", "metrics"])),
        ]);
        let modules = resolve_base_modules("grove", &cfg).unwrap();
        assert_eq!(modules, vec!["kernel", "shell", "ui", "metrics"]);
    }

    #[test]
    fn test_unknown_level_resolves_empty() {
        let cfg = config(&[("seed", level(None, &["kernel"]))]);
        assert!(resolve_base_modules("nope", &cfg).unwrap().is_empty());
    }

    #[test]
    fn test_missing_extends_target_ends_walk() {
        let cfg = config(&[("sprout", level(Some("ghost"), &["shell"]))]);
        let modules = resolve_base_modules("sprout", &cfg).unwrap();
        assert_eq!(modules, vec!["shell"]);
    }

    #[test]
    fn test_duplicate_modules_are_preserved() {
        let cfg = config(&[
            ("seed", level(None, &["kernel", "shell"])),
            ("sprout", level(Some("seed"), &["shell"])),
        ]);
        let modules = resolve_base_modules("sprout", &cfg).unwrap();
        assert_eq!(modules, vec!["kernel", "shell", "shell"]);
    }

    #[test]
    fn test_two_level_cycle_is_reported_with_chain() {
        let cfg = config(&[
            ("a", level(Some("b"), &[])),
            ("b", level(Some("a"), &[])),
        ]);
        let err = resolve_base_modules("a", &cfg).unwrap_err();
        assert_eq!(err.chain, vec!["a", "b", "a"]);
        assert!(err.to_string().contains("a -> b -> a"));
    }

    #[test]
    fn test_self_cycle_is_reported() {
        let cfg = config(&[("loop", level(Some("loop"), &["m"]))]);
        let err = resolve_base_modules("loop", &cfg).unwrap_err();
        assert_eq!(err.chain, vec!["loop", "loop"]);
    }
}
