//! Override Resolver
//!
//! Reconciles a base module sequence with forced-on/forced-off
//! overrides and the registry's dependency graph. The resolver runs a
//! fixed-point loop over a finite set of module ids: prune forced-off
//! modules, expand required dependencies (dropping dependents of
//! forced-off modules), prune anything whose required dependencies are
//! unmet, and repeat until a full pass leaves the set unchanged.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::genesis::registry::ModuleRegistry;
use crate::types::{OverrideState, ResolutionResult};

/// Apply normalized overrides to a base module sequence.
///
/// Forced-off wins over forced-on, transitively: a module whose
/// required dependency chain touches a forced-off module is removed no
/// matter how it entered the desired set. `missing_deps` is computed
/// over the desired set (base plus forced-on), so a module pruned for
/// unmet dependencies still reports what it was missing.
pub fn apply_module_overrides(
    base: &[String],
    registry: &ModuleRegistry,
    overrides: &BTreeMap<String, OverrideState>,
) -> ResolutionResult {
    let forced_on: BTreeSet<String> = overrides
        .iter()
        .filter(|(_, state)| **state == OverrideState::On)
        .map(|(id, _)| id.clone())
        .collect();
    let forced_off: BTreeSet<String> = overrides
        .iter()
        .filter(|(_, state)| **state == OverrideState::Off)
        .map(|(id, _)| id.clone())
        .collect();

    let base_set: BTreeSet<String> = base.iter().cloned().collect();
    let desired: BTreeSet<String> = base_set.union(&forced_on).cloned().collect();
    let mut resolved = desired.clone();

    loop {
        let before = resolved.clone();

        // Forced-off modules never survive.
        for id in &forced_off {
            resolved.remove(id);
        }

        // Expand required dependencies. Newly added ids join the
        // worklist so a forced-off module taints its dependents within
        // the same pass instead of churning across passes forever.
        let mut queue: VecDeque<String> = resolved.iter().cloned().collect();
        while let Some(id) = queue.pop_front() {
            if !resolved.contains(&id) {
                continue;
            }
            for dep in registry.dependencies(&id) {
                if dep.optional {
                    continue;
                }
                if forced_off.contains(&dep.id) {
                    resolved.remove(&id);
                    break;
                }
                if resolved.insert(dep.id.clone()) {
                    queue.push_back(dep.id.clone());
                }
            }
        }

        // Prune anything whose required dependencies are unmet.
        // Removing one module can orphan a dependent already visited
        // earlier in the same sweep, so sweep until nothing falls out.
        loop {
            let snapshot: Vec<String> = resolved.iter().cloned().collect();
            let mut pruned = false;
            for id in &snapshot {
                let unmet = registry
                    .dependencies(id)
                    .iter()
                    .any(|dep| !dep.optional && !resolved.contains(&dep.id));
                if unmet {
                    resolved.remove(id);
                    pruned = true;
                }
            }
            if !pruned {
                break;
            }
        }

        if resolved == before {
            break;
        }
    }

    let added: BTreeSet<String> = resolved.difference(&base_set).cloned().collect();
    let removed: BTreeSet<String> = base_set.difference(&resolved).cloned().collect();

    let mut missing_deps: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for id in &desired {
        let missing: Vec<String> = registry
            .dependencies(id)
            .iter()
            .filter(|dep| !dep.optional && !resolved.contains(&dep.id))
            .map(|dep| dep.id.clone())
            .collect();
        if !missing.is_empty() {
            missing_deps.insert(id.clone(), missing);
        }
    }

    ResolutionResult {
        resolved,
        added,
        removed,
        forced_on,
        forced_off,
        missing_deps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ModuleRegistryEntry;

    fn registry(entries: &[(&str, &[(&str, bool)])]) -> ModuleRegistry {
        let mut registry = ModuleRegistry::new();
        for (id, deps) in entries {
            let dependencies = deps
                .iter()
                .map(|(dep, optional)| {
                    if *optional {
                        crate::types::ModuleDependency::optional(dep)
                    } else {
                        crate::types::ModuleDependency::required(dep)
                    }
                })
                .collect();
            registry.insert(
                id,
                ModuleRegistryEntry {
                    dependencies,
                    path: None,
                },
            );
        }
        registry
    }

    fn base(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn overrides(entries: &[(&str, OverrideState)]) -> BTreeMap<String, OverrideState> {
        entries
            .iter()
            .map(|(id, state)| (id.to_string(), *state))
            .collect()
    }

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_overrides_are_identity_on_consistent_base() {
        let reg = registry(&[("shell", &[("kernel", false)]), ("kernel", &[])]);
        let result = apply_module_overrides(&base(&["kernel", "shell"]), &reg, &overrides(&[]));
        assert_eq!(result.resolved, set(&["kernel", "shell"]));
        assert!(result.added.is_empty());
        assert!(result.removed.is_empty());
        assert!(result.missing_deps.is_empty());
    }

    #[test]
    fn test_forced_on_pulls_module_and_required_deps() {
        let reg = registry(&[("metrics", &[("storage", false)]), ("storage", &[])]);
        let result = apply_module_overrides(
            &base(&["kernel"]),
            &reg,
            &overrides(&[("metrics", OverrideState::On)]),
        );
        assert!(result.resolved.contains("metrics"));
        assert!(result.resolved.contains("storage"));
        assert_eq!(result.added, set(&["metrics", "storage"]));
    }

    #[test]
    fn test_deep_dependency_chain_is_fully_expanded() {
        let reg = registry(&[
            ("a", &[("b", false)]),
            ("b", &[("c", false)]),
            ("c", &[("d", false)]),
            ("d", &[]),
        ]);
        let result =
            apply_module_overrides(&base(&[]), &reg, &overrides(&[("a", OverrideState::On)]));
        assert_eq!(result.resolved, set(&["a", "b", "c", "d"]));
    }

    #[test]
    fn test_forced_off_module_is_removed() {
        let reg = registry(&[]);
        let result = apply_module_overrides(
            &base(&["kernel", "telemetry"]),
            &reg,
            &overrides(&[("telemetry", OverrideState::Off)]),
        );
        assert_eq!(result.resolved, set(&["kernel"]));
        assert_eq!(result.removed, set(&["telemetry"]));
    }

    #[test]
    fn test_forced_off_dominates_forced_on_through_deps() {
        // metrics is forced on but requires storage, which is forced
        // off; metrics must not survive.
        let reg = registry(&[("metrics", &[("storage", false)]), ("storage", &[])]);
        let result = apply_module_overrides(
            &base(&[]),
            &reg,
            &overrides(&[
                ("metrics", OverrideState::On),
                ("storage", OverrideState::Off),
            ]),
        );
        assert!(result.resolved.is_empty());
        assert_eq!(result.missing_deps["metrics"], vec!["storage"]);
    }

    #[test]
    fn test_forced_off_domination_is_transitive() {
        let reg = registry(&[
            ("c", &[("a", false)]),
            ("a", &[("b", false)]),
            ("b", &[]),
        ]);
        let result = apply_module_overrides(
            &base(&["c", "a"]),
            &reg,
            &overrides(&[("b", OverrideState::Off)]),
        );
        assert!(result.resolved.is_empty());
        assert_eq!(result.removed, set(&["a", "c"]));
    }

    #[test]
    fn test_forced_off_domination_reaches_deep_chains() {
        // d is forced off three hops down the chain. Pruning b orphans
        // a within the same pass, so a must fall with it.
        let reg = registry(&[
            ("a", &[("b", false)]),
            ("b", &[("c", false)]),
            ("c", &[("d", false)]),
            ("d", &[]),
        ]);
        let result = apply_module_overrides(
            &base(&["a"]),
            &reg,
            &overrides(&[("d", OverrideState::Off)]),
        );
        assert!(result.resolved.is_empty());
        assert_eq!(result.removed, set(&["a"]));
        assert_eq!(result.missing_deps["a"], vec!["b"]);
    }

    #[test]
    fn test_taint_through_module_outside_base_terminates() {
        // x requires y, y requires z, z forced off; y is not in base
        // so it only appears through expansion. The loop must settle
        // on the empty set instead of re-adding y forever.
        let reg = registry(&[
            ("x", &[("y", false)]),
            ("y", &[("z", false)]),
            ("z", &[]),
        ]);
        let result = apply_module_overrides(
            &base(&["x"]),
            &reg,
            &overrides(&[("z", OverrideState::Off)]),
        );
        assert!(result.resolved.is_empty());
        assert_eq!(result.removed, set(&["x"]));
        assert_eq!(result.missing_deps["x"], vec!["y"]);
    }

    #[test]
    fn test_missing_deps_computed_over_desired() {
        // The classic shape: base [m1, m2], m1 requires m3, m3 forced
        // off. m1 is pruned but still reports what it was missing.
        let reg = registry(&[("m1", &[("m3", false)]), ("m2", &[]), ("m3", &[])]);
        let result = apply_module_overrides(
            &base(&["m1", "m2"]),
            &reg,
            &overrides(&[("m3", OverrideState::Off)]),
        );
        assert_eq!(result.resolved, set(&["m2"]));
        assert_eq!(result.removed, set(&["m1"]));
        assert_eq!(result.missing_deps["m1"], vec!["m3"]);
        assert!(!result.missing_deps.contains_key("m2"));
    }

    #[test]
    fn test_absent_required_dep_is_pulled_in_not_pruned() {
        let reg = registry(&[("m1", &[("m3", false)]), ("m3", &[])]);
        let result = apply_module_overrides(&base(&["m1"]), &reg, &overrides(&[]));
        assert_eq!(result.resolved, set(&["m1", "m3"]));
        assert_eq!(result.added, set(&["m3"]));
    }

    #[test]
    fn test_optional_deps_are_not_enforced() {
        let reg = registry(&[("ui", &[("metrics", true)])]);
        let result = apply_module_overrides(&base(&["ui"]), &reg, &overrides(&[]));
        assert_eq!(result.resolved, set(&["ui"]));
        assert!(result.missing_deps.is_empty());
    }

    #[test]
    fn test_optional_forced_off_dep_does_not_remove_dependent() {
        let reg = registry(&[("ui", &[("metrics", true)]), ("metrics", &[])]);
        let result = apply_module_overrides(
            &base(&["ui", "metrics"]),
            &reg,
            &overrides(&[("metrics", OverrideState::Off)]),
        );
        assert_eq!(result.resolved, set(&["ui"]));
    }

    #[test]
    fn test_modules_unknown_to_registry_survive() {
        let reg = registry(&[]);
        let result = apply_module_overrides(&base(&["mystery"]), &reg, &overrides(&[]));
        assert_eq!(result.resolved, set(&["mystery"]));
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let reg = registry(&[
            ("a", &[("b", false)]),
            ("b", &[("c", false)]),
            ("c", &[]),
        ]);
        let first =
            apply_module_overrides(&base(&["a"]), &reg, &overrides(&[]));
        let again_base: Vec<String> = first.resolved.iter().cloned().collect();
        let second = apply_module_overrides(&again_base, &reg, &overrides(&[]));
        assert_eq!(second.resolved, first.resolved);
        assert!(second.added.is_empty());
        assert!(second.removed.is_empty());
    }

    #[test]
    fn test_forced_on_and_off_sets_reported() {
        let reg = registry(&[]);
        let result = apply_module_overrides(
            &base(&[]),
            &reg,
            &overrides(&[
                ("a", OverrideState::On),
                ("b", OverrideState::Off),
            ]),
        );
        assert_eq!(result.forced_on, set(&["a"]));
        assert_eq!(result.forced_off, set(&["b"]));
    }
}
