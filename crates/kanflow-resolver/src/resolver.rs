//! The dependency registry and DFS resolution walk.

use kanflow_core::{codes, KanflowError, KanflowResult};
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One declared dependency: a name, a semver constraint, and whether the
/// dependency is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencySpec {
    /// Name of the depended-on service/package.
    pub name: String,
    /// Version constraint, e.g. `>=1.0.0, <2.0.0`.
    pub constraint: VersionReq,
    /// Optional dependencies degrade to an unsatisfied resolution entry
    /// instead of failing the walk.
    pub optional: bool,
}

impl DependencySpec {
    /// A required dependency. Fails on an unparseable constraint.
    pub fn required(name: impl Into<String>, constraint: &str) -> KanflowResult<Self> {
        Ok(Self {
            name: name.into(),
            constraint: parse_constraint(constraint)?,
            optional: false,
        })
    }

    /// An optional dependency. Fails on an unparseable constraint.
    pub fn optional(name: impl Into<String>, constraint: &str) -> KanflowResult<Self> {
        Ok(Self {
            name: name.into(),
            constraint: parse_constraint(constraint)?,
            optional: true,
        })
    }
}

fn parse_constraint(constraint: &str) -> KanflowResult<VersionReq> {
    VersionReq::parse(constraint).map_err(|e| {
        KanflowError::validation(
            codes::VALIDATION_ERROR,
            format!("invalid version constraint '{constraint}': {e}"),
        )
    })
}

fn parse_version(version: &str) -> KanflowResult<Version> {
    Version::parse(version).map_err(|e| {
        KanflowError::validation(
            codes::VALIDATION_ERROR,
            format!("invalid version '{version}': {e}"),
        )
    })
}

/// One registered `(name, version)` node in the dependency graph.
///
/// Back-references (`dependents`) are plain names, not live pointers; all
/// ownership lives in the resolver's arena.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DependencyNode {
    name: String,
    version: Version,
    dependencies: Vec<DependencySpec>,
    dependents: Vec<String>,
    resolved: bool,
}

/// The per-dependency outcome of a resolution walk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    /// Dependency name.
    pub name: String,
    /// The constraint that was requested.
    pub requested: String,
    /// The version selected to satisfy it, when one exists.
    pub selected: Option<Version>,
    /// Whether the dependency was satisfied.
    pub satisfied: bool,
    /// Whether the dependency was declared optional.
    pub optional: bool,
}

/// Directed-graph dependency resolution with cycle detection and
/// best-version selection.
///
/// The input graph may contain cycles; a successful resolution proves the
/// walked subgraph is acyclic and satisfiable.
#[derive(Debug, Default)]
pub struct DependencyResolver {
    registry: HashMap<String, Vec<DependencyNode>>,
}

impl DependencyResolver {
    /// An empty resolver.
    pub fn new() -> Self {
        Self {
            registry: HashMap::new(),
        }
    }

    /// Register a `(name, version)` pair with its dependency specs.
    ///
    /// Records a back-reference on every already-registered version of each
    /// dependency. Re-registering the same pair replaces its specs.
    pub fn register_version(
        &mut self,
        name: &str,
        version: &str,
        dependencies: Vec<DependencySpec>,
    ) -> KanflowResult<()> {
        let version = parse_version(version)?;

        for spec in &dependencies {
            if let Some(nodes) = self.registry.get_mut(&spec.name) {
                for node in nodes {
                    if !node.dependents.contains(&name.to_string()) {
                        node.dependents.push(name.to_string());
                    }
                }
            }
        }

        let nodes = self.registry.entry(name.to_string()).or_default();
        if let Some(existing) = nodes.iter_mut().find(|n| n.version == version) {
            existing.dependencies = dependencies;
            existing.resolved = false;
        } else {
            nodes.push(DependencyNode {
                name: name.to_string(),
                version,
                dependencies,
                dependents: Vec::new(),
                resolved: false,
            });
        }
        Ok(())
    }

    /// Registered versions of a name, ascending.
    pub fn versions_of(&self, name: &str) -> Vec<Version> {
        let mut versions: Vec<Version> = self
            .registry
            .get(name)
            .map(|nodes| nodes.iter().map(|n| n.version.clone()).collect())
            .unwrap_or_default();
        versions.sort();
        versions
    }

    /// Names that depend on the given name (back-references).
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        let mut dependents: Vec<String> = self
            .registry
            .get(name)
            .map(|nodes| {
                nodes
                    .iter()
                    .flat_map(|n| n.dependents.iter().cloned())
                    .collect()
            })
            .unwrap_or_default();
        dependents.sort();
        dependents.dedup();
        dependents
    }

    /// The highest registered version of `name` satisfying every constraint,
    /// or `None` when nothing does.
    pub fn find_best_version(&self, name: &str, constraints: &[VersionReq]) -> Option<Version> {
        self.registry
            .get(name)?
            .iter()
            .filter(|node| constraints.iter().all(|c| c.matches(&node.version)))
            .map(|node| node.version.clone())
            .max()
    }

    /// Recursively resolve the dependencies of a registered `(name, version)`
    /// pair, producing one [`Resolution`] per encountered dependency.
    ///
    /// Cycle detection uses a per-call stack: revisiting a node that is
    /// still being resolved raises [`KanflowError::CircularDependency`];
    /// nodes are removed from the stack on the way back up, so diamonds
    /// (shared dependencies) resolve fine. Unsatisfied optional
    /// dependencies degrade to a warning-level resolution entry; required
    /// ones fail immediately.
    pub fn resolve_dependencies(
        &mut self,
        name: &str,
        version: &str,
    ) -> KanflowResult<Vec<Resolution>> {
        let version = parse_version(version)?;
        let mut stack: Vec<String> = Vec::new();
        let mut resolutions: Vec<Resolution> = Vec::new();
        let mut fully_resolved: Vec<(String, Version)> = Vec::new();

        self.walk(name, &version, &mut stack, &mut resolutions, &mut fully_resolved)?;

        for (resolved_name, resolved_version) in fully_resolved {
            if let Some(nodes) = self.registry.get_mut(&resolved_name) {
                if let Some(node) = nodes.iter_mut().find(|n| n.version == resolved_version) {
                    node.resolved = true;
                }
            }
        }

        Ok(resolutions)
    }

    fn walk(
        &self,
        name: &str,
        version: &Version,
        stack: &mut Vec<String>,
        resolutions: &mut Vec<Resolution>,
        fully_resolved: &mut Vec<(String, Version)>,
    ) -> KanflowResult<()> {
        if stack.iter().any(|entry| entry == name) {
            let mut chain = stack.clone();
            chain.push(name.to_string());
            return Err(KanflowError::CircularDependency {
                chain: chain.join(" -> "),
            });
        }

        let node = self
            .registry
            .get(name)
            .and_then(|nodes| nodes.iter().find(|n| &n.version == version))
            .ok_or_else(|| KanflowError::NotFound(format!("{name}@{version} not registered")))?;

        stack.push(name.to_string());

        for spec in &node.dependencies {
            match self.find_best_version(&spec.name, std::slice::from_ref(&spec.constraint)) {
                Some(selected) => {
                    resolutions.push(Resolution {
                        name: spec.name.clone(),
                        requested: spec.constraint.to_string(),
                        selected: Some(selected.clone()),
                        satisfied: true,
                        optional: spec.optional,
                    });
                    self.walk(&spec.name, &selected, stack, resolutions, fully_resolved)?;
                }
                None if spec.optional => {
                    tracing::warn!(
                        dependency = %spec.name,
                        constraint = %spec.constraint,
                        "optional dependency unsatisfied; degrading"
                    );
                    resolutions.push(Resolution {
                        name: spec.name.clone(),
                        requested: spec.constraint.to_string(),
                        selected: None,
                        satisfied: false,
                        optional: true,
                    });
                }
                None => {
                    return Err(KanflowError::MissingDependency {
                        name: spec.name.clone(),
                        constraint: spec.constraint.to_string(),
                    });
                }
            }
        }

        stack.pop();
        fully_resolved.push((name.to_string(), version.clone()));
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn resolver_with(entries: &[(&str, &str, Vec<DependencySpec>)]) -> DependencyResolver {
        let mut resolver = DependencyResolver::new();
        for (name, version, deps) in entries {
            resolver
                .register_version(name, version, deps.clone())
                .unwrap();
        }
        resolver
    }

    #[test]
    fn test_find_best_version_highest_satisfying() {
        let resolver = resolver_with(&[
            ("svc", "1.0.0", vec![]),
            ("svc", "1.2.0", vec![]),
            ("svc", "2.0.0", vec![]),
        ]);
        let constraint = VersionReq::parse(">=1.0.0, <2.0.0").unwrap();
        let best = resolver.find_best_version("svc", &[constraint]).unwrap();
        assert_eq!(best, Version::parse("1.2.0").unwrap());
    }

    #[test]
    fn test_find_best_version_none_satisfies() {
        let resolver = resolver_with(&[("svc", "1.0.0", vec![]), ("svc", "1.2.0", vec![])]);
        let constraint = VersionReq::parse(">=3.0.0").unwrap();
        assert!(resolver.find_best_version("svc", &[constraint]).is_none());
    }

    #[test]
    fn test_find_best_version_multiple_constraints() {
        let resolver = resolver_with(&[
            ("svc", "1.0.0", vec![]),
            ("svc", "1.2.0", vec![]),
            ("svc", "1.9.0", vec![]),
        ]);
        let a = VersionReq::parse(">=1.0.0").unwrap();
        let b = VersionReq::parse("<1.5.0").unwrap();
        let best = resolver.find_best_version("svc", &[a, b]).unwrap();
        assert_eq!(best, Version::parse("1.2.0").unwrap());
    }

    #[test]
    fn test_unknown_name_has_no_best_version() {
        let resolver = DependencyResolver::new();
        assert!(resolver.find_best_version("ghost", &[]).is_none());
    }

    #[test]
    fn test_versions_of_lists_ascending() {
        let resolver = resolver_with(&[
            ("svc", "2.0.0", vec![]),
            ("svc", "1.0.0", vec![]),
            ("svc", "1.2.0", vec![]),
        ]);
        let versions: Vec<String> = resolver
            .versions_of("svc")
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(versions, ["1.0.0", "1.2.0", "2.0.0"]);
        assert!(resolver.versions_of("ghost").is_empty());
    }

    #[test]
    fn test_resolve_simple_chain() {
        let mut resolver = resolver_with(&[
            ("z", "1.0.0", vec![]),
            ("y", "1.0.0", vec![DependencySpec::required("z", ">=1.0.0").unwrap()]),
            ("x", "1.0.0", vec![DependencySpec::required("y", ">=1.0.0").unwrap()]),
        ]);
        let resolutions = resolver.resolve_dependencies("x", "1.0.0").unwrap();
        assert_eq!(resolutions.len(), 2);
        assert!(resolutions.iter().all(|r| r.satisfied));
        let names: Vec<&str> = resolutions.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["y", "z"]);
    }

    #[test]
    fn test_cycle_detected_and_removal_fixes_it() {
        // x -> y -> z -> x closes a cycle.
        let mut resolver = resolver_with(&[
            ("x", "1.0.0", vec![DependencySpec::required("y", ">=1.0.0").unwrap()]),
            ("y", "1.0.0", vec![DependencySpec::required("z", ">=1.0.0").unwrap()]),
            ("z", "1.0.0", vec![DependencySpec::required("x", ">=1.0.0").unwrap()]),
        ]);
        let err = resolver.resolve_dependencies("x", "1.0.0").unwrap_err();
        assert_eq!(err.code(), codes::CIRCULAR_DEPENDENCY);
        assert!(err.to_string().contains("x -> y -> z -> x"));

        // Dropping the z -> x edge makes the same call succeed.
        resolver.register_version("z", "1.0.0", vec![]).unwrap();
        let resolutions = resolver.resolve_dependencies("x", "1.0.0").unwrap();
        assert_eq!(resolutions.len(), 2);
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        // x depends on y and z; both depend on w. The walk must backtrack
        // the stack so w is visitable twice.
        let mut resolver = resolver_with(&[
            ("w", "1.0.0", vec![]),
            ("y", "1.0.0", vec![DependencySpec::required("w", ">=1.0.0").unwrap()]),
            ("z", "1.0.0", vec![DependencySpec::required("w", ">=1.0.0").unwrap()]),
            (
                "x",
                "1.0.0",
                vec![
                    DependencySpec::required("y", ">=1.0.0").unwrap(),
                    DependencySpec::required("z", ">=1.0.0").unwrap(),
                ],
            ),
        ]);
        let resolutions = resolver.resolve_dependencies("x", "1.0.0").unwrap();
        assert_eq!(resolutions.len(), 4);
        assert!(resolutions.iter().all(|r| r.satisfied));
    }

    #[test]
    fn test_missing_required_dependency_fails() {
        let mut resolver = resolver_with(&[(
            "x",
            "1.0.0",
            vec![DependencySpec::required("ghost", ">=1.0.0").unwrap()],
        )]);
        let err = resolver.resolve_dependencies("x", "1.0.0").unwrap_err();
        assert_eq!(err.code(), codes::MISSING_DEPENDENCY);
    }

    #[test]
    fn test_missing_optional_dependency_degrades() {
        let mut resolver = resolver_with(&[(
            "x",
            "1.0.0",
            vec![DependencySpec::optional("ghost", ">=1.0.0").unwrap()],
        )]);
        let resolutions = resolver.resolve_dependencies("x", "1.0.0").unwrap();
        assert_eq!(resolutions.len(), 1);
        assert!(!resolutions[0].satisfied);
        assert!(resolutions[0].optional);
        assert!(resolutions[0].selected.is_none());
    }

    #[test]
    fn test_unregistered_root_not_found() {
        let mut resolver = DependencyResolver::new();
        let err = resolver.resolve_dependencies("ghost", "1.0.0").unwrap_err();
        assert_eq!(err.code(), codes::NOT_FOUND);
    }

    #[test]
    fn test_resolution_picks_best_per_constraint() {
        let mut resolver = resolver_with(&[
            ("dep", "1.0.0", vec![]),
            ("dep", "1.5.0", vec![]),
            ("dep", "2.0.0", vec![]),
            (
                "app",
                "1.0.0",
                vec![DependencySpec::required("dep", ">=1.0.0, <2.0.0").unwrap()],
            ),
        ]);
        let resolutions = resolver.resolve_dependencies("app", "1.0.0").unwrap();
        assert_eq!(
            resolutions[0].selected,
            Some(Version::parse("1.5.0").unwrap())
        );
    }

    #[test]
    fn test_dependents_back_references() {
        let resolver = resolver_with(&[
            ("base", "1.0.0", vec![]),
            ("a", "1.0.0", vec![DependencySpec::required("base", ">=1.0.0").unwrap()]),
            ("b", "1.0.0", vec![DependencySpec::required("base", ">=1.0.0").unwrap()]),
        ]);
        assert_eq!(resolver.dependents_of("base"), ["a", "b"]);
    }

    #[test]
    fn test_invalid_version_rejected() {
        let mut resolver = DependencyResolver::new();
        let err = resolver
            .register_version("svc", "not-a-version", vec![])
            .unwrap_err();
        assert_eq!(err.code(), codes::VALIDATION_ERROR);
    }
}
