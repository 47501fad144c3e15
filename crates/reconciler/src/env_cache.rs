//! Env cache: ordered store of derived configuration entries.
//!
//! Entries are either literal values or references to a secret key. An
//! entry whose literal contains `$(OTHER)` tokens declares `OTHER` as a
//! dependency; the container runtime performs the substitution, and it only
//! resolves names defined earlier in the env list. The cache keeps those
//! dependencies as plain graph edges. [`EnvCache::render`] is the one place
//! that looks at the graph as a whole: it rejects cycles and emits entries
//! so that every dependency precedes its dependents.

use indexmap::{IndexMap, IndexSet};
use k8s_openapi::api::core::v1::{EnvVar, EnvVarSource, SecretKeySelector};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::DfsPostOrder;
use tracing::debug;

use crate::error::{Error, Result};

/// Value of an env entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvValue {
    /// A plain string, possibly containing `$(NAME)` tokens.
    Literal(String),
    /// A key of a secret, resolved by the cluster when the pod starts.
    SecretRef { secret_name: String, key: String },
}

/// One named configuration value with its interpolation dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvCacheEntry {
    name: String,
    value: EnvValue,
    dependencies: IndexSet<String>,
}

impl EnvCacheEntry {
    pub fn literal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: EnvValue::Literal(value.into()),
            dependencies: IndexSet::new(),
        }
    }

    pub fn secret_ref(
        name: impl Into<String>,
        secret_name: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: EnvValue::SecretRef {
                secret_name: secret_name.into(),
                key: key.into(),
            },
            dependencies: IndexSet::new(),
        }
    }

    /// Declare that this entry's value references `name` for substitution.
    #[must_use]
    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        self.add_dependency(name);
        self
    }

    pub fn add_dependency(&mut self, name: impl Into<String>) {
        self.dependencies.insert(name.into());
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn value(&self) -> &EnvValue {
        &self.value
    }

    pub const fn dependencies(&self) -> &IndexSet<String> {
        &self.dependencies
    }

    /// The literal value, `None` for secret references.
    pub fn literal_value(&self) -> Option<&str> {
        match &self.value {
            EnvValue::Literal(value) => Some(value),
            EnvValue::SecretRef { .. } => None,
        }
    }

    /// The referenced secret name, `None` for literals.
    pub fn secret_name(&self) -> Option<&str> {
        match &self.value {
            EnvValue::Literal(_) => None,
            EnvValue::SecretRef { secret_name, .. } => Some(secret_name),
        }
    }

    /// Container env var for this entry.
    pub fn to_env_var(&self) -> EnvVar {
        match &self.value {
            EnvValue::Literal(value) => EnvVar {
                name: self.name.clone(),
                value: Some(value.clone()),
                value_from: None,
            },
            EnvValue::SecretRef { secret_name, key } => EnvVar {
                name: self.name.clone(),
                value: None,
                value_from: Some(EnvVarSource {
                    secret_key_ref: Some(SecretKeySelector {
                        name: secret_name.clone(),
                        key: key.clone(),
                        optional: None,
                    }),
                    ..EnvVarSource::default()
                }),
            },
        }
    }
}

/// Ordered name → entry store.
#[derive(Debug, Default)]
pub struct EnvCache {
    entries: IndexMap<String, EnvCacheEntry>,
    generation: u64,
}

impl EnvCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry with the same name.
    ///
    /// A new name is appended; an existing name keeps its position. Returns
    /// whether the stored content changed.
    pub fn set(&mut self, entry: EnvCacheEntry) -> bool {
        if self.entries.get(entry.name()) == Some(&entry) {
            return false;
        }
        debug!(name = entry.name(), "Setting env cache entry");
        self.entries.insert(entry.name.clone(), entry);
        self.generation = self.generation.wrapping_add(1);
        true
    }

    pub fn get(&self, name: &str) -> Option<&EnvCacheEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &EnvCacheEntry> {
        self.entries.values()
    }

    /// `(entry, dependency)` pairs whose dependency is not in the cache.
    pub fn missing_dependencies(&self) -> Vec<(&str, &str)> {
        let entries = &self.entries;
        entries
            .values()
            .flat_map(move |entry| {
                entry
                    .dependencies
                    .iter()
                    .filter(move |dep| !entries.contains_key(dep.as_str()))
                    .map(move |dep| (entry.name(), dep.as_str()))
            })
            .collect()
    }

    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Linearize the cache into container env vars.
    ///
    /// Insertion order is kept except where an entry depends on one inserted
    /// later; that dependency is moved in front of it. Dependencies on names
    /// not in the cache are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DependencyCycle`] when entries depend on each other
    /// in a cycle, including an entry depending on itself.
    pub fn render(&self) -> Result<Vec<EnvVar>> {
        let mut graph: DiGraph<&str, ()> = DiGraph::with_capacity(self.entries.len(), 0);
        let nodes: IndexMap<&str, NodeIndex> = self
            .entries
            .keys()
            .map(|name| (name.as_str(), graph.add_node(name.as_str())))
            .collect();

        for (name, entry) in &self.entries {
            let Some(&from) = nodes.get(name.as_str()) else {
                continue;
            };
            for dep in &entry.dependencies {
                if let Some(&to) = nodes.get(dep.as_str()) {
                    graph.add_edge(from, to, ());
                }
            }
        }

        toposort(&graph, None).map_err(|cycle| {
            let entry = graph
                .node_weight(cycle.node_id())
                .copied()
                .unwrap_or_default();
            Error::dependency_cycle(entry)
        })?;

        let mut dfs = DfsPostOrder::empty(&graph);
        let mut rendered = Vec::with_capacity(self.entries.len());
        for &start in nodes.values() {
            dfs.move_to(start);
            while let Some(node) = dfs.next(&graph) {
                let entry = graph
                    .node_weight(node)
                    .and_then(|name| self.entries.get(*name));
                if let Some(entry) = entry {
                    rendered.push(entry.to_env_var());
                }
            }
        }
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(vars: &[EnvVar]) -> Vec<&str> {
        vars.iter().map(|v| v.name.as_str()).collect()
    }

    #[test]
    fn test_set_preserves_insertion_order() {
        let mut cache = EnvCache::new();
        cache.set(EnvCacheEntry::literal("B", "1"));
        cache.set(EnvCacheEntry::literal("A", "2"));
        cache.set(EnvCacheEntry::literal("C", "3"));

        let order: Vec<&str> = cache.iter().map(EnvCacheEntry::name).collect();
        assert_eq!(order, vec!["B", "A", "C"]);
    }

    #[test]
    fn test_reset_updates_in_place() {
        let mut cache = EnvCache::new();
        cache.set(EnvCacheEntry::literal("A", "1"));
        cache.set(EnvCacheEntry::literal("B", "2"));
        assert!(cache.set(EnvCacheEntry::literal("A", "changed")));

        let order: Vec<&str> = cache.iter().map(EnvCacheEntry::name).collect();
        assert_eq!(order, vec!["A", "B"]);
        assert_eq!(
            cache.get("A").and_then(EnvCacheEntry::literal_value),
            Some("changed")
        );
    }

    #[test]
    fn test_identical_set_is_not_a_mutation() {
        let mut cache = EnvCache::new();
        assert!(cache.set(EnvCacheEntry::literal("A", "1")));
        let generation = cache.generation();

        assert!(!cache.set(EnvCacheEntry::literal("A", "1")));
        assert_eq!(cache.generation(), generation);
    }

    #[test]
    fn test_dangling_dependency_is_tolerated() {
        let mut cache = EnvCache::new();
        cache.set(EnvCacheEntry::literal("JAAS", "user=$(USER)").with_dependency("USER"));

        assert_eq!(cache.missing_dependencies(), vec![("JAAS", "USER")]);
        assert_eq!(cache.render().ok().map(|v| v.len()), Some(1));

        cache.set(EnvCacheEntry::literal("USER", "u1"));
        assert!(cache.missing_dependencies().is_empty());
        assert_eq!(
            cache.get("JAAS").map(|e| e.dependencies().len()),
            Some(1)
        );
    }

    #[test]
    fn test_render_moves_dependencies_first() {
        let mut cache = EnvCache::new();
        cache.set(EnvCacheEntry::literal("FIRST", "1"));
        cache.set(
            EnvCacheEntry::literal("JAAS", "$(USER) $(PASSWORD)")
                .with_dependency("USER")
                .with_dependency("PASSWORD"),
        );
        cache.set(EnvCacheEntry::literal("USER", "u1"));
        cache.set(EnvCacheEntry::secret_ref("PASSWORD", "p1", "password"));

        let rendered = cache.render().unwrap_or_default();
        let order = names(&rendered);
        let position = |name: &str| order.iter().position(|n| *n == name);

        assert_eq!(order.len(), 4);
        assert_eq!(order.first(), Some(&"FIRST"));
        assert!(position("USER") < position("JAAS"));
        assert!(position("PASSWORD") < position("JAAS"));
    }

    #[test]
    fn test_render_keeps_order_when_already_valid() {
        let mut cache = EnvCache::new();
        cache.set(EnvCacheEntry::literal("USER", "u1"));
        cache.set(EnvCacheEntry::literal("JAAS", "$(USER)").with_dependency("USER"));
        cache.set(EnvCacheEntry::literal("LAST", "x"));

        let rendered = cache.render().unwrap_or_default();
        assert_eq!(names(&rendered), vec!["USER", "JAAS", "LAST"]);
    }

    #[test]
    fn test_render_rejects_cycle() {
        let mut cache = EnvCache::new();
        cache.set(EnvCacheEntry::literal("A", "$(B)").with_dependency("B"));
        cache.set(EnvCacheEntry::literal("B", "$(A)").with_dependency("A"));

        assert!(matches!(
            cache.render(),
            Err(Error::DependencyCycle { .. })
        ));
    }

    #[test]
    fn test_render_rejects_self_dependency() {
        let mut cache = EnvCache::new();
        cache.set(EnvCacheEntry::literal("A", "$(A)").with_dependency("A"));

        assert_eq!(cache.render(), Err(Error::dependency_cycle("A")));
    }

    #[test]
    fn test_secret_ref_renders_value_from() {
        let var = EnvCacheEntry::secret_ref("PASSWORD", "p1", "password").to_env_var();
        let selector = var.value_from.and_then(|source| source.secret_key_ref);

        assert!(var.value.is_none());
        assert_eq!(selector.as_ref().map(|s| s.name.as_str()), Some("p1"));
        assert_eq!(selector.map(|s| s.key), Some("password".to_string()));
    }
}
