//! Field mapping engine.
//!
//! A [`MappingDefinition`] holds the copy and rename rules loaded from
//! configuration. A [`FieldMapper`] applies them to every [`FieldStore`] of a
//! request: the query parameters and, when it decoded, the JSON body.

mod body;
mod query;

pub use body::{decode_body, BodyMap, BodyUndecodable};
pub use query::{QueryParams, QueryValue};

use crate::config::{ConfigError, MapperConfig, Phase};
use crate::context::RequestView;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// A keyed collection that copy and rename rules can operate on.
pub trait FieldStore {
    /// What a rule carries from its source to its destination.
    type Value;

    /// Value of `key` if it is eligible as a rule source.
    fn source_value(&self, key: &str) -> Option<Self::Value>;

    /// Set `key` to `value`, replacing whatever was stored there.
    fn write(&mut self, key: &str, value: Self::Value);

    /// Remove `key` entirely.
    fn remove(&mut self, key: &str);
}

/// A single source -> destination rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRule {
    /// Key to read from
    pub source: String,
    /// Key to write to
    pub dest: String,
}

impl FieldRule {
    /// Create a new rule.
    pub fn new(source: impl Into<String>, dest: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            dest: dest.into(),
        }
    }
}

/// Immutable mapping rules and the phases they apply to.
///
/// Rules are kept sorted by source key. When two rules of the same phase
/// write the same destination, the one with the greater source key wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingDefinition {
    copy_rules: Vec<FieldRule>,
    rename_rules: Vec<FieldRule>,
    scope: BTreeSet<Phase>,
}

impl MappingDefinition {
    /// Build a definition from parsed configuration.
    pub fn new(config: MapperConfig) -> Self {
        if config.is_empty() {
            debug!("Mapping has no copy or rename rules");
        }

        let definition = Self {
            copy_rules: into_rules(config.copy_fields),
            rename_rules: into_rules(config.map_fields),
            scope: config.scope.into_iter().collect(),
        };

        if definition.scope.is_empty() {
            warn!("Mapping has an empty scope and will never be invoked by the proxy");
        }
        if definition.applies_to(Phase::Response) {
            warn!("Mapping only modifies requests; the response scope has no effect");
        }

        info!(
            copy_rules = definition.copy_rules.len(),
            rename_rules = definition.rename_rules.len(),
            scope = ?definition.scope,
            "Mapping definition loaded"
        );

        definition
    }

    /// Load a definition from a JSON configuration payload.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ConfigError> {
        MapperConfig::from_json(bytes).map(Self::new)
    }

    /// Load a definition from a YAML configuration string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        MapperConfig::from_yaml(yaml).map(Self::new)
    }

    /// Copy rules, ordered by source key.
    pub fn copy_rules(&self) -> &[FieldRule] {
        &self.copy_rules
    }

    /// Rename rules, ordered by source key.
    pub fn rename_rules(&self) -> &[FieldRule] {
        &self.rename_rules
    }

    /// Phases this definition applies to.
    pub fn scope(&self) -> &BTreeSet<Phase> {
        &self.scope
    }

    /// Whether the definition applies to `phase`.
    pub fn applies_to(&self, phase: Phase) -> bool {
        self.scope.contains(&phase)
    }
}

fn into_rules(fields: BTreeMap<String, String>) -> Vec<FieldRule> {
    fields
        .into_iter()
        .map(|(source, dest)| FieldRule::new(source, dest))
        .collect()
}

/// Applies a [`MappingDefinition`] to request views.
///
/// Cheap to clone; the definition is shared read-only.
#[derive(Debug, Clone)]
pub struct FieldMapper {
    definition: Arc<MappingDefinition>,
}

impl FieldMapper {
    /// Create a mapper for the given definition.
    pub fn new(definition: impl Into<Arc<MappingDefinition>>) -> Self {
        Self {
            definition: definition.into(),
        }
    }

    /// The definition this mapper applies.
    pub fn definition(&self) -> &MappingDefinition {
        &self.definition
    }

    /// Apply copy then rename rules to the query and, if present, the body.
    pub fn apply(&self, view: &mut RequestView) {
        self.apply_to(&mut view.query);

        match view.body.as_mut() {
            Some(body) => self.apply_to(body),
            None => trace!("No decoded body, skipping body rules"),
        }
    }

    /// Apply copy then rename rules to a single store.
    pub fn apply_to<S: FieldStore + ?Sized>(&self, store: &mut S) {
        copy_fields(store, &self.definition.copy_rules);
        rename_fields(store, &self.definition.rename_rules);
    }
}

/// Duplicate every present source under its destination.
///
/// Values are read before anything is written, so a rule never observes the
/// output of another rule in the same phase.
fn copy_fields<S: FieldStore + ?Sized>(store: &mut S, rules: &[FieldRule]) {
    let pending: Vec<(&str, S::Value)> = rules
        .iter()
        .filter_map(|rule| {
            store
                .source_value(&rule.source)
                .map(|value| (rule.dest.as_str(), value))
        })
        .collect();

    for (dest, value) in pending {
        store.write(dest, value);
    }
}

/// Move every present source to its destination.
///
/// All values are captured, then all sources removed, then all destinations
/// written. A destination that is also another rule's source therefore keeps
/// the moved value.
fn rename_fields<S: FieldStore + ?Sized>(store: &mut S, rules: &[FieldRule]) {
    let mut moved = Vec::new();
    let mut pending = Vec::new();

    for rule in rules {
        if let Some(value) = store.source_value(&rule.source) {
            moved.push(rule.source.as_str());
            pending.push((rule.dest.as_str(), value));
        }
    }

    for source in moved {
        store.remove(source);
    }

    for (dest, value) in pending {
        store.write(dest, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(copy: &[(&str, &str)], rename: &[(&str, &str)]) -> MappingDefinition {
        let config = MapperConfig {
            copy_fields: copy
                .iter()
                .map(|(s, d)| (s.to_string(), d.to_string()))
                .collect(),
            map_fields: rename
                .iter()
                .map(|(s, d)| (s.to_string(), d.to_string()))
                .collect(),
            scope: vec![Phase::Request],
        };
        MappingDefinition::new(config)
    }

    fn body(pairs: &[(&str, &str)]) -> BodyMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_rules_sorted_by_source() {
        let def = definition(&[("zeta", "z"), ("alpha", "a")], &[]);
        let sources: Vec<_> = def.copy_rules().iter().map(|r| r.source.as_str()).collect();
        assert_eq!(sources, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_scope() {
        let def = definition(&[], &[]);
        assert!(def.applies_to(Phase::Request));
        assert!(!def.applies_to(Phase::Response));

        let def = MappingDefinition::from_json(b"{}").unwrap();
        assert!(def.scope().is_empty());
    }

    #[test]
    fn test_copy_keeps_source() {
        let mapper = FieldMapper::new(definition(&[("user_id", "token")], &[]));
        let mut store = body(&[("user_id", "John Doe"), ("occupation", "gardener")]);

        mapper.apply_to(&mut store);

        assert_eq!(
            store,
            body(&[
                ("occupation", "gardener"),
                ("token", "John Doe"),
                ("user_id", "John Doe"),
            ])
        );
    }

    #[test]
    fn test_copy_is_idempotent() {
        let mapper = FieldMapper::new(definition(&[("a", "b")], &[]));
        let mut store = body(&[("a", "1")]);

        mapper.apply_to(&mut store);
        let once = store.clone();
        mapper.apply_to(&mut store);

        assert_eq!(store, once);
    }

    #[test]
    fn test_rename_removes_source() {
        let mapper = FieldMapper::new(definition(&[], &[("user_id", "token"), ("missing", "x")]));
        let mut store = body(&[("user_id", "John Doe"), ("occupation", "gardener")]);

        mapper.apply_to(&mut store);

        assert_eq!(
            store,
            body(&[("occupation", "gardener"), ("token", "John Doe")])
        );
        assert!(!store.contains_key("x"));
    }

    #[test]
    fn test_copy_then_rename_same_source() {
        let mapper = FieldMapper::new(definition(
            &[("user_id", "token"), ("occupation", "job")],
            &[("user_id", "token")],
        ));
        let mut store = body(&[("user_id", "John Doe"), ("occupation", "gardener")]);

        mapper.apply_to(&mut store);

        assert_eq!(
            store,
            body(&[
                ("job", "gardener"),
                ("occupation", "gardener"),
                ("token", "John Doe"),
            ])
        );
    }

    #[test]
    fn test_rename_chain_does_not_alias() {
        // a -> b and b -> c must move the original values, not cascade.
        let mapper = FieldMapper::new(definition(&[], &[("a", "b"), ("b", "c")]));
        let mut store = body(&[("a", "1"), ("b", "2")]);

        mapper.apply_to(&mut store);

        assert_eq!(store, body(&[("b", "1"), ("c", "2")]));
    }

    #[test]
    fn test_rename_swap() {
        let mapper = FieldMapper::new(definition(&[], &[("a", "b"), ("b", "a")]));
        let mut store = body(&[("a", "1"), ("b", "2")]);

        mapper.apply_to(&mut store);

        assert_eq!(store, body(&[("a", "2"), ("b", "1")]));
    }

    #[test]
    fn test_copy_chain_reads_original_values() {
        let mapper = FieldMapper::new(definition(&[("a", "b"), ("b", "c")], &[]));
        let mut store = body(&[("a", "1"), ("b", "2")]);

        mapper.apply_to(&mut store);

        assert_eq!(store, body(&[("a", "1"), ("b", "1"), ("c", "2")]));
    }

    #[test]
    fn test_same_destination_last_source_wins() {
        let mapper = FieldMapper::new(definition(&[("first", "dest"), ("second", "dest")], &[]));
        let mut store = body(&[("first", "1"), ("second", "2")]);

        mapper.apply_to(&mut store);

        assert_eq!(store.get("dest").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_rename_onto_itself() {
        let mapper = FieldMapper::new(definition(&[], &[("a", "a")]));
        let mut store = body(&[("a", "1")]);

        mapper.apply_to(&mut store);

        assert_eq!(store, body(&[("a", "1")]));
    }

    #[test]
    fn test_apply_without_body() {
        let mapper = FieldMapper::new(definition(&[], &[("user_id", "token")]));
        let mut view = RequestView::parse(Some("user_id=1"), b"");

        mapper.apply(&mut view);

        assert!(view.body.is_none());
        assert_eq!(view.query.get("token"), Some("1"));
        assert!(!view.query.contains_key("user_id"));
    }
}
