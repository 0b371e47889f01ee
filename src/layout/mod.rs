//! The dataset layout adapter.
//!
//! The compiler never touches the filesystem. It asks a `DatasetLayout` which
//! run-level entity combinations exist and what per-run metadata (confound
//! columns, event conditions, timing) is available for each of them. Metadata
//! comes back as a fixed-shape `UnitMetadata`, so every lookup is an explicit
//! optional value rather than an open-ended attribute bag.
pub mod snapshot;

pub use snapshot::LayoutSnapshot;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fmt;

/// One axis of an analysis unit's identity.
///
/// The declaration order is the canonical key order used for display and sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    #[serde(alias = "participant")]
    Subject,
    Session,
    Task,
    Run,
    /// Not a dataset entity: produced by the contrasts of a lower level.
    Contrast,
}

impl Dimension {
    /// The entities a dataset layout can enumerate.
    pub const DATASET_ENTITIES: [Dimension; 4] =
        [Dimension::Subject, Dimension::Session, Dimension::Task, Dimension::Run];

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "subject" | "participant" | "sub" => Some(Dimension::Subject),
            "session" | "ses" => Some(Dimension::Session),
            "task" => Some(Dimension::Task),
            "run" => Some(Dimension::Run),
            "contrast" => Some(Dimension::Contrast),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Subject => "subject",
            Dimension::Session => "session",
            Dimension::Task => "task",
            Dimension::Run => "run",
            Dimension::Contrast => "contrast",
        }
    }

    /// Short BIDS-style prefix used when rendering a key (`sub-01_ses-1`).
    pub fn prefix(&self) -> &'static str {
        match self {
            Dimension::Subject => "sub",
            Dimension::Session => "ses",
            Dimension::Task => "task",
            Dimension::Run => "run",
            Dimension::Contrast => "contrast",
        }
    }

    pub fn is_dataset_entity(&self) -> bool {
        !matches!(self, Dimension::Contrast)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The entity tuple identifying one analysis unit, e.g. `{subject: 01, run: 2}`.
///
/// Entries are kept sorted by `Dimension`, so two keys with the same entries
/// compare, hash and render identically regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "BTreeMap<Dimension, String>", into = "BTreeMap<Dimension, String>")]
pub struct EntityKey(SmallVec<[(Dimension, String); 4]>);

impl EntityKey {
    pub fn new() -> Self { Self::default() }

    /// Builder-style insert. An existing value for `dim` is replaced.
    pub fn with(mut self, dim: Dimension, value: impl Into<String>) -> Self {
        self.insert(dim, value);
        self
    }

    pub fn insert(&mut self, dim: Dimension, value: impl Into<String>) {
        let value = value.into();
        match self.0.binary_search_by(|(d, _)| d.cmp(&dim)) {
            Ok(pos) => self.0[pos].1 = value,
            Err(pos) => self.0.insert(pos, (dim, value)),
        }
    }

    pub fn get(&self, dim: Dimension) -> Option<&str> {
        self.0
            .binary_search_by(|(d, _)| d.cmp(&dim))
            .ok()
            .map(|pos| self.0[pos].1.as_str())
    }

    pub fn contains(&self, dim: Dimension) -> bool { self.get(dim).is_some() }

    pub fn dimensions(&self) -> impl Iterator<Item = Dimension> + '_ {
        self.0.iter().map(|(d, _)| *d)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Dimension, &str)> {
        self.0.iter().map(|(d, v)| (*d, v.as_str()))
    }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Keeps only the listed dimensions. Dimensions the key lacks are skipped.
    pub fn project(&self, dims: &[Dimension]) -> EntityKey {
        EntityKey(self.0.iter().filter(|(d, _)| dims.contains(d)).cloned().collect())
    }

    pub fn without(&self, dim: Dimension) -> EntityKey {
        EntityKey(self.0.iter().filter(|(d, _)| *d != dim).cloned().collect())
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("*");
        }
        for (i, (dim, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("_")?;
            }
            write!(f, "{}-{}", dim.prefix(), value)?;
        }
        Ok(())
    }
}

impl From<BTreeMap<Dimension, String>> for EntityKey {
    fn from(map: BTreeMap<Dimension, String>) -> Self {
        // BTreeMap iteration is already in canonical order.
        EntityKey(map.into_iter().collect())
    }
}

impl From<EntityKey> for BTreeMap<Dimension, String> {
    fn from(key: EntityKey) -> Self {
        key.0.into_iter().collect()
    }
}

impl FromIterator<(Dimension, String)> for EntityKey {
    fn from_iter<I: IntoIterator<Item = (Dimension, String)>>(iter: I) -> Self {
        let mut key = EntityKey::new();
        for (dim, value) in iter {
            key.insert(dim, value);
        }
        key
    }
}

/// Entity values compare numerically when both sides are integers, so a
/// filter on run `"2"` accepts a dataset run labelled `"02"`.
pub fn values_match(a: &str, b: &str) -> bool {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x == y,
        _ => a == b,
    }
}

/// Conjunctive entity conditions: every listed dimension must be present in a
/// key and match one of its accepted values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityFilter {
    conditions: BTreeMap<Dimension, Vec<String>>,
}

impl EntityFilter {
    pub fn new() -> Self { Self::default() }

    /// Adds a condition. If the dimension is already constrained, the accepted
    /// values become the intersection of both lists.
    pub fn require(&mut self, dim: Dimension, values: Vec<String>) {
        match self.conditions.get_mut(&dim) {
            Some(existing) => existing.retain(|v| values.iter().any(|w| values_match(v, w))),
            None => {
                self.conditions.insert(dim, values);
            }
        }
    }

    pub fn merge(&mut self, other: &EntityFilter) {
        for (dim, values) in &other.conditions {
            self.require(*dim, values.clone());
        }
    }

    pub fn matches(&self, key: &EntityKey) -> bool {
        self.conditions.iter().all(|(dim, accepted)| match key.get(*dim) {
            Some(value) => accepted.iter().any(|a| values_match(a, value)),
            None => false,
        })
    }

    pub fn conditions(&self) -> impl Iterator<Item = (Dimension, &[String])> {
        self.conditions.iter().map(|(d, v)| (*d, v.as_slice()))
    }

    pub fn is_empty(&self) -> bool { self.conditions.is_empty() }
}

impl fmt::Display for EntityFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conditions.is_empty() {
            return f.write_str("(no conditions)");
        }
        let parts: Vec<String> = self
            .conditions
            .iter()
            .map(|(dim, values)| format!("{} in [{}]", dim, values.join(", ")))
            .collect();
        f.write_str(&parts.join(" AND "))
    }
}

/// What the dataset knows about a single run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitMetadata {
    /// Confound column names, in file order.
    #[serde(default)]
    pub confounds: Vec<String>,
    /// Event columns mapped to the distinct values observed in that column.
    #[serde(default)]
    pub events: IndexMap<String, Vec<String>>,
    #[serde(default)]
    pub repetition_time: Option<f64>,
    #[serde(default)]
    pub volumes: Option<u32>,
}

/// How a regressor name is backed by a run's metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Confound,
    Event,
    Missing,
}

impl UnitMetadata {
    pub fn has_confound(&self, name: &str) -> bool {
        self.confounds.iter().any(|c| c == name)
    }

    pub fn has_event(&self, column: &str, value: &str) -> bool {
        self.events
            .get(column)
            .map_or(false, |values| values.iter().any(|v| v == value))
    }

    /// Looks a regressor name up. `column.value` names refer to event
    /// conditions, anything else to a confound column.
    pub fn availability(&self, name: &str) -> Availability {
        if let Some((column, value)) = name.split_once('.') {
            if self.has_event(column, value) {
                return Availability::Event;
            }
        }
        if self.has_confound(name) {
            Availability::Confound
        } else {
            Availability::Missing
        }
    }
}

/// Read-only query interface over a dataset snapshot.
///
/// Implementations must be deterministic and side-effect free for a given
/// snapshot: compiling the same model twice has to produce the same graph.
pub trait DatasetLayout {
    /// Lists candidate run-level entity keys in a stable order.
    ///
    /// An adapter may use the filter to narrow its query or ignore it; the
    /// enumerator applies the filter to every returned key regardless.
    fn list_entities(&self, filter: &EntityFilter) -> Vec<EntityKey>;

    /// Metadata for one run, or `None` when the dataset has nothing for it.
    fn get_metadata(&self, key: &EntityKey) -> Option<UnitMetadata>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn run_key(sub: &str, run: &str) -> EntityKey {
        EntityKey::new()
            .with(Dimension::Run, run)
            .with(Dimension::Subject, sub)
            .with(Dimension::Task, "stroop")
    }

    #[test]
    fn test_key_is_canonically_ordered() {
        let key = run_key("01", "2");
        let dims: Vec<Dimension> = key.dimensions().collect();
        assert_eq!(dims, vec![Dimension::Subject, Dimension::Task, Dimension::Run]);
        assert_eq!(key.to_string(), "sub-01_task-stroop_run-2");
    }

    #[test]
    fn test_projection_collapses_dimensions() {
        let key = run_key("01", "2").with(Dimension::Session, "a");
        let projected = key.project(&[Dimension::Subject, Dimension::Session]);
        assert_eq!(projected.to_string(), "sub-01_ses-a");
        assert_eq!(key.without(Dimension::Run).get(Dimension::Run), None);
        assert_eq!(EntityKey::new().to_string(), "*");
    }

    #[rstest]
    #[case("2", "02", true)]
    #[case("10", "1", false)]
    #[case("stroop", "stroop", true)]
    #[case("stroop", "Stroop", false)]
    fn test_values_match(#[case] a: &str, #[case] b: &str, #[case] expected: bool) {
        assert_eq!(values_match(a, b), expected);
    }

    #[test]
    fn test_filter_is_conjunctive() {
        let mut filter = EntityFilter::new();
        filter.require(Dimension::Task, vec!["stroop".into()]);
        filter.require(Dimension::Run, vec!["1".into(), "2".into()]);

        assert!(filter.matches(&run_key("01", "02")));
        assert!(!filter.matches(&run_key("01", "3")));
        // A condition on a dimension the key lacks never matches.
        filter.require(Dimension::Session, vec!["a".into()]);
        assert!(!filter.matches(&run_key("01", "1")));
    }

    #[test]
    fn test_filter_require_intersects() {
        let mut filter = EntityFilter::new();
        filter.require(Dimension::Subject, vec!["01".into(), "02".into()]);
        filter.require(Dimension::Subject, vec!["2".into()]);
        assert!(filter.matches(&run_key("02", "1")));
        assert!(!filter.matches(&run_key("01", "1")));
    }

    #[test]
    fn test_metadata_availability() {
        let mut meta = UnitMetadata::default();
        meta.confounds = vec!["drift".into(), "trans_x".into()];
        meta.events.insert("trial_type".into(), vec!["congruent".into()]);

        assert_eq!(meta.availability("drift"), Availability::Confound);
        assert_eq!(meta.availability("trial_type.congruent"), Availability::Event);
        assert_eq!(meta.availability("trial_type.incongruent"), Availability::Missing);
        assert_eq!(meta.availability("rot_z"), Availability::Missing);
    }

    #[test]
    fn test_key_serializes_as_map() {
        let key = run_key("01", "1");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, r#"{"subject":"01","task":"stroop","run":"1"}"#);
        let back: EntityKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
