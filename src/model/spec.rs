//! The normalized, validated model specification.
//!
//! A `ModelSpec` is produced once by the parser and is read-only afterwards.
//! Every consumer works from these typed structures rather than re-reading
//! the document.

use crate::layout::{Dimension, EntityFilter};
use indexmap::IndexSet;
use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::Path;

use super::error::SpecValidationError;
use super::parser;

/// A stage in the statistical hierarchy. The declaration order is the
/// aggregation order: a level may only follow levels that rank below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelKind {
    Run,
    Session,
    Subject,
    Dataset,
}

impl LevelKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "run" => Some(LevelKind::Run),
            "session" => Some(LevelKind::Session),
            "subject" | "participant" => Some(LevelKind::Subject),
            "dataset" => Some(LevelKind::Dataset),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LevelKind::Run => "run",
            LevelKind::Session => "session",
            LevelKind::Subject => "subject",
            LevelKind::Dataset => "dataset",
        }
    }

    /// Grouping used when a level does not declare `GroupBy`.
    pub fn default_group_by(&self) -> Vec<Dimension> {
        match self {
            LevelKind::Run => Vec::new(),
            LevelKind::Session => vec![Dimension::Subject, Dimension::Session],
            LevelKind::Subject => vec![Dimension::Subject],
            LevelKind::Dataset => Vec::new(),
        }
    }
}

impl fmt::Display for LevelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `*` glob over confound column names.
#[derive(Debug, Clone)]
pub struct WildcardPattern {
    source: String,
    regex: Regex,
}

impl WildcardPattern {
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        let escaped: Vec<String> = source.split('*').map(regex::escape).collect();
        let regex = Regex::new(&format!("^{}$", escaped.join(".*")))?;
        Ok(Self { source: source.to_string(), regex })
    }

    pub fn matches(&self, name: &str) -> bool { self.regex.is_match(name) }

    pub fn as_str(&self) -> &str { &self.source }
}

impl PartialEq for WildcardPattern {
    fn eq(&self, other: &Self) -> bool { self.source == other.source }
}

impl Eq for WildcardPattern {}

impl Serialize for WildcardPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

/// Where a declared regressor is expected to come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegressorSource {
    /// A column of the run's confounds table.
    Confound,
    /// A `column.value` condition from the run's events table.
    Event { column: String, value: String },
    /// Expands to every matching confound column of a run.
    Wildcard(WildcardPattern),
    /// A literal such as the intercept `1`; always available.
    Constant,
}

impl RegressorSource {
    pub fn classify(name: &str, numeric: bool) -> Result<Self, regex::Error> {
        if numeric {
            return Ok(RegressorSource::Constant);
        }
        if name.contains('*') {
            return Ok(RegressorSource::Wildcard(WildcardPattern::new(name)?));
        }
        Ok(match name.split_once('.') {
            Some((column, value)) if !column.is_empty() && !value.is_empty() => RegressorSource::Event {
                column: column.to_string(),
                value: value.to_string(),
            },
            _ => RegressorSource::Confound,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegressorSpec {
    pub name: String,
    /// Optional regressors are dropped quietly when a run lacks them.
    pub optional: bool,
    pub source: RegressorSource,
}

/// An opaque transformation block, carried through to the backend untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transformation {
    pub name: String,
    pub body: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelBlock {
    pub regressors: Vec<RegressorSpec>,
    pub hrf: Option<String>,
    pub transformations: Vec<Transformation>,
}

impl ModelBlock {
    /// Names of every regressor that is not a wildcard.
    pub fn exact_names(&self) -> impl Iterator<Item = &str> {
        self.regressors
            .iter()
            .filter(|r| !matches!(r.source, RegressorSource::Wildcard(_)))
            .map(|r| r.name.as_str())
    }

    pub fn patterns(&self) -> impl Iterator<Item = &WildcardPattern> {
        self.regressors.iter().filter_map(|r| match &r.source {
            RegressorSource::Wildcard(p) => Some(p),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TestType {
    #[serde(rename = "t")]
    T,
    F,
}

impl TestType {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "t" => Some(TestType::T),
            "f" => Some(TestType::F),
            _ => None,
        }
    }
}

/// A named linear combination of regressors or of lower-level contrasts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContrastSpec {
    pub name: String,
    pub conditions: Vec<String>,
    /// One row per tested combination; every row lines up with `conditions`.
    /// A t contrast has exactly one row.
    pub weights: Vec<Vec<f64>>,
    pub test: TestType,
}

impl ContrastSpec {
    /// Unit-weight contrast on a single condition, as generated for dummy contrasts.
    pub fn indicator(name: &str, test: TestType) -> Self {
        Self {
            name: name.to_string(),
            conditions: vec![name.to_string()],
            weights: vec![vec![1.0]],
            test,
        }
    }

    /// Every name this contrast puts weight on.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.conditions.iter().map(|c| c.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DummyContrasts {
    /// `None` means "every available name".
    pub conditions: Option<Vec<String>>,
    pub test: TestType,
}

/// Aggregation statistic requested from the modeling backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Effects {
    Fixed,
    Random,
}

impl Effects {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "fixed" => Some(Effects::Fixed),
            "random" => Some(Effects::Random),
            _ => None,
        }
    }

    /// Within-subject aggregation defaults to fixed effects, anything that
    /// collapses subjects to random effects.
    pub fn default_for(group_by: &[Dimension]) -> Self {
        if group_by.contains(&Dimension::Subject) { Effects::Fixed } else { Effects::Random }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelSpec {
    pub kind: LevelKind,
    pub model: ModelBlock,
    pub contrasts: Vec<ContrastSpec>,
    pub dummy_contrasts: Option<DummyContrasts>,
    /// Grouping applied when aggregating into this level. Empty at the run level.
    pub group_by: Vec<Dimension>,
    pub filter: EntityFilter,
    /// `None` at the run level, which does not aggregate.
    pub effects: Option<Effects>,
}

impl LevelSpec {
    pub fn name(&self) -> &'static str { self.kind.as_str() }

    pub fn is_lowest(&self) -> bool { self.kind == LevelKind::Run }

    /// The entity dimensions a unit key at this level carries.
    pub fn key_dimensions(&self) -> Vec<Dimension> {
        if self.is_lowest() {
            Dimension::DATASET_ENTITIES.to_vec()
        } else {
            self.group_by.iter().copied().filter(|d| d.is_dataset_entity()).collect()
        }
    }

    /// Names a contrast at this level may reference, given what the level
    /// below produces. The run level sees only its own regressors.
    pub fn available_names(&self, inputs: &NameSet) -> NameSet {
        let mut names = if self.is_lowest() { NameSet::new() } else { inputs.clone() };
        for name in self.model.exact_names() {
            names.insert(name);
        }
        for pattern in self.model.patterns() {
            names.insert_pattern(pattern.clone());
        }
        names
    }

    /// Lower-level contrasts that `contrast` puts weight on together. Only a
    /// level grouped by `contrast` reports them, since each of its units sees
    /// a single input; more than one can never resolve in any unit.
    pub fn combined_inputs<'a>(&self, contrast: &'a ContrastSpec, inputs: &NameSet) -> Vec<&'a str> {
        if !self.group_by.contains(&Dimension::Contrast) {
            return Vec::new();
        }
        let own: Vec<&str> = self.model.exact_names().collect();
        contrast.keys().filter(|k| inputs.contains(k) && !own.contains(k)).collect()
    }

    /// Contrast names this level would produce if every name in `available`
    /// were present. Units compute their real outputs per unit.
    pub fn declared_outputs(&self, inputs: &NameSet) -> NameSet {
        let mut outputs = NameSet::new();
        if let Some(dummy) = &self.dummy_contrasts {
            match &dummy.conditions {
                Some(conditions) => conditions.iter().for_each(|c| outputs.insert(c)),
                None if self.is_lowest() => {
                    self.model.exact_names().for_each(|n| outputs.insert(n));
                    self.model.patterns().for_each(|p| outputs.insert_pattern(p.clone()));
                }
                None => outputs.extend(inputs),
            }
        }
        for contrast in &self.contrasts {
            outputs.insert(&contrast.name);
        }
        outputs
    }
}

/// An insertion-ordered set of names plus wildcard patterns that stand in for
/// names only known per unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameSet {
    exact: IndexSet<String>,
    patterns: Vec<WildcardPattern>,
}

impl NameSet {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&mut self, name: &str) {
        if !self.exact.contains(name) {
            self.exact.insert(name.to_string());
        }
    }

    pub fn insert_pattern(&mut self, pattern: WildcardPattern) {
        if !self.patterns.contains(&pattern) {
            self.patterns.push(pattern);
        }
    }

    pub fn extend(&mut self, other: &NameSet) {
        other.exact.iter().for_each(|n| self.insert(n));
        other.patterns.iter().for_each(|p| self.insert_pattern(p.clone()));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.exact.contains(name) || self.patterns.iter().any(|p| p.matches(name))
    }

    /// Concrete names only, in first-insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.exact.iter().map(|n| n.as_str())
    }

    pub fn is_empty(&self) -> bool { self.exact.is_empty() && self.patterns.is_empty() }
}

impl<'a> FromIterator<&'a str> for NameSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut set = NameSet::new();
        iter.into_iter().for_each(|n| set.insert(n));
        set
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSpec {
    pub name: String,
    pub description: Option<String>,
    /// Strictly ordered from the run level upwards. Parsed models always have
    /// at least one level.
    pub levels: Vec<LevelSpec>,
}

impl ModelSpec {
    pub fn from_json_str(text: &str) -> Result<Self, SpecValidationError> {
        parser::parse_str(text)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SpecValidationError> {
        parser::parse_path(path.as_ref())
    }

    /// The run level, or `None` for a model built by hand with no levels.
    pub fn lowest(&self) -> Option<&LevelSpec> { self.levels.first() }

    pub fn level_position(&self, name: &str) -> Option<usize> {
        let kind = LevelKind::parse(name)?;
        self.levels.iter().position(|l| l.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("a_comp_cor_*", "a_comp_cor_00", true)]
    #[case("a_comp_cor_*", "t_comp_cor_00", false)]
    #[case("*_x", "trans_x", true)]
    #[case("motion.*", "motion.x", true)]
    #[case("motion.*", "motionAx", false)]
    fn test_wildcard_matching(#[case] pattern: &str, #[case] name: &str, #[case] expected: bool) {
        let pattern = WildcardPattern::new(pattern).unwrap();
        assert_eq!(pattern.matches(name), expected);
    }

    #[rstest]
    #[case("trial_type.congruent", false, "event")]
    #[case("drift", false, "confound")]
    #[case("a_comp_cor_*", false, "wildcard")]
    #[case("1", true, "constant")]
    #[case("weird.", false, "confound")]
    fn test_regressor_classification(#[case] name: &str, #[case] numeric: bool, #[case] expected: &str) {
        let kind = match RegressorSource::classify(name, numeric).unwrap() {
            RegressorSource::Event { .. } => "event",
            RegressorSource::Confound => "confound",
            RegressorSource::Wildcard(_) => "wildcard",
            RegressorSource::Constant => "constant",
        };
        assert_eq!(kind, expected);
    }

    #[test]
    fn test_name_set_keeps_first_insertion_order() {
        let mut set: NameSet = ["b", "a"].into_iter().collect();
        set.insert("b");
        set.insert_pattern(WildcardPattern::new("c_*").unwrap());
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["b", "a"]);
        assert!(set.contains("c_1"));
        assert!(!set.contains("d"));
    }

    #[test]
    fn test_default_effects() {
        assert_eq!(Effects::default_for(&[Dimension::Subject]), Effects::Fixed);
        assert_eq!(Effects::default_for(&[Dimension::Contrast]), Effects::Random);
    }
}
