//! Turns a `ModelDocument` into a validated `ModelSpec`.
use super::document::{
    ContrastDocument, DummyContrastsDocument, LevelDocument, ModelDocument, ModelEntry, RegressorEntry,
    WeightsDocument,
};
use super::error::{SpecValidationError, Violation, ViolationKind};
use super::rules::{chain, filters, grouping, names, references};
use super::spec::{
    ContrastSpec, DummyContrasts, Effects, LevelKind, LevelSpec, ModelBlock, ModelSpec, RegressorSource,
    RegressorSpec, TestType, Transformation,
};
use crate::layout::{Dimension, EntityFilter};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

pub(crate) fn parse_str(text: &str) -> Result<ModelSpec, SpecValidationError> {
    let document: ModelDocument = serde_json::from_str(text).map_err(|e| {
        SpecValidationError::new(vec![Violation::new(
            format!("line {} column {}", e.line(), e.column()),
            ViolationKind::Document,
            e.to_string(),
        )])
    })?;
    SpecParser::new().parse(document)
}

pub(crate) fn parse_path(path: &Path) -> Result<ModelSpec, SpecValidationError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        SpecValidationError::new(vec![Violation::new(
            path.display().to_string(),
            ViolationKind::Document,
            format!("cannot read model document: {}", e),
        )])
    })?;
    parse_str(&text)
}

/// Collects violations while building the typed spec, like a linter: one pass,
/// every problem reported.
pub struct SpecParser {
    violations: Vec<Violation>,
}

impl SpecParser {
    pub fn new() -> Self {
        Self { violations: Vec::new() }
    }

    pub fn parse(mut self, document: ModelDocument) -> Result<ModelSpec, SpecValidationError> {
        if document.steps.is_empty() {
            self.push("Steps", ViolationKind::Document, "a model needs at least one level");
        }

        let input = document.input.as_ref().map(|input| self.filter(input, "Input"));

        // Levels with an unknown name are dropped here but still counted as
        // violations; the cross-level rules run on what remains.
        let mut levels: Vec<(usize, LevelSpec)> = Vec::with_capacity(document.steps.len());
        for (index, step) in document.steps.into_iter().enumerate() {
            let location = format!("Steps[{}]", index);
            if let Some(level) = self.level(step, &location) {
                levels.push((index, level));
            }
        }

        if let (Some(input), Some((_, first))) = (input, levels.first_mut()) {
            first.filter.merge(&input);
        }

        self.violations.extend(chain::check(&levels));
        self.violations.extend(references::check(&levels));
        self.violations.extend(grouping::check(&levels));
        self.violations.extend(filters::check(&levels));

        if !self.violations.is_empty() {
            return Err(SpecValidationError::new(self.violations));
        }

        let name = document.name.unwrap_or_else(|| "model".to_string());
        debug!(model = %name, levels = levels.len(), "model specification parsed");
        Ok(ModelSpec {
            name,
            description: document.description,
            levels: levels.into_iter().map(|(_, level)| level).collect(),
        })
    }

    fn push(&mut self, location: impl Into<String>, kind: ViolationKind, message: impl Into<String>) {
        self.violations.push(Violation::new(location, kind, message));
    }

    fn level(&mut self, step: LevelDocument, location: &str) -> Option<LevelSpec> {
        let kind = LevelKind::parse(&step.level);
        if kind.is_none() {
            self.push(
                format!("{}.Level", location),
                ViolationKind::LevelOrder,
                format!("unknown level '{}'", step.level),
            );
        }

        let model = self.model(step.model, location);

        let mut contrasts = Vec::with_capacity(step.contrasts.len());
        for (index, doc) in step.contrasts.into_iter().enumerate() {
            let contrast_location = format!("{}.Contrasts[{}]", location, index);
            if let Some(contrast) = self.contrast(doc, &contrast_location) {
                contrasts.push(contrast);
            }
        }
        self.violations.extend(names::duplicates(
            contrasts.iter().map(|c| c.name.as_str()),
            &format!("{}.Contrasts", location),
            "contrast",
        ));

        let dummy_contrasts = step
            .dummy_contrasts
            .and_then(|doc| self.dummy_contrasts(doc, &format!("{}.DummyContrasts", location)));

        let filter = step
            .filter
            .as_ref()
            .map(|f| self.filter(f, &format!("{}.Filter", location)))
            .unwrap_or_default();

        let kind = kind?;
        let group_by = self.group_by(kind, step.group_by, &format!("{}.GroupBy", location));
        let effects = if kind == LevelKind::Run {
            None
        } else {
            match step.effects.as_deref() {
                None => Some(Effects::default_for(&group_by)),
                Some(name) => match Effects::parse(name) {
                    Some(effects) => Some(effects),
                    None => {
                        self.push(
                            format!("{}.Effects", location),
                            ViolationKind::Document,
                            format!("unknown effects '{}', expected 'fixed' or 'random'", name),
                        );
                        None
                    }
                },
            }
        };

        Some(LevelSpec { kind, model, contrasts, dummy_contrasts, group_by, filter, effects })
    }

    fn model(&mut self, entry: Option<ModelEntry>, location: &str) -> ModelBlock {
        let (entries, hrf, raw_transformations) = match entry {
            None => (Vec::new(), None, Vec::new()),
            Some(ModelEntry::List(x)) => (x, None, Vec::new()),
            Some(ModelEntry::Object { x, hrf, transformations }) => (x, hrf, transformations),
        };

        let mut regressors = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            let entry_location = format!("{}.Model.X[{}]", location, index);
            let (name, optional, numeric) = match entry {
                RegressorEntry::Name(name) => (name, false, false),
                RegressorEntry::Number(n) => (n.to_string(), false, true),
                RegressorEntry::Detailed { name, optional } => (name, optional, false),
            };
            if name.trim().is_empty() {
                self.push(entry_location, ViolationKind::Document, "regressor name is empty");
                continue;
            }
            match RegressorSource::classify(&name, numeric) {
                Ok(source) => regressors.push(RegressorSpec { name, optional, source }),
                Err(e) => self.push(
                    entry_location,
                    ViolationKind::Document,
                    format!("invalid wildcard '{}': {}", name, e),
                ),
            }
        }
        self.violations.extend(names::duplicates(
            regressors.iter().map(|r| r.name.as_str()),
            &format!("{}.Model.X", location),
            "regressor",
        ));

        let mut transformations = Vec::with_capacity(raw_transformations.len());
        for (index, body) in raw_transformations.into_iter().enumerate() {
            match body.get("Name").and_then(|n| n.as_str()) {
                Some(name) => transformations.push(Transformation { name: name.to_string(), body: body.clone() }),
                None => self.push(
                    format!("{}.Model.Transformations[{}]", location, index),
                    ViolationKind::Document,
                    "transformation has no 'Name'",
                ),
            }
        }

        ModelBlock { regressors, hrf, transformations }
    }

    fn test_type(&mut self, raw: Option<&str>, location: &str) -> Option<TestType> {
        match raw {
            None => Some(TestType::T),
            Some(name) => {
                let parsed = TestType::parse(name);
                if parsed.is_none() {
                    self.push(
                        location,
                        ViolationKind::MalformedContrast,
                        format!("unknown test '{}', expected 't' or 'F'", name),
                    );
                }
                parsed
            }
        }
    }

    fn contrast(&mut self, doc: ContrastDocument, location: &str) -> Option<ContrastSpec> {
        let before = self.violations.len();

        if doc.name.trim().is_empty() {
            self.push(location, ViolationKind::Document, "contrast name is empty");
        }
        let n = doc.condition_list.len();
        if n == 0 {
            self.push(location, ViolationKind::MalformedContrast, format!("contrast '{}' has an empty ConditionList", doc.name));
        }
        self.violations.extend(names::duplicates(
            doc.condition_list.iter().map(|c| c.as_str()),
            &format!("{}.ConditionList", location),
            "condition",
        ));
        let test = self.test_type(doc.test.as_deref(), &format!("{}.Test", location));

        let weights = match (doc.weights, test) {
            (_, None) => Vec::new(),
            // Omitted weights: equal weighting for t, one row per condition for F.
            (None, Some(TestType::T)) => vec![vec![1.0 / n.max(1) as f64; n]],
            (None, Some(TestType::F)) => (0..n)
                .map(|row| (0..n).map(|col| if row == col { 1.0 } else { 0.0 }).collect())
                .collect(),
            (Some(WeightsDocument::Vector(row)), Some(_)) => vec![row],
            (Some(WeightsDocument::Matrix(rows)), Some(_)) => rows,
        };

        if test == Some(TestType::T) && weights.len() != 1 {
            self.push(
                format!("{}.Weights", location),
                ViolationKind::MalformedContrast,
                format!("t contrast '{}' takes a single weight vector, got {} rows", doc.name, weights.len()),
            );
        }
        if test == Some(TestType::F) && weights.is_empty() {
            self.push(
                format!("{}.Weights", location),
                ViolationKind::MalformedContrast,
                format!("F contrast '{}' has no weight rows", doc.name),
            );
        }
        for (index, row) in weights.iter().enumerate() {
            if row.len() != n {
                self.push(
                    format!("{}.Weights[{}]", location, index),
                    ViolationKind::MalformedContrast,
                    format!(
                        "contrast '{}' has {} weight(s) for {} condition(s)",
                        doc.name,
                        row.len(),
                        n
                    ),
                );
            }
        }

        if self.violations.len() > before {
            return None;
        }
        Some(ContrastSpec { name: doc.name, conditions: doc.condition_list, weights, test: test? })
    }

    fn dummy_contrasts(&mut self, doc: DummyContrastsDocument, location: &str) -> Option<DummyContrasts> {
        match doc {
            DummyContrastsDocument::Flag(false) => None,
            DummyContrastsDocument::Flag(true) => Some(DummyContrasts { conditions: None, test: TestType::T }),
            DummyContrastsDocument::Detailed { conditions, test } => {
                if let Some(conditions) = &conditions {
                    self.violations.extend(names::duplicates(
                        conditions.iter().map(|c| c.as_str()),
                        &format!("{}.Conditions", location),
                        "dummy contrast condition",
                    ));
                }
                let test = self.test_type(test.as_deref(), &format!("{}.Test", location))?;
                Some(DummyContrasts { conditions, test })
            }
        }
    }

    fn group_by(&mut self, kind: LevelKind, raw: Option<Vec<String>>, location: &str) -> Vec<Dimension> {
        let raw = match raw {
            None => return kind.default_group_by(),
            Some(raw) => raw,
        };

        let mut dims = Vec::with_capacity(raw.len());
        for name in &raw {
            match Dimension::parse(name) {
                Some(dim) => dims.push(dim),
                None => self.push(
                    location,
                    ViolationKind::UnresolvableGrouping,
                    format!("grouping variable '{}' is neither a dataset entity nor 'contrast'", name),
                ),
            }
        }
        self.violations.extend(names::duplicates(dims.iter().map(|d| d.as_str()), location, "grouping variable"));

        if kind == LevelKind::Run {
            // The lowest level aggregates nothing; a run-level GroupBy is accepted
            // for compatibility as long as it only names dataset entities.
            if dims.contains(&Dimension::Contrast) {
                self.push(
                    location,
                    ViolationKind::UnresolvableGrouping,
                    "the run level cannot group by 'contrast': no level below produces contrasts",
                );
            }
            return Vec::new();
        }
        dims
    }

    fn filter(&mut self, raw: &BTreeMap<String, serde_json::Value>, location: &str) -> EntityFilter {
        let mut filter = EntityFilter::new();
        for (key, value) in raw {
            let entry_location = format!("{}.{}", location, key);
            let dim = match Dimension::parse(key) {
                Some(dim) if dim.is_dataset_entity() => dim,
                _ => {
                    self.push(entry_location, ViolationKind::InvalidFilter, format!("'{}' is not a dataset entity", key));
                    continue;
                }
            };
            let values: Option<Vec<String>> = match value {
                serde_json::Value::Array(items) if !items.is_empty() => items.iter().map(scalar_to_string).collect(),
                serde_json::Value::Array(_) => None,
                scalar => scalar_to_string(scalar).map(|v| vec![v]),
            };
            match values {
                Some(values) => filter.require(dim, values),
                None => self.push(
                    entry_location,
                    ViolationKind::InvalidFilter,
                    "filter values must be a string, a number, or a non-empty list of those",
                ),
            }
        }
        filter
    }
}

impl Default for SpecParser {
    fn default() -> Self { Self::new() }
}

fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
