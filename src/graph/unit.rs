//! Defines the `AnalysisUnit` and its associated types, representing a single
//! concrete computation in the compiled graph.

use crate::config::SmoothingRequest;
use crate::layout::{Dimension, EntityKey};
use crate::model::{ContrastSpec, Effects, Transformation};
use serde::Serialize;

/// Represents where a resolved regressor's values come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegressorKind {
    /// Onsets of one condition from the run's events table.
    Event { column: String, value: String },
    /// A column of the run's confounds table.
    Confound,
    /// A generated Legendre drift term; the backend computes its values.
    Drift { order: u32 },
    /// Passed through verbatim to the backend (higher-level regressors, intercepts).
    Passthrough,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedRegressor {
    pub name: String,
    #[serde(flatten)]
    pub kind: RegressorKind,
}

/// Acquisition timing reported by the layout for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RunTiming {
    pub repetition_time: Option<f64>,
    pub volumes: Option<u32>,
}

/// The design specification of one unit: the model with every wildcard
/// expanded to concrete names. Numeric values are the backend's business.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolvedModel {
    pub regressors: Vec<ResolvedRegressor>,
    pub hrf: Option<String>,
    pub transformations: Vec<Transformation>,
    /// Present for run-level units only.
    pub timing: Option<RunTiming>,
}

impl ResolvedModel {
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.regressors.iter().map(|r| r.name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.regressors.iter().any(|r| r.name == name)
    }

    /// Volumes minus event and confound regressors. Drift terms are not counted.
    pub fn degrees_of_freedom(&self) -> Option<i64> {
        let volumes = self.timing?.volumes?;
        let fitted = self
            .regressors
            .iter()
            .filter(|r| matches!(r.kind, RegressorKind::Event { .. } | RegressorKind::Confound))
            .count();
        Some(i64::from(volumes) - fitted as i64)
    }
}

/// What a higher-level unit asks the backend to do with its inputs.
///
/// This is a request, not a statistical definition: the backend decides how
/// fixed or random effects are actually estimated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregationRequest {
    pub group_by: Vec<Dimension>,
    pub effects: Effects,
    /// Input contrast names that reach this unit from the level below.
    pub inputs: Vec<String>,
}

/// A node of the compiled graph. Immutable once added.
///
/// The units a node aggregates are stored by the graph, not on the unit;
/// see `CompiledGraph::parents`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisUnit {
    pub level: &'static str,
    /// Position of `level` in the compiled level chain (0 = run).
    pub level_index: usize,
    pub key: EntityKey,
    pub model: ResolvedModel,
    pub contrasts: Vec<ContrastSpec>,
    /// `None` at the run level.
    pub aggregation: Option<AggregationRequest>,
    pub smoothing: Option<SmoothingRequest>,
}

impl AnalysisUnit {
    /// Stable human-readable identifier, e.g. `subject:sub-01`.
    pub fn label(&self) -> String {
        format!("{}:{}", self.level, self.key)
    }

    pub fn contrast_names(&self) -> impl Iterator<Item = &str> {
        self.contrasts.iter().map(|c| c.name.as_str())
    }

    /// One output key per contrast: the unit key extended with `contrast-<name>`.
    pub fn output_keys(&self) -> Vec<EntityKey> {
        self.contrasts
            .iter()
            .map(|c| self.key.clone().with(Dimension::Contrast, c.name.clone()))
            .collect()
    }
}
