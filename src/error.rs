//! The compiler's error taxonomy.
//!
//! Fatal errors abort compilation with no partial output and surface as
//! `CompileError`. Recoverable problems exclude a single unit, are collected
//! as `Exclusion`s, and travel alongside the graph that was still built.
use crate::layout::EntityKey;
use thiserror::Error;

pub use crate::config::ConfigError;
pub use crate::model::SpecValidationError;

/// The lowest level matched no dataset entities, so nothing above it could
/// ever be populated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no {level}-level units match filter {filter} ({candidates} candidate(s) listed by the layout)")]
pub struct EmptyUnitSetError {
    pub level: &'static str,
    pub filter: String,
    pub candidates: usize,
}

/// A run lacks a required regressor. Only that run is excluded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{level} unit '{unit}' is missing required regressor(s): {}", .missing.join(", "))]
pub struct UnresolvedRegressorError {
    pub level: &'static str,
    pub unit: EntityKey,
    pub missing: Vec<String>,
}

/// Every input of a would-be group was excluded, so the group's unit is not created.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{level} group '{group}' has no surviving inputs and was not created")]
pub struct DegenerateGroupWarning {
    pub level: &'static str,
    pub group: EntityKey,
}

/// A recoverable, per-unit exclusion reported with a successful compilation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Exclusion {
    #[error(transparent)]
    UnresolvedRegressor(#[from] UnresolvedRegressorError),
    #[error(transparent)]
    DegenerateGroup(#[from] DegenerateGroupWarning),
}

/// The compiled graph broke one of its structural invariants.
///
/// Signals a compiler defect rather than a user error; never retryable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphIntegrityError {
    #[error("cycle detected: only {ordered} of {total} units could be ordered")]
    Cycle { ordered: usize, total: usize },
    #[error("unit '{unit}' aggregates '{parent}', which is not on the level immediately below")]
    LevelSkip { unit: String, parent: String },
    #[error("unit '{unit}' sits above the lowest level but aggregates nothing")]
    Orphan { unit: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error(transparent)]
    Spec(#[from] SpecValidationError),
    #[error(transparent)]
    EmptyUnitSet(#[from] EmptyUnitSetError),
    #[error("internal error, the compiled graph is inconsistent: {0}")]
    GraphIntegrity(#[from] GraphIntegrityError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
