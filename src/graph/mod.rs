//! Defines the core data structures for the compiled analysis graph.
pub mod dag;
pub mod edge;
pub mod storage;
pub mod unit;

// Re-export key types for convenient access
pub use dag::CompiledGraph;
pub use edge::Edge;
pub use storage::UnitId;
pub use unit::{AggregationRequest, AnalysisUnit, RegressorKind, ResolvedModel, ResolvedRegressor, RunTiming};
