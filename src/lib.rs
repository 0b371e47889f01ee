//! Compiles a hierarchical statistical model (run -> session -> subject ->
//! dataset) and a dataset layout into a directed acyclic graph of analysis
//! units, ready for an external execution engine.
//!
//! ```no_run
//! use bids_model_graph::{compile, LayoutSnapshot, ModelSpec};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let spec = ModelSpec::from_path("model.json")?;
//! let layout = LayoutSnapshot::from_json_str(&std::fs::read_to_string("layout.json")?)?;
//! let compilation = compile(&spec, &layout)?;
//! println!("{}", compilation.handoff()?.to_json()?);
//! # Ok(())
//! # }
//! ```

// --- MODULE DECLARATIONS ---
pub mod compiler;
pub mod config;
pub mod display;
pub mod error;
pub mod graph;
pub mod handoff;
pub mod layout;
pub mod model;

pub use compiler::{compile, Compilation, Compiler};
pub use config::CompileOptions;
pub use error::{
    CompileError, DegenerateGroupWarning, EmptyUnitSetError, Exclusion, GraphIntegrityError,
    UnresolvedRegressorError,
};
pub use graph::{AnalysisUnit, CompiledGraph, Edge, UnitId};
pub use handoff::Handoff;
pub use layout::{DatasetLayout, Dimension, EntityFilter, EntityKey, LayoutSnapshot, UnitMetadata};
pub use model::{ModelSpec, SpecValidationError};
