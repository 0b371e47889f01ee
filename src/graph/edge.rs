//! Defines the `Edge` type, representing data flow between two units.

use super::storage::UnitId;
use serde::Serialize;

/// "The output of `from` is an input to the aggregation performed by `to`."
///
/// `from` always sits on the level immediately below `to`. Edges are derived
/// from the parent lists held by the graph rather than stored separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Edge {
    pub from: UnitId,
    pub to: UnitId,
}
