//! The engine-facing view of a compiled graph.
//!
//! A `Handoff` borrows from the graph: units are referenced, never copied.
//! Units are listed in topological order, lowest level first, each with the
//! ids of the units it aggregates.
use crate::config::SmoothingRequest;
use crate::error::GraphIntegrityError;
use crate::graph::{AggregationRequest, CompiledGraph, ResolvedModel, UnitId};
use crate::layout::EntityKey;
use crate::model::ContrastSpec;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct HandoffUnit<'g> {
    pub id: UnitId,
    pub level: &'static str,
    pub key: &'g EntityKey,
    pub model: &'g ResolvedModel,
    pub contrasts: &'g [ContrastSpec],
    /// Units whose outputs this unit aggregates. Empty at the run level.
    pub parents: &'g [UnitId],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<&'g AggregationRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smoothing: Option<&'g SmoothingRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degrees_of_freedom: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Handoff<'g> {
    pub levels: &'g [&'static str],
    pub units: Vec<HandoffUnit<'g>>,
}

impl<'g> Handoff<'g> {
    pub fn from_graph(graph: &'g CompiledGraph) -> Result<Self, GraphIntegrityError> {
        let units = graph
            .topological_order()?
            .into_iter()
            .map(|id| {
                let unit = graph.unit(id);
                HandoffUnit {
                    id,
                    level: unit.level,
                    key: &unit.key,
                    model: &unit.model,
                    contrasts: &unit.contrasts,
                    parents: graph.parents(id),
                    aggregation: unit.aggregation.as_ref(),
                    smoothing: unit.smoothing.as_ref(),
                    degrees_of_freedom: unit.model.degrees_of_freedom(),
                }
            })
            .collect();
        Ok(Self { levels: graph.levels(), units })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::AnalysisUnit;
    use crate::layout::Dimension;
    use crate::model::Effects;

    #[test]
    fn test_handoff_lists_units_with_parents() {
        let mut graph = CompiledGraph::new(vec!["run", "subject"]);
        let run = graph.add_unit(
            AnalysisUnit {
                level: "run",
                level_index: 0,
                key: EntityKey::new().with(Dimension::Subject, "01").with(Dimension::Run, "1"),
                model: ResolvedModel::default(),
                contrasts: Vec::new(),
                aggregation: None,
                smoothing: None,
            },
            &[],
        );
        graph.add_unit(
            AnalysisUnit {
                level: "subject",
                level_index: 1,
                key: EntityKey::new().with(Dimension::Subject, "01"),
                model: ResolvedModel::default(),
                contrasts: Vec::new(),
                aggregation: Some(AggregationRequest {
                    group_by: vec![Dimension::Subject],
                    effects: Effects::Fixed,
                    inputs: Vec::new(),
                }),
                smoothing: None,
            },
            &[run],
        );

        let handoff = Handoff::from_graph(&graph).unwrap();
        assert_eq!(handoff.units.len(), 2);
        assert_eq!(handoff.units[1].parents, &[run]);

        let json: serde_json::Value = serde_json::from_str(&handoff.to_json().unwrap()).unwrap();
        assert_eq!(json["levels"], serde_json::json!(["run", "subject"]));
        assert_eq!(json["units"][0]["key"], serde_json::json!({"subject": "01", "run": "1"}));
        assert_eq!(json["units"][1]["parents"], serde_json::json!([0]));
        assert_eq!(json["units"][1]["aggregation"]["effects"], "fixed");
        assert!(json["units"][0].get("aggregation").is_none());
    }
}
