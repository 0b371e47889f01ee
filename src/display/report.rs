use crate::compiler::Compilation;
use crate::graph::{AnalysisUnit, CompiledGraph, UnitId};
use std::fmt::Write;

/// Renders a compilation level by level, lowest first, followed by every exclusion.
pub fn format_report(compilation: &Compilation) -> String {
    let graph = &compilation.graph;
    let mut output = String::new();

    let _ = writeln!(output, "COMPILED GRAPH: {} unit(s), {} edge(s)", graph.unit_count(), graph.edge_count());
    let _ = writeln!(output, "--------------------------------------------------");

    for (index, level) in graph.levels().iter().enumerate() {
        let units: Vec<(UnitId, &AnalysisUnit)> = graph.units_at(index).collect();
        let _ = writeln!(output, "[L{}] {} ({} unit(s))", index + 1, level, units.len());
        for (i, &(id, unit)) in units.iter().enumerate() {
            let connector = if i == units.len() - 1 { "`--" } else { "|--" };
            let _ = writeln!(output, "{} {}{}", connector, unit.key, describe(graph, id, unit));
        }
    }

    if !compilation.exclusions.is_empty() {
        let _ = writeln!(output, "EXCLUSIONS ({}):", compilation.exclusions.len());
        for exclusion in &compilation.exclusions {
            let _ = writeln!(output, "  ! {}", exclusion);
        }
    }
    output
}

fn describe(graph: &CompiledGraph, id: UnitId, unit: &AnalysisUnit) -> String {
    let mut line = String::new();
    let contrasts: Vec<&str> = unit.contrast_names().collect();
    let _ = write!(line, "  contrasts=[{}]", contrasts.join(", "));

    match &unit.aggregation {
        None => {
            let _ = write!(line, " regressors={}", unit.model.regressors.len());
            if let Some(df) = unit.model.degrees_of_freedom() {
                let _ = write!(line, " df={}", df);
            }
        }
        Some(request) => {
            let inputs: Vec<String> = graph.parents(id).iter().map(|&p| graph.unit(p).key.to_string()).collect();
            let _ = write!(line, " {:?} <- [{}]", request.effects, inputs.join(", "));
        }
    }

    if let Some(smoothing) = &unit.smoothing {
        let _ = write!(line, " smooth={}mm", smoothing.fwhm);
    }
    line
}
