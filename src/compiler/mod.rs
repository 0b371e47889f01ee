//! The compile pipeline: (ModelSpec, dataset layout) -> CompiledGraph.
//!
//! Compilation is a pure, single-threaded transform. The layout is only read.
//! Units are registered level by level, lowest first, so every unit's inputs
//! already exist when it is added.

use self::aggregate::{group_children, ChildRecord};
use self::contrasts::ContrastResolver;
use self::design::{passthrough_model, DesignPlanner};
use crate::config::{CompileOptions, SmoothingRequest};
use crate::error::{
    CompileError, DegenerateGroupWarning, Exclusion, SpecValidationError, UnresolvedRegressorError,
};
use crate::graph::{AggregationRequest, AnalysisUnit, CompiledGraph, RegressorKind};
use crate::handoff::Handoff;
use crate::layout::{DatasetLayout, EntityKey};
use crate::model::{Effects, LevelSpec, ModelSpec, NameSet, Violation, ViolationKind};
use indexmap::IndexSet;
use tracing::{debug, info, warn};

// --- MODULE DECLARATIONS ---
mod aggregate;
mod contrasts;
mod design;
mod enumerate;

/// A successful compilation: the graph plus every unit that was left out.
#[derive(Debug, Clone)]
pub struct Compilation {
    pub graph: CompiledGraph,
    pub exclusions: Vec<Exclusion>,
}

impl Compilation {
    /// True when nothing was excluded.
    pub fn is_complete(&self) -> bool { self.exclusions.is_empty() }

    pub fn unresolved(&self) -> impl Iterator<Item = &UnresolvedRegressorError> {
        self.exclusions.iter().filter_map(|e| match e {
            Exclusion::UnresolvedRegressor(err) => Some(err),
            _ => None,
        })
    }

    pub fn degenerate(&self) -> impl Iterator<Item = &DegenerateGroupWarning> {
        self.exclusions.iter().filter_map(|e| match e {
            Exclusion::DegenerateGroup(warning) => Some(warning),
            _ => None,
        })
    }

    /// The ordered, engine-facing view of the graph.
    pub fn handoff(&self) -> Result<Handoff<'_>, CompileError> {
        Ok(Handoff::from_graph(&self.graph)?)
    }
}

/// Compiles a model against a dataset with default options.
pub fn compile(spec: &ModelSpec, layout: &dyn DatasetLayout) -> Result<Compilation, CompileError> {
    Compiler::new().compile(spec, layout)
}

#[derive(Debug, Clone, Default)]
pub struct Compiler {
    options: CompileOptions,
}

impl Compiler {
    pub fn new() -> Self { Self::default() }

    pub fn with_options(options: CompileOptions) -> Self { Self { options } }

    pub fn options(&self) -> &CompileOptions { &self.options }

    /// Fatal problems abort with no graph. Per-unit problems exclude the unit
    /// and are returned with the graph that could still be built.
    pub fn compile(&self, spec: &ModelSpec, layout: &dyn DatasetLayout) -> Result<Compilation, CompileError> {
        let lowest = spec.lowest().ok_or_else(|| {
            SpecValidationError::new(vec![Violation::new(
                "Steps",
                ViolationKind::Document,
                "a model needs at least one level",
            )])
        })?;
        let active = self.options.active_levels(spec)?;
        let smoothing = self.options.smoothing_request(spec, active)?;
        let levels = &spec.levels[..active];
        info!(model = %spec.name, levels = active, "compiling model");

        let mut state = CompileState {
            graph: CompiledGraph::new(levels.iter().map(|l| l.name()).collect()),
            exclusions: Vec::new(),
            violations: Vec::new(),
            smoothing,
        };

        // 1. Entity enumeration and run-level designs
        let keys = enumerate::run_keys(lowest, &self.options, layout)?;
        let mut children = state.compile_runs(lowest, keys, layout, &self.options);
        let mut declared = lowest.declared_outputs(&NameSet::new());

        // 2. One aggregation step per level transition
        for (index, level) in levels.iter().enumerate().skip(1) {
            children = state.compile_level(index, level, &children, &declared);
            declared = level.declared_outputs(&declared);
        }

        // 3. Contrast failures are fatal, but only after every unit was checked
        if !state.violations.is_empty() {
            return Err(SpecValidationError::new(state.violations).into());
        }

        state.graph.verify()?;

        for (index, name) in state.graph.levels().iter().enumerate() {
            info!(level = %name, units = state.graph.units_at(index).count(), "level compiled");
        }
        info!(
            units = state.graph.unit_count(),
            edges = state.graph.edge_count(),
            exclusions = state.exclusions.len(),
            "model compiled"
        );
        Ok(Compilation { graph: state.graph, exclusions: state.exclusions })
    }
}

struct CompileState {
    graph: CompiledGraph,
    exclusions: Vec<Exclusion>,
    violations: Vec<Violation>,
    smoothing: Option<(usize, SmoothingRequest)>,
}

impl CompileState {
    fn smoothing_for(&self, index: usize) -> Option<SmoothingRequest> {
        self.smoothing.as_ref().filter(|(i, _)| *i == index).map(|(_, request)| request.clone())
    }

    fn exclude(&mut self, exclusion: Exclusion) {
        warn!(%exclusion, "unit excluded");
        self.exclusions.push(exclusion);
    }

    fn compile_runs(
        &mut self,
        level: &LevelSpec,
        keys: Vec<EntityKey>,
        layout: &dyn DatasetLayout,
        options: &CompileOptions,
    ) -> Vec<ChildRecord> {
        let planner = DesignPlanner::new(level, options.drift_terms());
        let resolver = ContrastResolver::new(level, 0, &NameSet::new());
        let declared: Vec<String> = level.declared_outputs(&NameSet::new()).names().map(str::to_string).collect();
        let smoothing = self.smoothing_for(0);
        let mut records = Vec::with_capacity(keys.len());

        for key in keys {
            let metadata = layout.get_metadata(&key);
            let model = match planner.plan(&key, metadata.as_ref()) {
                Ok(model) => model,
                Err(err) => {
                    self.exclude(err.into());
                    records.push(ChildRecord { key, unit: None, outputs: declared.clone() });
                    continue;
                }
            };

            let available: IndexSet<String> = model.names().map(str::to_string).collect();
            let pool: Vec<String> = model
                .regressors
                .iter()
                .filter(|r| !matches!(r.kind, RegressorKind::Drift { .. }))
                .map(|r| r.name.clone())
                .collect();

            let unit = AnalysisUnit {
                level: level.name(),
                level_index: 0,
                key: key.clone(),
                contrasts: Vec::new(),
                model,
                aggregation: None,
                smoothing: smoothing.clone(),
            };
            let contrasts = resolver.resolve(&unit.label(), &pool, &available, &mut self.violations);
            let unit = AnalysisUnit { contrasts, ..unit };

            let outputs = unit.contrast_names().map(str::to_string).collect();
            let id = self.graph.add_unit(unit, &[]);
            records.push(ChildRecord { key, unit: Some(id), outputs });
        }

        records
    }

    fn compile_level(
        &mut self,
        index: usize,
        level: &LevelSpec,
        children: &[ChildRecord],
        below: &NameSet,
    ) -> Vec<ChildRecord> {
        let resolver = ContrastResolver::new(level, index, below);
        resolver.check_combined(&mut self.violations);
        let effects = level.effects.unwrap_or_else(|| Effects::default_for(&level.group_by));
        let smoothing = self.smoothing_for(index);
        let groups = group_children(level, children);
        let mut records = Vec::with_capacity(groups.len());

        for group in groups {
            if group.is_degenerate() {
                self.exclude(DegenerateGroupWarning { level: level.name(), group: group.key.clone() }.into());
                let outputs = level.declared_outputs(below).names().map(str::to_string).collect();
                records.push(ChildRecord { key: group.key, unit: None, outputs });
                continue;
            }

            let model = passthrough_model(&level.model);
            let mut available: IndexSet<String> = group.inputs.iter().cloned().collect();
            available.extend(model.names().map(str::to_string));

            let unit = AnalysisUnit {
                level: level.name(),
                level_index: index,
                key: group.key.clone(),
                model,
                contrasts: Vec::new(),
                aggregation: Some(AggregationRequest {
                    group_by: level.group_by.clone(),
                    effects,
                    inputs: group.inputs.clone(),
                }),
                smoothing: smoothing.clone(),
            };
            let contrasts = resolver.resolve(&unit.label(), &group.inputs, &available, &mut self.violations);
            let unit = AnalysisUnit { contrasts, ..unit };

            debug!(unit = %unit.label(), inputs = group.members.len(), "aggregation unit planned");
            let outputs = unit.contrast_names().map(str::to_string).collect();
            let id = self.graph.add_unit(unit, &group.members);
            records.push(ChildRecord { key: group.key, unit: Some(id), outputs });
        }

        records
    }
}
