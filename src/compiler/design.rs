//! Design planning for run-level units: resolve the declared regressors
//! against what each run actually provides.
use crate::error::UnresolvedRegressorError;
use crate::graph::{RegressorKind, ResolvedModel, ResolvedRegressor, RunTiming};
use crate::layout::{EntityKey, UnitMetadata};
use crate::model::{LevelSpec, ModelBlock, RegressorSource};
use tracing::debug;

pub(crate) struct DesignPlanner<'a> {
    level: &'a LevelSpec,
    drift_terms: Vec<(u32, String)>,
}

impl<'a> DesignPlanner<'a> {
    pub fn new(level: &'a LevelSpec, drift_terms: Vec<(u32, String)>) -> Self {
        Self { level, drift_terms }
    }

    /// Expands wildcards in metadata order and drops absent optional
    /// regressors. Every missing required regressor is reported at once.
    pub fn plan(
        &self,
        key: &EntityKey,
        metadata: Option<&UnitMetadata>,
    ) -> Result<ResolvedModel, UnresolvedRegressorError> {
        let empty = UnitMetadata::default();
        let meta = metadata.unwrap_or(&empty);
        let mut resolved = ResolvedBuilder::default();
        let mut missing = Vec::new();

        for spec in &self.level.model.regressors {
            let found = match &spec.source {
                RegressorSource::Constant => {
                    resolved.push(&spec.name, RegressorKind::Passthrough);
                    true
                }
                RegressorSource::Event { column, value } if meta.has_event(column, value) => {
                    let kind = RegressorKind::Event { column: column.clone(), value: value.clone() };
                    resolved.push(&spec.name, kind);
                    true
                }
                // A confound column may legitimately contain a dot.
                RegressorSource::Event { .. } | RegressorSource::Confound if meta.has_confound(&spec.name) => {
                    resolved.push(&spec.name, RegressorKind::Confound);
                    true
                }
                RegressorSource::Event { .. } | RegressorSource::Confound => false,
                RegressorSource::Wildcard(pattern) => {
                    let mut matched = false;
                    for column in meta.confounds.iter().filter(|c| pattern.matches(c)) {
                        resolved.push(column, RegressorKind::Confound);
                        matched = true;
                    }
                    matched
                }
            };

            if !found {
                if spec.optional {
                    debug!(unit = %key, regressor = %spec.name, "optional regressor absent, dropped");
                } else {
                    missing.push(spec.name.clone());
                }
            }
        }

        if !missing.is_empty() {
            return Err(UnresolvedRegressorError { level: self.level.name(), unit: key.clone(), missing });
        }

        for (order, name) in &self.drift_terms {
            resolved.push(name, RegressorKind::Drift { order: *order });
        }

        let model = resolved.finish(
            &self.level.model,
            metadata.map(|m| RunTiming { repetition_time: m.repetition_time, volumes: m.volumes }),
        );
        debug!(unit = %key, regressors = model.regressors.len(), "run design planned");
        Ok(model)
    }
}

/// Higher levels pass their regressors to the backend as written.
pub(crate) fn passthrough_model(block: &ModelBlock) -> ResolvedModel {
    let mut resolved = ResolvedBuilder::default();
    for spec in &block.regressors {
        resolved.push(&spec.name, RegressorKind::Passthrough);
    }
    resolved.finish(block, None)
}

#[derive(Default)]
struct ResolvedBuilder {
    regressors: Vec<ResolvedRegressor>,
}

impl ResolvedBuilder {
    fn contains(&self, name: &str) -> bool {
        self.regressors.iter().any(|r| r.name == name)
    }

    /// First occurrence wins; a wildcard overlapping an explicit name adds nothing.
    fn push(&mut self, name: &str, kind: RegressorKind) {
        if !self.contains(name) {
            self.regressors.push(ResolvedRegressor { name: name.to_string(), kind });
        }
    }

    fn finish(self, block: &ModelBlock, timing: Option<RunTiming>) -> ResolvedModel {
        ResolvedModel {
            regressors: self.regressors,
            hrf: block.hrf.clone(),
            transformations: block.transformations.clone(),
            timing,
        }
    }
}
