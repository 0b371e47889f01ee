//! Entity enumeration for the lowest level.
use crate::config::CompileOptions;
use crate::error::EmptyUnitSetError;
use crate::layout::{DatasetLayout, Dimension, EntityFilter, EntityKey};
use crate::model::LevelSpec;
use indexmap::IndexSet;
use tracing::debug;

/// The run-level filter with the participant restriction folded in.
pub(crate) fn effective_filter(level: &LevelSpec, options: &CompileOptions) -> EntityFilter {
    let mut filter = level.filter.clone();
    let participants = options.participant_labels();
    if !participants.is_empty() {
        filter.require(Dimension::Subject, participants);
    }
    filter
}

/// Lists the run keys satisfying every filter condition, in the order the
/// layout reported them. Duplicates keep their first position.
pub(crate) fn run_keys(
    level: &LevelSpec,
    options: &CompileOptions,
    layout: &dyn DatasetLayout,
) -> Result<Vec<EntityKey>, EmptyUnitSetError> {
    let filter = effective_filter(level, options);
    let candidates = layout.list_entities(&filter);
    let total = candidates.len();

    let keys: IndexSet<EntityKey> = candidates.into_iter().filter(|key| filter.matches(key)).collect();
    debug!(candidates = total, matched = keys.len(), filter = %filter, "enumerated run-level entities");

    if keys.is_empty() {
        return Err(EmptyUnitSetError { level: level.name(), filter: filter.to_string(), candidates: total });
    }
    Ok(keys.into_iter().collect())
}
