//! Rule for grouping variables: each must be resolvable against the level below.
//!
//! An entity survives into a level only if that level groups by it, so a
//! dataset level cannot group by `run` once a subject level collapsed runs.
//! `contrast` resolves only when the level below produces at least one contrast.
use crate::layout::Dimension;
use crate::model::error::{Violation, ViolationKind};
use crate::model::spec::{LevelSpec, NameSet};

pub(crate) fn check(levels: &[(usize, LevelSpec)]) -> Vec<Violation> {
    let mut violations = Vec::new();
    let mut dims: Vec<Dimension> = Dimension::DATASET_ENTITIES.to_vec();
    let mut produced = NameSet::new();
    let mut below = None;

    for (index, level) in levels {
        if let Some(below) = below {
            for var in &level.group_by {
                let message = match var {
                    Dimension::Contrast if produced.is_empty() => Some(format!(
                        "grouping by 'contrast', but the {} level produces no contrasts",
                        below
                    )),
                    Dimension::Contrast => None,
                    entity if !dims.contains(entity) => Some(format!(
                        "grouping variable '{}' was already collapsed at the {} level",
                        entity, below
                    )),
                    _ => None,
                };
                if let Some(message) = message {
                    violations.push(Violation::new(
                        format!("Steps[{}].GroupBy", index),
                        ViolationKind::UnresolvableGrouping,
                        message,
                    ));
                }
            }
        }

        dims = level.key_dimensions();
        produced = level.declared_outputs(&produced);
        below = Some(level.kind);
    }

    violations
}
