//! Rule for contrast references: every weight key must name something the
//! owning level can see.
//!
//! The run level sees its own regressors (wildcards match by pattern, since
//! their expansion is only known per run). Higher levels see the contrasts the
//! level immediately below produces, plus their own regressors.
//!
//! A level grouped by `contrast` gives each unit a single input contrast, so
//! an explicit contrast there may combine at most one of them.
use crate::model::error::{Violation, ViolationKind};
use crate::model::spec::{LevelSpec, NameSet};

pub(crate) fn check(levels: &[(usize, LevelSpec)]) -> Vec<Violation> {
    let mut violations = Vec::new();
    let mut inputs = NameSet::new();

    for (index, level) in levels {
        let available = level.available_names(&inputs);

        for (c_index, contrast) in level.contrasts.iter().enumerate() {
            let combined = level.combined_inputs(contrast, &inputs);
            if combined.len() > 1 {
                violations.push(Violation::new(
                    format!("Steps[{}].Contrasts[{}]", index, c_index),
                    ViolationKind::MalformedContrast,
                    format!(
                        "contrast '{}' combines lower-level contrasts {}, but the {} level groups by \
                         contrast and each of its units sees only one",
                        contrast.name,
                        combined.iter().map(|k| format!("'{}'", k)).collect::<Vec<_>>().join(", "),
                        level.kind
                    ),
                ));
            }
            for key in contrast.keys() {
                if !available.contains(key) {
                    violations.push(Violation::new(
                        format!("Steps[{}].Contrasts[{}]", index, c_index),
                        ViolationKind::UndefinedReference,
                        format!(
                            "contrast '{}' references '{}', which is not defined at the {} level",
                            contrast.name, key, level.kind
                        ),
                    ));
                }
            }
        }

        if let Some(conditions) = level.dummy_contrasts.as_ref().and_then(|d| d.conditions.as_ref()) {
            for condition in conditions {
                if !available.contains(condition) {
                    violations.push(Violation::new(
                        format!("Steps[{}].DummyContrasts", index),
                        ViolationKind::UndefinedReference,
                        format!(
                            "dummy contrast condition '{}' is not defined at the {} level",
                            condition, level.kind
                        ),
                    ));
                }
            }
        }

        inputs = level.declared_outputs(&inputs);
    }

    violations
}
