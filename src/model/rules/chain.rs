//! Rule for level ordering: the levels must form a chain rising from `run`.
use crate::model::error::{Violation, ViolationKind};
use crate::model::spec::{LevelKind, LevelSpec};

/// Levels may skip ranks (run -> subject is fine) but never repeat or descend.
pub(crate) fn check(levels: &[(usize, LevelSpec)]) -> Vec<Violation> {
    let mut violations = Vec::new();

    if let Some((index, first)) = levels.first() {
        if first.kind != LevelKind::Run {
            violations.push(Violation::new(
                format!("Steps[{}].Level", index),
                ViolationKind::LevelOrder,
                format!("the first level must be 'run', found '{}'", first.kind),
            ));
        }
    }

    for pair in levels.windows(2) {
        let (_, below) = &pair[0];
        let (index, above) = &pair[1];
        if above.kind <= below.kind {
            violations.push(Violation::new(
                format!("Steps[{}].Level", index),
                ViolationKind::LevelOrder,
                format!("level '{}' cannot follow '{}'", above.kind, below.kind),
            ));
        }
    }

    violations
}
