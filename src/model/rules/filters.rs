//! Rule for level filters above the run level.
//!
//! A higher level's filter is matched against the keys of the units it
//! aggregates, so it may only name entities the level below still carries.
//! A filter on a collapsed entity would match nothing and empty the level.
use crate::layout::Dimension;
use crate::model::error::{Violation, ViolationKind};
use crate::model::spec::LevelSpec;

pub(crate) fn check(levels: &[(usize, LevelSpec)]) -> Vec<Violation> {
    let mut violations = Vec::new();

    for pair in levels.windows(2) {
        let (_, below) = &pair[0];
        let (index, level) = &pair[1];
        let dims: Vec<Dimension> = below.key_dimensions();

        for (dim, _) in level.filter.conditions() {
            if !dims.contains(&dim) {
                violations.push(Violation::new(
                    format!("Steps[{}].Filter.{}", index, dim),
                    ViolationKind::InvalidFilter,
                    format!("'{}' was already collapsed at the {} level and cannot be filtered on", dim, below.kind),
                ));
            }
        }
    }

    violations
}
