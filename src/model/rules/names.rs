//! Rule for name uniqueness within a single list.
use crate::model::error::{Violation, ViolationKind};
use std::collections::HashSet;

/// Reports each name that appears more than once, once per extra occurrence.
pub(crate) fn duplicates<'a>(
    names: impl Iterator<Item = &'a str>,
    location: &str,
    what: &str,
) -> Vec<Violation> {
    let mut seen = HashSet::new();
    names
        .enumerate()
        .filter(|(_, name)| !seen.insert(*name))
        .map(|(index, name)| {
            Violation::new(
                format!("{}[{}]", location, index),
                ViolationKind::DuplicateName,
                format!("{} '{}' is declared more than once", what, name),
            )
        })
        .collect()
}
