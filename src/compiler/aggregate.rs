//! Aggregation planning: groups the units of one level into the units of the
//! level above.
//!
//! Grouping is explicit key-tuple grouping over the ordered child sequence.
//! Groups appear in the order their first child was observed, so identical
//! inputs always give identical groups.
use crate::graph::UnitId;
use crate::layout::{Dimension, EntityKey};
use crate::model::LevelSpec;
use indexmap::{IndexMap, IndexSet};

/// One unit of the level below, or a unit that would have existed had it not
/// been excluded. Excluded records still claim their group, so a group whose
/// children were all excluded can be reported instead of vanishing silently.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ChildRecord {
    pub key: EntityKey,
    /// `None` when the child was excluded.
    pub unit: Option<UnitId>,
    /// Contrast names the child produces (or would have produced).
    pub outputs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Group {
    pub key: EntityKey,
    /// Surviving children, in observation order.
    pub members: Vec<UnitId>,
    /// Contrast names reaching this group from its members.
    pub inputs: Vec<String>,
}

impl Group {
    pub fn is_degenerate(&self) -> bool { self.members.is_empty() }
}

#[derive(Default)]
struct GroupBuilder {
    members: IndexSet<UnitId>,
    inputs: IndexSet<String>,
}

impl GroupBuilder {
    fn add(&mut self, child: &ChildRecord, inputs: &[String]) {
        if let Some(unit) = child.unit {
            self.members.insert(unit);
            self.inputs.extend(inputs.iter().cloned());
        }
    }
}

/// Groups `children` by `level`'s grouping variables after applying its filter.
///
/// Grouping by `contrast` fans every child out to one group per output name;
/// the group key then carries a `contrast` entry.
pub(crate) fn group_children(level: &LevelSpec, children: &[ChildRecord]) -> Vec<Group> {
    let entities: Vec<Dimension> = level.group_by.iter().copied().filter(|d| d.is_dataset_entity()).collect();
    let by_contrast = level.group_by.contains(&Dimension::Contrast);
    let mut groups: IndexMap<EntityKey, GroupBuilder> = IndexMap::new();

    for child in children.iter().filter(|c| level.filter.matches(&c.key)) {
        let base = child.key.project(&entities);
        if by_contrast {
            for output in &child.outputs {
                let key = base.clone().with(Dimension::Contrast, output.clone());
                groups.entry(key).or_default().add(child, std::slice::from_ref(output));
            }
        } else {
            groups.entry(base).or_default().add(child, &child.outputs);
        }
    }

    groups
        .into_iter()
        .map(|(key, builder)| Group {
            key,
            members: builder.members.into_iter().collect(),
            inputs: builder.inputs.into_iter().collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelSpec;

    fn level(doc: &str, index: usize) -> LevelSpec {
        ModelSpec::from_json_str(doc).unwrap().levels.remove(index)
    }

    fn child(sub: &str, run: &str, unit: Option<u32>, outputs: &[&str]) -> ChildRecord {
        ChildRecord {
            key: EntityKey::new().with(Dimension::Subject, sub).with(Dimension::Run, run),
            unit: unit.map(UnitId),
            outputs: outputs.iter().map(|o| o.to_string()).collect(),
        }
    }

    const SUBJECT: &str = r#"{"Steps": [{"Level": "run", "Model": ["a", "b"], "DummyContrasts": true},
                                         {"Level": "subject", "DummyContrasts": true}]}"#;

    #[test]
    fn test_groups_follow_first_observation() {
        let children = vec![
            child("02", "1", Some(0), &["a"]),
            child("01", "1", Some(1), &["a", "b"]),
            child("02", "2", Some(2), &["b"]),
        ];
        let groups = group_children(&level(SUBJECT, 1), &children);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key.to_string(), "sub-02");
        assert_eq!(groups[0].members, vec![UnitId(0), UnitId(2)]);
        assert_eq!(groups[0].inputs, vec!["a", "b"]);
        assert_eq!(groups[1].members, vec![UnitId(1)]);
    }

    #[test]
    fn test_excluded_children_keep_their_group() {
        let children = vec![
            child("01", "1", None, &["a"]),
            child("01", "2", Some(1), &["a"]),
            child("02", "1", None, &["a"]),
        ];
        let groups = group_children(&level(SUBJECT, 1), &children);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].members, vec![UnitId(1)]);
        assert!(!groups[0].is_degenerate());
        assert!(groups[1].is_degenerate());
        assert!(groups[1].inputs.is_empty());
    }

    #[test]
    fn test_contrast_grouping_fans_out() {
        let doc = r#"{"Steps": [{"Level": "run", "Model": ["a", "b"], "DummyContrasts": true},
                                {"Level": "dataset", "GroupBy": ["contrast"]}]}"#;
        let children = vec![child("01", "1", Some(0), &["a", "b"]), child("02", "1", Some(1), &["a"])];
        let groups = group_children(&level(doc, 1), &children);

        let keys: Vec<String> = groups.iter().map(|g| g.key.to_string()).collect();
        assert_eq!(keys, vec!["contrast-a", "contrast-b"]);
        assert_eq!(groups[0].members, vec![UnitId(0), UnitId(1)]);
        assert_eq!(groups[0].inputs, vec!["a"]);
        assert_eq!(groups[1].members, vec![UnitId(0)]);
    }

    #[test]
    fn test_level_filter_drops_children() {
        let doc = r#"{"Steps": [{"Level": "run", "Model": ["a"]},
                                {"Level": "subject", "Filter": {"run": 1}}]}"#;
        let children = vec![child("01", "1", Some(0), &[]), child("01", "2", Some(1), &[])];
        let groups = group_children(&level(doc, 1), &children);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members, vec![UnitId(0)]);
    }
}
