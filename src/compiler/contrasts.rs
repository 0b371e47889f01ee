//! Per-unit contrast resolution.
//!
//! The parser already checked contrast keys against the declared model. Here
//! they are checked again against each unit's concrete names, since wildcard
//! expansion and missing optional regressors change what a unit provides.
use crate::layout::Dimension;
use crate::model::{ContrastSpec, LevelSpec, NameSet, Violation, ViolationKind};
use indexmap::IndexSet;
use std::collections::HashSet;
use tracing::debug;

pub(crate) struct ContrastResolver<'a> {
    level: &'a LevelSpec,
    level_index: usize,
    /// Every contrast name the level below declares. Set only when this level
    /// groups by contrast, where each unit sees a single input.
    sibling_inputs: Option<NameSet>,
}

impl<'a> ContrastResolver<'a> {
    pub fn new(level: &'a LevelSpec, level_index: usize, below: &NameSet) -> Self {
        let sibling_inputs = level.group_by.contains(&Dimension::Contrast).then(|| below.clone());
        Self { level, level_index, sibling_inputs }
    }

    /// Reports explicit contrasts that weight several lower-level contrasts at
    /// a level grouped by contrast. No unit could ever resolve them.
    pub fn check_combined(&self, violations: &mut Vec<Violation>) {
        let Some(siblings) = &self.sibling_inputs else { return };
        for (index, contrast) in self.level.contrasts.iter().enumerate() {
            let combined = self.level.combined_inputs(contrast, siblings);
            if combined.len() > 1 {
                violations.push(Violation::new(
                    format!("Steps[{}].Contrasts[{}]", self.level_index, index),
                    ViolationKind::MalformedContrast,
                    format!(
                        "contrast '{}' combines {} but each '{}' unit sees a single contrast",
                        contrast.name,
                        combined.iter().map(|k| format!("'{}'", k)).collect::<Vec<_>>().join(", "),
                        self.level.name()
                    ),
                ));
            }
        }
    }

    /// Dummy contrasts first, then the explicit ones.
    ///
    /// `pool` is what condition-less dummy contrasts expand over; `available`
    /// is every name a weight key may use for this unit. Unresolvable keys are
    /// pushed onto `violations` and the contrast is left off the unit.
    pub fn resolve(
        &self,
        unit: &str,
        pool: &[String],
        available: &IndexSet<String>,
        violations: &mut Vec<Violation>,
    ) -> Vec<ContrastSpec> {
        let explicit: HashSet<&str> = self.level.contrasts.iter().map(|c| c.name.as_str()).collect();
        let mut resolved = Vec::with_capacity(pool.len() + explicit.len());

        if let Some(dummy) = &self.level.dummy_contrasts {
            let names: Vec<&str> = match &dummy.conditions {
                None => pool.iter().map(String::as_str).collect(),
                Some(conditions) => conditions
                    .iter()
                    .map(String::as_str)
                    .filter(|c| available.contains(*c))
                    .collect(),
            };
            for name in names {
                if explicit.contains(name) {
                    debug!(unit, contrast = name, "dummy contrast shadowed by an explicit contrast");
                    continue;
                }
                resolved.push(ContrastSpec::indicator(name, dummy.test));
            }
        }

        for (index, contrast) in self.level.contrasts.iter().enumerate() {
            let missing: Vec<&str> = contrast.keys().filter(|k| !available.contains(*k)).collect();
            if missing.is_empty() {
                resolved.push(contrast.clone());
                continue;
            }
            if let Some(siblings) = &self.sibling_inputs {
                if missing.iter().all(|k| siblings.contains(k)) {
                    // Belongs to the unit that groups the referenced contrast.
                    debug!(unit, contrast = %contrast.name, "contrast targets another contrast group");
                    continue;
                }
            }
            violations.push(Violation::new(
                format!("Steps[{}].Contrasts[{}]", self.level_index, index),
                ViolationKind::UndefinedReference,
                format!(
                    "contrast '{}' references {}, which unit '{}' does not provide",
                    contrast.name,
                    missing.iter().map(|k| format!("'{}'", k)).collect::<Vec<_>>().join(", "),
                    unit
                ),
            ));
        }

        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelSpec, TestType};

    fn spec(doc: &str) -> ModelSpec {
        ModelSpec::from_json_str(doc).unwrap()
    }

    fn strings(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn set(names: &[&str]) -> IndexSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_unit_missing_a_wildcard_column_is_reported() {
        let spec = spec(
            r#"{"Steps": [{"Level": "run", "Model": ["a_comp_cor_*"],
                "Contrasts": [{"Name": "c1", "ConditionList": ["a_comp_cor_01"], "Weights": [1]}]}]}"#,
        );
        let resolver = ContrastResolver::new(&spec.levels[0], 0, &NameSet::new());
        let mut violations = Vec::new();

        let names = set(&["a_comp_cor_00", "a_comp_cor_01"]);
        let ok = resolver.resolve("run:sub-01", &strings(&["a_comp_cor_00", "a_comp_cor_01"]), &names, &mut violations);
        assert_eq!(ok.len(), 1);
        assert!(violations.is_empty());

        let fewer = set(&["a_comp_cor_00"]);
        let none = resolver.resolve("run:sub-02", &strings(&["a_comp_cor_00"]), &fewer, &mut violations);
        assert!(none.is_empty());
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].location, "Steps[0].Contrasts[0]");
        assert!(violations[0].message.contains("run:sub-02"));
    }

    #[test]
    fn test_dummy_contrasts_skip_absent_conditions_and_yield_to_explicit() {
        let spec = spec(
            r#"{"Steps": [{"Level": "run", "Model": ["trial_type.a", {"Name": "trial_type.b", "Optional": true}],
                "DummyContrasts": {"Conditions": ["trial_type.a", "trial_type.b"], "Test": "F"},
                "Contrasts": [{"Name": "trial_type.a", "ConditionList": ["trial_type.a"], "Weights": [2]}]}]}"#,
        );
        let resolver = ContrastResolver::new(&spec.levels[0], 0, &NameSet::new());
        let mut violations = Vec::new();

        let resolved = resolver.resolve("run:x", &strings(&["trial_type.a"]), &set(&["trial_type.a"]), &mut violations);
        assert!(violations.is_empty());
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].weights, vec![vec![2.0]]);
        assert_eq!(resolved[0].test, TestType::T);
    }

    #[test]
    fn test_contrast_grouped_level_skips_other_groups() {
        let spec = spec(
            r#"{"Steps": [
                {"Level": "run", "Model": ["a", "b"], "DummyContrasts": true},
                {"Level": "dataset", "GroupBy": ["contrast"], "Model": [1],
                 "Contrasts": [{"Name": "only_a", "ConditionList": ["a"], "Weights": [1]},
                               {"Name": "mean", "ConditionList": ["1"], "Weights": [1]}]}
            ]}"#,
        );
        let below = spec.levels[0].declared_outputs(&NameSet::new());
        let resolver = ContrastResolver::new(&spec.levels[1], 1, &below);
        let mut violations = Vec::new();

        let for_b = resolver.resolve("dataset:contrast-b", &strings(&["b"]), &set(&["b", "1"]), &mut violations);
        assert!(violations.is_empty());
        assert_eq!(for_b.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(), vec!["mean"]);

        let for_a = resolver.resolve("dataset:contrast-a", &strings(&["a"]), &set(&["a", "1"]), &mut violations);
        assert_eq!(for_a.len(), 2);
    }

    #[test]
    fn test_contrast_grouped_level_reports_combined_inputs_once() {
        let mut spec = spec(
            r#"{"Steps": [
                {"Level": "run", "Model": ["a", "b"], "DummyContrasts": true},
                {"Level": "dataset", "Model": [1],
                 "Contrasts": [{"Name": "a_vs_b", "ConditionList": ["a", "b"], "Weights": [1, -1]},
                               {"Name": "a_vs_mean", "ConditionList": ["a", "1"], "Weights": [1, -1]}]}
            ]}"#,
        );
        spec.levels[1].group_by = vec![Dimension::Contrast];
        let below = spec.levels[0].declared_outputs(&NameSet::new());
        let resolver = ContrastResolver::new(&spec.levels[1], 1, &below);
        let mut violations = Vec::new();

        resolver.check_combined(&mut violations);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::MalformedContrast);
        assert_eq!(violations[0].location, "Steps[1].Contrasts[0]");
    }
}
