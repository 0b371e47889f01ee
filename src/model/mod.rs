//! The model specification parser.
//!
//! Reads a hierarchical model document, validates it as a whole, and produces
//! a normalized `ModelSpec` with levels in dependency order. Validation runs
//! every rule and reports all violations together, so a user can fix a
//! document in one round trip.

pub use self::error::{SpecValidationError, Violation, ViolationKind};
pub use self::parser::SpecParser;
pub use self::spec::{
    ContrastSpec, DummyContrasts, Effects, LevelKind, LevelSpec, ModelBlock, ModelSpec, NameSet,
    RegressorSource, RegressorSpec, TestType, Transformation, WildcardPattern,
};

// --- MODULE DECLARATIONS ---
pub mod document;
mod error;
mod parser;
mod spec;
mod rules {
    pub mod chain;
    pub mod filters;
    pub mod grouping;
    pub mod names;
    pub mod references;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violations(doc: &str) -> Vec<Violation> {
        ModelSpec::from_json_str(doc).unwrap_err().violations
    }

    #[test]
    fn test_level_chain_must_rise_from_run() {
        let found = violations(
            r#"{"Steps": [{"Level": "subject"}, {"Level": "run"}, {"Level": "run"}]}"#,
        );
        let order: Vec<&Violation> = found.iter().filter(|v| v.kind == ViolationKind::LevelOrder).collect();
        // subject first, run after subject, run after run
        assert_eq!(order.len(), 3);
    }

    #[test]
    fn test_participant_is_an_alias_for_subject() {
        let spec = ModelSpec::from_json_str(
            r#"{"Steps": [{"Level": "run", "Model": ["drift"]}, {"Level": "participant"}]}"#,
        )
        .unwrap();
        assert_eq!(spec.levels[1].kind, LevelKind::Subject);
        assert_eq!(spec.level_position("subject"), Some(1));
    }

    #[test]
    fn test_higher_contrast_resolves_against_lower_outputs() {
        let spec = ModelSpec::from_json_str(
            r#"{"Steps": [
                {"Level": "run", "Model": ["trial_type.a", "trial_type.b"],
                 "Contrasts": [{"Name": "a_vs_b", "ConditionList": ["trial_type.a", "trial_type.b"], "Weights": [1, -1]}]},
                {"Level": "subject",
                 "Contrasts": [{"Name": "mean_a_vs_b", "ConditionList": ["a_vs_b"], "Weights": [1]}]}
            ]}"#,
        );
        assert!(spec.is_ok());

        // The run level's regressors are not visible two levels up.
        let found = violations(
            r#"{"Steps": [
                {"Level": "run", "Model": ["trial_type.a"], "DummyContrasts": true},
                {"Level": "subject", "DummyContrasts": true},
                {"Level": "dataset",
                 "Contrasts": [{"Name": "x", "ConditionList": ["nope"], "Weights": [1]}]}
            ]}"#,
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, ViolationKind::UndefinedReference);
        assert_eq!(found[0].location, "Steps[2].Contrasts[0]");
    }

    #[test]
    fn test_wildcard_regressors_satisfy_contrast_keys() {
        let spec = ModelSpec::from_json_str(
            r#"{"Steps": [{"Level": "run", "Model": ["a_comp_cor_*"],
                "Contrasts": [{"Name": "c0", "ConditionList": ["a_comp_cor_00"], "Weights": [1]}]}]}"#,
        );
        assert!(spec.is_ok());
    }

    #[test]
    fn test_grouping_variables_must_resolve() {
        let found = violations(
            r#"{"Steps": [
                {"Level": "run", "Model": ["drift"]},
                {"Level": "subject", "GroupBy": ["subject", "contrast"]},
                {"Level": "dataset", "GroupBy": ["run", "colour"]}
            ]}"#,
        );
        let grouping: Vec<&Violation> =
            found.iter().filter(|v| v.kind == ViolationKind::UnresolvableGrouping).collect();
        // 'contrast' with no run contrasts, 'run' already collapsed, 'colour' unknown
        assert_eq!(grouping.len(), 3, "{:?}", found);
    }

    #[test]
    fn test_contrast_grouping_resolves_with_dummy_contrasts() {
        let spec = ModelSpec::from_json_str(
            r#"{"Steps": [
                {"Level": "run", "Model": ["drift"], "DummyContrasts": true},
                {"Level": "subject", "GroupBy": ["subject", "contrast"], "DummyContrasts": true},
                {"Level": "dataset", "GroupBy": ["contrast"], "Model": [1]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(spec.levels[2].effects, Some(Effects::Random));
        assert_eq!(spec.levels[1].key_dimensions(), vec![crate::layout::Dimension::Subject]);
    }

    #[test]
    fn test_filter_on_collapsed_entity_is_rejected() {
        let found = violations(
            r#"{"Steps": [
                {"Level": "run", "Model": ["drift"], "DummyContrasts": true},
                {"Level": "subject", "GroupBy": ["subject"], "DummyContrasts": true},
                {"Level": "dataset", "Filter": {"run": "1"}, "DummyContrasts": true}
            ]}"#,
        );
        assert_eq!(found.len(), 1, "{:?}", found);
        assert_eq!(found[0].kind, ViolationKind::InvalidFilter);
        assert_eq!(found[0].location, "Steps[2].Filter.run");

        // The subject level still aggregates run-keyed units.
        let spec = ModelSpec::from_json_str(
            r#"{"Steps": [
                {"Level": "run", "Model": ["drift"], "DummyContrasts": true},
                {"Level": "subject", "GroupBy": ["subject"], "Filter": {"run": "1"}, "DummyContrasts": true},
                {"Level": "dataset", "Filter": {"subject": "01"}, "DummyContrasts": true}
            ]}"#,
        );
        assert!(spec.is_ok(), "{:?}", spec.err());
    }

    #[test]
    fn test_contrast_grouped_level_cannot_combine_input_contrasts() {
        let found = violations(
            r#"{"Steps": [
                {"Level": "run", "Model": ["trial_type.a", "trial_type.b"],
                 "DummyContrasts": {"Conditions": ["trial_type.a", "trial_type.b"]}},
                {"Level": "subject", "GroupBy": ["subject", "contrast"],
                 "Contrasts": [{"Name": "a_vs_b", "ConditionList": ["trial_type.a", "trial_type.b"], "Weights": [1, -1]}]}
            ]}"#,
        );
        assert_eq!(found.len(), 1, "{:?}", found);
        assert_eq!(found[0].kind, ViolationKind::MalformedContrast);
        assert_eq!(found[0].location, "Steps[1].Contrasts[0]");

        // One input contrast per explicit contrast is fine.
        let spec = ModelSpec::from_json_str(
            r#"{"Steps": [
                {"Level": "run", "Model": ["trial_type.a", "trial_type.b"],
                 "DummyContrasts": {"Conditions": ["trial_type.a", "trial_type.b"]}},
                {"Level": "subject", "GroupBy": ["subject", "contrast"],
                 "Contrasts": [{"Name": "mean_a", "ConditionList": ["trial_type.a"], "Weights": [1]}]}
            ]}"#,
        );
        assert!(spec.is_ok(), "{:?}", spec.err());
    }
}
