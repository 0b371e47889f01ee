//! document.rs
//! The raw, serde-facing shape of a model document.
//!
//! Nothing here is validated beyond JSON well-formedness; the parser turns
//! these structures into a `ModelSpec` and reports every inconsistency.

use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModelDocument {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Dataset-wide entity restrictions, merged into the run-level filter.
    #[serde(default)]
    pub input: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(alias = "Levels")]
    pub steps: Vec<LevelDocument>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LevelDocument {
    pub level: String,
    #[serde(default)]
    pub model: Option<ModelEntry>,
    #[serde(default)]
    pub contrasts: Vec<ContrastDocument>,
    #[serde(default)]
    pub dummy_contrasts: Option<DummyContrastsDocument>,
    #[serde(default)]
    pub group_by: Option<Vec<String>>,
    #[serde(default)]
    pub filter: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default)]
    pub effects: Option<String>,
}

/// `Model` is either `{"X": [...], ...}` or a bare regressor list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ModelEntry {
    // A struct variant would also accept a sequence, so the list form goes first.
    List(Vec<RegressorEntry>),
    Object {
        #[serde(rename = "X", default)]
        x: Vec<RegressorEntry>,
        #[serde(rename = "HRF", default)]
        hrf: Option<String>,
        #[serde(rename = "Transformations", default)]
        transformations: Vec<serde_json::Value>,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RegressorEntry {
    Name(String),
    /// Numeric regressors such as the intercept `1`.
    Number(serde_json::Number),
    Detailed {
        #[serde(rename = "Name")]
        name: String,
        #[serde(rename = "Optional", default)]
        optional: bool,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContrastDocument {
    pub name: String,
    #[serde(default)]
    pub condition_list: Vec<String>,
    #[serde(default)]
    pub weights: Option<WeightsDocument>,
    #[serde(default, alias = "Type")]
    pub test: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WeightsDocument {
    Vector(Vec<f64>),
    Matrix(Vec<Vec<f64>>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DummyContrastsDocument {
    Flag(bool),
    Detailed {
        #[serde(rename = "Conditions", default)]
        conditions: Option<Vec<String>>,
        #[serde(rename = "Test", alias = "Type", default)]
        test: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_accepts_both_shapes() {
        let list: ModelEntry = serde_json::from_str(r#"["drift", {"Name": "rot_x", "Optional": true}, 1]"#).unwrap();
        assert!(matches!(list, ModelEntry::List(ref x) if x.len() == 3));

        let object: ModelEntry = serde_json::from_str(r#"{"X": ["drift"], "HRF": "spm"}"#).unwrap();
        match object {
            ModelEntry::Object { x, hrf, transformations } => {
                assert_eq!(x.len(), 1);
                assert_eq!(hrf.as_deref(), Some("spm"));
                assert!(transformations.is_empty());
            }
            other => panic!("unexpected shape: {:?}", other),
        }
    }

    #[test]
    fn test_contrast_type_alias() {
        let doc: ContrastDocument = serde_json::from_str(
            r#"{"Name": "c", "ConditionList": ["a", "b"], "Weights": [1, -1], "Type": "T"}"#,
        )
        .unwrap();
        assert_eq!(doc.test.as_deref(), Some("T"));
        assert!(matches!(doc.weights, Some(WeightsDocument::Vector(ref w)) if w == &vec![1.0, -1.0]));
    }

    #[test]
    fn test_levels_alias_and_dummy_flag() {
        let doc: ModelDocument = serde_json::from_str(
            r#"{"Name": "m", "Levels": [{"Level": "run", "DummyContrasts": true}]}"#,
        )
        .unwrap();
        assert_eq!(doc.steps.len(), 1);
        assert!(matches!(doc.steps[0].dummy_contrasts, Some(DummyContrastsDocument::Flag(true))));
    }
}
