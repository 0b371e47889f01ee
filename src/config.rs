//! Compile options: how much of the model to compile, which participants to
//! include, and the preprocessing requests attached to the units.
use crate::model::ModelSpec;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("cannot read compile options: {0}")]
    Parse(String),
    #[error("analysis level '{0}' is not part of the model")]
    UnknownAnalysisLevel(String),
    #[error("invalid smoothing '{spec}': {reason}")]
    InvalidSmoothing { spec: String, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompileOptions {
    /// Stop after this level. `None` compiles every level of the model.
    pub analysis_level: Option<String>,
    /// Subject labels to include, with or without the `sub-` prefix. Empty means all.
    pub participants: Vec<String>,
    /// `FWHM[:LEVEL[:TYPE]]`, e.g. `5`, `5:l2`, `6:subject:iso`.
    pub smoothing: Option<String>,
    /// Highest Legendre polynomial order added to every run design.
    pub detrend_poly: Option<u32>,
}

impl CompileOptions {
    pub fn new() -> Self { Self::default() }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn with_analysis_level(mut self, level: impl Into<String>) -> Self {
        self.analysis_level = Some(level.into());
        self
    }

    pub fn with_participants<I, S>(mut self, participants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.participants = participants.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_smoothing(mut self, smoothing: impl Into<String>) -> Self {
        self.smoothing = Some(smoothing.into());
        self
    }

    pub fn with_detrend_poly(mut self, order: u32) -> Self {
        self.detrend_poly = Some(order);
        self
    }

    /// How many levels of `spec`, counted from the run level, get compiled.
    pub fn active_levels(&self, spec: &ModelSpec) -> Result<usize, ConfigError> {
        match &self.analysis_level {
            None => Ok(spec.levels.len()),
            Some(name) => spec
                .level_position(name)
                .map(|pos| pos + 1)
                .ok_or_else(|| ConfigError::UnknownAnalysisLevel(name.clone())),
        }
    }

    /// Participant labels without their `sub-` prefix.
    pub fn participant_labels(&self) -> Vec<String> {
        self.participants
            .iter()
            .map(|p| p.trim())
            .map(|p| p.strip_prefix("sub-").unwrap_or(p))
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Names of the generated drift regressors: `legendre00` up to the configured order.
    pub fn drift_terms(&self) -> Vec<(u32, String)> {
        match self.detrend_poly {
            None => Vec::new(),
            Some(order) => (0..=order).map(|i| (i, format!("legendre{:02}", i))).collect(),
        }
    }

    /// Resolves the smoothing option to the index of the level it applies to.
    pub fn smoothing_request(
        &self,
        spec: &ModelSpec,
        active_levels: usize,
    ) -> Result<Option<(usize, SmoothingRequest)>, ConfigError> {
        let raw = match &self.smoothing {
            None => return Ok(None),
            Some(raw) => raw,
        };
        let parsed: SmoothingSpec = raw.parse()?;
        let invalid = |reason: String| ConfigError::InvalidSmoothing { spec: raw.clone(), reason };

        let index = match &parsed.level {
            SmoothingLevel::Index(n) if *n >= 1 && *n <= spec.levels.len() => n - 1,
            SmoothingLevel::Index(n) => {
                return Err(invalid(format!("level l{} is outside the model's {} level(s)", n, spec.levels.len())))
            }
            SmoothingLevel::Name(name) => spec
                .level_position(name)
                .ok_or_else(|| invalid(format!("level '{}' is not part of the model", name)))?,
        };
        if index >= active_levels {
            return Err(invalid(format!(
                "level '{}' is above the analysis level",
                spec.levels[index].name()
            )));
        }

        Ok(Some((index, SmoothingRequest { fwhm: parsed.fwhm, kind: parsed.kind })))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SmoothingKind {
    #[serde(rename = "iso")]
    Isotropic,
}

/// Smoothing the backend should apply to a unit's inputs before fitting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SmoothingRequest {
    pub fwhm: f64,
    pub kind: SmoothingKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SmoothingLevel {
    /// `lN`, 1-based.
    Index(usize),
    Name(String),
}

/// The parsed `FWHM[:LEVEL[:TYPE]]` option.
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothingSpec {
    pub fwhm: f64,
    pub level: SmoothingLevel,
    pub kind: SmoothingKind,
}

impl FromStr for SmoothingSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ConfigError::InvalidSmoothing { spec: s.to_string(), reason: reason.to_string() };

        let parts: Vec<&str> = s.split(':').map(str::trim).collect();
        if parts.len() > 3 {
            return Err(invalid("expected FWHM[:LEVEL[:TYPE]]"));
        }

        let fwhm: f64 = parts[0].parse().map_err(|_| invalid("FWHM is not a number"))?;
        if !fwhm.is_finite() || fwhm <= 0.0 {
            return Err(invalid("FWHM must be positive"));
        }

        let level = match parts.get(1).copied().unwrap_or("l1") {
            "" => return Err(invalid("LEVEL is empty")),
            raw => match raw.strip_prefix('l').or_else(|| raw.strip_prefix('L')).map(str::parse::<usize>) {
                Some(Ok(n)) => SmoothingLevel::Index(n),
                _ => SmoothingLevel::Name(raw.to_string()),
            },
        };

        let kind = match parts.get(2).copied().unwrap_or("iso").to_ascii_lowercase().as_str() {
            "iso" => SmoothingKind::Isotropic,
            _ => return Err(invalid("only isotropic ('iso') smoothing is supported")),
        };

        Ok(Self { fwhm, level, kind })
    }
}
