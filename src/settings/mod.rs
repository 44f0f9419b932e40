//! Settings for checking and evaluation (vdmx.toml)
//!
//! Settings are read from TOML. The arithmetic precision is process-wide:
//! the driver calls [`Settings::apply`] once before evaluation starts, after
//! which the core only reads it. Interpreters never install it themselves.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::interpreter::numeric;

/// Top-level settings file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Type checker options
    #[serde(default)]
    pub checker: CheckerSettings,

    /// Evaluation options
    #[serde(default)]
    pub evaluation: EvaluationSettings,
}

/// Type checker options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckerSettings {
    /// Reject (rather than warn about) impure calls from pure contexts
    #[serde(default)]
    pub strict: bool,
}

/// Evaluation options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSettings {
    /// Decimal digits kept by arbitrary-precision real arithmetic
    #[serde(default = "default_precision")]
    pub precision: u32,

    /// Convert function arguments and results to their declared types
    #[serde(default = "default_true")]
    pub dynamic_type_checks: bool,

    /// Evaluate preconditions before calls
    #[serde(default = "default_true")]
    pub pre_checks: bool,

    /// Evaluate postconditions after calls
    #[serde(default = "default_true")]
    pub post_checks: bool,

    /// Evaluate type invariants on construction and narrowing
    #[serde(default = "default_true")]
    pub inv_checks: bool,

    /// Bound quantifier searches to this many milliseconds
    #[serde(default)]
    pub quantifier_timeout_ms: Option<u64>,

    /// How `and`/`or`/`=>` treat undefined operands
    #[serde(default)]
    pub undefined_logic: UndefinedLogic,
}

fn default_precision() -> u32 {
    numeric::DEFAULT_PRECISION
}

fn default_true() -> bool {
    true
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self {
            precision: default_precision(),
            dynamic_type_checks: true,
            pre_checks: true,
            post_checks: true,
            inv_checks: true,
            quantifier_timeout_ms: None,
            undefined_logic: UndefinedLogic::default(),
        }
    }
}

/// Treatment of undefined operands in the boolean connectives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UndefinedLogic {
    /// Any undefined operand yields a "maybe" result unless the other side
    /// decides the outcome
    #[default]
    ThreeValued,
    /// Only the literal `undefined` is tolerated; a computed undefined
    /// operand is a failure
    LiteralOnly,
}

impl Settings {
    /// Load settings from a file
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse settings from a TOML string
    pub fn parse(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Serialize the settings to TOML
    pub fn to_toml(&self) -> Result<String, SettingsError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.evaluation.precision == 0 {
            return Err(SettingsError::Validation(
                "precision must be at least one digit".to_string(),
            ));
        }
        if self.evaluation.quantifier_timeout_ms == Some(0) {
            return Err(SettingsError::Validation(
                "quantifier_timeout_ms must be positive when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Install the process-wide arithmetic precision.
    ///
    /// The precision can be installed once; applying settings that ask for a
    /// different one afterwards is an error and changes nothing.
    pub fn apply(&self) -> Result<(), SettingsError> {
        let installed = numeric::install_precision(self.evaluation.precision);
        if installed != self.evaluation.precision {
            return Err(SettingsError::Validation(format!(
                "precision is already installed as {} digits",
                installed
            )));
        }
        Ok(())
    }

    /// The quantifier search bound, if any
    pub fn quantifier_timeout(&self) -> Option<Duration> {
        self.evaluation
            .quantifier_timeout_ms
            .map(Duration::from_millis)
    }
}

/// Settings errors
#[derive(Debug, Error)]
pub enum SettingsError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Parse error
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests;
