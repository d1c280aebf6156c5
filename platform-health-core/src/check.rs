use serde::{Deserialize, Serialize};

use crate::error::{HealthError, Result};

/// Whether a [`CheckExpression`] runs once against the whole context, or
/// once per element of a provider-declared iteration key (§3 "mode").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckMode {
    Default,
    Each,
}

impl Default for CheckMode {
    fn default() -> Self {
        CheckMode::Default
    }
}

impl CheckMode {
    fn parse(raw: &str) -> Result<Self> {
        match raw {
            "" => Ok(CheckMode::Default),
            "each" => Ok(CheckMode::Each),
            other => Err(HealthError::Compile(format!(
                "invalid check mode '{other}', expected \"\" or \"each\""
            ))),
        }
    }
}

/// A single CEL assertion bound to a provider (§3 "CheckExpression").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckExpression {
    pub expression: String,
    pub message: String,
    pub mode: CheckMode,
}

impl CheckExpression {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            message: String::new(),
            mode: CheckMode::Default,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_mode(mut self, mode: CheckMode) -> Self {
        self.mode = mode;
        self
    }

    /// The text surfaced on failure: the operator-supplied message, falling
    /// back to a generated one naming the source expression (§3).
    pub fn failure_message(&self) -> String {
        if self.message.is_empty() {
            format!("CEL check failed: {}", self.expression)
        } else {
            self.message.clone()
        }
    }
}

/// The `checks:` entry shape accepted by component configuration (§4.2
/// "check_list parsing" / §6): either a bare expression string, or a mapping
/// with `check`, `message`, `mode`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CheckExpressionConfig {
    Bare(String),
    Full {
        check: String,
        #[serde(default)]
        message: String,
        #[serde(default)]
        mode: String,
    },
}

impl CheckExpressionConfig {
    pub fn into_check(self) -> Result<CheckExpression> {
        match self {
            CheckExpressionConfig::Bare(expression) => Ok(CheckExpression::new(expression)),
            CheckExpressionConfig::Full {
                check,
                message,
                mode,
            } => Ok(CheckExpression {
                expression: check,
                message,
                mode: CheckMode::parse(&mode)?,
            }),
        }
    }
}

/// Parses a `checks:` sequence, wrapping any failure with the offending
/// index as §4.3 "compile_all" requires.
pub fn parse_check_list(raw: Vec<CheckExpressionConfig>) -> Result<Vec<CheckExpression>> {
    raw.into_iter()
        .enumerate()
        .map(|(index, cfg)| {
            cfg.into_check()
                .map_err(|e| HealthError::Compile(format!("checks[{index}]: {e}")))
        })
        .collect()
}
