use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::check::CheckExpressionConfig;
use crate::error::{HealthError, Result};

/// A `timeout:` value as accepted by the schema (§6): a humantime string
/// ("5s"), a bare number of seconds, or absent (inherit).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeoutConfig {
    Duration(#[serde(with = "humantime_serde")] Duration),
    Seconds(f64),
}

impl TimeoutConfig {
    pub fn into_duration(self) -> Duration {
        match self {
            TimeoutConfig::Duration(d) => d,
            TimeoutConfig::Seconds(secs) => Duration::from_secs_f64(secs.max(0.0)),
        }
    }
}

/// The declarative shape of one component (§6): `kind` is required;
/// everything else is optional. The schema's own top-level keys are fixed
/// and exhaustively listed here per §6's table; anything else lands in
/// `extra` via `#[serde(flatten)]` instead of being silently dropped by
/// serde, so the factory can turn each leftover key into a
/// [`crate::error::ComponentWarning`] (§4.2 "unknown keys at this level
/// become non-fatal warnings").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentConfig {
    pub kind: String,
    #[serde(default)]
    pub spec: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub checks: Vec<CheckExpressionConfig>,
    #[serde(default)]
    pub components: BTreeMap<String, ComponentConfig>,
    #[serde(default)]
    pub timeout: Option<TimeoutConfig>,
    /// Resolution of `includes` is explicitly left to an external config
    /// loader (§6); this field is parsed and carried but never interpreted
    /// here.
    #[serde(default)]
    pub includes: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ComponentConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            spec: BTreeMap::new(),
            checks: Vec::new(),
            components: BTreeMap::new(),
            timeout: None,
            includes: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    pub fn timeout_duration(&self) -> Duration {
        self.timeout
            .clone()
            .map(TimeoutConfig::into_duration)
            .unwrap_or(Duration::ZERO)
    }
}

/// The document root (§6): a `components:` mapping of name to
/// [`ComponentConfig`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RootConfig {
    #[serde(default)]
    pub components: BTreeMap<String, ComponentConfig>,
}

/// Parses a JSON document into a [`RootConfig`], wrapping serde's error in
/// a [`HealthError::Configuration`] so it joins the rest of the factory's
/// error surface.
pub fn parse_root_json(raw: &str) -> Result<RootConfig> {
    serde_json::from_str(raw).map_err(|e| {
        HealthError::configuration("root", "<document>", format!("invalid configuration: {e}"))
    })
}
