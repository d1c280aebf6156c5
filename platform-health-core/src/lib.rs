//! Provider contract, registry, factory, CEL subsystem and response model
//! for the platform health engine.
//!
//! This crate has no knowledge of any concrete provider or of how checks get
//! scheduled concurrently - it defines the contract
//! ([`provider::Provider`] and its optional capabilities), the process-wide
//! [`registry::ProviderRegistry`], the [`factory::Factory`] that turns
//! configuration into instances, the embedded [`cel`] assertion subsystem,
//! and the [`response::Response`] tree. Concrete providers live in
//! `platform-health-providers`; concurrent dispatch lives in
//! `platform-health-engine`.

pub mod cel;
pub mod cel_bridge;
pub mod check;
pub mod config;
pub mod context;
pub mod error;
pub mod factory;
pub mod provider;
pub mod registry;
pub mod response;
pub mod status;
pub mod value;

pub use cel::{CelConfig, CheckOutcome, IterationKeys, VariableDecl};
pub use check::{CheckExpression, CheckExpressionConfig, CheckMode, parse_check_list};
pub use config::{ComponentConfig, RootConfig, TimeoutConfig, parse_root_json};
pub use context::{ExecutionContext, Parallelism};
pub use error::{ComponentError, ComponentWarning, HealthError, Result};
pub use factory::Factory;
pub use provider::{BoxProvider, Container, Provider, SharedProvider, WithChecks, evaluate_checks};
pub use registry::{PrototypeFn, ProviderRegistry};
pub use response::{FlatResponse, Response};
pub use status::Status;
pub use value::{CheckContext, CheckValue};
