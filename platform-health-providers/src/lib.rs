//! Concrete provider implementations for the platform health engine.
//!
//! `spec.md` §1 scopes concrete providers out of the core design - this
//! crate supplies just enough of them ([`container`], [`mock`], [`tcp`]) for
//! the factory/registry/orchestrator to have something real to wire
//! together, the way `platform-health-core`'s and `platform-health-engine`'s
//! own test suites need a `Leaf`/`Outer` stand-in but a production registry
//! needs named, registrable kinds instead of ad-hoc test types.

pub mod container;
pub mod mock;
pub mod tcp;

use std::sync::Arc;

use platform_health_core::{BoxProvider, HealthError, ProviderRegistry, Result};

/// Registers every provider kind this crate supplies into `registry`
/// (§4.2 "Registration happens once during process initialization").
/// Call once at process startup, before any [`platform_health_core::Factory`]
/// is used; a second call against the same registry fails because
/// [`ProviderRegistry::register`] refuses to clobber an existing kind.
pub fn register_all(registry: &ProviderRegistry) -> Result<()> {
    registry.register(
        container::KIND,
        Box::new(|| Box::new(container::ContainerProvider::new()) as BoxProvider),
    )?;
    registry.register(
        mock::KIND,
        Box::new(|| Box::new(mock::MockProvider::new()) as BoxProvider),
    )?;
    registry.register(
        tcp::KIND,
        Box::new(|| Box::new(tcp::TcpProvider::new()) as BoxProvider),
    )?;
    Ok(())
}

/// Convenience constructor: a fresh registry with every provider in this
/// crate already registered.
pub fn default_registry() -> Result<Arc<ProviderRegistry>> {
    let registry = ProviderRegistry::new();
    register_all(&registry)?;
    Ok(Arc::new(registry))
}

pub(crate) fn missing_field(kind: &str, name: &str, field: &str) -> HealthError {
    HealthError::configuration(kind, name, format!("missing required spec field '{field}'"))
}
