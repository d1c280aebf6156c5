use std::sync::Arc;
use std::time::Duration;

use crate::check::parse_check_list;
use crate::config::ComponentConfig;
use crate::error::{ComponentWarning, HealthError, Result};
use crate::provider::BoxProvider;
use crate::registry::ProviderRegistry;

/// Turns declarative [`ComponentConfig`] into a configured, initialized
/// instance (§4.2). Composes a registry lookup with option application,
/// spec decoding, component wiring, `setup`, the post-setup timeout
/// override, and check wiring, in that order.
///
/// Rust has no runtime reflection over an arbitrary provider's fields, so
/// unlike a source design that decodes the spec map generically, each
/// provider here owns its own [`crate::provider::Provider::apply_spec`].
/// Likewise, `resolve_components` needs a [`Factory`] to turn raw child
/// config into instances; since a provider's `setup()` has no factory
/// parameter in the §4.1 contract, this `Factory` calls
/// `resolve_components` itself immediately after `setup()` succeeds, rather
/// than leaving it to be invoked from inside the provider's own `setup`.
/// See DESIGN.md.
/// Nesting-depth bound standing in for true cycle detection (§4.4
/// "Container self-reference / cycle protection"). This crate's
/// configuration tree is built from owned, non-aliased values
/// (`BTreeMap<String, ComponentConfig>`), so a genuine reference cycle
/// cannot be constructed the way it could in a pointer-based graph; an
/// operator-authored config nested this deep is, in practice, always a
/// mistake rather than legitimate structure. See DESIGN.md.
pub const MAX_CONTAINER_DEPTH: usize = 64;

pub struct Factory {
    registry: Arc<ProviderRegistry>,
}

impl Factory {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub async fn build(
        &self,
        name: &str,
        config: &ComponentConfig,
    ) -> Result<(BoxProvider, Vec<ComponentWarning>)> {
        self.build_at_depth(name, config, 0).await
    }

    /// As [`Self::build`], but tracks nesting `depth` explicitly so a
    /// [`Container`](crate::provider::Container) resolving its own children
    /// can pass `depth + 1` back in. Public so concrete container providers
    /// in other crates can call it from `resolve_components`.
    pub async fn build_at_depth(
        &self,
        name: &str,
        config: &ComponentConfig,
        depth: usize,
    ) -> Result<(BoxProvider, Vec<ComponentWarning>)> {
        if depth > MAX_CONTAINER_DEPTH {
            return Err(HealthError::configuration(
                &config.kind,
                name,
                format!("nesting exceeds maximum depth of {MAX_CONTAINER_DEPTH}, likely a cyclic component reference"),
            ));
        }

        let mut instance = self.registry.new_instance(&config.kind)?;
        instance.set_name(name.to_string());
        tracing::debug!(kind = %config.kind, name, depth, "building component instance");

        let unused_keys = instance.apply_spec(&config.spec)?;
        let mut warnings: Vec<ComponentWarning> = unused_keys
            .into_iter()
            .map(|key| {
                ComponentWarning::new(
                    instance.kind(),
                    instance.name(),
                    format!("unused spec key '{key}'"),
                )
            })
            .collect();
        warnings.extend(config.extra.keys().map(|key| {
            ComponentWarning::new(
                instance.kind(),
                instance.name(),
                format!("unrecognized component key '{key}'"),
            )
        }));
        for warning in &warnings {
            tracing::warn!(kind = %warning.kind, name = %warning.name, detail = %warning.detail, "component warning");
        }

        if !config.components.is_empty() {
            let container = instance.as_container_mut().ok_or_else(|| {
                HealthError::configuration(
                    &config.kind,
                    name,
                    "components supplied but provider is not a container",
                )
            })?;
            container.set_components(config.components.clone());
        }

        instance.setup().await?;

        if let Some(container) = instance.as_container_mut() {
            container.resolve_components(self, depth + 1).await?;
        }

        let explicit_timeout = config.timeout_duration();
        if explicit_timeout > Duration::ZERO {
            instance.set_timeout(explicit_timeout);
        }

        if !config.checks.is_empty() {
            let checks = parse_check_list(config.checks.clone())?;
            let with_checks = instance.as_with_checks_mut().ok_or_else(|| {
                HealthError::configuration(
                    &config.kind,
                    name,
                    "checks supplied but provider does not accept checks",
                )
            })?;
            with_checks.set_checks(checks)?;
        }

        Ok((instance, warnings))
    }
}
