//! The one concrete [`Container`] implementation in this workspace: owns a
//! raw `name -> ComponentConfig` map, resolves it into instances through a
//! [`Factory`] during `setup`, and evaluates the resolved children
//! concurrently through [`Orchestrator`] at `check()` time.
//!
//! Grounded on `platform-health-engine::orchestrator`'s test-only `Outer`
//! provider (which exists solely to prove the re-entrant parallelism cap
//! doesn't deadlock), promoted here to a full, registrable implementation of
//! §4.1's Container capability: `set_components`, `resolve_components`,
//! `components`, `component_errors`, plus the own-checks Open Question from
//! `spec.md` §9 (a container may declare its own CEL checks in addition to
//! its children; a failure there adds a message at the container node
//! without touching child statuses).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cel_interpreter::Program;
use tracing::{debug, warn};

use platform_health_core::{
    CelConfig, CheckContext, CheckExpression, CheckValue, ComponentConfig, ComponentError,
    Container, ExecutionContext, Factory, Result, Response, SharedProvider, Status, VariableDecl,
    WithChecks, evaluate_checks,
};
use platform_health_engine::Orchestrator;

pub const KIND: &str = "container";

pub struct ContainerProvider {
    name: String,
    timeout: Duration,
    raw_components: BTreeMap<String, ComponentConfig>,
    components: Vec<SharedProvider>,
    component_errors: Vec<ComponentError>,
    cel: CelConfig,
    compiled: Vec<(CheckExpression, Arc<Program>)>,
}

impl ContainerProvider {
    pub fn new() -> Self {
        Self {
            name: String::new(),
            timeout: Duration::ZERO,
            raw_components: BTreeMap::new(),
            components: Vec::new(),
            component_errors: Vec::new(),
            cel: CelConfig::new(vec![VariableDecl::new("child_count", CheckValue::Int(0))]),
            compiled: Vec::new(),
        }
    }

    fn tag(&self) -> String {
        format!("{KIND}/{}", self.name)
    }
}

impl Default for ContainerProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl platform_health_core::Provider for ContainerProvider {
    fn kind(&self) -> &str {
        KIND
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    async fn setup(&mut self) -> Result<()> {
        Ok(())
    }

    async fn check(&self, ctx: &ExecutionContext) -> Response {
        let child_ctx = match ctx.enter_container(self.tag()) {
            Ok(next) => next,
            Err(()) => {
                return Response::loop_detected(
                    KIND,
                    self.name(),
                    format!("cycle detected: '{}' re-entered on its own ancestor chain", self.name()),
                );
            }
        };

        let (children, _child_status) = Orchestrator::new()
            .evaluate(&self.components, &child_ctx)
            .await;

        let mut messages: Vec<String> = self
            .component_errors
            .iter()
            .map(|e| e.to_string())
            .collect();

        let mut own_status = Status::Healthy;
        if !self.compiled.is_empty() {
            let context = self.check_context();
            match evaluate_checks(&self.cel, &self.compiled, &context, ctx.fail_fast()) {
                Ok(failures) if !failures.is_empty() => {
                    own_status = Status::Unhealthy;
                    messages.extend(failures);
                }
                Ok(_) => {}
                Err(e) => {
                    own_status = Status::Unhealthy;
                    messages.push(e.to_string());
                }
            }
        }

        Response::new(KIND, self.name(), own_status)
            .with_messages(messages)
            .with_children(children)
    }

    fn as_with_checks(&self) -> Option<&dyn WithChecks> {
        Some(self)
    }

    fn as_with_checks_mut(&mut self) -> Option<&mut dyn WithChecks> {
        Some(self)
    }

    fn as_container(&self) -> Option<&dyn Container> {
        Some(self)
    }

    fn as_container_mut(&mut self) -> Option<&mut dyn Container> {
        Some(self)
    }
}

#[async_trait]
impl Container for ContainerProvider {
    fn set_components(&mut self, raw: BTreeMap<String, ComponentConfig>) {
        self.raw_components = raw;
    }

    async fn resolve_components(&mut self, factory: &Factory, depth: usize) -> Result<()> {
        debug!(
            name = self.name(),
            depth,
            raw_count = self.raw_components.len(),
            "resolving container components"
        );
        let mut components = Vec::with_capacity(self.raw_components.len());
        let mut errors = Vec::new();
        for (name, config) in &self.raw_components {
            match factory.build_at_depth(name, config, depth).await {
                Ok((instance, _warnings)) => components.push(SharedProvider::from(instance)),
                Err(e) => {
                    warn!(parent = self.name(), child = %name, error = %e, "component failed to resolve");
                    errors.push(ComponentError::new(&config.kind, name.clone(), e.to_string()));
                }
            }
        }
        self.components = components;
        self.component_errors = errors;
        Ok(())
    }

    fn components(&self) -> &[SharedProvider] {
        &self.components
    }

    fn component_errors(&self) -> &[ComponentError] {
        &self.component_errors
    }
}

impl WithChecks for ContainerProvider {
    fn check_config(&self) -> &CelConfig {
        &self.cel
    }

    fn check_context(&self) -> CheckContext {
        let mut ctx = CheckContext::new();
        ctx.insert("child_count".into(), CheckValue::Int(self.components.len() as i64));
        ctx
    }

    fn set_checks(&mut self, checks: Vec<CheckExpression>) -> Result<()> {
        self.compiled = self.cel.compile_all(&checks)?;
        Ok(())
    }

    fn checks(&self) -> &[(CheckExpression, Arc<Program>)] {
        &self.compiled
    }
}
