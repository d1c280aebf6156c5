//! An in-memory leaf provider with no real I/O, parameterized to be
//! healthy/unhealthy/sleeping/loop-detected on demand.
//!
//! Grounded on `platform-health-engine::orchestrator`'s own test-only `Leaf`
//! type, promoted to a registrable provider so the engine's concurrency,
//! timeout, fail-fast and aggregation behavior (`spec.md` §8 scenarios 1-6)
//! can be exercised end to end through the factory/registry rather than by
//! constructing a `Provider` impl by hand in every test module.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cel_interpreter::Program;
use tracing::debug;

use platform_health_core::{
    CelConfig, CheckContext, CheckExpression, CheckValue, Container, ExecutionContext,
    IterationKeys, Response, Result, Status, VariableDecl, WithChecks, evaluate_checks,
};

pub const KIND: &str = "mock";

/// The outcome a `mock` instance reports once its configured `sleep` (if
/// any) has elapsed, absent any check failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Healthy,
    Unhealthy,
    LoopDetected,
}

pub struct MockProvider {
    name: String,
    timeout: Duration,
    outcome: Outcome,
    message: String,
    sleep: Duration,
    /// Exposed to CEL checks as `value` (§8 scenario 6 models this as
    /// `items`/`item`; a scalar `value` variable covers default-mode checks
    /// the same way a real provider would expose one fetched field).
    value: CheckValue,
    /// Exposed to CEL checks as `items`, with per-element iteration key
    /// `item` (§4.3 iteration keys, §8 scenario 6).
    items: Vec<CheckValue>,
    cel: CelConfig,
    compiled: Vec<(CheckExpression, Arc<Program>)>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            name: String::new(),
            timeout: Duration::ZERO,
            outcome: Outcome::Healthy,
            message: String::new(),
            sleep: Duration::ZERO,
            value: CheckValue::Null,
            items: Vec::new(),
            cel: CelConfig::new(vec![
                VariableDecl::new("value", CheckValue::Int(0)),
                VariableDecl::new("items", CheckValue::list([])),
            ])
            .with_iteration_keys(IterationKeys::new("items", "item")),
            compiled: Vec::new(),
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl platform_health_core::Provider for MockProvider {
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
        debug!(name = self.name(), outcome = ?self.outcome, "mock provider configured");
        Ok(())
    }

    fn apply_spec(&mut self, spec: &BTreeMap<String, serde_json::Value>) -> Result<Vec<String>> {
        let mut unused = Vec::new();
        for (key, value) in spec {
            match key.as_str() {
                "status" => {
                    self.outcome = match value.as_str() {
                        Some("healthy") => Outcome::Healthy,
                        Some("unhealthy") => Outcome::Unhealthy,
                        Some("loop_detected") => Outcome::LoopDetected,
                        other => {
                            return Err(crate::missing_field(
                                KIND,
                                &self.name,
                                &format!("status: unrecognized value {other:?}"),
                            ));
                        }
                    };
                }
                "message" => {
                    self.message = value.as_str().unwrap_or_default().to_string();
                }
                "sleep_ms" => {
                    self.sleep = Duration::from_millis(value.as_u64().unwrap_or(0));
                }
                "value" => {
                    self.value = CheckValue::from(value.clone());
                }
                "items" => {
                    self.items = value
                        .as_array()
                        .cloned()
                        .unwrap_or_default()
                        .into_iter()
                        .map(CheckValue::from)
                        .collect();
                }
                _ => unused.push(key.clone()),
            }
        }
        Ok(unused)
    }

    async fn check(&self, ctx: &ExecutionContext) -> Response {
        if !self.sleep.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(self.sleep) => {}
                _ = ctx.cancelled_or_expired() => {
                    let message = if ctx.deadline_elapsed() { "deadline exceeded" } else { "context canceled" };
                    return Response::unhealthy(KIND, self.name(), [message]);
                }
            }
        }

        if ctx.is_canceled() {
            return Response::unhealthy(KIND, self.name(), ["context canceled"]);
        }

        match self.outcome {
            Outcome::LoopDetected => {
                return Response::loop_detected(KIND, self.name(), self.message.clone());
            }
            Outcome::Unhealthy => {
                let message = if self.message.is_empty() {
                    "mock provider configured unhealthy".to_string()
                } else {
                    self.message.clone()
                };
                return Response::unhealthy(KIND, self.name(), [message]);
            }
            Outcome::Healthy => {}
        }

        if self.compiled.is_empty() {
            return Response::healthy(KIND, self.name());
        }

        let context = self.check_context();
        match evaluate_checks(&self.cel, &self.compiled, &context, ctx.fail_fast()) {
            Ok(failures) if failures.is_empty() => Response::healthy(KIND, self.name()),
            Ok(failures) => Response::unhealthy(KIND, self.name(), failures),
            Err(e) => Response::unhealthy(KIND, self.name(), [e.to_string()]),
        }
    }

    fn as_with_checks(&self) -> Option<&dyn WithChecks> {
        Some(self)
    }

    fn as_with_checks_mut(&mut self) -> Option<&mut dyn WithChecks> {
        Some(self)
    }

    fn as_container(&self) -> Option<&dyn Container> {
        None
    }

    fn as_container_mut(&mut self) -> Option<&mut dyn Container> {
        None
    }
}

impl WithChecks for MockProvider {
    fn check_config(&self) -> &CelConfig {
        &self.cel
    }

    fn check_context(&self) -> CheckContext {
        let mut ctx = CheckContext::new();
        ctx.insert("value".into(), self.value.clone());
        ctx.insert("items".into(), CheckValue::List(self.items.clone()));
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

#[cfg(test)]
mod tests {
    use super::*;
    use platform_health_core::{CheckMode, Parallelism, Provider};

    fn ctx() -> ExecutionContext {
        ExecutionContext::root(Parallelism::Default, false)
    }

    #[tokio::test]
    async fn healthy_status_with_no_checks_passes() {
        let mut provider = MockProvider::new();
        provider.set_name("a".into());
        provider.setup().await.unwrap();
        let response = provider.check(&ctx()).await;
        assert_eq!(response.status, Status::Healthy);
    }

    #[tokio::test]
    async fn unhealthy_status_reports_configured_message() {
        let mut provider = MockProvider::new();
        provider.set_name("a".into());
        let mut spec = BTreeMap::new();
        spec.insert("status".into(), serde_json::json!("unhealthy"));
        spec.insert("message".into(), serde_json::json!("down"));
        provider.apply_spec(&spec).unwrap();
        provider.setup().await.unwrap();
        let response = provider.check(&ctx()).await;
        assert_eq!(response.status, Status::Unhealthy);
        assert!(response.messages.contains(&"down".to_string()));
    }

    #[tokio::test]
    async fn loop_detected_status_is_reported_verbatim() {
        let mut provider = MockProvider::new();
        provider.set_name("a".into());
        let mut spec = BTreeMap::new();
        spec.insert("status".into(), serde_json::json!("loop_detected"));
        provider.apply_spec(&spec).unwrap();
        provider.setup().await.unwrap();
        let response = provider.check(&ctx()).await;
        assert_eq!(response.status, Status::LoopDetected);
    }

    #[tokio::test]
    async fn each_mode_check_fails_on_offending_element() {
        let mut provider = MockProvider::new();
        provider.set_name("items".into());
        let mut spec = BTreeMap::new();
        spec.insert(
            "items".into(),
            serde_json::json!([{"v": 1}, {"v": 2}, {"v": 3}]),
        );
        provider.apply_spec(&spec).unwrap();
        provider.setup().await.unwrap();
        provider
            .set_checks(vec![
                CheckExpression::new("item.v > 1").with_mode(CheckMode::Each)
            ])
            .unwrap();

        let response = provider.check(&ctx()).await;
        assert_eq!(response.status, Status::Unhealthy);
        assert_eq!(response.messages.len(), 1);
    }

    #[tokio::test]
    async fn unused_spec_keys_are_reported() {
        let mut provider = MockProvider::new();
        let mut spec = BTreeMap::new();
        spec.insert("nickname".into(), serde_json::json!("bob"));
        let unused = provider.apply_spec(&spec).unwrap();
        assert_eq!(unused, vec!["nickname".to_string()]);
    }

    /// §8 "Check compilation purity": `setup()` is idempotent, so calling it
    /// twice against unchanged state reproduces the same instance.
    #[tokio::test]
    async fn setup_is_idempotent() {
        let mut provider = MockProvider::new();
        provider.set_name("a".into());
        let mut spec = BTreeMap::new();
        spec.insert("status".into(), serde_json::json!("unhealthy"));
        spec.insert("message".into(), serde_json::json!("down"));
        provider.apply_spec(&spec).unwrap();

        provider.setup().await.unwrap();
        let first = provider.check(&ctx()).await;
        provider.setup().await.unwrap();
        let second = provider.check(&ctx()).await;

        assert_eq!(first, second);
    }

    /// §8 "Cancellation promptness": a check racing a cancelled context
    /// returns promptly with a message carrying the cancellation marker,
    /// rather than running to completion.
    #[tokio::test]
    async fn cancelled_context_is_reported_promptly() {
        let mut provider = MockProvider::new();
        provider.set_name("a".into());
        let mut spec = BTreeMap::new();
        spec.insert("sleep_ms".into(), serde_json::json!(300_000));
        provider.apply_spec(&spec).unwrap();
        provider.setup().await.unwrap();

        let ctx = ExecutionContext::root(Parallelism::Default, false);
        ctx.cancel();
        let response = tokio::time::timeout(Duration::from_secs(5), provider.check(&ctx))
            .await
            .expect("a cancelled context must not be waited out");
        assert_eq!(response.status, Status::Unhealthy);
        assert!(response.messages[0].contains("context canceled"));
    }
}
