use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cel_interpreter::Program;

use crate::cel::{CelConfig, CheckOutcome};
use crate::check::{CheckExpression, CheckMode};
use crate::config::ComponentConfig;
use crate::context::ExecutionContext;
use crate::error::{ComponentError, Result};
use crate::factory::Factory;
use crate::response::Response;
use crate::value::CheckContext;

/// The provider contract every instance implements (§4.1).
///
/// Capability interfaces ("With-Checks", "Container") are advertised by
/// structural conformance in the source design; in Rust that becomes a pair
/// of down-casting accessors rather than a marker trait, since a `dyn
/// Provider` cannot itself also be a `dyn WithChecks` without knowing the
/// concrete type. A provider that supports a capability overrides the
/// matching accessor; the default is "no capability".
#[async_trait]
pub trait Provider: Send + Sync {
    fn kind(&self) -> &str;
    fn name(&self) -> &str;
    fn set_name(&mut self, name: String);

    /// `Duration::ZERO` means "inherit the caller's deadline" (§3).
    fn timeout(&self) -> Duration;
    fn set_timeout(&mut self, timeout: Duration);

    /// Applies defaults, validates mandatory fields, compiles any owned CEL
    /// expressions, resolves children for containers. Must be idempotent:
    /// calling it again with unchanged state reproduces the same instance
    /// (§8 "Check compilation purity").
    async fn setup(&mut self) -> Result<()>;

    /// Reflective spec decoding (§4.2 step 2) has no Rust equivalent over an
    /// arbitrary `dyn Provider`, so each concrete provider implements its own
    /// decode: consume the keys it recognizes, return the rest so the
    /// factory can turn them into unused-key warnings. Return `Err` only for
    /// a missing mandatory field. The default accepts no keys at all, which
    /// is correct for providers with no spec fields.
    fn apply_spec(&mut self, spec: &BTreeMap<String, serde_json::Value>) -> Result<Vec<String>> {
        Ok(spec.keys().cloned().collect())
    }

    /// Performs one evaluation. Must observe `ctx` cancellation promptly
    /// (§5 "Cancellation semantics") rather than run to completion after the
    /// context has been cancelled.
    async fn check(&self, ctx: &ExecutionContext) -> Response;

    fn as_with_checks(&self) -> Option<&dyn WithChecks> {
        None
    }

    fn as_with_checks_mut(&mut self) -> Option<&mut dyn WithChecks> {
        None
    }

    fn as_container(&self) -> Option<&dyn Container> {
        None
    }

    fn as_container_mut(&mut self) -> Option<&mut dyn Container> {
        None
    }
}

pub type BoxProvider = Box<dyn Provider>;

/// A provider frozen after `setup`, shared read-only between the
/// orchestrator's worker tasks. The factory and `setup` need `&mut self`
/// exclusivity to build an instance; spawning a worker per sibling needs
/// `'static` ownership that outlives the borrow of any single stack frame.
/// `Arc<dyn Provider>` satisfies both: build mutably through [`BoxProvider`],
/// then freeze into a `SharedProvider` once via `Arc::from` before handing
/// it to a container or the orchestrator.
pub type SharedProvider = Arc<dyn Provider>;

/// Capability for providers that assert CEL expressions against fetched data
/// (§4.1 "With-Checks").
pub trait WithChecks: Send + Sync {
    /// The CEL environment (declared variables, iteration keys) this
    /// provider exposes to its expressions.
    fn check_config(&self) -> &CelConfig;

    /// Builds the variable mapping a `check()` call asserts against.
    /// Providers that fetch data populate this from the fetch result;
    /// providers with nothing to fetch may return an empty context.
    fn check_context(&self) -> CheckContext;

    /// Replaces the check list, compiling and validating every expression
    /// (including the *each*-mode/iteration-key coupling of §8) up front so
    /// a bad expression fails at configuration time, not at `check()` time.
    fn set_checks(&mut self, checks: Vec<CheckExpression>) -> Result<()>;

    fn checks(&self) -> &[(CheckExpression, Arc<Program>)];
}

/// Capability for providers that own nested child instances (§4.1
/// "Container").
#[async_trait]
pub trait Container: Send + Sync {
    /// Stores raw child configuration for later resolution; does not
    /// construct instances itself (§4.1).
    fn set_components(&mut self, raw: BTreeMap<String, ComponentConfig>);

    /// Converts the stored raw child map into instances via `factory`,
    /// collecting a [`ComponentError`] per child that fails to construct
    /// without aborting resolution of the remaining children (§4.1, §7
    /// kind 1). `depth` is this container's nesting depth below the
    /// configuration root, threaded through to [`Factory::build`] so
    /// pathologically deep nesting is rejected as a configuration error
    /// rather than overflowing the stack (§4.4 "Container self-reference /
    /// cycle protection"; see DESIGN.md for why a depth bound stands in for
    /// cycle detection here).
    async fn resolve_components(&mut self, factory: &Factory, depth: usize) -> Result<()>;

    fn components(&self) -> &[SharedProvider];
    fn component_errors(&self) -> &[ComponentError];
}

/// Runs a provider's compiled check list against one context, in declaration
/// order, collecting failure messages (§4.4 "Check evaluation within a
/// provider"). With `fail_fast` set, returns as soon as the first failure (or
/// the first evaluation error) is observed; siblings of that expression are
/// skipped, matching the orchestrator-level fail-fast contract at the
/// expression level.
pub fn evaluate_checks(
    cel: &CelConfig,
    compiled: &[(CheckExpression, Arc<Program>)],
    context: &CheckContext,
    fail_fast: bool,
) -> Result<Vec<String>> {
    let mut failures = Vec::new();
    for (check, program) in compiled {
        let outcomes = match check.mode {
            CheckMode::Default => vec![cel.evaluate(check, program, context)?],
            CheckMode::Each => cel.evaluate_each(check, program, context)?,
        };
        for outcome in outcomes {
            if let CheckOutcome::Fail(message) = outcome {
                failures.push(message);
                if fail_fast {
                    return Ok(failures);
                }
            }
        }
    }
    Ok(failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cel::VariableDecl;
    use crate::value::CheckValue;

    #[test]
    fn evaluate_checks_collects_all_failures_without_fail_fast() {
        let cel = CelConfig::new(vec![VariableDecl::new("x", CheckValue::Int(0))]);
        let checks = vec![
            CheckExpression::new("x > 0").with_message("must be positive"),
            CheckExpression::new("x < 10").with_message("must be small"),
        ];
        let compiled = cel.compile_all(&checks).unwrap();

        let mut ctx = CheckContext::new();
        ctx.insert("x".into(), CheckValue::Int(-5));
        let failures = evaluate_checks(&cel, &compiled, &ctx, false).unwrap();
        assert_eq!(failures, vec!["must be positive".to_string()]);
    }

    #[test]
    fn fail_fast_stops_at_first_failing_expression() {
        let cel = CelConfig::new(vec![VariableDecl::new("x", CheckValue::Int(0))]);
        let checks = vec![
            CheckExpression::new("x > 100").with_message("first"),
            CheckExpression::new("x > 100").with_message("second"),
        ];
        let compiled = cel.compile_all(&checks).unwrap();

        let mut ctx = CheckContext::new();
        ctx.insert("x".into(), CheckValue::Int(1));
        let failures = evaluate_checks(&cel, &compiled, &ctx, true).unwrap();
        assert_eq!(failures, vec!["first".to_string()]);
    }
}
