use std::sync::Arc;

use cel_interpreter::{Program, Value as CelValue};
use dashmap::DashMap;

use crate::cel_bridge::{build_context, cel_to_check_value};
use crate::check::{CheckExpression, CheckMode};
use crate::error::{HealthError, Result};
use crate::value::{CheckContext, CheckValue};

/// A declared variable a provider exposes to its CEL environment, paired
/// with a representative sample value.
///
/// `cel_interpreter` is dynamically typed: there is no separate static
/// type-checking pass independent of evaluation. §4.3's "variable
/// declarations (names + types)" is therefore implemented here as
/// name + sample-value pairs, and config-time "verify boolean output"
/// (§4.3 "Config-time validation") is done by evaluating the candidate
/// expression against a context built from these samples. See DESIGN.md.
#[derive(Debug, Clone)]
pub struct VariableDecl {
    pub name: String,
    pub sample: CheckValue,
}

impl VariableDecl {
    pub fn new(name: impl Into<String>, sample: impl Into<CheckValue>) -> Self {
        Self {
            name: name.into(),
            sample: sample.into(),
        }
    }
}

/// `(many_key, single_key)` from §3/§4.3: the collection variable and the
/// per-element variable a provider exposes for *each*-mode checks.
#[derive(Debug, Clone)]
pub struct IterationKeys {
    pub many_key: String,
    pub single_key: String,
}

impl IterationKeys {
    pub fn new(many_key: impl Into<String>, single_key: impl Into<String>) -> Self {
        Self {
            many_key: many_key.into(),
            single_key: single_key.into(),
        }
    }
}

/// The outcome of evaluating one [`CheckExpression`] against one context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Pass,
    Fail(String),
}

impl CheckOutcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, CheckOutcome::Pass)
    }
}

/// Per-provider CEL configuration (§3 "CELProgram", §4.3).
///
/// Owns the declared variable environment, the optional iteration keys, and
/// a compiled-AST cache keyed by expression source string. The cache is a
/// `DashMap`, which gives lock-free reads on the common path and safe
/// concurrent inserts (§5 "Shared resources").
pub struct CelConfig {
    variables: Vec<VariableDecl>,
    iteration: Option<IterationKeys>,
    cache: DashMap<String, Arc<Program>>,
}

impl CelConfig {
    pub fn new(variables: Vec<VariableDecl>) -> Self {
        Self {
            variables,
            iteration: None,
            cache: DashMap::new(),
        }
    }

    pub fn with_iteration_keys(mut self, keys: IterationKeys) -> Self {
        self.iteration = Some(keys);
        self
    }

    pub fn iteration_keys(&self) -> Option<&IterationKeys> {
        self.iteration.as_ref()
    }

    pub fn supports_each_mode(&self) -> bool {
        self.iteration.is_some()
    }

    /// Rejects *each*-mode expressions when the provider declares no
    /// iteration keys (§3 invariant, §8 "Iteration-mode coupling").
    pub fn validate_mode(&self, check: &CheckExpression) -> Result<()> {
        if check.mode == CheckMode::Each && !self.supports_each_mode() {
            return Err(HealthError::Configuration {
                kind: "checks".into(),
                name: check.expression.clone(),
                detail: "mode \"each\" is not supported: provider declares no iteration keys"
                    .into(),
            });
        }
        Ok(())
    }

    fn sample_context(&self) -> CheckContext {
        self.variables
            .iter()
            .map(|v| (v.name.clone(), v.sample.clone()))
            .collect()
    }

    /// Compiles `expression`, caching the AST by source string, and verifies
    /// it produces a boolean when evaluated against the declared variable
    /// samples (§4.3 "compile"). A cache hit skips compilation entirely.
    pub fn compile(&self, expression: &str) -> Result<Arc<Program>> {
        if let Some(cached) = self.cache.get(expression) {
            return Ok(cached.clone());
        }
        let program = Program::compile(expression)
            .map_err(|e| HealthError::Compile(format!("{expression}: {e}")))?;

        let sample = self.sample_context();
        let refs: Vec<(&str, &CheckValue)> =
            sample.iter().map(|(k, v)| (k.as_str(), v)).collect();
        let ctx = build_context(refs);
        match program.execute(&ctx) {
            Ok(CelValue::Bool(_)) => {}
            Ok(other) => {
                return Err(HealthError::Compile(format!(
                    "{expression}: must produce a boolean, got {other:?}"
                )));
            }
            // A runtime error against the *sample* context (e.g. a missing
            // nested field the sample didn't shape) does not prove the
            // expression is malformed - only that our dummy data didn't
            // match. We accept the expression here and let a genuine
            // mismatch surface as an evaluation error at real check time.
            Err(_) => {}
        }

        let program = Arc::new(program);
        self.cache
            .insert(expression.to_string(), program.clone());
        Ok(program)
    }

    /// Bulk version of [`Self::compile`]; a failure is wrapped with the
    /// offending index (§4.3 "compile_all").
    pub fn compile_all(
        &self,
        checks: &[CheckExpression],
    ) -> Result<Vec<(CheckExpression, Arc<Program>)>> {
        checks
            .iter()
            .enumerate()
            .map(|(index, check)| {
                self.validate_mode(check)?;
                let program = self.compile(&check.expression).map_err(|e| {
                    HealthError::Compile(format!("checks[{index}]: {e}"))
                })?;
                Ok((check.clone(), program))
            })
            .collect()
    }

    /// Evaluates a single compiled program against a context, producing a
    /// pass/fail outcome (§4.3 "evaluate", §7 kind 5 "Check failure").
    /// Evaluation errors (missing field, type mismatch) are returned as
    /// `Err`, distinct from an ordinary `false` result (§7 kind 4).
    pub fn evaluate(
        &self,
        check: &CheckExpression,
        program: &Program,
        context: &CheckContext,
    ) -> Result<CheckOutcome> {
        let refs: Vec<(&str, &CheckValue)> =
            context.iter().map(|(k, v)| (k.as_str(), v)).collect();
        let ctx = build_context(refs);
        let value = program
            .execute(&ctx)
            .map_err(|e| HealthError::Evaluation(format!("{}: {e}", check.expression)))?;
        match value {
            CelValue::Bool(true) => Ok(CheckOutcome::Pass),
            CelValue::Bool(false) => Ok(CheckOutcome::Fail(check.failure_message())),
            other => Err(HealthError::Evaluation(format!(
                "{}: expected boolean, got {other:?}",
                check.expression
            ))),
        }
    }

    /// Runs an expression for inspection, with no boolean constraint,
    /// returning a normalized value (§4.3 "evaluate_any", §8 "CEL
    /// round-trip"). The expression is compiled through the same cache as
    /// checks, so repeated inspection of the same source string is cheap.
    pub fn evaluate_any(&self, expression: &str, context: &CheckContext) -> Result<CheckValue> {
        let cached = self.cache.get(expression).map(|p| p.clone());
        let program = match cached {
            Some(p) => p,
            None => {
                let compiled = Program::compile(expression)
                    .map_err(|e| HealthError::Compile(format!("{expression}: {e}")))?;
                let compiled = Arc::new(compiled);
                self.cache
                    .insert(expression.to_string(), compiled.clone());
                compiled
            }
        };
        let refs: Vec<(&str, &CheckValue)> =
            context.iter().map(|(k, v)| (k.as_str(), v)).collect();
        let ctx = build_context(refs);
        let value = program
            .execute(&ctx)
            .map_err(|e| HealthError::Evaluation(format!("{expression}: {e}")))?;
        Ok(cel_to_check_value(value))
    }

    /// *each*-mode evaluation (§4.3 "evaluate_each"): if `context[many_key]`
    /// is a sequence, evaluate once per element bound to `single_key`;
    /// otherwise evaluate once over the full context, matching §4.3's
    /// documented fallback. Failures are wrapped with the offending index.
    pub fn evaluate_each(
        &self,
        check: &CheckExpression,
        program: &Program,
        context: &CheckContext,
    ) -> Result<Vec<CheckOutcome>> {
        let keys = self
            .iteration
            .as_ref()
            .ok_or_else(|| HealthError::Internal("each-mode check with no iteration keys".into()))?;

        let elements = context.get(&keys.many_key).and_then(CheckValue::as_list);

        match elements {
            Some(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    let mut element_ctx = CheckContext::new();
                    element_ctx.insert(keys.single_key.clone(), item.clone());
                    self.evaluate(check, program, &element_ctx).map_err(|e| {
                        HealthError::Evaluation(format!("{}[{index}]: {e}", keys.many_key))
                    })
                })
                .collect(),
            None => Ok(vec![self.evaluate(check, program, context)?]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cel() -> CelConfig {
        CelConfig::new(vec![
            VariableDecl::new("x", CheckValue::Int(0)),
            VariableDecl::new("name", CheckValue::String(String::new())),
        ])
    }

    #[test]
    fn compile_rejects_non_boolean_expressions() {
        let cel = cel();
        let err = cel.compile("x + 1").unwrap_err();
        assert!(matches!(err, HealthError::Compile(_)));
    }

    #[test]
    fn compile_caches_by_source_string() {
        let cel = cel();
        let first = cel.compile("x > 0").unwrap();
        let second = cel.compile("x > 0").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn evaluate_passes_and_fails_as_expected() {
        let cel = cel();
        let check = CheckExpression::new("x > 0").with_message("x must be positive");
        let program = cel.compile(&check.expression).unwrap();

        let mut ok_ctx = CheckContext::new();
        ok_ctx.insert("x".into(), CheckValue::Int(1));
        assert_eq!(
            cel.evaluate(&check, &program, &ok_ctx).unwrap(),
            CheckOutcome::Pass
        );

        let mut fail_ctx = CheckContext::new();
        fail_ctx.insert("x".into(), CheckValue::Int(-1));
        assert_eq!(
            cel.evaluate(&check, &program, &fail_ctx).unwrap(),
            CheckOutcome::Fail("x must be positive".into())
        );
    }

    #[test]
    fn evaluate_each_mode_runs_once_per_element() {
        let cel = CelConfig::new(vec![]).with_iteration_keys(IterationKeys::new("items", "item"));
        let check = CheckExpression::new("item.v > 1").with_mode(CheckMode::Each);
        cel.validate_mode(&check).unwrap();

        let items = CheckValue::list([
            CheckValue::map([("v".to_string(), CheckValue::Int(1))]),
            CheckValue::map([("v".to_string(), CheckValue::Int(2))]),
            CheckValue::map([("v".to_string(), CheckValue::Int(3))]),
        ]);
        let mut ctx = CheckContext::new();
        ctx.insert("items".into(), items);

        // Compile against a sample where `item` is a single element, which
        // is what the provider would declare via `with_iteration_keys`
        // samples in real usage; here we compile directly since this
        // provider declares no variables.
        let program = Program::compile(&check.expression).unwrap();
        let outcomes = cel.evaluate_each(&check, &program, &ctx).unwrap();
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0], CheckOutcome::Fail(check.failure_message()));
        assert!(outcomes[1].is_pass());
        assert!(outcomes[2].is_pass());
    }

    #[test]
    fn each_mode_without_iteration_keys_is_rejected_at_validate() {
        let cel = cel();
        let check = CheckExpression::new("true").with_mode(CheckMode::Each);
        assert!(cel.validate_mode(&check).is_err());
    }

    #[test]
    fn evaluate_any_normalizes_nested_values() {
        let cel = cel();
        let mut ctx = CheckContext::new();
        ctx.insert(
            "name".into(),
            CheckValue::map([("inner".to_string(), CheckValue::Int(42))]),
        );
        let value = cel.evaluate_any("name", &ctx).unwrap();
        assert_eq!(
            value,
            CheckValue::map([("inner".to_string(), CheckValue::Int(42))])
        );
    }
}
