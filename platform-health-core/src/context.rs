use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Parallelism policy read from the execution context (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parallelism {
    /// `0` — use the platform's default worker count.
    Default,
    /// `-1` — unbounded, one worker per instance.
    Unbounded,
    /// `n >= 1` — cap concurrent in-flight checks at `n`.
    Bounded(usize),
}

impl Parallelism {
    pub fn from_hint(n: i64) -> Self {
        match n {
            0 => Parallelism::Default,
            n if n < 0 => Parallelism::Unbounded,
            n => Parallelism::Bounded(n as usize),
        }
    }
}

/// The execution context every `check()` call receives (§4.1, §4.4, §5).
///
/// Carries a deadline, a cancellation signal, a fail-fast hint and a
/// parallelism hint. Cloning an `ExecutionContext` is cheap: the
/// cancellation token is reference-counted, and cancelling a parent
/// context's token cancels every context derived from it.
#[derive(Clone)]
pub struct ExecutionContext {
    deadline: Option<Instant>,
    cancel: CancellationToken,
    fail_fast: bool,
    parallelism: Parallelism,
    /// Chain of `"kind/name"` tags for every container currently being
    /// walked on this branch, innermost last. Not part of the external
    /// contract of §4.1 — it exists purely so a container provider can run
    /// the defensive "am I my own ancestor" check §4.4 calls for at
    /// evaluation time, given that this crate's owned-by-value component
    /// tree otherwise can't construct a true reference cycle (see
    /// `platform-health-providers::container` and DESIGN.md).
    ancestors: Vec<String>,
}

impl ExecutionContext {
    pub fn new(parallelism: Parallelism, fail_fast: bool) -> Self {
        Self {
            deadline: None,
            cancel: CancellationToken::new(),
            fail_fast,
            parallelism,
            ancestors: Vec::new(),
        }
    }

    pub fn root(parallelism: Parallelism, fail_fast: bool) -> Self {
        Self::new(parallelism, fail_fast)
    }

    pub fn parallelism(&self) -> Parallelism {
        self.parallelism
    }

    pub fn fail_fast(&self) -> bool {
        self.fail_fast
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// A child cancellation token: cancelling `self` cancels the child, but
    /// cancelling the child alone does not propagate back up. This is what
    /// lets the orchestrator's fail-fast path cancel only the siblings under
    /// one parent (§4.4 "Cancellation and fail-fast").
    pub fn child_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Derive a child context whose deadline is `min(parent_deadline, now +
    /// timeout)` (§4.4 "Per-instance timing", §5 "Timeout semantics"). A
    /// `timeout` of `Duration::ZERO` means "inherit", so the parent deadline
    /// (if any) passes through unchanged.
    pub fn with_instance_timeout(&self, timeout: Duration) -> Self {
        let mut next = self.clone();
        next.cancel = self.cancel.child_token();
        if timeout.is_zero() {
            return next;
        }
        let candidate = Instant::now() + timeout;
        next.deadline = Some(match self.deadline {
            Some(parent) if parent < candidate => parent,
            _ => candidate,
        });
        next
    }

    /// Awaits either cancellation or the deadline elapsing, whichever comes
    /// first. Returns immediately (without waiting) if there is no deadline
    /// and the token is not yet cancelled — callers `select!` this against
    /// the real work.
    pub async fn cancelled_or_expired(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.cancel.cancelled().await,
        }
    }

    /// True once the deadline (if any) has passed.
    pub fn deadline_elapsed(&self) -> bool {
        self.deadline.map(|d| Instant::now() >= d).unwrap_or(false)
    }

    /// Records entry into a container identified by `tag` (conventionally
    /// `"kind/name"`), returning a child context with `tag` appended to the
    /// ancestor chain. `Err(())` means `tag` already appears as an ancestor
    /// on this branch — the caller should report `LOOP_DETECTED` rather than
    /// recurse (§4.4 "Container self-reference / cycle protection").
    pub fn enter_container(&self, tag: impl Into<String>) -> std::result::Result<Self, ()> {
        let tag = tag.into();
        if self.ancestors.iter().any(|a| a == &tag) {
            return Err(());
        }
        let mut next = self.clone();
        next.ancestors.push(tag);
        Ok(next)
    }
}
