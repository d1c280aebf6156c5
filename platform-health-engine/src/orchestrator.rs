use std::sync::Arc;
use std::time::Instant;

use platform_health_core::{ExecutionContext, Parallelism, Response, SharedProvider, Status};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Evaluates a set of sibling instances concurrently under one
/// [`ExecutionContext`] and aggregates their statuses (§4.4 "Dispatcher /
/// Orchestrator").
///
/// An `Orchestrator` is stateless and cheap to construct; each call to
/// [`Orchestrator::evaluate`] owns a fresh [`Semaphore`] scoped to the
/// siblings passed into that call. This is what makes the "parallelism
/// bound applies to leaf evaluations, not to recursion depth" requirement
/// (§4.4) hold without any special-casing: a container provider's own
/// `check()` recurses by calling `Orchestrator::evaluate` again for its own
/// children, which acquires permits from a brand new semaphore rather than
/// contending with the permit its own sibling slot is holding. A
/// parallelism cap of 1 at the root therefore never deadlocks against a
/// container three levels deep (§8 scenario 5).
#[derive(Debug, Default, Clone, Copy)]
pub struct Orchestrator;

impl Orchestrator {
    pub fn new() -> Self {
        Self
    }

    /// Runs every instance in `instances` concurrently, respecting
    /// `ctx`'s parallelism bound, deadline, cancellation and fail-fast
    /// settings, and returns one [`Response`] per instance (order not
    /// guaranteed, per §4.4) plus the aggregated status.
    pub async fn evaluate(
        &self,
        instances: &[SharedProvider],
        ctx: &ExecutionContext,
    ) -> (Vec<Response>, Status) {
        if instances.is_empty() {
            return (Vec::new(), Status::Healthy);
        }

        let permits = match ctx.parallelism() {
            Parallelism::Default => default_worker_count(),
            Parallelism::Unbounded => instances.len(),
            Parallelism::Bounded(n) => n,
        };
        let semaphore = Arc::new(Semaphore::new(permits.max(1)));

        let mut handles = Vec::with_capacity(instances.len());
        for instance in instances {
            let instance = instance.clone();
            let worker_ctx = ctx.clone();
            let semaphore = semaphore.clone();
            handles.push(tokio::spawn(async move {
                run_one(instance, worker_ctx, semaphore).await
            }));
        }

        let mut responses = Vec::with_capacity(handles.len());
        for handle in handles {
            let response = match handle.await {
                Ok(response) => response,
                Err(join_err) => {
                    warn!(error = %join_err, "health check worker panicked");
                    Response::unhealthy(
                        "worker",
                        "unknown",
                        [format!("worker panicked: {join_err}")],
                    )
                }
            };
            responses.push(response);
        }

        let status = Status::aggregate(responses.iter().map(|r| r.status));
        (responses, status)
    }
}

async fn run_one(
    instance: SharedProvider,
    ctx: ExecutionContext,
    semaphore: Arc<Semaphore>,
) -> Response {
    let permit = tokio::select! {
        permit = semaphore.acquire_owned() => permit.ok(),
        _ = ctx.cancelled_or_expired() => None,
    };
    let Some(permit) = permit else {
        return cancellation_response(&instance, &ctx);
    };

    let child_ctx = ctx.with_instance_timeout(instance.timeout());
    debug!(kind = instance.kind(), name = instance.name(), "check starting");

    let start = Instant::now();
    let response = tokio::select! {
        response = instance.check(&child_ctx) => response,
        _ = child_ctx.cancelled_or_expired() => cancellation_response(&instance, &child_ctx),
    };
    let duration = start.elapsed();
    drop(permit);

    let response = response.with_duration(duration);
    debug!(
        kind = instance.kind(),
        name = instance.name(),
        status = %response.status,
        "check finished"
    );

    if ctx.fail_fast() && !response.is_success() {
        ctx.cancel();
    }
    response
}

fn cancellation_response(instance: &SharedProvider, ctx: &ExecutionContext) -> Response {
    let message = if ctx.deadline_elapsed() {
        "deadline exceeded"
    } else {
        "context canceled"
    };
    Response::unhealthy(instance.kind(), instance.name(), [message])
}

/// The platform's default worker count when the caller passes parallelism
/// `0` (§4.4). Falls back to `4` if the platform cannot report its
/// parallelism.
fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use platform_health_core::Provider;
    use std::time::Duration;

    struct Leaf {
        name: String,
        status: Status,
        sleep: Duration,
        message: String,
    }

    impl Leaf {
        fn healthy(name: &str) -> Self {
            Self {
                name: name.into(),
                status: Status::Healthy,
                sleep: Duration::ZERO,
                message: String::new(),
            }
        }

        fn unhealthy(name: &str, message: &str) -> Self {
            Self {
                name: name.into(),
                status: Status::Unhealthy,
                sleep: Duration::ZERO,
                message: message.into(),
            }
        }

        fn loop_detected(name: &str) -> Self {
            Self {
                name: name.into(),
                status: Status::LoopDetected,
                sleep: Duration::ZERO,
                message: "cycle detected".into(),
            }
        }

        fn sleeping(name: &str, sleep: Duration) -> Self {
            Self {
                name: name.into(),
                status: Status::Healthy,
                sleep,
                message: String::new(),
            }
        }
    }

    #[async_trait]
    impl Provider for Leaf {
        fn kind(&self) -> &str {
            "leaf"
        }
        fn name(&self) -> &str {
            &self.name
        }
        fn set_name(&mut self, name: String) {
            self.name = name;
        }
        fn timeout(&self) -> Duration {
            Duration::ZERO
        }
        fn set_timeout(&mut self, _timeout: Duration) {}
        async fn setup(&mut self) -> platform_health_core::Result<()> {
            Ok(())
        }
        async fn check(&self, ctx: &ExecutionContext) -> Response {
            if !self.sleep.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.sleep) => {}
                    _ = ctx.cancelled_or_expired() => {
                        return Response::unhealthy(self.kind(), self.name(), ["deadline exceeded"]);
                    }
                }
            }
            match self.status {
                Status::Healthy => Response::healthy(self.kind(), self.name()),
                Status::LoopDetected => {
                    Response::loop_detected(self.kind(), self.name(), self.message.clone())
                }
                _ => Response::unhealthy(self.kind(), self.name(), [self.message.clone()]),
            }
        }
    }

    fn shared(provider: Leaf) -> SharedProvider {
        Arc::new(provider)
    }

    #[tokio::test]
    async fn all_healthy_leaves_aggregate_healthy() {
        let instances = vec![shared(Leaf::healthy("a")), shared(Leaf::healthy("b"))];
        let ctx = ExecutionContext::root(Parallelism::Default, false);
        let (responses, status) = Orchestrator::new().evaluate(&instances, &ctx).await;
        assert_eq!(status, Status::Healthy);
        assert_eq!(responses.len(), 2);
    }

    #[tokio::test]
    async fn one_unhealthy_leaf_degrades_aggregate() {
        use pretty_assertions::assert_eq;

        let instances = vec![
            shared(Leaf::healthy("a")),
            shared(Leaf::unhealthy("b", "down")),
        ];
        let ctx = ExecutionContext::root(Parallelism::Default, false);
        let (responses, status) = Orchestrator::new().evaluate(&instances, &ctx).await;
        assert_eq!(status, Status::Unhealthy);
        let unhealthy = responses.iter().find(|r| r.name == "b").unwrap();
        assert_eq!(unhealthy.messages, vec!["down".to_string()]);
    }

    #[rstest::rstest]
    #[case::healthy(Status::Healthy)]
    #[case::unhealthy(Status::Unhealthy)]
    #[case::loop_detected(Status::LoopDetected)]
    #[tokio::test]
    async fn a_lone_instance_reports_its_own_status_unchanged(#[case] status: Status) {
        let leaf = match status {
            Status::Healthy => Leaf::healthy("a"),
            Status::LoopDetected => Leaf::loop_detected("a"),
            _ => Leaf::unhealthy("a", "down"),
        };
        let ctx = ExecutionContext::root(Parallelism::Default, false);
        let (_, aggregate) = Orchestrator::new().evaluate(&[shared(leaf)], &ctx).await;
        assert_eq!(aggregate, status);
    }

    #[test]
    fn semaphore_blocks_second_acquire_until_first_releases() {
        use tokio_test::{assert_pending, assert_ready};

        let semaphore = Arc::new(Semaphore::new(1));
        let permit = semaphore.clone().try_acquire_owned().unwrap();

        let waiter = semaphore.clone();
        let mut task = tokio_test::task::spawn(async move { waiter.acquire_owned().await });
        assert_pending!(task.poll());

        drop(permit);
        assert_ready!(task.poll()).expect("permit becomes available once released");
    }

    #[tokio::test]
    async fn loop_detected_wins_regardless_of_position() {
        let first = vec![
            shared(Leaf::loop_detected("a")),
            shared(Leaf::healthy("b")),
            shared(Leaf::unhealthy("c", "down")),
        ];
        let last = vec![
            shared(Leaf::healthy("b")),
            shared(Leaf::unhealthy("c", "down")),
            shared(Leaf::loop_detected("a")),
        ];
        let ctx = ExecutionContext::root(Parallelism::Default, false);
        let (_, first_status) = Orchestrator::new().evaluate(&first, &ctx).await;
        let (_, last_status) = Orchestrator::new().evaluate(&last, &ctx).await;
        assert_eq!(first_status, Status::LoopDetected);
        assert_eq!(last_status, Status::LoopDetected);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_timeout_degrades_to_unhealthy() {
        let instances = vec![shared(Leaf::sleeping("a", Duration::from_secs(300)))];
        let ctx = ExecutionContext::root(Parallelism::Default, false)
            .with_instance_timeout(Duration::from_secs(1));
        let (responses, status) = Orchestrator::new().evaluate(&instances, &ctx).await;
        assert_eq!(status, Status::Unhealthy);
        assert!(responses[0].messages[0].contains("deadline exceeded"));
    }

    #[tokio::test]
    async fn parallelism_one_does_not_deadlock_nested_containers() {
        // Simulates §8 scenario 5 without a real container provider: the
        // "outer" evaluate call holds a single permit for the one instance,
        // while that instance's own check() recurses into a second
        // Orchestrator::evaluate call (a fresh semaphore) for its three
        // children.
        struct Outer {
            name: String,
            children: Vec<SharedProvider>,
        }

        #[async_trait]
        impl Provider for Outer {
            fn kind(&self) -> &str {
                "container"
            }
            fn name(&self) -> &str {
                &self.name
            }
            fn set_name(&mut self, name: String) {
                self.name = name;
            }
            fn timeout(&self) -> Duration {
                Duration::ZERO
            }
            fn set_timeout(&mut self, _timeout: Duration) {}
            async fn setup(&mut self) -> platform_health_core::Result<()> {
                Ok(())
            }
            async fn check(&self, ctx: &ExecutionContext) -> Response {
                let nested_ctx =
                    ExecutionContext::root(Parallelism::Bounded(1), ctx.fail_fast());
                let (children, status) =
                    Orchestrator::new().evaluate(&self.children, &nested_ctx).await;
                Response::new(self.kind(), self.name(), status).with_children(children)
            }
        }

        let outer = Outer {
            name: "group".into(),
            children: vec![
                shared(Leaf::healthy("x")),
                shared(Leaf::healthy("y")),
                shared(Leaf::unhealthy("z", "down")),
            ],
        };
        let instances: Vec<SharedProvider> = vec![Arc::new(outer)];
        let ctx = ExecutionContext::root(Parallelism::Bounded(1), false);

        let evaluation = Orchestrator::new().evaluate(&instances, &ctx);
        let (responses, status) =
            tokio::time::timeout(Duration::from_secs(5), evaluation)
                .await
                .expect("evaluation must not deadlock");
        assert_eq!(status, Status::Unhealthy);
        assert_eq!(responses[0].children.len(), 3);
    }

    /// §4.4 "Cancellation and fail-fast": once one sibling fails under a
    /// fail-fast context, the others must observe cancellation promptly
    /// rather than run to completion.
    #[tokio::test]
    async fn fail_fast_cancels_siblings_after_first_failure() {
        let instances = vec![
            shared(Leaf::unhealthy("a", "down")),
            shared(Leaf::sleeping("b", Duration::from_secs(300))),
        ];
        let ctx = ExecutionContext::root(Parallelism::Default, true);

        let evaluation = Orchestrator::new().evaluate(&instances, &ctx);
        let (responses, status) = tokio::time::timeout(Duration::from_secs(5), evaluation)
            .await
            .expect("fail_fast must cancel the sleeping sibling promptly, not wait it out");
        assert_eq!(status, Status::Unhealthy);

        let sleeping = responses.iter().find(|r| r.name == "b").unwrap();
        assert!(
            sleeping.messages.iter().any(|m| m.contains("deadline exceeded")
                || m.contains("context canceled")),
            "expected a cancellation message, got {:?}",
            sleeping.messages
        );
    }

    /// §8 "Parallelism safety": a tree with nested containers aggregates to
    /// the same status no matter what parallelism the root evaluation uses.
    #[rstest::rstest]
    #[case::bounded_one(Parallelism::Bounded(1))]
    #[case::default(Parallelism::Default)]
    #[case::unbounded(Parallelism::Unbounded)]
    #[tokio::test]
    async fn aggregate_status_is_independent_of_parallelism(#[case] parallelism: Parallelism) {
        struct Outer {
            name: String,
            children: Vec<SharedProvider>,
        }

        #[async_trait]
        impl Provider for Outer {
            fn kind(&self) -> &str {
                "container"
            }
            fn name(&self) -> &str {
                &self.name
            }
            fn set_name(&mut self, name: String) {
                self.name = name;
            }
            fn timeout(&self) -> Duration {
                Duration::ZERO
            }
            fn set_timeout(&mut self, _timeout: Duration) {}
            async fn setup(&mut self) -> platform_health_core::Result<()> {
                Ok(())
            }
            async fn check(&self, ctx: &ExecutionContext) -> Response {
                let nested_ctx =
                    ExecutionContext::root(Parallelism::Bounded(1), ctx.fail_fast());
                let (children, status) =
                    Orchestrator::new().evaluate(&self.children, &nested_ctx).await;
                Response::new(self.kind(), self.name(), status).with_children(children)
            }
        }

        let outer = Outer {
            name: "outer".into(),
            children: vec![
                shared(Leaf::healthy("x")),
                shared(Leaf::healthy("y")),
                shared(Leaf::unhealthy("z", "down")),
            ],
        };
        let instances: Vec<SharedProvider> = vec![shared(outer), shared(Leaf::healthy("w"))];
        let ctx = ExecutionContext::root(parallelism, false);

        let evaluation = Orchestrator::new().evaluate(&instances, &ctx);
        let (_, status) = tokio::time::timeout(Duration::from_secs(5), evaluation)
            .await
            .expect("evaluation must not deadlock");
        assert_eq!(status, Status::Unhealthy);
    }
}
