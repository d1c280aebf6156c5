//! Runnable entry point for the platform health engine.
//!
//! `spec.md` §1 scopes CLI flag parsing and configuration-file loading out
//! of this repository's core; this binary is deliberately not a CLI. It
//! exists to give the engine a place to wire up process-level logging
//! (matching the teacher's `tracing-subscriber` init pattern) and to prove
//! the exit-code convention of §6 end to end: it builds a small in-process
//! configuration, runs the orchestrator once, prints the resulting response
//! tree, and exits with the code the aggregate status implies.

use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use platform_health_core::{
    ExecutionContext, Factory, Parallelism, RootConfig, SharedProvider, parse_root_json,
};
use platform_health_engine::Orchestrator;

/// A small in-process configuration mixing a healthy `tcp` leaf, an
/// `unhealthy` `mock` leaf, and a `container` whose own CEL check asserts
/// it has at least one child - enough to exercise every module this crate
/// wires together without any external network dependency beyond `tcp`'s
/// dial against a loopback listener this binary stands up itself.
const DEMO_CONFIG: &str = r#"
{
  "components": {
    "loopback": { "kind": "tcp", "spec": { "host": "127.0.0.1", "port": 0 } },
    "always_unhealthy": {
      "kind": "mock",
      "spec": { "status": "unhealthy", "message": "demo leaf configured unhealthy" }
    },
    "group": {
      "kind": "container",
      "checks": ["child_count > 0"],
      "components": {
        "member": { "kind": "mock", "spec": { "status": "healthy" } }
      }
    }
  }
}
"#;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "platform_health_lab=info,platform_health_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        service = "platform-health-lab",
        version = env!("CARGO_PKG_VERSION"),
        "starting demo health-check run"
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .context("binding the demo loopback listener")?;
    let port = listener.local_addr()?.port();
    tokio::spawn(async move {
        loop {
            if listener.accept().await.is_err() {
                break;
            }
        }
    });
    let config_json = DEMO_CONFIG.replacen("\"port\": 0", &format!("\"port\": {port}"), 1);

    let registry = platform_health_providers::default_registry()
        .context("registering built-in provider kinds")?;
    let factory = Factory::new(registry);

    let root: RootConfig = parse_root_json(&config_json).context("parsing demo configuration")?;
    let mut instances: Vec<SharedProvider> = Vec::with_capacity(root.components.len());
    for (name, component) in &root.components {
        let (instance, warnings) = factory
            .build(name, component)
            .await
            .with_context(|| format!("building component '{name}'"))?;
        for warning in &warnings {
            tracing::warn!(%warning, "unused configuration key");
        }
        instances.push(SharedProvider::from(instance));
    }

    let ctx = ExecutionContext::root(Parallelism::Default, false);
    let (responses, status) = Orchestrator::new().evaluate(&instances, &ctx).await;

    for response in &responses {
        print_response(response, 0);
    }
    info!(status = %status, "demo health-check run complete");

    Ok(if status.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_response(response: &platform_health_core::Response, depth: usize) {
    let indent = "  ".repeat(depth);
    println!(
        "{indent}{} [{}] {} ({:?}){}",
        response.name,
        response.kind,
        response.status,
        response.duration,
        if response.messages.is_empty() {
            String::new()
        } else {
            format!(" - {}", response.messages.join("; "))
        }
    );
    for child in &response.children {
        print_response(child, depth + 1);
    }
}
