//! A minimal real network provider: dials `host:port` with
//! `tokio::net::TcpStream::connect` and reports HEALTHY if the handshake
//! completes. This is the one provider `spec.md` §1 names explicitly as an
//! example external collaborator ("a component implementing the provider
//! contract of §4.1") - kept deliberately thin (no retries, no connection
//! pooling, no TLS) since full network providers remain out of scope.
//!
//! Error classification follows §7 kind 6 ("provider fetch error"):
//! providers are expected to map raw I/O errors to short operator-friendly
//! labels where sensible, falling back to the raw text otherwise.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cel_interpreter::Program;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use platform_health_core::{
    CelConfig, CheckContext, CheckExpression, CheckValue, ExecutionContext, Result, Response,
    Status, VariableDecl, WithChecks, evaluate_checks,
};

pub const KIND: &str = "tcp";

pub struct TcpProvider {
    name: String,
    timeout: Duration,
    host: String,
    port: u16,
    cel: CelConfig,
    compiled: Vec<(CheckExpression, Arc<Program>)>,
}

impl TcpProvider {
    pub fn new() -> Self {
        Self {
            name: String::new(),
            timeout: Duration::ZERO,
            host: String::new(),
            port: 0,
            cel: CelConfig::new(vec![
                VariableDecl::new("connected", CheckValue::Bool(true)),
                VariableDecl::new("host", CheckValue::String(String::new())),
                VariableDecl::new("port", CheckValue::Int(0)),
                VariableDecl::new("duration_ms", CheckValue::Int(0)),
            ]),
            compiled: Vec::new(),
        }
    }

    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Maps a raw `std::io::Error` from the dial attempt to the short,
    /// operator-friendly labels §7 kind 6 asks for; anything unrecognized
    /// passes through as-is.
    fn classify_error(err: &std::io::Error) -> String {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::ConnectionRefused => "connection refused".to_string(),
            ErrorKind::TimedOut => "deadline exceeded".to_string(),
            ErrorKind::AddrNotAvailable => "address not available".to_string(),
            ErrorKind::NotFound => "host not found".to_string(),
            _ => err.to_string(),
        }
    }
}

impl Default for TcpProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl platform_health_core::Provider for TcpProvider {
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

    fn apply_spec(&mut self, spec: &BTreeMap<String, serde_json::Value>) -> Result<Vec<String>> {
        let mut unused = Vec::new();
        for (key, value) in spec {
            match key.as_str() {
                "host" => self.host = value.as_str().unwrap_or_default().to_string(),
                "port" => self.port = value.as_u64().unwrap_or(0) as u16,
                _ => unused.push(key.clone()),
            }
        }
        Ok(unused)
    }

    async fn setup(&mut self) -> Result<()> {
        if self.host.is_empty() {
            return Err(crate::missing_field(KIND, &self.name, "host"));
        }
        if self.port == 0 {
            return Err(crate::missing_field(KIND, &self.name, "port"));
        }
        debug!(name = self.name(), address = %self.address(), "tcp provider configured");
        Ok(())
    }

    async fn check(&self, ctx: &ExecutionContext) -> Response {
        debug!(name = self.name(), address = %self.address(), "tcp dial starting");
        let start = std::time::Instant::now();
        let dial = tokio::select! {
            result = TcpStream::connect(self.address()) => result,
            _ = ctx.cancelled_or_expired() => {
                let message = if ctx.deadline_elapsed() { "deadline exceeded" } else { "context canceled" };
                return Response::unhealthy(KIND, self.name(), [message]);
            }
        };
        let duration_ms = start.elapsed().as_millis() as i64;

        match dial {
            Err(e) => {
                let classified = Self::classify_error(&e);
                warn!(name = self.name(), address = %self.address(), error = %classified, "tcp dial failed");
                Response::unhealthy(KIND, self.name(), [classified])
            }
            Ok(_stream) => {
                debug!(name = self.name(), duration_ms, "tcp dial finished");
                if self.compiled.is_empty() {
                    return Response::healthy(KIND, self.name());
                }
                let mut context = self.check_context();
                context.insert("duration_ms".into(), CheckValue::Int(duration_ms));
                match evaluate_checks(&self.cel, &self.compiled, &context, ctx.fail_fast()) {
                    Ok(failures) if failures.is_empty() => Response::healthy(KIND, self.name()),
                    Ok(failures) => Response::unhealthy(KIND, self.name(), failures),
                    Err(e) => Response::unhealthy(KIND, self.name(), [e.to_string()]),
                }
            }
        }
    }

    fn as_with_checks(&self) -> Option<&dyn WithChecks> {
        Some(self)
    }

    fn as_with_checks_mut(&mut self) -> Option<&mut dyn WithChecks> {
        Some(self)
    }
}

impl WithChecks for TcpProvider {
    fn check_config(&self) -> &CelConfig {
        &self.cel
    }

    fn check_context(&self) -> CheckContext {
        let mut ctx = CheckContext::new();
        ctx.insert("connected".into(), CheckValue::Bool(true));
        ctx.insert("host".into(), CheckValue::String(self.host.clone()));
        ctx.insert("port".into(), CheckValue::Int(self.port as i64));
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
