use thiserror::Error;

/// Errors produced while building or evaluating the health-check tree.
///
/// Variants follow the seven error kinds named in the design: configuration
/// errors are fatal during factory construction, everything else surfaces as
/// an `UNHEALTHY` leaf rather than aborting the run.
#[derive(Error, Debug)]
pub enum HealthError {
    #[error("configuration error in '{name}' ({kind}): {detail}")]
    Configuration {
        kind: String,
        name: String,
        detail: String,
    },

    #[error("CEL compile error: {0}")]
    Compile(String),

    #[error("CEL evaluation error: {0}")]
    Evaluation(String),

    #[error("unknown provider kind: {0}")]
    UnknownKind(String),

    #[error("kind '{0}' is already registered")]
    DuplicateKind(String),

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("context canceled")]
    Canceled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl HealthError {
    pub fn configuration(
        kind: impl Into<String>,
        name: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::Configuration {
            kind: kind.into(),
            name: name.into(),
            detail: detail.into(),
        }
    }

    /// True for the "cancellation / deadline" class (§7 kind 7), which callers
    /// render with the fixed markers the testable properties in §8 assert on.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::DeadlineExceeded | Self::Canceled)
    }
}

pub type Result<T> = std::result::Result<T, HealthError>;

/// A non-fatal diagnostic attached to a response or to a container's
/// component-resolution results (§4.2, §7 kind 2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentWarning {
    pub kind: String,
    pub name: String,
    pub detail: String,
}

impl ComponentWarning {
    pub fn new(kind: impl Into<String>, name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for ComponentWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}/{}] {}", self.kind, self.name, self.detail)
    }
}

/// A fatal diagnostic produced while resolving one child of a container
/// (§4.1 Container capability, §7 kind 1). Resolution of siblings continues
/// regardless of a single child's failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("component '{name}' ({kind}) failed to resolve: {detail}")]
pub struct ComponentError {
    pub kind: String,
    pub name: String,
    pub detail: String,
}

impl ComponentError {
    pub fn new(kind: impl Into<String>, name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            detail: detail.into(),
        }
    }
}
