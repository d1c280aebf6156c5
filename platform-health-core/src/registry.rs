use dashmap::DashMap;

use crate::error::{HealthError, Result};
use crate::provider::BoxProvider;

/// A zero-argument constructor producing a fresh, independent provider value
/// (§3 "ProviderKind", §9 "Registry of types without runtime reflection").
/// The source design clones a zero-value prototype per instance; since Rust
/// has no runtime reflection over arbitrary types, a factory closure plays
/// the same role.
pub type PrototypeFn = Box<dyn Fn() -> BoxProvider + Send + Sync>;

/// Process-wide mapping from provider kind to prototype factory (§3, §4.2,
/// §5 "read-many / written-once").
///
/// Registration is expected to happen once during process initialization;
/// nothing prevents a later `register` call, but `register` itself refuses
/// to clobber an existing kind (§3 "write-once"). Lookups use `DashMap`'s
/// sharded locking, which gives effectively lock-free concurrent reads once
/// population has settled - there is no explicit read/write-lock phase
/// transition to model.
#[derive(Default)]
pub struct ProviderRegistry {
    prototypes: DashMap<String, PrototypeFn>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `kind`. Fails if `kind` is already registered (§3
    /// "write-once").
    pub fn register(&self, kind: impl Into<String>, prototype: PrototypeFn) -> Result<()> {
        let kind = kind.into();
        if self.prototypes.contains_key(&kind) {
            tracing::warn!(kind = %kind, "duplicate provider kind registration rejected");
            return Err(HealthError::DuplicateKind(kind));
        }
        tracing::debug!(kind = %kind, "provider kind registered");
        self.prototypes.insert(kind, prototype);
        Ok(())
    }

    /// Produces a fresh instance from the prototype registered for `kind`.
    pub fn new_instance(&self, kind: &str) -> Result<BoxProvider> {
        self.prototypes
            .get(kind)
            .map(|entry| (entry.value())())
            .ok_or_else(|| HealthError::UnknownKind(kind.to_string()))
    }

    pub fn is_registered(&self, kind: &str) -> bool {
        self.prototypes.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<String> {
        self.prototypes.iter().map(|e| e.key().clone()).collect()
    }
}
