//! Concurrent evaluation orchestrator for the platform health engine
//! (§4.4): bounded worker pool, per-instance timeouts, cancellation and
//! fail-fast propagation, and status aggregation over a set of sibling
//! providers.

pub mod orchestrator;

pub use orchestrator::Orchestrator;
