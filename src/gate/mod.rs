//! Safety Gate Module
//!
//! Every module load passes through the gate: critical-path
//! classification, human approval, sandboxed verification, then
//! instantiation. Each stage can stop the load, and every transition
//! lands in the audit trail.

pub mod approval;
pub mod critical;
pub mod loader;
pub mod sandbox;

pub use loader::{create_safety_gate, LoadError, SafetyGate, SafetyGateOptions};
