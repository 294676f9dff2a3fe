//! Genesis Module
//!
//! Level-based module composition: each genesis level extends a parent
//! and contributes modules, per-module overrides force modules on or
//! off, and a fixed-point resolver reconciles the result against the
//! registry's dependency graph.

pub mod config;
pub mod levels;
pub mod overrides;
pub mod registry;
pub mod resolver;
