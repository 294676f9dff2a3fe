//! Protean -- Self-Modifying Module Runtime
//!
//! A module runtime that resolves its own composition from layered
//! genesis levels, gates every self-modification behind approval and
//! sandboxed verification, and keeps an audit trail of each load.

pub mod types;
pub mod config;
pub mod genesis;
pub mod gate;
pub mod state;
pub mod vfs;
pub mod verify;
pub mod hitl;
pub mod modules;
pub mod audit;
