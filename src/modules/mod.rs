//! Modules
//!
//! Module sources are text files with a frontmatter manifest declaring
//! identity and capabilities, followed by the module body. This module
//! parses that format and turns fetched content into live instances
//! for the safety gate.

pub mod format;
pub mod instantiate;
