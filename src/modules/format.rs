//! Module Format Parser
//!
//! Parses `.mod` module files that use frontmatter for metadata and an
//! arbitrary text body for the module source.
//!
//! Expected format:
//! ```text
//! ---
//! id: status-widget
//! kind: widget
//! description: Renders runtime status
//! capabilities: [render]
//! ---
//!
//! Module body goes here...
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::ModuleCapability;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Deserialized frontmatter from a module file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleFrontmatter {
    pub id: Option<String>,
    pub kind: Option<String>,
    pub description: Option<String>,
    pub capabilities: Option<Vec<String>>,
}

/// Fully parsed module manifest. Parsing never fails: a file without
/// frontmatter becomes a capability-less module named after its path.
#[derive(Debug, Clone)]
pub struct ModuleManifest {
    pub id: String,
    pub description: String,
    pub capabilities: Vec<ModuleCapability>,
    pub body: String,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse module `content` into a [`ModuleManifest`].
///
/// The id falls back to the path's file stem; capabilities come from
/// the explicit `capabilities` list when present, otherwise from the
/// `kind` shorthand (widget -> render, tool -> tool, service ->
/// service). Unrecognized capability names are dropped.
pub fn parse_module_manifest(content: &str, file_path: &str) -> ModuleManifest {
    let frontmatter = parse_frontmatter(content);
    let body = extract_body(content);

    let id = frontmatter
        .as_ref()
        .and_then(|fm| fm.id.clone())
        .unwrap_or_else(|| extract_id_from_path(file_path));

    let description = frontmatter
        .as_ref()
        .and_then(|fm| fm.description.clone())
        .unwrap_or_default();

    let capabilities = match frontmatter.as_ref().and_then(|fm| fm.capabilities.clone()) {
        Some(names) => names
            .iter()
            .filter_map(|name| parse_capability(name))
            .collect(),
        None => frontmatter
            .as_ref()
            .and_then(|fm| fm.kind.as_deref())
            .map(capabilities_for_kind)
            .unwrap_or_default(),
    };

    ModuleManifest {
        id,
        description,
        capabilities,
        body,
    }
}

/// Extract and parse the frontmatter block from raw module content.
///
/// The frontmatter must be delimited by lines that are exactly `---`.
pub fn parse_frontmatter(raw: &str) -> Option<ModuleFrontmatter> {
    let trimmed = raw.trim_start();

    if !trimmed.starts_with("---") {
        return None;
    }

    let after_open = &trimmed[3..];
    let close_idx = after_open.find("\n---")?;

    let block = after_open[..close_idx].trim();
    let json_value = block_to_json(block)?;
    serde_json::from_value::<ModuleFrontmatter>(json_value).ok()
}

/// Derive a module id from the file path by taking the file stem.
///
/// `modules/status-widget.mod` => `"status-widget"`
pub fn extract_id_from_path(file_path: &str) -> String {
    Path::new(file_path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}

pub fn parse_capability(name: &str) -> Option<ModuleCapability> {
    match name.trim() {
        "render" => Some(ModuleCapability::Render),
        "tool" => Some(ModuleCapability::Tool),
        "service" => Some(ModuleCapability::Service),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn capabilities_for_kind(kind: &str) -> Vec<ModuleCapability> {
    match kind {
        "widget" => vec![ModuleCapability::Render],
        "tool" => vec![ModuleCapability::Tool],
        "service" => vec![ModuleCapability::Service],
        _ => Vec::new(),
    }
}

/// Extract the module body (everything after the closing `---` of the
/// frontmatter).
fn extract_body(content: &str) -> String {
    let trimmed = content.trim_start();

    if !trimmed.starts_with("---") {
        return content.to_string();
    }

    let after_open = &trimmed[3..];
    if let Some(close_idx) = after_open.find("\n---") {
        let after_close = &after_open[close_idx + 4..]; // skip "\n---"
        after_close.trim_start_matches('\n').to_string()
    } else {
        String::new()
    }
}

/// Minimal frontmatter-to-JSON converter.
///
/// Supports scalar key-value pairs and single-level arrays using the
/// `[a, b]` inline syntax.
fn block_to_json(block: &str) -> Option<serde_json::Value> {
    use serde_json::{Map, Value};

    let mut map = Map::new();

    for line in block.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let colon = line.find(':')?;
        let key = line[..colon].trim().to_string();
        let raw_value = line[colon + 1..].trim();

        let value = if raw_value.is_empty() {
            Value::Null
        } else if raw_value.starts_with('[') && raw_value.ends_with(']') {
            let inner = &raw_value[1..raw_value.len() - 1];
            let items: Vec<Value> = inner
                .split(',')
                .map(|s| Value::String(s.trim().to_string()))
                .filter(|v| v != &Value::String(String::new()))
                .collect();
            Value::Array(items)
        } else if raw_value == "true" {
            Value::Bool(true)
        } else if raw_value == "false" {
            Value::Bool(false)
        } else if let Ok(n) = raw_value.parse::<i64>() {
            Value::Number(n.into())
        } else {
            Value::String(raw_value.to_string())
        };

        map.insert(key, value);
    }

    Some(Value::Object(map))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_id_from_path() {
        assert_eq!(extract_id_from_path("modules/status-widget.mod"), "status-widget");
        assert_eq!(extract_id_from_path("kernel.mod"), "kernel");
    }

    #[test]
    fn test_parse_full_manifest() {
        let content = "---\nid: status-widget\nkind: widget\ndescription: Shows status\ncapabilities: [render, tool]\n---\n\nbody text\n";
        let manifest = parse_module_manifest(content, "modules/status-widget.mod");
        assert_eq!(manifest.id, "status-widget");
        assert_eq!(manifest.description, "Shows status");
        assert_eq!(
            manifest.capabilities,
            vec![ModuleCapability::Render, ModuleCapability::Tool]
        );
        assert_eq!(manifest.body, "body text\n");
    }

    #[test]
    fn test_kind_derives_capabilities_when_list_absent() {
        let content = "---\nkind: widget\n---\nbody";
        let manifest = parse_module_manifest(content, "modules/ui.mod");
        assert_eq!(manifest.id, "ui");
        assert_eq!(manifest.capabilities, vec![ModuleCapability::Render]);
    }

    #[test]
    fn test_explicit_capabilities_win_over_kind() {
        let content = "---\nkind: widget\ncapabilities: [tool]\n---\nbody";
        let manifest = parse_module_manifest(content, "m.mod");
        assert_eq!(manifest.capabilities, vec![ModuleCapability::Tool]);
    }

    #[test]
    fn test_no_frontmatter_yields_capability_less_module() {
        let content = "plain module body without manifest";
        let manifest = parse_module_manifest(content, "modules/mystery.mod");
        assert_eq!(manifest.id, "mystery");
        assert!(manifest.capabilities.is_empty());
        assert_eq!(manifest.body, content);
    }

    #[test]
    fn test_unknown_capability_names_are_dropped() {
        let content = "---\ncapabilities: [render, levitate]\n---\nbody";
        let manifest = parse_module_manifest(content, "m.mod");
        assert_eq!(manifest.capabilities, vec![ModuleCapability::Render]);
    }
}
