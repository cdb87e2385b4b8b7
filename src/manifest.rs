//! The order manifest (`src/order.json`).
//!
//! `{ "blocks": ["hero", "features", ...] }`. List order is the canonical
//! render and bundle order. Duplicates are kept as-is.
//!
//! Reads fail soft: a missing file, invalid JSON or a non-array `blocks`
//! field all mean "no blocks". The pipeline never writes the manifest; the
//! scaffolding commands use [`read_order`] / [`write_order`], which keep any
//! other fields intact.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::BundleError;

static KEY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[a-z0-9][a-z0-9_-]*$").expect("valid key regex"));

/// Ordered block keys from the manifest. Empty and non-string entries are dropped.
pub fn read_blocks(manifest_path: &Path) -> Vec<String> {
    let Ok(raw) = std::fs::read_to_string(manifest_path) else {
        return Vec::new();
    };
    let Ok(json) = serde_json::from_str::<Value>(&raw) else {
        return Vec::new();
    };
    blocks_of(&json)
}

fn blocks_of(json: &Value) -> Vec<String> {
    json.get("blocks")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(Value::as_str)
                .filter(|key| !key.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

/// Whether `key` is acceptable for a newly created block.
pub fn is_valid_key(key: &str) -> bool {
    KEY_PATTERN.is_match(key)
}

pub fn validate_key(key: &str) -> Result<(), BundleError> {
    if is_valid_key(key) {
        Ok(())
    } else {
        Err(BundleError::InvalidKey(key.to_string()))
    }
}

/// Whole manifest object for editing. Falls back to `{"blocks": []}`.
pub fn read_order(manifest_path: &Path) -> Map<String, Value> {
    let parsed = std::fs::read_to_string(manifest_path)
        .ok()
        .and_then(|raw| serde_json::from_str::<Value>(&raw).ok());
    match parsed {
        Some(Value::Object(map)) => map,
        _ => {
            let mut map = Map::new();
            map.insert("blocks".into(), Value::Array(Vec::new()));
            map
        }
    }
}

/// Pretty-printed (2-space) manifest with a trailing newline.
pub fn write_order(manifest_path: &Path, order: &Map<String, Value>) -> Result<(), BundleError> {
    let mut text = serde_json::to_string_pretty(order)?;
    text.push('\n');
    if let Some(parent) = manifest_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(manifest_path, text)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
        let path = dir.path().join("order.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn reads_blocks_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = manifest(&dir, r#"{"blocks":["b","a","b"]}"#);
        assert_eq!(read_blocks(&path), vec!["b", "a", "b"]);
    }

    #[test]
    fn missing_manifest_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_blocks(&dir.path().join("nope.json")).is_empty());
    }

    #[test]
    fn invalid_json_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = manifest(&dir, "{ blocks: [");
        assert!(read_blocks(&path).is_empty());
    }

    #[test]
    fn non_array_blocks_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = manifest(&dir, r#"{"blocks":"hero"}"#);
        assert!(read_blocks(&path).is_empty());
    }

    #[test]
    fn falsy_entries_are_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let path = manifest(&dir, r#"{"blocks":["", null, "hero", false, 0]}"#);
        assert_eq!(read_blocks(&path), vec!["hero"]);
    }

    #[test]
    fn key_validation() {
        assert!(is_valid_key("hero"));
        assert!(is_valid_key("Hero_2-b"));
        assert!(!is_valid_key("-hero"));
        assert!(!is_valid_key("he ro"));
        assert!(!is_valid_key(""));
    }

    #[test]
    fn order_round_trip_keeps_other_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = manifest(&dir, r#"{"title":"Landing","blocks":["a"]}"#);
        let mut order = read_order(&path);
        order.insert("blocks".into(), serde_json::json!(["a", "b"]));
        write_order(&path, &order).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.ends_with("}\n"));
        assert!(text.find("title").unwrap() < text.find("blocks").unwrap());
        assert_eq!(read_blocks(&path), vec!["a", "b"]);
    }
}
