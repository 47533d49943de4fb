//! Permissive manifest and sidecar parsing.
//!
//! Bucket content is third-party input: fields may be missing, renamed, or
//! carry unexpected shapes (`bin` alone accepts a string, an array of
//! strings, or `[target, alias]` pairs). Everything here reads defensively
//! and degrades to `None`/empty instead of erroring outward.

use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

/// Raw parsed package manifest.
///
/// Shape-varying fields stay as [`Value`] and are interpreted through
/// accessors; unknown fields are ignored wholesale.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ManifestRecord {
    version: Value,
    description: Value,
    homepage: Value,
    /// License may be a plain string or an object with identifier/url.
    license: Value,
    /// Executables to shim; string, array, or `[target, alias]` pairs.
    pub bin: Value,
    /// Runtime dependencies; string or array.
    pub depends: Value,
    /// Deprecation marker; any non-null, non-false value counts.
    deprecated: Value,
}

impl ManifestRecord {
    /// Parse a manifest file, returning `None` on any read or parse failure.
    pub fn parse_file(path: &Path) -> Option<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!("skipping unreadable manifest {}: {e}", path.display());
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::debug!("skipping malformed manifest {}: {e}", path.display());
                None
            }
        }
    }

    /// Version string, coercing bare JSON numbers.
    pub fn version(&self) -> Option<String> {
        value_to_string(&self.version)
    }

    /// Package description, if present.
    pub fn description(&self) -> Option<String> {
        value_to_string(&self.description)
    }

    /// Homepage URL, if present.
    pub fn homepage(&self) -> Option<String> {
        value_to_string(&self.homepage)
    }

    /// License identifier; objects yield their `identifier` field.
    pub fn license(&self) -> Option<String> {
        match &self.license {
            Value::Object(map) => map.get("identifier").and_then(value_to_string),
            other => value_to_string(other),
        }
    }

    /// Dependency names, tolerating string or array shapes.
    pub fn depends(&self) -> Vec<String> {
        match &self.depends {
            Value::String(s) => vec![s.clone()],
            Value::Array(items) => items.iter().filter_map(value_to_string).collect(),
            _ => Vec::new(),
        }
    }

    /// Whether the manifest carries a deprecation marker.
    pub fn is_deprecated(&self) -> bool {
        match &self.deprecated {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }
}

fn value_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Normalized shim names from a manifest `bin` field.
///
/// Accepted shapes:
/// - `"foo.exe"` -> `["foo"]`
/// - `["foo.exe", "bar/baz.exe"]` -> `["foo", "baz"]`
/// - `[["real.exe", "alias"]]` -> `["alias"]` (the alias is the shim name)
pub fn normalize_bins(bin: &Value) -> Vec<String> {
    let mut out = Vec::new();
    match bin {
        Value::String(s) => push_stem(&mut out, s),
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::String(s) => push_stem(&mut out, s),
                    Value::Array(pair) => {
                        // [target, alias, args...]: the alias names the shim;
                        // fall back to the target when no alias is given.
                        let named = pair.get(1).or_else(|| pair.first());
                        if let Some(Value::String(s)) = named {
                            push_stem(&mut out, s);
                        }
                    }
                    _ => {}
                }
            }
        }
        _ => {}
    }
    out
}

fn push_stem(out: &mut Vec<String>, raw: &str) {
    let stem = Path::new(raw)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(raw);
    if !stem.is_empty() && !out.iter().any(|existing| existing == stem) {
        out.push(stem.to_string());
    }
}

/// Install-time sidecar (`install.json`) recorded next to a version's
/// manifest. Carries the originating bucket and an optional hold marker.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InstallInfo {
    /// Bucket the app was installed from, if recorded.
    pub bucket: Option<String>,
    /// Held apps are excluded from upgrade candidates.
    pub hold: Option<bool>,
}

impl InstallInfo {
    /// Parse an `install.json` sidecar, returning `None` on any failure.
    pub fn parse_file(path: &Path) -> Option<Self> {
        let raw = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&raw).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_permissive_parse() {
        let record: ManifestRecord = serde_json::from_str(
            r#"{"version": "1.2.3", "description": "a tool", "unknown_field": [1, 2]}"#,
        )
        .unwrap();
        assert_eq!(record.version().as_deref(), Some("1.2.3"));
        assert_eq!(record.description().as_deref(), Some("a tool"));
        assert!(record.homepage().is_none());
        assert!(!record.is_deprecated());
    }

    #[test]
    fn test_numeric_version_coerced() {
        let record: ManifestRecord = serde_json::from_str(r#"{"version": 2021}"#).unwrap();
        assert_eq!(record.version().as_deref(), Some("2021"));
    }

    #[test]
    fn test_license_shapes() {
        let plain: ManifestRecord =
            serde_json::from_str(r#"{"license": "MIT"}"#).unwrap();
        assert_eq!(plain.license().as_deref(), Some("MIT"));

        let object: ManifestRecord =
            serde_json::from_str(r#"{"license": {"identifier": "GPL-3.0", "url": "x"}}"#).unwrap();
        assert_eq!(object.license().as_deref(), Some("GPL-3.0"));
    }

    #[test]
    fn test_deprecated_marker() {
        let flagged: ManifestRecord =
            serde_json::from_str(r#"{"deprecated": "use other-tool instead"}"#).unwrap();
        assert!(flagged.is_deprecated());

        let false_flag: ManifestRecord =
            serde_json::from_str(r#"{"deprecated": false}"#).unwrap();
        assert!(!false_flag.is_deprecated());
    }

    #[test]
    fn test_bin_string() {
        assert_eq!(normalize_bins(&json!("foo.exe")), vec!["foo"]);
    }

    #[test]
    fn test_bin_array_of_strings() {
        assert_eq!(
            normalize_bins(&json!(["foo.exe", "tools/bar.exe"])),
            vec!["foo", "bar"]
        );
    }

    #[test]
    fn test_bin_target_alias_pairs() {
        assert_eq!(
            normalize_bins(&json!([["real-name.exe", "alias"], "plain.exe"])),
            vec!["alias", "plain"]
        );
        // Single-element pair falls back to the target.
        assert_eq!(normalize_bins(&json!([["only.exe"]])), vec!["only"]);
    }

    #[test]
    fn test_bin_dedup_and_garbage() {
        assert_eq!(
            normalize_bins(&json!(["foo.exe", "foo.exe", 42, null])),
            vec!["foo"]
        );
        assert!(normalize_bins(&json!({"not": "a bin"})).is_empty());
    }

    #[test]
    fn test_install_info() {
        let info: InstallInfo =
            serde_json::from_str(r#"{"bucket": "main", "hold": true, "url": "x"}"#).unwrap();
        assert_eq!(info.bucket.as_deref(), Some("main"));
        assert_eq!(info.hold, Some(true));
    }
}
