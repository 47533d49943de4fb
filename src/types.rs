//! Shared identifier types for scopes and buckets.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Installation scope: per-user or system-wide.
///
/// Every filesystem lookup in the engine is relative to exactly one scope
/// root; the two scopes are fully independent trees with identical layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallScope {
    /// Per-user installation root.
    User,
    /// System-wide installation root.
    Global,
}

impl InstallScope {
    /// Get the string representation of the scope.
    pub fn as_str(self) -> &'static str {
        match self {
            InstallScope::User => "user",
            InstallScope::Global => "global",
        }
    }

    /// Both scopes in lookup order. User-scope entries shadow global ones,
    /// so user always comes first.
    pub fn both() -> [InstallScope; 2] {
        [InstallScope::User, InstallScope::Global]
    }
}

impl fmt::Display for InstallScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A key uniquely identifying a bucket across scopes.
///
/// This newtype eliminates the ambiguity of `(InstallScope, String)` tuples
/// and doubles as the string key (`"user:main"`) in the persisted cache map.
#[derive(Debug, Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct BucketKey {
    /// Scope the bucket lives under.
    pub scope: InstallScope,
    /// Bucket directory name.
    pub name: String,
}

impl BucketKey {
    /// Create a new `BucketKey` from a scope and bucket name.
    pub fn new(scope: InstallScope, name: impl Into<String>) -> Self {
        Self {
            scope,
            name: name.into(),
        }
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_order() {
        assert_eq!(InstallScope::both(), [InstallScope::User, InstallScope::Global]);
    }

    #[test]
    fn test_bucket_key_display() {
        let key = BucketKey::new(InstallScope::User, "main");
        assert_eq!(key.to_string(), "user:main");
        let key = BucketKey::new(InstallScope::Global, "extras");
        assert_eq!(key.to_string(), "global:extras");
    }
}
