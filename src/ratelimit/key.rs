//! Window key generation.

use std::fmt;

/// A key that identifies the hit history of one owner acting on one resource.
///
/// The key is the owner and the resource joined with a dash. Empty parts are
/// accepted and simply produce a degenerate key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowKey(String);

impl WindowKey {
    /// Create a new window key from an owner and a resource.
    pub fn new(owner: &str, resource: &str) -> Self {
        Self(format!("{}-{}", owner, resource))
    }

    /// The composite key as stored in the window store.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for WindowKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for WindowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
