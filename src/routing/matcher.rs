//! Route matching logic.
//!
//! # Responsibilities
//! - Match path prefix on segment boundaries (case-sensitive)
//! - Decide whether one prefix covers (shadows) another
//!
//! # Design Decisions
//! - `/api/users` matches `/api/users`, `/api/users/` and `/api/users/7`,
//!   never `/api/usersx`
//! - A trailing slash on the configured prefix is ignored
//! - `/` is the wildcard and matches every path
//! - No regex to guarantee O(n) matching

/// Matches the request path against a prefix on segment boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    /// Create a new path prefix matcher.
    ///
    /// Returns `None` if the prefix is not absolute.
    pub fn new(prefix: impl Into<String>) -> Option<Self> {
        let prefix = prefix.into();
        if !prefix.starts_with('/') {
            return None;
        }
        let trimmed = prefix.trim_end_matches('/');
        let prefix = if trimmed.is_empty() { "/" } else { trimmed };
        Some(Self {
            prefix: prefix.to_string(),
        })
    }

    /// The normalized prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn is_root(&self) -> bool {
        self.prefix == "/"
    }

    /// Returns true if `path` falls under this prefix.
    pub fn matches(&self, path: &str) -> bool {
        self.remainder(path).is_some()
    }

    /// The part of `path` after the prefix, if it matches.
    ///
    /// The remainder is either empty or starts with `/`.
    pub fn remainder<'a>(&self, path: &'a str) -> Option<&'a str> {
        if self.is_root() {
            return path.starts_with('/').then_some(path);
        }
        let rest = path.strip_prefix(self.prefix.as_str())?;
        (rest.is_empty() || rest.starts_with('/')).then_some(rest)
    }

    /// Returns true if every path matched by `other` is also matched by `self`.
    pub fn covers(&self, other: &PathPrefixMatcher) -> bool {
        self.matches(&other.prefix)
    }
}
