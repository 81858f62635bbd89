//! Static per-route path rewriting.

use serde::{Deserialize, Serialize};

use crate::routing::matcher::PathPrefixMatcher;

/// How the matched prefix is transformed before forwarding.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathRewrite {
    /// Forward the path unchanged.
    #[default]
    Preserve,
    /// Remove the matched prefix so the backend sees a root-relative path.
    StripPrefix,
    /// Replace the matched prefix with another one.
    ReplacePrefix(String),
}

impl PathRewrite {
    /// Rewrite `path`, which must already match `matcher`.
    pub fn apply(&self, matcher: &PathPrefixMatcher, path: &str) -> String {
        let rest = match self {
            PathRewrite::Preserve => return path.to_string(),
            PathRewrite::StripPrefix | PathRewrite::ReplacePrefix(_) => {
                matcher.remainder(path).unwrap_or(path)
            }
        };

        let head = match self {
            PathRewrite::ReplacePrefix(new) => new.trim_end_matches('/'),
            _ => "",
        };

        let rewritten = format!("{head}{rest}");
        if rewritten.is_empty() {
            "/".to_string()
        } else if rewritten.starts_with('/') {
            rewritten
        } else {
            format!("/{rewritten}")
        }
    }
}
