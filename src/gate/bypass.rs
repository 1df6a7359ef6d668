//! Paths exempt from maintenance gating.
//!
//! Patterns are either exact (`/health`) or a prefix wildcard (`/api/*`).
//! Matching is case-sensitive. A wildcard pattern is a plain string prefix on
//! everything before `/*`, so `/api/*` matches `/api`, `/api/v1` and also
//! `/apiary`.

/// Normalize a request path: strip one trailing `/`, map `""` to `/`.
pub fn normalize_path(path: &str) -> &str {
    if path.is_empty() {
        return "/";
    }
    match path.strip_suffix('/') {
        Some("") => "/",
        Some(stripped) => stripped,
        None => path,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathPattern {
    Exact(String),
    Prefix(String),
}

impl PathPattern {
    fn parse(raw: &str) -> Self {
        let pattern = normalize_path(raw.trim());
        match pattern.strip_suffix("/*") {
            Some("") => Self::Prefix("/".to_string()),
            Some(prefix) => Self::Prefix(prefix.to_string()),
            None => Self::Exact(pattern.to_string()),
        }
    }

    fn matches(&self, path: &str) -> bool {
        match self {
            Self::Exact(exact) => path == exact,
            Self::Prefix(prefix) => path.starts_with(prefix.as_str()),
        }
    }
}

/// Ordered list of bypass patterns, fixed after provisioning.
#[derive(Debug, Clone, Default)]
pub struct BypassPathSet {
    patterns: Vec<PathPattern>,
}

impl BypassPathSet {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| PathPattern::parse(p.as_ref()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn matches(&self, path: &str) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        let path = normalize_path(path);
        self.patterns.iter().any(|p| p.matches(path))
    }
}
