// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Pattern matchers for capture rules
//!
//! Rule patterns come from the backend and are user-controlled, so the way a
//! pattern is interpreted is isolated behind [`PatternMatcher`].

use std::sync::Arc;

use dashmap::DashMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Decides whether a rule pattern matches a URL
pub trait PatternMatcher: Send + Sync {
    /// Return true when `pattern` matches `url`
    fn matches(&self, pattern: &str, url: &str) -> bool;

    /// Matcher name for logging
    fn name(&self) -> &'static str;

    /// Drop any per-pattern state not in `patterns`. Called when the rule
    /// list is replaced.
    fn retain_patterns(&self, _patterns: &[&str]) {}
}

/// Which matcher to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatcherKind {
    /// Pattern is a plain substring of the URL
    #[default]
    Substring,
    /// Pattern is a substring with `*` wildcards
    Glob,
    /// Pattern is a regular expression searched anywhere in the URL
    Regex,
}

impl MatcherKind {
    /// Build the matcher
    pub fn build(self) -> Arc<dyn PatternMatcher> {
        match self {
            MatcherKind::Substring => Arc::new(SubstringMatcher),
            MatcherKind::Glob => Arc::new(GlobMatcher::default()),
            MatcherKind::Regex => Arc::new(RegexMatcher::default()),
        }
    }
}

/// Plain substring match. Empty patterns never match.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubstringMatcher;

impl PatternMatcher for SubstringMatcher {
    fn matches(&self, pattern: &str, url: &str) -> bool {
        !pattern.is_empty() && url.contains(pattern)
    }

    fn name(&self) -> &'static str {
        "substring"
    }
}

/// Compiled pattern cache; `None` marks a pattern that failed to compile
#[derive(Default)]
struct PatternCache {
    compiled: DashMap<String, Option<Regex>>,
}

impl PatternCache {
    fn is_match(&self, pattern: &str, url: &str, compile: impl FnOnce(&str) -> String) -> bool {
        if let Some(entry) = self.compiled.get(pattern) {
            return entry.as_ref().map(|re| re.is_match(url)).unwrap_or(false);
        }

        let compiled = match Regex::new(&compile(pattern)) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!(pattern = %pattern, error = %e, "Invalid capture rule pattern");
                None
            }
        };
        let matched = compiled.as_ref().map(|re| re.is_match(url)).unwrap_or(false);
        self.compiled.insert(pattern.to_string(), compiled);
        matched
    }

    fn retain(&self, patterns: &[&str]) {
        self.compiled.retain(|pattern, _| patterns.contains(&pattern.as_str()));
    }

    fn len(&self) -> usize {
        self.compiled.len()
    }
}

/// Substring match where `*` stands for any run of characters
#[derive(Default)]
pub struct GlobMatcher {
    cache: PatternCache,
}

impl GlobMatcher {
    fn to_regex(pattern: &str) -> String {
        pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*")
    }
}

impl GlobMatcher {
    /// Number of compiled patterns held
    pub fn cached_patterns(&self) -> usize {
        self.cache.len()
    }
}

impl PatternMatcher for GlobMatcher {
    fn matches(&self, pattern: &str, url: &str) -> bool {
        if pattern.is_empty() {
            return false;
        }
        if !pattern.contains('*') {
            return url.contains(pattern);
        }
        self.cache.is_match(pattern, url, Self::to_regex)
    }

    fn name(&self) -> &'static str {
        "glob"
    }

    fn retain_patterns(&self, patterns: &[&str]) {
        self.cache.retain(patterns);
    }
}

/// Regular expression searched anywhere in the URL. Invalid expressions never match.
#[derive(Default)]
pub struct RegexMatcher {
    cache: PatternCache,
}

impl RegexMatcher {
    /// Number of compiled patterns held
    pub fn cached_patterns(&self) -> usize {
        self.cache.len()
    }
}

impl PatternMatcher for RegexMatcher {
    fn matches(&self, pattern: &str, url: &str) -> bool {
        !pattern.is_empty() && self.cache.is_match(pattern, url, str::to_string)
    }

    fn name(&self) -> &'static str {
        "regex"
    }

    fn retain_patterns(&self, patterns: &[&str]) {
        self.cache.retain(patterns);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substring() {
        let m = SubstringMatcher;
        assert!(m.matches("/api/orders", "https://shop.example/api/orders?page=2"));
        assert!(!m.matches("/api/orders", "https://shop.example/api/users"));
        assert!(!m.matches("", "https://shop.example/"));
    }

    #[test]
    fn test_glob() {
        let m = GlobMatcher::default();
        assert!(m.matches("/api/*/orders", "https://shop.example/api/v2/orders"));
        assert!(!m.matches("/api/*/orders", "https://shop.example/api/v2/users"));
        // Regex metacharacters are literal
        assert!(m.matches("/search?q=*", "https://shop.example/search?q=shoes"));
        assert!(!m.matches("/a.c", "https://shop.example/abc"));
        assert!(m.matches("/a.c", "https://shop.example/a.c"));
    }

    #[test]
    fn test_regex() {
        let m = RegexMatcher::default();
        assert!(m.matches(r"/item/\d+$", "https://shop.example/item/42"));
        assert!(!m.matches(r"/item/\d+$", "https://shop.example/item/abc"));
        // Invalid pattern is cached as non-matching
        assert!(!m.matches("(", "https://shop.example/("));
        assert!(!m.matches("(", "https://shop.example/("));
    }

    #[test]
    fn test_retain_prunes_replaced_patterns() {
        let m = RegexMatcher::default();
        m.matches("/a/\\d+", "https://x/a/1");
        m.matches("/b/\\d+", "https://x/b/1");
        m.matches("(", "https://x/");
        assert_eq!(m.cached_patterns(), 3);

        m.retain_patterns(&["/b/\\d+"]);
        assert_eq!(m.cached_patterns(), 1);
        assert!(m.matches("/b/\\d+", "https://x/b/2"));

        m.retain_patterns(&[]);
        assert_eq!(m.cached_patterns(), 0);
    }

    #[test]
    fn test_kind_builds_named_matcher() {
        assert_eq!(MatcherKind::Substring.build().name(), "substring");
        assert_eq!(MatcherKind::Glob.build().name(), "glob");
        assert_eq!(MatcherKind::Regex.build().name(), "regex");
    }
}
