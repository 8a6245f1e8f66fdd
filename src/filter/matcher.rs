//! Blocklist matcher for ad/tracking domains.
//!
//! Holds exact domains plus regex heuristics and decides whether a
//! queried name is blocked.

use std::borrow::Cow;

use fancy_regex::Regex;
use rustc_hash::FxHashSet;

use crate::error::MatcherError;

/// A set of blocked domains plus regex rules.
///
/// Built once during startup, read-only while serving.
#[derive(Default)]
pub struct Matcher {
    domains: FxHashSet<String>,
    rules: Vec<Regex>,
}

impl Matcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an exact domain. Blocks the domain and all of its subdomains.
    pub fn add(&mut self, domain: &str) {
        let domain = normalize(domain);
        if domain.is_empty() {
            return;
        }
        self.domains.insert(domain.into_owned());
    }

    /// Compile and append a regex rule.
    ///
    /// On error the matcher is left untouched.
    pub fn add_regex(&mut self, pattern: &str) -> Result<(), MatcherError> {
        let rule = Regex::new(pattern).map_err(|source| MatcherError::InvalidRegex {
            pattern: pattern.to_string(),
            source: Box::new(source),
        })?;
        self.rules.push(rule);
        Ok(())
    }

    /// Check if a domain should be blocked.
    ///
    /// Performs exact match and subdomain matching (e.g., blocks
    /// "ads.example.com" if "example.com" is in the blocklist), then falls
    /// back to the regex rules on the full name.
    pub fn is_blocked(&self, domain: &str) -> bool {
        let domain = normalize(domain);
        if domain.is_empty() {
            return false;
        }

        let mut current: &str = &domain;
        loop {
            if self.domains.contains(current) {
                return true;
            }
            match current.find('.') {
                Some(pos) if pos + 1 < current.len() => current = &current[pos + 1..],
                _ => break,
            }
        }

        self.rules
            .iter()
            .any(|rule| rule.is_match(&domain).unwrap_or(false))
    }

    /// Returns the number of exact domains. Regex rules are not counted.
    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

/// Lowercase and strip a single trailing dot, allocating only when needed.
fn normalize(domain: &str) -> Cow<'_, str> {
    let domain = domain.strip_suffix('.').unwrap_or(domain);
    if domain.bytes().any(|b| b.is_ascii_uppercase()) {
        Cow::Owned(domain.to_ascii_lowercase())
    } else {
        Cow::Borrowed(domain)
    }
}
