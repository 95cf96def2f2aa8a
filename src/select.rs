//! Selector filter: inclusion/exclusion patterns over (model, explore) pairs.
//!
//! Patterns have the form `model/explore` where either segment may be a
//! shell-style glob (`*`, `?`), with an optional leading `-` marking the
//! pattern as an exclusion. Patterns are evaluated left to right and the
//! last matching pattern wins, supporting the "include broadly, then carve
//! out" authoring style:
//!
//! ```
//! use spyglass_core::select::Selector;
//!
//! let selector = Selector::compile(&["*/*".into(), "-ecommerce/users".into()]).unwrap();
//! assert!(selector.matches("ecommerce", "orders"));
//! assert!(!selector.matches("ecommerce", "users"));
//! ```

use regex::Regex;

use crate::error::{Error, Result};

/// One compiled pattern.
#[derive(Debug, Clone)]
struct Rule {
    negated: bool,
    model: Regex,
    explore: Regex,
}

/// Compiled predicate over (model, explore) pairs.
#[derive(Debug, Clone)]
pub struct Selector {
    rules: Vec<Rule>,
    has_inclusion: bool,
}

/// Translate one glob segment into an anchored regex.
fn glob_to_regex(segment: &str) -> Result<Regex> {
    let mut pattern = String::from("^");
    for ch in segment.chars() {
        match ch {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            c => pattern.push_str(&regex::escape(&c.to_string())),
        }
    }
    pattern.push('$');
    Regex::new(&pattern).map_err(|e| Error::Internal(format!("bad glob translation: {e}")))
}

impl Selector {
    /// Compile a pattern list. An empty list includes everything.
    pub fn compile(patterns: &[String]) -> Result<Self> {
        let mut rules = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let (negated, body) = match pattern.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, pattern.as_str()),
            };
            let segments: Vec<&str> = body.split('/').collect();
            if segments.len() != 2 {
                return Err(Error::invalid_selector(
                    pattern.clone(),
                    "expected exactly one '/' separating model and explore",
                ));
            }
            let (model, explore) = (segments[0], segments[1]);
            if model.is_empty() || explore.is_empty() {
                return Err(Error::invalid_selector(pattern.clone(), "empty segment"));
            }
            rules.push(Rule {
                negated,
                model: glob_to_regex(model)?,
                explore: glob_to_regex(explore)?,
            });
        }
        let has_inclusion = rules.iter().any(|r| !r.negated);
        Ok(Self {
            rules,
            has_inclusion,
        })
    }

    /// Whether a (model, explore) pair is selected for validation.
    pub fn matches(&self, model: &str, explore: &str) -> bool {
        let last_match = self
            .rules
            .iter()
            .filter(|rule| rule.model.is_match(model) && rule.explore.is_match(explore))
            .next_back();
        match last_match {
            Some(rule) => !rule.negated,
            // No rule matched: excluded by default when any inclusion
            // pattern exists, included otherwise.
            None => !self.has_inclusion,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
