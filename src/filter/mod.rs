//! Filter evaluation engine.
//!
//! A compiled, per-feed composite predicate over entries. All configured
//! dimensions must pass (AND); within a dimension, include terms use OR
//! logic and any exclude match rejects.

use regex::{Regex, RegexBuilder};

use crate::app::{FeedwatchError, Result};
use crate::config::{FilterSpec, KeywordRule};
use crate::domain::Entry;

/// Compiled filter for one feed. Regex patterns are compiled exactly once,
/// at construction; a pattern that fails to compile never reaches entry
/// evaluation.
#[derive(Debug, Clone)]
pub struct EntryFilter {
    keywords: KeywordRule,
    categories: KeywordRule,
    authors: KeywordRule,
    title_pattern: Option<Regex>,
    content_pattern: Option<Regex>,
}

impl EntryFilter {
    pub fn new(spec: &FilterSpec) -> Result<Self> {
        Ok(Self {
            keywords: spec.keywords.clone(),
            categories: spec.categories.clone(),
            authors: spec.authors.clone(),
            title_pattern: compile(spec.regex.title.as_deref(), "title")?,
            content_pattern: compile(spec.regex.content.as_deref(), "content")?,
        })
    }

    /// Evaluate the composite predicate. Pure; no side effects, no I/O.
    pub fn matches(&self, entry: &Entry) -> bool {
        let result = self.check_keywords(entry)
            && self.check_categories(entry)
            && self.check_authors(entry)
            && self.check_regex(entry);

        if result {
            tracing::debug!("Entry '{}' passed all filters", entry.display_title());
        } else {
            tracing::debug!("Entry '{}' filtered out", entry.display_title());
        }

        result
    }

    fn check_keywords(&self, entry: &Entry) -> bool {
        if self.keywords.is_empty() {
            return true;
        }

        let text = fold_case(
            &format!("{} {}", entry.title, entry.content),
            self.keywords.case_sensitive,
        );

        for term in &self.keywords.exclude {
            if text.contains(&fold_case(term, self.keywords.case_sensitive)) {
                return false;
            }
        }

        if self.keywords.include.is_empty() {
            return true;
        }
        self.keywords
            .include
            .iter()
            .any(|term| text.contains(&fold_case(term, self.keywords.case_sensitive)))
    }

    fn check_categories(&self, entry: &Entry) -> bool {
        if self.categories.is_empty() {
            return true;
        }

        let entry_categories: Vec<String> = entry
            .categories
            .iter()
            .map(|c| fold_case(c, self.categories.case_sensitive))
            .collect();

        for category in &self.categories.exclude {
            if entry_categories.contains(&fold_case(category, self.categories.case_sensitive)) {
                return false;
            }
        }

        if self.categories.include.is_empty() {
            return true;
        }
        self.categories.include.iter().any(|category| {
            entry_categories.contains(&fold_case(category, self.categories.case_sensitive))
        })
    }

    fn check_authors(&self, entry: &Entry) -> bool {
        if self.authors.is_empty() {
            return true;
        }

        let author = fold_case(&entry.author, self.authors.case_sensitive);

        for excluded in &self.authors.exclude {
            if author.contains(&fold_case(excluded, self.authors.case_sensitive)) {
                return false;
            }
        }

        if self.authors.include.is_empty() {
            return true;
        }
        self.authors
            .include
            .iter()
            .any(|included| author.contains(&fold_case(included, self.authors.case_sensitive)))
    }

    fn check_regex(&self, entry: &Entry) -> bool {
        if let Some(pattern) = &self.title_pattern {
            if !pattern.is_match(&entry.title) {
                return false;
            }
        }
        if let Some(pattern) = &self.content_pattern {
            if !pattern.is_match(&entry.content) {
                return false;
            }
        }
        true
    }
}

fn fold_case(s: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        s.to_string()
    } else {
        s.to_lowercase()
    }
}

fn compile(pattern: Option<&str>, which: &str) -> Result<Option<Regex>> {
    match pattern {
        None => Ok(None),
        Some(p) => RegexBuilder::new(p)
            .case_insensitive(true)
            .build()
            .map(Some)
            .map_err(|e| {
                FeedwatchError::Config(format!("invalid {} regex pattern '{}': {}", which, p, e))
            }),
    }
}
