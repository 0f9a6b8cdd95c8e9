//! Attaches metadata values flagged for automatic matching.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::document::{Document, Metadata};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Case-insensitive substring of the value itself.
    #[default]
    Exact,
    /// `match_filter` as a regular expression.
    Regex,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::Regex => "regex",
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" | "" => Ok(MatchType::Exact),
            "regex" => Ok(MatchType::Regex),
            other => Err(format!("unknown match type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoMatchValue {
    pub key_id: i64,
    pub key: String,
    pub value_id: i64,
    pub value: String,
    #[serde(default)]
    pub match_type: MatchType,
    #[serde(default)]
    pub match_filter: String,
}

impl AutoMatchValue {
    fn matches(&self, content: &str, lowered: &str, patterns: &mut HashMap<String, Option<Regex>>) -> bool {
        match self.match_type {
            MatchType::Exact => {
                let needle = self.value.trim().to_lowercase();
                !needle.is_empty() && lowered.contains(&needle)
            }
            MatchType::Regex => {
                if self.match_filter.is_empty() {
                    return false;
                }
                let regex = patterns
                    .entry(self.match_filter.clone())
                    .or_insert_with(|| match Regex::new(&self.match_filter) {
                        Ok(regex) => Some(regex),
                        Err(e) => {
                            warn!(
                                filter = %self.match_filter,
                                value_id = self.value_id,
                                error = %e,
                                "Skipping metadata value with invalid match filter"
                            );
                            None
                        }
                    });
                regex.as_ref().is_some_and(|r| r.is_match(content))
            }
        }
    }
}

/// Adds every matching value to the document's metadata. Returns the number
/// of entries added.
pub fn apply_auto_matching(document: &mut Document, values: &[AutoMatchValue]) -> usize {
    let lowered = document.content.to_lowercase();
    let mut patterns = HashMap::new();
    let mut added = 0;

    for value in values {
        if !value.matches(&document.content, &lowered, &mut patterns) {
            continue;
        }
        let entry = Metadata::named(value.key_id, &value.key, value.value_id, &value.value);
        if document.add_metadata(entry) {
            added += 1;
        }
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(value_id: i64, value: &str, match_type: MatchType, filter: &str) -> AutoMatchValue {
        AutoMatchValue {
            key_id: 1,
            key: "vendor".to_string(),
            value_id,
            value: value.to_string(),
            match_type,
            match_filter: filter.to_string(),
        }
    }

    fn doc() -> Document {
        let mut doc = Document::new(1, "bill.pdf", "application/pdf");
        doc.content = "Invoice from ACME Corporation, order #A-1234".to_string();
        doc
    }

    #[test]
    fn test_exact_match_is_case_insensitive() {
        let mut d = doc();
        let added = apply_auto_matching(
            &mut d,
            &[
                value(10, "Acme", MatchType::Exact, ""),
                value(11, "Globex", MatchType::Exact, ""),
            ],
        );
        assert_eq!(added, 1);
        assert_eq!(d.metadata()[0].value_id, 10);
        assert_eq!(d.metadata()[0].key, "vendor");
    }

    #[test]
    fn test_regex_match_uses_filter() {
        let mut d = doc();
        let added = apply_auto_matching(
            &mut d,
            &[
                value(20, "orders", MatchType::Regex, r"#A-\d{4}"),
                value(21, "broken", MatchType::Regex, "(["),
                value(22, "empty", MatchType::Regex, ""),
            ],
        );
        assert_eq!(added, 1);
        assert_eq!(d.metadata()[0].value_id, 20);
    }

    #[test]
    fn test_existing_entries_not_duplicated() {
        let mut d = doc();
        d.metadata = Some(vec![Metadata::new(1, 10)]);
        let added = apply_auto_matching(&mut d, &[value(10, "acme", MatchType::Exact, "")]);
        assert_eq!(added, 0);
        assert_eq!(d.metadata().len(), 1);
    }
}
