//! Built-in condition evaluators.
//!
//! Each evaluator answers whether one condition holds for a document,
//! before inversion. Inversion and tracing belong to the engine.

use chrono::NaiveDate;
use regex::{Regex, RegexBuilder};

use crate::document::Document;
use crate::error::RuleError;

use super::model::{Condition, ConditionKind};

pub type ConditionFn = fn(&Condition, &Document) -> Result<bool, RuleError>;

#[derive(Debug, Clone, Copy)]
enum TextMatch {
    Is,
    Starts,
    Contains,
}

/// Compiles the condition value as a regex honoring the case flag.
pub(crate) fn compile_regex(pattern: &str, case_insensitive: bool) -> Result<Regex, RuleError> {
    build_regex(pattern, pattern, case_insensitive)
}

/// Compiles `source`, reporting errors against the user's `pattern`.
fn build_regex(source: &str, pattern: &str, case_insensitive: bool) -> Result<Regex, RuleError> {
    RegexBuilder::new(source)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|e| RuleError::InvalidRegex {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}

fn match_text(condition: &Condition, haystack: &str, how: TextMatch) -> Result<bool, RuleError> {
    if condition.is_regex {
        let source = match how {
            TextMatch::Is => format!("^(?:{})$", condition.value),
            TextMatch::Starts => format!("^(?:{})", condition.value),
            TextMatch::Contains => condition.value.clone(),
        };
        let regex = build_regex(&source, &condition.value, condition.case_insensitive)?;
        return Ok(regex.is_match(haystack));
    }

    let (haystack, needle) = if condition.case_insensitive {
        (haystack.to_lowercase(), condition.value.to_lowercase())
    } else {
        (haystack.to_string(), condition.value.clone())
    };

    Ok(match how {
        TextMatch::Is => haystack == needle,
        TextMatch::Starts => haystack.starts_with(&needle),
        TextMatch::Contains => haystack.contains(&needle),
    })
}

fn name_is(c: &Condition, d: &Document) -> Result<bool, RuleError> {
    match_text(c, &d.name, TextMatch::Is)
}

fn name_starts(c: &Condition, d: &Document) -> Result<bool, RuleError> {
    match_text(c, &d.name, TextMatch::Starts)
}

fn name_contains(c: &Condition, d: &Document) -> Result<bool, RuleError> {
    match_text(c, &d.name, TextMatch::Contains)
}

fn description_is(c: &Condition, d: &Document) -> Result<bool, RuleError> {
    match_text(c, &d.description, TextMatch::Is)
}

fn description_starts(c: &Condition, d: &Document) -> Result<bool, RuleError> {
    match_text(c, &d.description, TextMatch::Starts)
}

fn description_contains(c: &Condition, d: &Document) -> Result<bool, RuleError> {
    match_text(c, &d.description, TextMatch::Contains)
}

fn content_is(c: &Condition, d: &Document) -> Result<bool, RuleError> {
    match_text(c, &d.content, TextMatch::Is)
}

fn content_starts(c: &Condition, d: &Document) -> Result<bool, RuleError> {
    match_text(c, &d.content, TextMatch::Starts)
}

fn content_contains(c: &Condition, d: &Document) -> Result<bool, RuleError> {
    match_text(c, &d.content, TextMatch::Contains)
}

pub(crate) fn parse_date(value: &str, format: &str) -> Result<NaiveDate, RuleError> {
    NaiveDate::parse_from_str(value.trim(), format).map_err(|_| RuleError::InvalidDate {
        value: value.to_string(),
        format: format.to_string(),
    })
}

fn date_is(c: &Condition, d: &Document) -> Result<bool, RuleError> {
    Ok(d.date.date_naive() == parse_date(&c.value, c.date_format())?)
}

fn date_after(c: &Condition, d: &Document) -> Result<bool, RuleError> {
    Ok(d.date.date_naive() > parse_date(&c.value, c.date_format())?)
}

fn date_before(c: &Condition, d: &Document) -> Result<bool, RuleError> {
    Ok(d.date.date_naive() < parse_date(&c.value, c.date_format())?)
}

fn metadata_has_key(c: &Condition, d: &Document) -> Result<bool, RuleError> {
    let key = c
        .metadata_key
        .ok_or_else(|| RuleError::MissingMetadataKey(c.kind.to_string()))?;
    Ok(d.metadata().iter().any(|m| m.key_id == key))
}

fn metadata_has_key_value(c: &Condition, d: &Document) -> Result<bool, RuleError> {
    let (key, value) = match (c.metadata_key, c.metadata_value) {
        (Some(k), Some(v)) => (k, v),
        _ => return Err(RuleError::MissingMetadataValue(c.kind.to_string())),
    };
    Ok(d
        .metadata()
        .iter()
        .any(|m| m.key_id == key && m.value_id == value))
}

pub(crate) fn parse_count(value: &str) -> Result<usize, RuleError> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|_| RuleError::InvalidNumber(value.to_string()))
}

fn metadata_count(c: &Condition, d: &Document) -> Result<bool, RuleError> {
    Ok(d.metadata().len() == parse_count(&c.value)?)
}

fn metadata_count_less_than(c: &Condition, d: &Document) -> Result<bool, RuleError> {
    Ok(d.metadata().len() < parse_count(&c.value)?)
}

fn metadata_count_more_than(c: &Condition, d: &Document) -> Result<bool, RuleError> {
    Ok(d.metadata().len() > parse_count(&c.value)?)
}

/// Evaluators shipped with the engine.
pub fn builtin() -> Vec<(ConditionKind, ConditionFn)> {
    vec![
        (ConditionKind::NameIs, name_is as ConditionFn),
        (ConditionKind::NameStarts, name_starts as ConditionFn),
        (ConditionKind::NameContains, name_contains as ConditionFn),
        (ConditionKind::DescriptionIs, description_is as ConditionFn),
        (ConditionKind::DescriptionStarts, description_starts as ConditionFn),
        (ConditionKind::DescriptionContains, description_contains as ConditionFn),
        (ConditionKind::ContentIs, content_is as ConditionFn),
        (ConditionKind::ContentStarts, content_starts as ConditionFn),
        (ConditionKind::ContentContains, content_contains as ConditionFn),
        (ConditionKind::DateIs, date_is as ConditionFn),
        (ConditionKind::DateAfter, date_after as ConditionFn),
        (ConditionKind::DateBefore, date_before as ConditionFn),
        (ConditionKind::MetadataHasKey, metadata_has_key as ConditionFn),
        (ConditionKind::MetadataHasKeyValue, metadata_has_key_value as ConditionFn),
        (ConditionKind::MetadataCount, metadata_count as ConditionFn),
        (ConditionKind::MetadataCountLessThan, metadata_count_less_than as ConditionFn),
        (ConditionKind::MetadataCountMoreThan, metadata_count_more_than as ConditionFn),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Metadata;
    use chrono::{TimeZone, Utc};

    fn doc() -> Document {
        let mut doc = Document::new(1, "Invoice ACME.pdf", "application/pdf");
        doc.name = "Invoice ACME".to_string();
        doc.description = "monthly bill".to_string();
        doc.content = "Acme Corp\nInvoice number 2024-001\nTotal due: 120 EUR".to_string();
        doc.date = Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap();
        doc.metadata = Some(vec![Metadata::new(1, 10), Metadata::new(2, 20)]);
        doc
    }

    fn cond(kind: ConditionKind, value: &str) -> Condition {
        Condition::new(kind, value)
    }

    #[test]
    fn test_literal_text_matches() {
        let d = doc();
        assert!(name_is(&cond(ConditionKind::NameIs, "Invoice ACME"), &d).unwrap());
        assert!(!name_is(&cond(ConditionKind::NameIs, "invoice acme"), &d).unwrap());
        assert!(name_starts(&cond(ConditionKind::NameStarts, "Invoice"), &d).unwrap());
        assert!(content_contains(&cond(ConditionKind::ContentContains, "Total due"), &d).unwrap());
        assert!(!description_starts(&cond(ConditionKind::DescriptionStarts, "bill"), &d).unwrap());
    }

    #[test]
    fn test_case_insensitive_literal() {
        let d = doc();
        let mut c = cond(ConditionKind::NameIs, "invoice acme");
        c.case_insensitive = true;
        assert!(name_is(&c, &d).unwrap());
    }

    #[test]
    fn test_regex_text_matches() {
        let d = doc();
        let mut c = cond(ConditionKind::ContentContains, r"\d{4}-\d{3}");
        c.is_regex = true;
        assert!(content_contains(&c, &d).unwrap());

        let mut c = cond(ConditionKind::NameIs, "invoice.*");
        c.is_regex = true;
        assert!(!name_is(&c, &d).unwrap());
        c.case_insensitive = true;
        assert!(name_is(&c, &d).unwrap());

        // Anchored: "ACME" alone is not the whole name.
        let mut c = cond(ConditionKind::NameIs, "ACME");
        c.is_regex = true;
        assert!(!name_is(&c, &d).unwrap());
    }

    #[test]
    fn test_invalid_regex_is_error() {
        let mut c = cond(ConditionKind::ContentContains, "(unclosed");
        c.is_regex = true;
        match content_contains(&c, &doc()) {
            Err(RuleError::InvalidRegex { pattern, .. }) => assert_eq!(pattern, "(unclosed"),
            other => panic!("expected InvalidRegex, got {:?}", other),
        }
    }

    #[test]
    fn test_anchored_regex_error_names_user_pattern() {
        let mut c = Condition::new(ConditionKind::NameIs, "(unclosed");
        c.is_regex = true;
        match name_is(&c, &doc()) {
            Err(RuleError::InvalidRegex { pattern, .. }) => assert_eq!(pattern, "(unclosed"),
            other => panic!("expected InvalidRegex, got {:?}", other),
        }

        // Alternation is grouped before anchoring.
        let mut c = Condition::new(ConditionKind::NameIs, "Invoice|x");
        c.is_regex = true;
        assert!(!name_is(&c, &doc()).unwrap());
        c.value = "Invoice ACME|x".to_string();
        assert!(name_is(&c, &doc()).unwrap());
    }

    #[test]
    fn test_date_comparisons() {
        let d = doc();
        assert!(date_is(&cond(ConditionKind::DateIs, "2024-03-15"), &d).unwrap());
        assert!(date_after(&cond(ConditionKind::DateAfter, "2024-01-01"), &d).unwrap());
        assert!(!date_before(&cond(ConditionKind::DateBefore, "2024-01-01"), &d).unwrap());

        let mut c = cond(ConditionKind::DateIs, "15.03.2024");
        c.date_format = Some("%d.%m.%Y".to_string());
        assert!(date_is(&c, &d).unwrap());

        assert!(matches!(
            date_is(&cond(ConditionKind::DateIs, "15.03.2024"), &d),
            Err(RuleError::InvalidDate { .. })
        ));
    }

    #[test]
    fn test_metadata_predicates() {
        let d = doc();
        let mut c = cond(ConditionKind::MetadataHasKey, "");
        c.metadata_key = Some(2);
        assert!(metadata_has_key(&c, &d).unwrap());
        c.metadata_key = Some(3);
        assert!(!metadata_has_key(&c, &d).unwrap());

        let mut c = cond(ConditionKind::MetadataHasKeyValue, "");
        c.metadata_key = Some(1);
        c.metadata_value = Some(10);
        assert!(metadata_has_key_value(&c, &d).unwrap());
        c.metadata_value = Some(11);
        assert!(!metadata_has_key_value(&c, &d).unwrap());

        let c = cond(ConditionKind::MetadataHasKey, "");
        assert!(matches!(
            metadata_has_key(&c, &d),
            Err(RuleError::MissingMetadataKey(_))
        ));
    }

    #[test]
    fn test_metadata_counts() {
        let d = doc();
        assert!(metadata_count(&cond(ConditionKind::MetadataCount, "2"), &d).unwrap());
        assert!(metadata_count_less_than(&cond(ConditionKind::MetadataCountLessThan, "3"), &d)
            .unwrap());
        assert!(!metadata_count_more_than(&cond(ConditionKind::MetadataCountMoreThan, "2"), &d)
            .unwrap());
        assert!(matches!(
            metadata_count(&cond(ConditionKind::MetadataCount, "two"), &d),
            Err(RuleError::InvalidNumber(_))
        ));
    }

    #[test]
    fn test_unhydrated_metadata_counts_as_empty() {
        let mut d = doc();
        d.metadata = None;
        assert!(metadata_count(&cond(ConditionKind::MetadataCount, "0"), &d).unwrap());
    }

    #[test]
    fn test_builtin_covers_every_kind() {
        let kinds: Vec<_> = builtin().into_iter().map(|(k, _)| k).collect();
        for kind in ConditionKind::ALL {
            assert!(kinds.contains(kind), "missing evaluator for {}", kind);
        }
    }
}
