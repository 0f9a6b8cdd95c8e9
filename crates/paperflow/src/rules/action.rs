//! Built-in action mutators. Each one edits the in-memory document copy.

use chrono::{NaiveTime, TimeZone, Utc};

use crate::document::{Document, Metadata};
use crate::error::RuleError;

use super::condition::parse_date;
use super::model::{Action, ActionKind, DEFAULT_DATE_FORMAT};

pub type ActionFn = fn(&Action, &mut Document) -> Result<(), RuleError>;

fn name_set(a: &Action, d: &mut Document) -> Result<(), RuleError> {
    d.name = a.value.clone();
    Ok(())
}

fn name_append(a: &Action, d: &mut Document) -> Result<(), RuleError> {
    d.name.push_str(&a.value);
    Ok(())
}

fn description_set(a: &Action, d: &mut Document) -> Result<(), RuleError> {
    d.description = a.value.clone();
    Ok(())
}

fn description_append(a: &Action, d: &mut Document) -> Result<(), RuleError> {
    d.description.push_str(&a.value);
    Ok(())
}

fn date_set(a: &Action, d: &mut Document) -> Result<(), RuleError> {
    let date = parse_date(&a.value, DEFAULT_DATE_FORMAT)?;
    d.date = Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN));
    Ok(())
}

fn metadata_ids(a: &Action) -> Result<(i64, i64), RuleError> {
    match (a.metadata_key, a.metadata_value) {
        (Some(k), Some(v)) => Ok((k, v)),
        _ => Err(RuleError::MissingMetadataValue(a.kind.to_string())),
    }
}

fn metadata_add(a: &Action, d: &mut Document) -> Result<(), RuleError> {
    let (key, value) = metadata_ids(a)?;
    d.add_metadata(Metadata::new(key, value));
    Ok(())
}

fn metadata_remove(a: &Action, d: &mut Document) -> Result<(), RuleError> {
    let (key, value) = metadata_ids(a)?;
    d.remove_metadata(key, value);
    Ok(())
}

pub fn builtin() -> Vec<(ActionKind, ActionFn)> {
    vec![
        (ActionKind::NameSet, name_set as ActionFn),
        (ActionKind::NameAppend, name_append as ActionFn),
        (ActionKind::DescriptionSet, description_set as ActionFn),
        (ActionKind::DescriptionAppend, description_append as ActionFn),
        (ActionKind::DateSet, date_set as ActionFn),
        (ActionKind::MetadataAdd, metadata_add as ActionFn),
        (ActionKind::MetadataRemove, metadata_remove as ActionFn),
    ]
}
