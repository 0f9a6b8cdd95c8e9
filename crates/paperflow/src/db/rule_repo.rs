//! Rule repository: `rules` with their ordered conditions and actions.

use rusqlite::{params, Connection, Row};

use crate::rules::{validate_rule, Action, ActionKind, Condition, ConditionKind, Rule, RuleMode};
use crate::store::StoreResult;

use super::{parse_column, Database, DatabaseError};

/// Validates and inserts a rule with its conditions and actions.
/// Returns the new rule id.
pub fn insert(db: &Database, rule: &Rule) -> StoreResult<i64> {
    validate_rule(rule)?;

    let id = db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO rules (user_id, name, description, enabled, rule_order, mode)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                rule.user_id,
                rule.name,
                rule.description,
                rule.enabled,
                rule.order,
                rule.mode.as_str()
            ],
        )?;
        let rule_id = tx.last_insert_rowid();

        for (position, c) in rule.conditions.iter().enumerate() {
            tx.execute(
                "INSERT INTO rule_conditions (rule_id, position, kind, value, enabled,
                 case_insensitive, inverted, is_regex, date_format, metadata_key, metadata_value)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    rule_id,
                    position as i64,
                    c.kind.as_str(),
                    c.value,
                    c.enabled,
                    c.case_insensitive,
                    c.inverted,
                    c.is_regex,
                    c.date_format,
                    c.metadata_key,
                    c.metadata_value
                ],
            )?;
        }

        for (position, a) in rule.actions.iter().enumerate() {
            tx.execute(
                "INSERT INTO rule_actions (rule_id, position, kind, value, enabled,
                 on_condition, metadata_key, metadata_value)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    rule_id,
                    position as i64,
                    a.kind.as_str(),
                    a.value,
                    a.enabled,
                    a.on_condition,
                    a.metadata_key,
                    a.metadata_value
                ],
            )?;
        }

        tx.commit()?;
        Ok(rule_id)
    })?;

    log::debug!("Saved rule {} '{}' for user {}", id, rule.name, rule.user_id);
    Ok(id)
}

pub fn set_enabled(db: &Database, rule_id: i64, enabled: bool) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE rules SET enabled = ?2 WHERE id = ?1",
            params![rule_id, enabled],
        )?;
        Ok(changed > 0)
    })
}

pub fn delete(db: &Database, rule_id: i64) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute("DELETE FROM rules WHERE id = ?1", params![rule_id])?;
        Ok(changed > 0)
    })
}

fn rule_from_row(row: &Row<'_>) -> Result<Rule, rusqlite::Error> {
    let mode: String = row.get(6)?;
    Ok(Rule {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        enabled: row.get(4)?,
        order: row.get(5)?,
        mode: parse_column::<RuleMode>(6, &mode)?,
        conditions: Vec::new(),
        actions: Vec::new(),
    })
}

fn condition_from_row(row: &Row<'_>) -> Result<Condition, rusqlite::Error> {
    let kind: String = row.get(1)?;
    Ok(Condition {
        id: row.get(0)?,
        kind: parse_column::<ConditionKind>(1, &kind)?,
        value: row.get(2)?,
        enabled: row.get(3)?,
        case_insensitive: row.get(4)?,
        inverted: row.get(5)?,
        is_regex: row.get(6)?,
        date_format: row.get(7)?,
        metadata_key: row.get(8)?,
        metadata_value: row.get(9)?,
    })
}

fn action_from_row(row: &Row<'_>) -> Result<Action, rusqlite::Error> {
    let kind: String = row.get(1)?;
    Ok(Action {
        id: row.get(0)?,
        kind: parse_column::<ActionKind>(1, &kind)?,
        value: row.get(2)?,
        enabled: row.get(3)?,
        on_condition: row.get(4)?,
        metadata_key: row.get(5)?,
        metadata_value: row.get(6)?,
    })
}

fn load_children(conn: &Connection, rule: &mut Rule) -> Result<(), DatabaseError> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, kind, value, enabled, case_insensitive, inverted, is_regex, date_format,
         metadata_key, metadata_value
         FROM rule_conditions WHERE rule_id = ?1 ORDER BY position",
    )?;
    rule.conditions = stmt
        .query_map(params![rule.id], condition_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare_cached(
        "SELECT id, kind, value, enabled, on_condition, metadata_key, metadata_value
         FROM rule_actions WHERE rule_id = ?1 ORDER BY position",
    )?;
    rule.actions = stmt
        .query_map(params![rule.id], action_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(())
}

/// Enabled rules of the user, lowest order first.
pub fn active_for_user(db: &Database, user_id: i64) -> Result<Vec<Rule>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, user_id, name, description, enabled, rule_order, mode
             FROM rules WHERE user_id = ?1 AND enabled = 1 ORDER BY rule_order",
        )?;
        let mut rules = stmt
            .query_map(params![user_id], rule_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        for rule in &mut rules {
            load_children(conn, rule)?;
        }
        Ok(rules)
    })
}
