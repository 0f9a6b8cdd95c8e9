//! Metadata and tag repository.
//!
//! Key, value and tag CRUD lives with the owning application; these
//! functions cover what the pipeline reads and writes, plus inserts used
//! to seed data.

use rusqlite::{params, Connection, Row};

use crate::document::{Metadata, Tag};
use crate::rules::{AutoMatchValue, MatchType};

use super::{parse_column, Database, DatabaseError};

pub fn insert_key(db: &Database, user_id: i64, key: &str) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO metadata_keys (user_id, key) VALUES (?1, ?2)",
            params![user_id, key],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Inserts a value under `key_id`. `auto_match` enables automatic matching
/// with the given match type and filter.
pub fn insert_value(
    db: &Database,
    key_id: i64,
    value: &str,
    auto_match: Option<(MatchType, &str)>,
) -> Result<i64, DatabaseError> {
    let (match_documents, match_type, match_filter) = match auto_match {
        Some((kind, filter)) => (true, kind, filter),
        None => (false, MatchType::Exact, ""),
    };
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO metadata_values (key_id, value, match_documents, match_type, match_filter)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                key_id,
                value,
                match_documents,
                match_type.as_str(),
                match_filter
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

pub fn insert_tag(db: &Database, user_id: i64, key: &str) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO tags (user_id, key) VALUES (?1, ?2)",
            params![user_id, key],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

pub fn attach_tag(db: &Database, document_id: &str, tag_id: i64) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT OR IGNORE INTO document_tags (document_id, tag_id) VALUES (?1, ?2)",
            params![document_id, tag_id],
        )?;
        Ok(())
    })
}

fn metadata_from_row(row: &Row<'_>) -> Result<Metadata, rusqlite::Error> {
    Ok(Metadata {
        key_id: row.get(0)?,
        key: row.get(1)?,
        value_id: row.get(2)?,
        value: row.get(3)?,
    })
}

/// Key/value pairs of the document with display names, ordered by key.
pub fn document_metadata(db: &Database, document_id: &str) -> Result<Vec<Metadata>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT k.id, k.key, v.id, v.value
             FROM document_metadata dm
             JOIN metadata_keys k ON k.id = dm.key_id
             JOIN metadata_values v ON v.id = dm.value_id
             WHERE dm.document_id = ?1
             ORDER BY k.key, v.value",
        )?;
        let rows = stmt
            .query_map(params![document_id], metadata_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn document_tags(db: &Database, document_id: &str) -> Result<Vec<Tag>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT t.id, t.key FROM document_tags dt
             JOIN tags t ON t.id = dt.tag_id
             WHERE dt.document_id = ?1
             ORDER BY t.key",
        )?;
        let rows = stmt
            .query_map(params![document_id], |r| {
                Ok(Tag {
                    id: r.get(0)?,
                    key: r.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Values of the user's keys flagged for automatic matching.
pub fn auto_match_values(db: &Database, user_id: i64) -> Result<Vec<AutoMatchValue>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT k.id, k.key, v.id, v.value, v.match_type, v.match_filter
             FROM metadata_values v
             JOIN metadata_keys k ON k.id = v.key_id
             WHERE k.user_id = ?1 AND v.match_documents = 1
             ORDER BY v.id",
        )?;
        let rows = stmt
            .query_map(params![user_id], |r| {
                let match_type: String = r.get(4)?;
                Ok(AutoMatchValue {
                    key_id: r.get(0)?,
                    key: r.get(1)?,
                    value_id: r.get(2)?,
                    value: r.get(3)?,
                    match_type: parse_column::<MatchType>(4, &match_type)?,
                    match_filter: r.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Replaces the document's key/value pairs in one transaction.
pub fn replace_document_metadata(
    db: &Database,
    document_id: &str,
    metadata: &[Metadata],
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        write_document_metadata(&tx, document_id, metadata)?;
        tx.commit()?;
        Ok(())
    })
}

/// Deletes and re-inserts the document's pairs on `conn`. Callers own the
/// transaction.
pub(crate) fn write_document_metadata(
    conn: &Connection,
    document_id: &str,
    metadata: &[Metadata],
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "DELETE FROM document_metadata WHERE document_id = ?1",
        params![document_id],
    )?;
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO document_metadata (document_id, key_id, value_id)
         VALUES (?1, ?2, ?3)",
    )?;
    for entry in metadata {
        stmt.execute(params![document_id, entry.key_id, entry.value_id])?;
    }
    Ok(())
}
