//! Document repository: the `documents` table.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::document::{Document, DocumentStatus, Metadata};

use super::metadata_repo;
use super::{format_timestamp, parse_column, parse_timestamp, Database, DatabaseError};

const COLUMNS: &str = "id, user_id, name, description, content, filename, hash, mimetype, size,
     date, lang, status, created_at, updated_at";

fn from_row(row: &Row<'_>) -> Result<Document, rusqlite::Error> {
    let date: String = row.get(9)?;
    let status: String = row.get(11)?;
    let created_at: String = row.get(12)?;
    let updated_at: String = row.get(13)?;

    Ok(Document {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        content: row.get(4)?,
        filename: row.get(5)?,
        hash: row.get(6)?,
        mimetype: row.get(7)?,
        size: row.get(8)?,
        date: parse_timestamp(9, &date)?,
        lang: row.get(10)?,
        status: parse_column::<DocumentStatus>(11, &status)?,
        metadata: None,
        tags: None,
        created_at: parse_timestamp(12, &created_at)?,
        updated_at: parse_timestamp(13, &updated_at)?,
    })
}

/// Inserts a new document row.
pub fn insert(db: &Database, doc: &Document) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            &format!(
                "INSERT INTO documents ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                COLUMNS
            ),
            params![
                doc.id,
                doc.user_id,
                doc.name,
                doc.description,
                doc.content,
                doc.filename,
                doc.hash,
                doc.mimetype,
                doc.size,
                format_timestamp(&doc.date),
                doc.lang,
                doc.status.as_str(),
                format_timestamp(&doc.created_at),
                format_timestamp(&doc.updated_at),
            ],
        )?;
        Ok(())
    })
}

/// Finds a document by id. Metadata and tags are left unhydrated.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<Document>, DatabaseError> {
    db.with_conn(|conn| {
        let doc = conn
            .query_row(
                &format!("SELECT {} FROM documents WHERE id = ?1", COLUMNS),
                params![id],
                from_row,
            )
            .optional()?;
        Ok(doc)
    })
}

/// Overwrites every scalar field except `id`, `user_id` and `created_at`.
/// Returns false when no row matched.
pub fn update(db: &Database, doc: &Document) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| Ok(update_row(conn, doc)?))
}

/// Writes the scalar fields and replaces the document's metadata pairs in
/// one transaction. Nothing is written when either part fails.
pub fn update_with_metadata(
    db: &Database,
    doc: &Document,
    metadata: &[Metadata],
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        if !update_row(&tx, doc)? {
            return Ok(false);
        }
        metadata_repo::write_document_metadata(&tx, &doc.id, metadata)?;
        tx.commit()?;
        Ok(true)
    })
}

fn update_row(conn: &Connection, doc: &Document) -> Result<bool, rusqlite::Error> {
    let changed = conn.execute(
        "UPDATE documents SET name = ?2, description = ?3, content = ?4, filename = ?5,
         hash = ?6, mimetype = ?7, size = ?8, date = ?9, lang = ?10, status = ?11,
         updated_at = ?12
         WHERE id = ?1",
        params![
            doc.id,
            doc.name,
            doc.description,
            doc.content,
            doc.filename,
            doc.hash,
            doc.mimetype,
            doc.size,
            format_timestamp(&doc.date),
            doc.lang,
            doc.status.as_str(),
            format_timestamp(&Utc::now()),
        ],
    )?;
    Ok(changed > 0)
}

pub fn set_content(db: &Database, id: &str, content: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE documents SET content = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, content, format_timestamp(&Utc::now())],
        )?;
        Ok(changed > 0)
    })
}

pub fn set_status(db: &Database, id: &str, status: DocumentStatus) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE documents SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status.as_str(), format_timestamp(&Utc::now())],
        )?;
        Ok(changed > 0)
    })
}

/// Deletes the document; job rows and metadata links cascade.
pub fn delete(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn sample(filename: &str) -> Document {
        let mut doc = Document::new(1, filename, "text/plain");
        doc.date = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        doc
    }

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        let doc = sample("notes.txt");
        insert(&db, &doc).unwrap();

        let found = find_by_id(&db, &doc.id).unwrap().unwrap();
        assert_eq!(found.filename, "notes.txt");
        assert_eq!(found.name, "notes");
        assert_eq!(found.status, DocumentStatus::Processing);
        assert_eq!(found.date, doc.date);
        assert!(found.metadata.is_none());
        assert!(found.tags.is_none());
    }

    #[test]
    fn test_find_nonexistent() {
        assert!(find_by_id(&test_db(), "missing").unwrap().is_none());
    }

    #[test]
    fn test_update_fields() {
        let db = test_db();
        let mut doc = sample("a.txt");
        insert(&db, &doc).unwrap();

        doc.name = "renamed".to_string();
        doc.hash = "abc".to_string();
        doc.lang = "eng".to_string();
        assert!(update(&db, &doc).unwrap());

        let found = find_by_id(&db, &doc.id).unwrap().unwrap();
        assert_eq!(found.name, "renamed");
        assert_eq!(found.hash, "abc");
        assert_eq!(found.lang, "eng");
    }

    #[test]
    fn test_update_with_metadata_writes_both() {
        let db = test_db();
        let mut doc = sample("d.txt");
        insert(&db, &doc).unwrap();
        let key = metadata_repo::insert_key(&db, 1, "vendor").unwrap();
        let value = metadata_repo::insert_value(&db, key, "ACME", None).unwrap();

        doc.name = "ACME bill".to_string();
        assert!(update_with_metadata(&db, &doc, &[Metadata::new(key, value)]).unwrap());

        assert_eq!(find_by_id(&db, &doc.id).unwrap().unwrap().name, "ACME bill");
        let pairs = metadata_repo::document_metadata(&db, &doc.id).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].value_id, value);
    }

    #[test]
    fn test_update_with_metadata_rolls_back_on_bad_pair() {
        let db = test_db();
        let mut doc = sample("e.txt");
        insert(&db, &doc).unwrap();
        let key = metadata_repo::insert_key(&db, 1, "vendor").unwrap();
        let value = metadata_repo::insert_value(&db, key, "ACME", None).unwrap();
        metadata_repo::replace_document_metadata(&db, &doc.id, &[Metadata::new(key, value)])
            .unwrap();

        doc.name = "renamed".to_string();
        assert!(update_with_metadata(&db, &doc, &[Metadata::new(9999, 9999)]).is_err());

        // Neither the row nor the previous pairs changed.
        assert_eq!(find_by_id(&db, &doc.id).unwrap().unwrap().name, "e");
        let pairs = metadata_repo::document_metadata(&db, &doc.id).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].value_id, value);

        assert!(!update_with_metadata(&db, &sample("ghost.txt"), &[]).unwrap());
    }

    #[test]
    fn test_content_and_status() {
        let db = test_db();
        let doc = sample("b.txt");
        insert(&db, &doc).unwrap();

        assert!(set_content(&db, &doc.id, "hello").unwrap());
        assert!(set_status(&db, &doc.id, DocumentStatus::Ready).unwrap());
        assert!(!set_status(&db, "missing", DocumentStatus::Ready).unwrap());

        let found = find_by_id(&db, &doc.id).unwrap().unwrap();
        assert_eq!(found.content, "hello");
        assert_eq!(found.status, DocumentStatus::Ready);
    }

    #[test]
    fn test_delete() {
        let db = test_db();
        let doc = sample("c.txt");
        insert(&db, &doc).unwrap();
        assert!(delete(&db, &doc.id).unwrap());
        assert!(find_by_id(&db, &doc.id).unwrap().is_none());
    }
}
