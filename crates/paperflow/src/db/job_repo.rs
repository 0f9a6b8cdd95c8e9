//! Job repository: per-step records in the `process_queue` table.

use chrono::Utc;
use rusqlite::{params, Row};

use crate::pipeline::step::{JobStatus, ProcessItem, ProcessStep};

use super::{
    format_timestamp, parse_column, parse_optional_timestamp, parse_timestamp, Database,
    DatabaseError,
};

const COLUMNS: &str = "document_id, step, status, message, created_at, started_at, stopped_at";

fn from_row(row: &Row<'_>) -> Result<ProcessItem, rusqlite::Error> {
    let step: String = row.get(1)?;
    let status: String = row.get(2)?;
    let created_at: String = row.get(4)?;

    Ok(ProcessItem {
        document_id: row.get(0)?,
        step: parse_column::<ProcessStep>(1, &step)?,
        status: parse_column::<JobStatus>(2, &status)?,
        message: row.get(3)?,
        created_at: parse_timestamp(4, &created_at)?,
        started_at: parse_optional_timestamp(5, row.get(5)?)?,
        stopped_at: parse_optional_timestamp(6, row.get(6)?)?,
    })
}

fn sorted(mut items: Vec<ProcessItem>) -> Vec<ProcessItem> {
    items.sort_by_key(|item| item.step);
    items
}

fn insert_pending<I>(conn: &rusqlite::Connection, document_id: &str, steps: I) -> Result<(), DatabaseError>
where
    I: IntoIterator<Item = ProcessStep>,
{
    let now = format_timestamp(&Utc::now());
    let mut stmt = conn.prepare(
        "INSERT OR REPLACE INTO process_queue (document_id, step, status, message, created_at)
         VALUES (?1, ?2, 'pending', NULL, ?3)",
    )?;
    for step in steps {
        stmt.execute(params![document_id, step.as_str(), now])?;
    }
    Ok(())
}

/// Creates a pending row for every pipeline step of the document.
pub fn add_document(db: &Database, document_id: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        insert_pending(&tx, document_id, ProcessStep::all())?;
        tx.commit()?;
        Ok(())
    })
}

/// Every job row of the document, in pipeline order.
pub fn list_for_document(db: &Database, document_id: &str) -> Result<Vec<ProcessItem>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM process_queue WHERE document_id = ?1",
            COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![document_id], from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sorted(rows))
    })
}

/// Pending job rows of the document, in pipeline order.
pub fn pending_steps(db: &Database, document_id: &str) -> Result<Vec<ProcessItem>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM process_queue WHERE document_id = ?1 AND status = 'pending'",
            COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![document_id], from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sorted(rows))
    })
}

pub fn mark_running(db: &Database, item: &ProcessItem) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE process_queue SET status = 'running', started_at = ?3, stopped_at = NULL
             WHERE document_id = ?1 AND step = ?2",
            params![
                item.document_id,
                item.step.as_str(),
                format_timestamp(&Utc::now())
            ],
        )?;
        Ok(())
    })
}

pub fn mark_done(
    db: &Database,
    item: &ProcessItem,
    succeeded: bool,
    message: Option<&str>,
) -> Result<(), DatabaseError> {
    let status = if succeeded {
        JobStatus::Finished
    } else {
        JobStatus::Failed
    };
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE process_queue SET status = ?3, message = ?4, stopped_at = ?5
             WHERE document_id = ?1 AND step = ?2",
            params![
                item.document_id,
                item.step.as_str(),
                status.as_str(),
                message,
                format_timestamp(&Utc::now())
            ],
        )?;
        Ok(())
    })
}

pub fn delete_item(db: &Database, item: &ProcessItem) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "DELETE FROM process_queue WHERE document_id = ?1 AND step = ?2",
            params![item.document_id, item.step.as_str()],
        )?;
        Ok(())
    })
}

/// Returns the row to `pending` for a later attempt. The message is kept.
pub fn requeue(db: &Database, item: &ProcessItem) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE process_queue SET status = 'pending', started_at = NULL
             WHERE document_id = ?1 AND step = ?2",
            params![item.document_id, item.step.as_str()],
        )?;
        Ok(())
    })
}

/// Resets rows left `running` by an interrupted process.
pub fn reset_running(db: &Database) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let count = conn.execute(
            "UPDATE process_queue SET status = 'pending', started_at = NULL
             WHERE status = 'running'",
            [],
        )?;
        if count > 0 {
            log::info!("Reset {} interrupted job(s) to pending", count);
        }
        Ok(count)
    })
}

/// Distinct documents with pending rows, oldest first.
pub fn documents_pending(db: &Database, limit: usize) -> Result<Vec<String>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT document_id FROM process_queue WHERE status = 'pending'
             GROUP BY document_id ORDER BY MIN(created_at), document_id LIMIT ?1",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let ids = stmt
            .query_map(params![limit], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    })
}

/// Replaces the document's rows with pending rows from `from` onwards.
pub fn force_from(db: &Database, document_id: &str, from: ProcessStep) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM process_queue WHERE document_id = ?1",
            params![document_id],
        )?;
        insert_pending(&tx, document_id, from.from_step())?;
        tx.commit()?;
        Ok(())
    })
}

pub fn delete_for_document(db: &Database, document_id: &str) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let count = conn.execute(
            "DELETE FROM process_queue WHERE document_id = ?1",
            params![document_id],
        )?;
        Ok(count)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::document_repo;
    use crate::document::Document;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn new_document(db: &Database) -> String {
        let doc = Document::new(1, "file.txt", "text/plain");
        document_repo::insert(db, &doc).unwrap();
        doc.id
    }

    #[test]
    fn test_add_document_creates_all_steps_pending() {
        let db = test_db();
        let id = new_document(&db);
        add_document(&db, &id).unwrap();

        let steps: Vec<_> = pending_steps(&db, &id)
            .unwrap()
            .into_iter()
            .map(|i| i.step)
            .collect();
        assert_eq!(steps, ProcessStep::all().collect::<Vec<_>>());
    }

    #[test]
    fn test_running_rows_are_not_pending() {
        let db = test_db();
        let id = new_document(&db);
        add_document(&db, &id).unwrap();

        let first = pending_steps(&db, &id).unwrap().remove(0);
        mark_running(&db, &first).unwrap();

        let pending = pending_steps(&db, &id).unwrap();
        assert_eq!(pending.len(), 5);
        assert_eq!(pending[0].step, ProcessStep::Thumbnail);

        let all = list_for_document(&db, &id).unwrap();
        assert_eq!(all[0].status, JobStatus::Running);
        assert!(all[0].started_at.is_some());
    }

    #[test]
    fn test_mark_done_and_requeue_keeps_message() {
        let db = test_db();
        let id = new_document(&db);
        add_document(&db, &id).unwrap();

        let item = pending_steps(&db, &id).unwrap().remove(0);
        mark_running(&db, &item).unwrap();
        mark_done(&db, &item, false, Some("disk full")).unwrap();

        let row = list_for_document(&db, &id).unwrap().remove(0);
        assert_eq!(row.status, JobStatus::Failed);
        assert!(row.stopped_at.is_some());

        requeue(&db, &item).unwrap();
        let row = pending_steps(&db, &id).unwrap().remove(0);
        assert_eq!(row.step, ProcessStep::Hash);
        assert_eq!(row.message.as_deref(), Some("disk full"));
    }

    #[test]
    fn test_reset_running() {
        let db = test_db();
        let id = new_document(&db);
        add_document(&db, &id).unwrap();
        for item in pending_steps(&db, &id).unwrap().iter().take(2) {
            mark_running(&db, item).unwrap();
        }

        assert_eq!(reset_running(&db).unwrap(), 2);
        assert_eq!(pending_steps(&db, &id).unwrap().len(), 6);
        assert_eq!(reset_running(&db).unwrap(), 0);
    }

    #[test]
    fn test_documents_pending_is_distinct_and_limited() {
        let db = test_db();
        let a = new_document(&db);
        let b = new_document(&db);
        let c = new_document(&db);
        for id in [&a, &b, &c] {
            add_document(&db, id).unwrap();
        }
        let pending = documents_pending(&db, 10).unwrap();
        assert_eq!(pending.len(), 3);
        assert_eq!(documents_pending(&db, 2).unwrap().len(), 2);

        delete_for_document(&db, &b).unwrap();
        let pending = documents_pending(&db, 10).unwrap();
        assert!(!pending.contains(&b));
    }

    #[test]
    fn test_force_from_step() {
        let db = test_db();
        let id = new_document(&db);
        add_document(&db, &id).unwrap();
        for item in pending_steps(&db, &id).unwrap() {
            delete_item(&db, &item).unwrap();
        }
        assert!(list_for_document(&db, &id).unwrap().is_empty());

        force_from(&db, &id, ProcessStep::Rules).unwrap();
        let steps: Vec<_> = pending_steps(&db, &id)
            .unwrap()
            .into_iter()
            .map(|i| i.step)
            .collect();
        assert_eq!(steps, vec![ProcessStep::Rules, ProcessStep::FtsIndex]);
    }

    #[test]
    fn test_rows_cascade_with_document() {
        let db = test_db();
        let id = new_document(&db);
        add_document(&db, &id).unwrap();
        document_repo::delete(&db, &id).unwrap();
        assert!(list_for_document(&db, &id).unwrap().is_empty());
    }
}
