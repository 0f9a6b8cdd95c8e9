//! Store traits backed by SQLite.

use crate::document::{Document, DocumentStatus, Metadata, Tag};
use crate::pipeline::step::{ProcessItem, ProcessStep};
use crate::rules::{AutoMatchValue, Rule};
use crate::store::{
    DocumentStore, JobStore, MetadataStore, RuleStore, StoreError, StoreResult,
};

use super::{document_repo, job_repo, metadata_repo, rule_repo, Database};

fn found(changed: bool, document_id: &str) -> StoreResult<()> {
    if changed {
        Ok(())
    } else {
        Err(StoreError::not_found("document", document_id))
    }
}

impl JobStore for Database {
    fn add_document(&self, document_id: &str) -> StoreResult<()> {
        Ok(job_repo::add_document(self, document_id)?)
    }

    fn get_document_pending_steps(&self, document_id: &str) -> StoreResult<Vec<ProcessItem>> {
        Ok(job_repo::pending_steps(self, document_id)?)
    }

    fn start_process_item(&self, item: &ProcessItem) -> StoreResult<()> {
        Ok(job_repo::mark_running(self, item)?)
    }

    fn mark_processing_done(
        &self,
        item: &ProcessItem,
        succeeded: bool,
        message: Option<&str>,
    ) -> StoreResult<()> {
        Ok(job_repo::mark_done(self, item, succeeded, message)?)
    }

    fn clear_process_item(&self, item: &ProcessItem) -> StoreResult<()> {
        Ok(job_repo::delete_item(self, item)?)
    }

    fn requeue_process_item(&self, item: &ProcessItem) -> StoreResult<()> {
        Ok(job_repo::requeue(self, item)?)
    }

    fn cancel_running_processes(&self) -> StoreResult<usize> {
        Ok(job_repo::reset_running(self)?)
    }

    fn get_documents_pending_processing(&self, limit: usize) -> StoreResult<Vec<String>> {
        Ok(job_repo::documents_pending(self, limit)?)
    }

    fn force_process_document(&self, document_id: &str, from: ProcessStep) -> StoreResult<()> {
        if document_repo::find_by_id(self, document_id)?.is_none() {
            return Err(StoreError::not_found("document", document_id));
        }
        Ok(job_repo::force_from(self, document_id, from)?)
    }

    fn cancel_document_processing(&self, document_id: &str) -> StoreResult<()> {
        job_repo::delete_for_document(self, document_id)?;
        Ok(())
    }
}

impl DocumentStore for Database {
    fn get_document(&self, document_id: &str) -> StoreResult<Document> {
        document_repo::find_by_id(self, document_id)?
            .ok_or_else(|| StoreError::not_found("document", document_id))
    }

    fn update(&self, document: &Document) -> StoreResult<()> {
        found(document_repo::update(self, document)?, &document.id)
    }

    fn update_with_metadata(&self, document: &Document) -> StoreResult<()> {
        found(
            document_repo::update_with_metadata(self, document, document.metadata())?,
            &document.id,
        )
    }

    fn set_document_content(&self, document_id: &str, content: &str) -> StoreResult<()> {
        found(document_repo::set_content(self, document_id, content)?, document_id)
    }

    fn set_status(&self, document_id: &str, status: DocumentStatus) -> StoreResult<()> {
        found(document_repo::set_status(self, document_id, status)?, document_id)
    }
}

impl MetadataStore for Database {
    fn get_document_metadata(&self, document_id: &str) -> StoreResult<Vec<Metadata>> {
        Ok(metadata_repo::document_metadata(self, document_id)?)
    }

    fn get_document_tags(&self, document_id: &str) -> StoreResult<Vec<Tag>> {
        Ok(metadata_repo::document_tags(self, document_id)?)
    }

    fn get_auto_match_values(&self, user_id: i64) -> StoreResult<Vec<AutoMatchValue>> {
        Ok(metadata_repo::auto_match_values(self, user_id)?)
    }

    fn update_document_metadata(
        &self,
        document_id: &str,
        metadata: &[Metadata],
    ) -> StoreResult<()> {
        Ok(metadata_repo::replace_document_metadata(
            self,
            document_id,
            metadata,
        )?)
    }
}

impl RuleStore for Database {
    fn get_active_user_rules(&self, user_id: i64) -> StoreResult<Vec<Rule>> {
        Ok(rule_repo::active_for_user(self, user_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_document_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.get_document("nope"),
            Err(StoreError::NotFound { entity: "document", .. })
        ));
        assert!(matches!(
            db.set_status("nope", DocumentStatus::Ready),
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            db.force_process_document("nope", ProcessStep::Hash),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_crash_recovery_resurfaces_running_steps() {
        let db = Database::open_in_memory().unwrap();
        let doc = Document::new(1, "a.txt", "text/plain");
        document_repo::insert(&db, &doc).unwrap();
        JobStore::add_document(&db, &doc.id).unwrap();

        let hash = db.get_document_pending_steps(&doc.id).unwrap().remove(0);
        db.start_process_item(&hash).unwrap();
        assert_eq!(db.get_document_pending_steps(&doc.id).unwrap().len(), 5);

        assert_eq!(db.cancel_running_processes().unwrap(), 1);
        let pending = db.get_document_pending_steps(&doc.id).unwrap();
        assert_eq!(pending.len(), 6);
        assert_eq!(pending[0].step, ProcessStep::Hash);
        assert_eq!(
            db.get_documents_pending_processing(10).unwrap(),
            vec![doc.id.clone()]
        );
    }
}
