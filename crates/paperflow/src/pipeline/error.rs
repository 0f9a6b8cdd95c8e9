use std::path::PathBuf;

use thiserror::Error;

/// Failure of one pipeline step, recorded as the job's message.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{0}")]
    Process(#[from] crate::error::ProcessError),

    #[error("{0}")]
    Storage(#[from] crate::error::StorageError),

    #[error("{0}")]
    Store(#[from] crate::store::StoreError),

    #[error("{0}")]
    Rule(#[from] crate::error::RuleError),

    #[error("Search index update failed: {0}")]
    Search(#[from] crate::search::SearchError),

    #[error("Failed to create scratch directory under '{path}': {source}")]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
