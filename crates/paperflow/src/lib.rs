pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod language;
pub mod logging;
pub mod pipeline;
pub mod processor;
pub mod rules;
pub mod sanitize;
pub mod search;
pub mod storage;
pub mod store;
pub mod thumbnail;
pub mod worker;

pub use config::{load_config, Config};
pub use db::Database;
pub use document::{Document, DocumentStatus, Metadata, Tag};
pub use error::{
    ConfigError, PaperflowError, ProcessError, Result, RuleError, StorageError, WorkerError,
};
pub use pipeline::{BroadcastProgress, DocumentPipeline, PipelineStores, ProcessStep, ProcessingEvent};
pub use rules::{Evaluation, Rule, RuleEngine};
pub use search::{HttpSearchIndex, NullIndex, SearchIndex};
pub use worker::{Dispatch, Manager, ProcessingStatus};
