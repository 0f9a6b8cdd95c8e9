use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaperflowError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Processing error: {0}")]
    Process(#[from] ProcessError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("Search index error: {0}")]
    Search(#[from] crate::search::SearchError),

    #[error("Failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Unsupported mimetype: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to read document '{path}': {source}")]
    ReadDocument {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to process PDF: {0}")]
    PdfProcessing(String),

    #[error("Failed to process DOCX: {0}")]
    DocxProcessing(String),

    #[error("Failed to process image: {0}")]
    ImageProcessing(String),

    #[error("OCR failed: {0}")]
    OcrFailed(String),

    #[error("Failed to run '{program}': {source}. Make sure it is installed.")]
    ToolMissing {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with {status}: {stderr}")]
    ToolFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("Failed to write scratch file '{path}': {source}")]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move file from '{from}' to '{to}': {source}")]
    MoveFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid content hash: '{0}'")]
    InvalidHash(String),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Processing manager is already running")]
    AlreadyRunning,

    #[error("Processing manager is not running")]
    NotRunning,

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Job store error: {0}")]
    Store(#[from] crate::store::StoreError),
}

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Unknown condition kind '{0}'")]
    UnknownCondition(String),

    #[error("Unknown action kind '{0}'")]
    UnknownAction(String),

    #[error("Unknown rule mode '{0}'")]
    UnknownMode(String),

    #[error("Invalid regular expression '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },

    #[error("Invalid date '{value}' for format '{format}'")]
    InvalidDate { value: String, format: String },

    #[error("Invalid number '{0}'")]
    InvalidNumber(String),

    #[error("'{0}' requires a metadata key")]
    MissingMetadataKey(String),

    #[error("'{0}' requires a metadata key and value")]
    MissingMetadataValue(String),

    #[error("No evaluator registered for '{0}'")]
    NotRegistered(String),
}

pub type Result<T> = std::result::Result<T, PaperflowError>;
