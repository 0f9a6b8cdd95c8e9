use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    /// Root of stored documents and thumbnails.
    pub data_directory: String,
    /// Defaults to `<data_directory>/paperflow.db`.
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub language: LanguageConfig,
    #[serde(default)]
    pub thumbnail: ThumbnailConfig,
    #[serde(default)]
    pub search: Option<SearchConfig>,
}

impl Config {
    /// Configuration with every section at its default.
    pub fn new(data_directory: impl Into<String>) -> Self {
        Self {
            version: "1.0".to_string(),
            data_directory: data_directory.into(),
            database_path: None,
            processing: ProcessingConfig::default(),
            ocr: OcrConfig::default(),
            tools: ToolsConfig::default(),
            language: LanguageConfig::default(),
            thumbnail: ThumbnailConfig::default(),
            search: None,
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_directory)
    }

    pub fn database_file(&self) -> PathBuf {
        match &self.database_path {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => self.data_dir().join("paperflow.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Capacity of each worker's inbound queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// How often the job store is re-checked for pending work.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Tick used to pull again after a completion or a skipped poll.
    #[serde(default = "default_idle_interval_ms")]
    pub idle_interval_ms: u64,
    /// Maximum documents fetched from the job store per pull.
    #[serde(default = "default_pull_batch_size")]
    pub pull_batch_size: usize,
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

fn default_queue_capacity() -> usize {
    3
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_idle_interval_ms() -> u64 {
    1000
}

fn default_pull_batch_size() -> usize {
    100
}

impl ProcessingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            queue_capacity: default_queue_capacity(),
            poll_interval_secs: default_poll_interval_secs(),
            idle_interval_ms: default_idle_interval_ms(),
            pull_batch_size: default_pull_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
    #[serde(default = "default_dpi")]
    pub dpi: u32,
}

fn default_true() -> bool {
    true
}

fn default_languages() -> Vec<String> {
    vec!["eng".to_string()]
}

fn default_dpi() -> u32 {
    300
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            languages: default_languages(),
            dpi: default_dpi(),
        }
    }
}

/// External programs, looked up on `PATH` unless given as absolute paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_tesseract")]
    pub tesseract: String,
    #[serde(default = "default_pdftoppm")]
    pub pdftoppm: String,
    #[serde(default = "default_pdfinfo")]
    pub pdfinfo: String,
    #[serde(default = "default_pandoc")]
    pub pandoc: String,
}

fn default_tesseract() -> String {
    "tesseract".to_string()
}

fn default_pdftoppm() -> String {
    "pdftoppm".to_string()
}

fn default_pdfinfo() -> String {
    "pdfinfo".to_string()
}

fn default_pandoc() -> String {
    "pandoc".to_string()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            tesseract: default_tesseract(),
            pdftoppm: default_pdftoppm(),
            pdfinfo: default_pdfinfo(),
            pandoc: default_pandoc(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Characters of cleaned content passed to the identifier.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

fn default_max_chars() -> usize {
    2000
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_chars: default_max_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailConfig {
    /// Width in pixels; height keeps the aspect ratio.
    #[serde(default = "default_thumbnail_width")]
    pub width: u32,
}

fn default_thumbnail_width() -> u32 {
    300
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            width: default_thumbnail_width(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub url: String,
    #[serde(default = "default_index")]
    pub index: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

fn default_index() -> String {
    "documents".to_string()
}

fn default_search_timeout() -> u64 {
    30
}
