use std::path::{Path, PathBuf};

use crate::config::schema::Config;
use crate::error::ConfigError;

/// `~/.paperflow/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".paperflow").join("config.json"))
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(invalid(format!(
            "Unsupported config version: {}",
            config.version
        )));
    }

    if config.data_directory.trim().is_empty() {
        return Err(invalid("data_directory must not be empty"));
    }

    let processing = &config.processing;
    if processing.worker_count == 0 {
        return Err(invalid("processing.worker_count must be at least 1"));
    }
    if processing.queue_capacity == 0 {
        return Err(invalid("processing.queue_capacity must be at least 1"));
    }
    if processing.poll_interval_secs == 0 {
        return Err(invalid("processing.poll_interval_secs must be at least 1"));
    }
    if processing.idle_interval_ms < 10 {
        return Err(invalid("processing.idle_interval_ms must be at least 10"));
    }
    if processing.pull_batch_size == 0 {
        return Err(invalid("processing.pull_batch_size must be at least 1"));
    }

    if !(72..=1200).contains(&config.ocr.dpi) {
        return Err(invalid(format!(
            "ocr.dpi must be between 72 and 1200, got {}",
            config.ocr.dpi
        )));
    }
    if config.ocr.enabled && config.ocr.languages.is_empty() {
        return Err(invalid("ocr.languages must list at least one language"));
    }

    for (name, program) in [
        ("tesseract", &config.tools.tesseract),
        ("pdftoppm", &config.tools.pdftoppm),
        ("pdfinfo", &config.tools.pdfinfo),
        ("pandoc", &config.tools.pandoc),
    ] {
        if program.trim().is_empty() {
            return Err(invalid(format!("tools.{} must not be empty", name)));
        }
    }

    if config.language.max_chars == 0 {
        return Err(invalid("language.max_chars must be at least 1"));
    }

    if config.thumbnail.width == 0 {
        return Err(invalid("thumbnail.width must be at least 1"));
    }

    if let Some(search) = &config.search {
        if !(search.url.starts_with("http://") || search.url.starts_with("https://")) {
            return Err(invalid(format!(
                "search.url must be an http(s) URL, got '{}'",
                search.url
            )));
        }
        if search.index.trim().is_empty() {
            return Err(invalid("search.index must not be empty"));
        }
    }

    Ok(())
}
