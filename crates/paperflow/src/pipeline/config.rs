use std::path::PathBuf;

use crate::config::Config;

/// Settings the per-document pipeline reads while running steps.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub data_directory: PathBuf,
    pub language_enabled: bool,
    pub language_max_chars: usize,
    pub thumbnail_width: u32,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            data_directory: config.data_dir(),
            language_enabled: config.language.enabled,
            language_max_chars: config.language.max_chars,
            thumbnail_width: config.thumbnail.width,
        }
    }
}
