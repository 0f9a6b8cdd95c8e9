//! Processing daemon: runs the worker pool against the configured database
//! until interrupted.
//!
//! Usage: `paperflowd [CONFIG]`. Without an argument the config is read from
//! `PAPERFLOW_CONFIG` or `~/.paperflow/config.json`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};

use paperflow::config::default_config_path;
use paperflow::error::{ConfigError, StorageError};
use paperflow::logging::{self, LogFormat};
use paperflow::sanitize::redact_url;
use paperflow::{
    load_config, BroadcastProgress, Database, DocumentPipeline, HttpSearchIndex, Manager,
    NullIndex, PipelineStores, SearchIndex,
};

fn config_path() -> Result<PathBuf, ConfigError> {
    if let Some(arg) = std::env::args_os().nth(1) {
        return Ok(PathBuf::from(arg));
    }
    if let Some(env) = std::env::var_os("PAPERFLOW_CONFIG") {
        return Ok(PathBuf::from(env));
    }
    default_config_path().ok_or_else(|| ConfigError::Validation {
        message: "no config path given and home directory unknown".to_string(),
    })
}

fn run() -> paperflow::Result<()> {
    let path = config_path()?;
    let config = load_config(&path)?;
    info!("Loaded configuration from {}", path.display());

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir).map_err(|e| StorageError::CreateDirectory {
        path: data_dir.clone(),
        source: e,
    })?;

    let db = Database::open(&config.database_file())?;

    let search: Arc<dyn SearchIndex> = match &config.search {
        Some(search) => {
            info!(url = %redact_url(&search.url), index = %search.index, "Search indexing enabled");
            Arc::new(HttpSearchIndex::new(search)?)
        }
        None => {
            info!("Search indexing disabled");
            Arc::new(NullIndex)
        }
    };

    let progress = BroadcastProgress::default();
    let pipeline = DocumentPipeline::from_config(
        &config,
        PipelineStores::from_database(&db),
        search,
        Arc::new(progress.clone()),
    );
    let manager = Manager::new(
        config.processing.clone(),
        Arc::new(db.clone()),
        Arc::new(pipeline),
        progress,
    );

    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })?;

    manager.start()?;
    info!(
        "Running {} workers, queue capacity {}",
        config.processing.worker_count, config.processing.queue_capacity
    );

    let _ = shutdown_rx.recv();
    info!("Shutdown requested");
    manager.stop();
    Ok(())
}

fn main() -> ExitCode {
    let format = std::env::var("PAPERFLOW_LOG_FORMAT")
        .ok()
        .and_then(|v| v.parse::<LogFormat>().ok())
        .unwrap_or_default();
    if let Err(e) = logging::init(format) {
        eprintln!("{}", e);
    }

    info!("Starting paperflowd v{}", env!("CARGO_PKG_VERSION"));

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
