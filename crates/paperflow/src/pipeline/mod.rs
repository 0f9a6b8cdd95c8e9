pub mod config;
pub mod error;
pub mod progress;
pub mod runner;
pub mod step;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use progress::{BroadcastProgress, NoopProgress, ProcessingEvent, ProgressReporter};
pub use runner::{DocumentPipeline, PipelineStores, PROCESSING_ERROR_PREFIX};
pub use step::{JobStatus, ProcessItem, ProcessStep, RetryPolicy, PIPELINE_STEPS};
