pub mod handler;
pub mod manager;
pub mod policy;
pub mod status;
mod executor;

pub use handler::{DocumentHandler, DocumentOutcome};
pub use manager::{Dispatch, Manager};
pub use policy::{LeastBusy, SchedulingPolicy, WorkerLoad};
pub use status::{CurrentDocument, ProcessingStatus, WorkerStatus};
