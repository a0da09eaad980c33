pub mod client;
pub mod models;

pub use client::{CupsCli, CupsError, Spooler};
pub use models::{JobId, JobStatus, QueueRequest};
