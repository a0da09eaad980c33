use chrono::{DateTime, Utc};
use serde_derive::Serialize;

use crate::{driver::DriverState, job_poller::PrintJob, printer::PrinterDescriptor};

/// Live view of one printer's test run, as published on the status feed.
#[derive(Debug, Clone, Serialize)]
pub struct PrinterStatus {
    pub name: String,
    pub queue_name: String,
    pub usb_id: String,
    pub usb_location: String,
    pub state: DriverState,
    pub cycle: u32,
    pub jobs_completed: u32,
    pub jobs_failed: u32,
    pub last_job: Option<PrintJob>,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<&PrinterDescriptor> for PrinterStatus {
    fn from(printer: &PrinterDescriptor) -> Self {
        PrinterStatus {
            name: printer.name.clone(),
            queue_name: printer.queue_name.clone(),
            usb_id: printer.identity.to_string(),
            usb_location: printer.usb_location.clone(),
            state: DriverState::Idle,
            cycle: 0,
            jobs_completed: 0,
            jobs_failed: 0,
            last_job: None,
            last_error: None,
            updated_at: Utc::now(),
        }
    }
}
