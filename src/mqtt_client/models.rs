use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};

use crate::status::PrinterStatus;

// ////// //
// Status //
// ////// //

#[derive(Debug, Serialize, Deserialize)]
pub struct MqttRigStatus {
    pub printer_count: usize,
    pub printers: Vec<String>,
    pub prig_version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MqttPrinterStatus {
    pub name: String,
    pub queue_name: String,
    pub usb_id: String,
    pub usb_location: String,
    pub state: String,
    /// The run for this printer has ended.
    pub finished: bool,
    pub cycle: u32,
    pub jobs_completed: u32,
    pub jobs_failed: u32,
    pub last_job_id: Option<String>,
    pub last_job_outcome: Option<String>,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl MqttRigStatus {
    pub fn from_statuses(statuses: &[PrinterStatus]) -> Self {
        MqttRigStatus {
            printer_count: statuses.len(),
            printers: statuses.iter().map(|status| status.queue_name.clone()).collect(),
            prig_version: env!("CARGO_PKG_VERSION").to_owned(),
        }
    }
}

impl From<&PrinterStatus> for MqttPrinterStatus {
    fn from(status: &PrinterStatus) -> Self {
        MqttPrinterStatus {
            name: status.name.clone(),
            queue_name: status.queue_name.clone(),
            usb_id: status.usb_id.clone(),
            usb_location: status.usb_location.clone(),
            state: status.state.to_string(),
            finished: status.state.is_terminal(),
            cycle: status.cycle,
            jobs_completed: status.jobs_completed,
            jobs_failed: status.jobs_failed,
            last_job_id: status.last_job.as_ref().and_then(|job| job.job_id.as_ref()).map(|id| id.to_string()),
            last_job_outcome: status.last_job.as_ref().map(|job| format!("{:?}", job.outcome)),
            last_error: status.last_error.clone(),
            updated_at: status.updated_at,
        }
    }
}
