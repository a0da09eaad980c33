pub mod models;

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;

use crate::{
    driver::DriverState,
    job_poller::PrintJob,
    printer::{PrinterDescriptor, PrinterIdentity},
};

pub use models::PrinterStatus;

/// Shared status of every printer run. Each driver only writes its own entry.
#[derive(Clone, Default)]
pub struct StatusStore {
    printers: Arc<DashMap<PrinterIdentity, PrinterStatus>>,
}

impl StatusStore {
    /// Starts a fresh entry, replacing whatever an earlier run of the same printer left behind.
    pub fn printer_detected(&self, printer: &PrinterDescriptor) {
        self.printers.insert(printer.identity.clone(), PrinterStatus::from(printer));
    }

    pub fn set_state(&self, identity: &PrinterIdentity, state: DriverState) {
        self.update(identity, |status| status.state = state);
    }

    pub fn set_cycle(&self, identity: &PrinterIdentity, cycle: u32) {
        self.update(identity, |status| status.cycle = cycle);
    }

    pub fn record_job(&self, identity: &PrinterIdentity, job: &PrintJob) {
        self.update(identity, |status| {
            if job.succeeded() {
                status.jobs_completed += 1;
            } else {
                status.jobs_failed += 1;
            }
            status.last_job = Some(job.clone());
        });
    }

    pub fn record_error(&self, identity: &PrinterIdentity, error: impl Into<String>) {
        let error = error.into();
        self.update(identity, |status| status.last_error = Some(error));
    }

    #[cfg(test)]
    pub fn get(&self, identity: &PrinterIdentity) -> Option<PrinterStatus> {
        self.printers.get(identity).map(|status| status.clone())
    }

    /// All entries, ordered by queue name.
    pub fn snapshot(&self) -> Vec<PrinterStatus> {
        let mut statuses: Vec<_> = self.printers.iter().map(|entry| entry.value().clone()).collect();
        statuses.sort_by(|a, b| a.queue_name.cmp(&b.queue_name));
        statuses
    }

    fn update(&self, identity: &PrinterIdentity, apply: impl FnOnce(&mut PrinterStatus)) {
        if let Some(mut status) = self.printers.get_mut(identity) {
            apply(status.value_mut());
            status.updated_at = Utc::now();
        }
    }
}
