use std::sync::Arc;

use log::{debug, info, warn};
use snafu::{ResultExt, Snafu};

use crate::{
    cups_client::{CupsError, QueueRequest, Spooler},
    printer::PrinterDescriptor,
};

/// Creates (or re-creates) the spooler queue for a detected printer.
pub struct Registrar {
    spooler: Arc<dyn Spooler>,
    location: String,
}

impl Registrar {
    pub fn new(spooler: Arc<dyn Spooler>, location: impl Into<String>) -> Self {
        Self { spooler, location: location.into() }
    }

    pub fn queue_request(&self, printer: &PrinterDescriptor) -> QueueRequest {
        QueueRequest {
            name: printer.queue_name.clone(),
            device_uri: printer.device_uri.to_string(),
            driver: printer.driver.clone(),
            location: format!("{} - {}", self.location, printer.model),
            description: format!("Auto-detected {}", printer.model),
        }
    }

    /// Replaces any stale queue under the printer's name and leaves the new one enabled and accepting.
    /// Only the add-queue step is fatal, everything around it is best effort.
    pub fn register(&self, printer: &PrinterDescriptor) -> Result<(), RegistrationError> {
        let queue = printer.queue_name.as_str();
        info!("Setting up printer {} in CUPS as {queue}", printer.name);

        if let Err(e) = self.spooler.delete_queue(queue) {
            debug!("No previous queue {queue} removed: {e}");
        }
        if let Err(e) = self.spooler.cancel_jobs(queue) {
            debug!("No outstanding jobs canceled for {queue}: {e}");
        }

        self.spooler.add_queue(&self.queue_request(printer)).context(RegistrationFailedSnafu { queue })?;

        if let Err(e) = self.spooler.enable_queue(queue) {
            warn!("Could not enable {queue}: {e}");
        }
        if let Err(e) = self.spooler.accept_jobs(queue) {
            warn!("Could not make {queue} accept jobs: {e}");
        }

        self.heal(queue);

        info!("Printer {} configured successfully", printer.name);
        Ok(())
    }

    /// One retry each for a queue that came up disabled or rejecting jobs.
    fn heal(&self, queue: &str) {
        let status = match self.spooler.queue_status(queue) {
            Ok(status) => status,
            Err(e) => {
                warn!("Could not read status of {queue}: {e}");
                return;
            }
        };

        if !status.enabled {
            warn!("Queue {queue} is disabled after setup, enabling again");
            if let Err(e) = self.spooler.enable_queue(queue) {
                warn!("Could not enable {queue}: {e}");
            }
        }
        if !status.accepting {
            warn!("Queue {queue} is not accepting jobs after setup, accepting again");
            if let Err(e) = self.spooler.accept_jobs(queue) {
                warn!("Could not make {queue} accept jobs: {e}");
            }
        }
    }
}

// ////// //
// Errors //
// ////// //

#[derive(Debug, Snafu)]
pub enum RegistrationError {
    #[snafu(display("Failed to setup printer queue {queue} in CUPS: {source}"))]
    RegistrationFailed { queue: String, source: CupsError },
}
