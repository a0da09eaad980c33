mod state;


use std::{sync::Arc, time::Duration};

use backon::{BlockingRetryable, ExponentialBuilder};
use humantime::format_duration;
use log::{debug, error, info, warn};
use snafu::Snafu;

use crate::{
    clock::{Clock, StopSignal},
    config::models::Settings,
    cups_client::Spooler,
    images::{TestImage, TestImageSet},
    job_poller::{JobPoller, PrintJob},
    monitor::ConnectivityMonitor,
    printer::{ModelFamily, PrinterDescriptor},
    registrar::{Registrar, RegistrationError},
    status::StatusStore,
    usb::UsbInventory,
};

pub use state::DriverState;

/// `-o` flags passed to the spooler, per printer family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintOptions {
    pub canon: Vec<String>,
    pub dnp: Vec<String>,
}

impl PrintOptions {
    pub fn for_family(&self, family: ModelFamily) -> &[String] {
        match family {
            ModelFamily::Canon => &self.canon,
            ModelFamily::Dnp => &self.dnp,
        }
    }
}

impl Default for PrintOptions {
    fn default() -> Self {
        let owned = |options: &[&str]| options.iter().map(|option| option.to_string()).collect();
        Self {
            canon: owned(&["fit-to-page", "media=4x6", "ColorModel=RGB", "quality=5"]),
            dnp: owned(&["media=w288h432", "fit-to-page"]),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub location: String,
    pub poll_interval: Duration,
    pub job_timeout: Duration,
    pub print_delay: Duration,
    pub cycle_delay: Duration,
    /// Wait before the first retry of an image, doubled for every further one.
    pub retry_delay: Duration,
    /// Attempts per image, the first one included.
    pub max_attempts: usize,
    pub options: PrintOptions,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            location: "PRig Test Rig".to_owned(),
            poll_interval: Duration::from_secs(2),
            job_timeout: Duration::from_secs(120),
            print_delay: Duration::from_secs(5),
            cycle_delay: Duration::from_secs(30),
            retry_delay: Duration::from_secs(5),
            max_attempts: 3,
            options: PrintOptions::default(),
        }
    }
}

impl DriverConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        let timing = &settings.timing;
        Self {
            location: settings.cups.location.clone(),
            poll_interval: timing.poll_interval,
            job_timeout: timing.job_timeout,
            print_delay: timing.print_delay,
            cycle_delay: timing.cycle_delay,
            retry_delay: timing.retry_delay,
            max_attempts: timing.max_attempts,
            options: PrintOptions { canon: settings.print.canon_options.clone(), dnp: settings.print.dnp_options.clone() },
        }
    }
}

/// Outcome of one driver run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub terminal: DriverState,
    /// Cycles started, the interrupted one included.
    pub cycles: u32,
    pub printed: u32,
    pub failed: u32,
}

enum CycleEnd {
    Completed,
    Interrupted(DriverState),
}

/// Why an image was given up on.
#[derive(Debug)]
enum AttemptError {
    Failed(PrintJob),
    Disconnected,
    Stopped,
}

/// Runs the print lifecycle of one printer until it is unplugged or a stop is requested.
pub struct PrintCycleDriver {
    spooler: Arc<dyn Spooler>,
    clock: Arc<dyn Clock>,
    registrar: Registrar,
    monitor: ConnectivityMonitor,
    poller: JobPoller,
    config: DriverConfig,
    status: StatusStore,
    stop: StopSignal,
}

impl PrintCycleDriver {
    pub fn new(
        spooler: Arc<dyn Spooler>,
        inventory: Arc<dyn UsbInventory>,
        clock: Arc<dyn Clock>,
        config: DriverConfig,
        status: StatusStore,
        stop: StopSignal,
    ) -> Self {
        Self {
            registrar: Registrar::new(spooler.clone(), config.location.clone()),
            monitor: ConnectivityMonitor::new(inventory),
            poller: JobPoller::new(spooler.clone(), clock.clone(), config.poll_interval, config.job_timeout),
            spooler,
            clock,
            config,
            status,
            stop,
        }
    }

    pub fn run(&self, printer: &PrinterDescriptor, images: &TestImageSet) -> Result<RunReport, DriverError> {
        self.status.printer_detected(printer);

        self.transition(printer, DriverState::Registering);
        if let Err(source) = self.registrar.register(printer) {
            error!("Aborting test run of {}: {source}", printer.name);
            self.status.record_error(&printer.identity, source.to_string());
            self.transition(printer, DriverState::Failed);
            sentry::capture_message(&format!("Could not register {}: {source}", printer.name), sentry::Level::Error);
            return Err(DriverError::Registration { printer: printer.name.clone(), source });
        }
        self.transition(printer, DriverState::Ready);

        let mut report = RunReport { terminal: DriverState::Ready, cycles: 0, printed: 0, failed: 0 };
        let terminal = loop {
            if self.stop.is_triggered() {
                break DriverState::Stopped;
            }

            report.cycles += 1;
            self.status.set_cycle(&printer.identity, report.cycles);
            self.transition(printer, DriverState::Printing);
            info!("Starting print cycle {} on {} with {} image(s)", report.cycles, printer.name, images.len());

            if let CycleEnd::Interrupted(state) = self.print_cycle(printer, images, &mut report) {
                break state;
            }

            self.transition(printer, DriverState::CycleWait);
            info!("Cycle {} on {} finished, next one in {}", report.cycles, printer.name, format_duration(self.config.cycle_delay));
            self.clock.sleep(self.config.cycle_delay);

            if self.stop.is_triggered() {
                break DriverState::Stopped;
            }
            if !self.monitor.is_connected(&printer.identity) {
                info!("Printer {} disconnected", printer.name);
                break DriverState::Disconnected;
            }
        };

        report.terminal = terminal;
        self.transition(printer, terminal);
        info!(
            "Test run of {} ended ({terminal}) after {} cycle(s): {} printed, {} failed",
            printer.name, report.cycles, report.printed, report.failed
        );
        Ok(report)
    }

    fn print_cycle(&self, printer: &PrinterDescriptor, images: &TestImageSet, report: &mut RunReport) -> CycleEnd {
        let options = self.config.options.for_family(printer.family);

        for image in images.iter() {
            match self.print_image(printer, image, options) {
                Ok(job) => {
                    self.status.record_job(&printer.identity, &job);
                    report.printed += 1;
                    debug!("Waiting {} before the next print", format_duration(self.config.print_delay));
                    self.clock.sleep(self.config.print_delay);
                }
                Err(AttemptError::Failed(job)) => {
                    error!("Giving up on {} for {} after {} attempt(s)", image.description, printer.name, self.attempts());
                    self.status.record_job(&printer.identity, &job);
                    self.status.record_error(&printer.identity, format!("{} failed: {:?}", image.description, job.outcome));
                    report.failed += 1;
                }
                Err(AttemptError::Disconnected) => {
                    info!("Printer {} disconnected during cycle {}", printer.name, report.cycles);
                    return CycleEnd::Interrupted(DriverState::Disconnected);
                }
                Err(AttemptError::Stopped) => return CycleEnd::Interrupted(DriverState::Stopped),
            }
        }

        CycleEnd::Completed
    }

    /// Prints one image, retrying failed jobs with growing waits.
    /// Connectivity and the stop signal are checked before every attempt.
    fn print_image(&self, printer: &PrinterDescriptor, image: &TestImage, options: &[String]) -> Result<PrintJob, AttemptError> {
        let queue = printer.queue_name.as_str();
        let attempts = self.attempts();
        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.config.retry_delay)
            .with_factor(2.0)
            .with_max_times(attempts - 1);
        let clock = self.clock.clone();
        let mut attempt = 0;

        (|| {
            attempt += 1;
            if self.stop.is_triggered() {
                return Err(AttemptError::Stopped);
            }
            if !self.monitor.is_connected(&printer.identity) {
                return Err(AttemptError::Disconnected);
            }

            info!("Printing {} on {} (attempt {attempt}/{attempts})", image.description, printer.name);
            let job = self.poller.submit(queue, &image.path, options);
            if job.succeeded() {
                Ok(job)
            } else {
                error!("Attempt {attempt}/{attempts} to print {} on {} failed: {:?}", image.description, printer.name, job.outcome);
                Err(AttemptError::Failed(job))
            }
        })
        .retry(backoff)
        .sleep(move |delay| clock.sleep(delay))
        .when(|e| matches!(e, AttemptError::Failed(_)))
        .notify(|_, delay| {
            if let Err(e) = self.spooler.cancel_jobs(queue) {
                warn!("Could not cancel stuck jobs on {queue}: {e}");
            }
            warn!("Retrying {} on {} in {}", image.description, printer.name, format_duration(delay));
        })
        .call()
    }

    fn attempts(&self) -> usize {
        self.config.max_attempts.max(1)
    }

    fn transition(&self, printer: &PrinterDescriptor, state: DriverState) {
        debug!("{} is now {state}", printer.name);
        self.status.set_state(&printer.identity, state);
    }
}

// ////// //
// Errors //
// ////// //

#[derive(Debug, Snafu)]
pub enum DriverError {
    #[snafu(display("Test run of {printer} aborted: {source}"))]
    Registration { printer: String, source: RegistrationError },
}
