use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, error, info, warn};

use crate::{
    clock::{Clock, StopSignal},
    driver::{DriverState, PrintCycleDriver},
    images::ImageSupply,
    printer::{PrinterDescriptor, PrinterDetector, PrinterIdentity},
    status::StatusStore,
};

/// Watches the USB bus and keeps one driver thread per connected supported printer.
pub struct Supervisor {
    detector: PrinterDetector,
    images: Arc<dyn ImageSupply>,
    driver: Arc<PrintCycleDriver>,
    status: StatusStore,
    clock: Arc<dyn Clock>,
    stop: StopSignal,
    interval: Duration,
    active: HashMap<PrinterIdentity, JoinHandle<bool>>,
    /// Printers whose run failed fatally. Not retried until they leave the bus.
    failed: HashSet<PrinterIdentity>,
}

impl Supervisor {
    pub fn new(
        detector: PrinterDetector,
        images: Arc<dyn ImageSupply>,
        driver: PrintCycleDriver,
        status: StatusStore,
        clock: Arc<dyn Clock>,
        stop: StopSignal,
        interval: Duration,
    ) -> Self {
        Self {
            detector,
            images,
            driver: Arc::new(driver),
            status,
            clock,
            stop,
            interval,
            active: HashMap::new(),
            failed: HashSet::new(),
        }
    }

    /// Runs until the stop signal is raised, then waits for every driver to wind down.
    pub fn run(&mut self) {
        info!("Watching for supported printers every {}", humantime::format_duration(self.interval));

        while !self.stop.is_triggered() {
            self.poll_once();
            self.clock.sleep(self.interval);
        }

        info!("Stopping, waiting for {} printer run(s) to finish", self.active.len());
        self.join_all();
    }

    pub fn poll_once(&mut self) {
        self.reap(false);

        let printers = self.detector.connected_printers();
        let present: HashSet<_> = printers.iter().map(|printer| printer.identity.clone()).collect();
        self.failed.retain(|identity| {
            let still_there = present.contains(identity);
            if !still_there {
                debug!("Printer {identity} left the bus, it will be tested again when plugged back in");
            }
            still_there
        });

        for printer in printers {
            if self.stop.is_triggered() {
                break;
            }
            if self.active.contains_key(&printer.identity) || self.failed.contains(&printer.identity) {
                continue;
            }
            self.spawn(printer);
        }
    }

    fn spawn(&mut self, printer: PrinterDescriptor) {
        info!("Found printer {} at {}", printer.name, printer.usb_location);

        let identity = printer.identity.clone();
        let images = self.images.clone();
        let driver = self.driver.clone();
        let status = self.status.clone();

        let spawned = thread::Builder::new()
            .name(printer.queue_name.clone())
            .spawn(move || test_printer(&printer, images.as_ref(), &driver, &status));

        match spawned {
            Ok(handle) => {
                self.active.insert(identity, handle);
            }
            Err(e) => error!("Could not start test run for {identity}: {e}"),
        }
    }

    fn reap(&mut self, wait: bool) {
        let done: Vec<_> = self.active.iter().filter(|(_, handle)| wait || handle.is_finished()).map(|(identity, _)| identity.clone()).collect();

        for identity in done {
            let Some(handle) = self.active.remove(&identity) else { continue };
            match handle.join() {
                Ok(true) => debug!("Test run for {identity} finished"),
                Ok(false) => {
                    warn!("Test run for {identity} failed, waiting for the printer to be replugged");
                    self.failed.insert(identity);
                }
                Err(_) => {
                    error!("Test run for {identity} panicked");
                    self.failed.insert(identity);
                }
            }
        }
    }

    fn join_all(&mut self) {
        self.reap(true);
    }
}

/// One printer's whole run. Returns `false` when it ended in a fatal failure.
fn test_printer(printer: &PrinterDescriptor, images: &dyn ImageSupply, driver: &PrintCycleDriver, status: &StatusStore) -> bool {
    let images = match images.supply(printer) {
        Ok(images) => images,
        Err(e) => {
            error!("Cannot test {}: {e}", printer.name);
            status.printer_detected(printer);
            status.record_error(&printer.identity, e.to_string());
            status.set_state(&printer.identity, DriverState::Failed);
            sentry::capture_message(&e.to_string(), sentry::Level::Error);
            return false;
        }
    };

    match driver.run(printer, &images) {
        Ok(report) => {
            debug!("{} report: {report:?}", printer.name);
            true
        }
        Err(e) => {
            error!("{e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        path::PathBuf,
        sync::{mpsc, Mutex},
    };

    use crate::{
        driver::DriverConfig,
        images::{ImageError, TestImage, TestImageSet},
        test_support::{FakeClock, FakeInventory, FakeSpooler},
    };

    use super::*;

    /// Hands out one image, optionally only after the test opens the gate.
    #[derive(Default)]
    struct FakeImages {
        gate: Option<Mutex<mpsc::Receiver<()>>>,
        missing: bool,
    }

    impl ImageSupply for FakeImages {
        fn supply(&self, printer: &PrinterDescriptor) -> Result<TestImageSet, ImageError> {
            if let Some(gate) = &self.gate {
                gate.lock().unwrap().recv().unwrap();
            }
            if self.missing {
                return Err(ImageError::NoSource { printer: printer.name.clone() });
            }
            Ok(TestImageSet::new(vec![TestImage { path: PathBuf::from("/tmp/prig/card.png"), description: "Card".to_owned() }]))
        }
    }

    fn supervisor(inventory: &Arc<FakeInventory>, spooler: &Arc<FakeSpooler>, images: FakeImages) -> (Supervisor, StatusStore) {
        let clock = Arc::new(FakeClock::default());
        let status = StatusStore::default();
        let stop = StopSignal::default();
        let driver = PrintCycleDriver::new(spooler.clone(), inventory.clone(), clock.clone(), DriverConfig::default(), status.clone(), stop.clone());
        let supervisor = Supervisor::new(
            PrinterDetector::new(inventory.clone()),
            Arc::new(images),
            driver,
            status.clone(),
            clock,
            stop,
            Duration::from_secs(3),
        );
        (supervisor, status)
    }

    #[test]
    fn unsupported_devices_are_never_registered() {
        let inventory = Arc::new(FakeInventory::with_ids(&["046d:c52b", "8087:0024"]));
        let spooler = Arc::new(FakeSpooler::default());
        let (mut supervisor, status) = supervisor(&inventory, &spooler, FakeImages::default());

        supervisor.poll_once();
        supervisor.poll_once();

        assert!(supervisor.active.is_empty());
        assert!(spooler.calls().is_empty());
        assert!(status.snapshot().is_empty());
    }

    #[test]
    fn one_driver_per_printer() {
        let inventory = Arc::new(FakeInventory::with_ids(&["04a9:327b"]).unplug_after(2));
        let spooler = Arc::new(FakeSpooler::default());
        let (gate, receiver) = mpsc::channel();
        let (mut supervisor, _) = supervisor(&inventory, &spooler, FakeImages { gate: Some(Mutex::new(receiver)), missing: false });

        supervisor.poll_once();
        supervisor.poll_once();
        assert_eq!(supervisor.active.len(), 1);

        gate.send(()).unwrap();
        supervisor.join_all();

        assert_eq!(spooler.calls_starting_with("add").len(), 1);
        assert!(spooler.calls_starting_with("submit").is_empty());
        assert!(supervisor.failed.is_empty());
    }

    #[test]
    fn failed_printer_waits_for_replug() {
        let inventory = Arc::new(FakeInventory::with_ids(&["1343:0003"]));
        let spooler = Arc::new(FakeSpooler::default());
        *spooler.add_queue_error.lock().unwrap() = Some("lpadmin: Unable to connect to server".to_owned());
        let (mut supervisor, _) = supervisor(&inventory, &spooler, FakeImages::default());

        supervisor.poll_once();
        supervisor.join_all();
        supervisor.poll_once();
        assert!(supervisor.active.is_empty());
        assert_eq!(spooler.calls_starting_with("add").len(), 1);

        inventory.unplug();
        supervisor.poll_once();
        assert!(supervisor.failed.is_empty());

        inventory.replug();
        supervisor.poll_once();
        supervisor.join_all();
        assert_eq!(spooler.calls_starting_with("add").len(), 2);
    }

    #[test]
    fn missing_images_fail_the_printer() {
        let inventory = Arc::new(FakeInventory::with_ids(&["04a9:3302"]));
        let spooler = Arc::new(FakeSpooler::default());
        let (mut supervisor, status) = supervisor(&inventory, &spooler, FakeImages { gate: None, missing: true });

        supervisor.poll_once();
        supervisor.join_all();

        let identity = PrinterIdentity::parse("04a9:3302").unwrap();
        assert!(supervisor.failed.contains(&identity));
        assert!(spooler.calls().is_empty());
        assert_eq!(status.get(&identity).unwrap().state, DriverState::Failed);
    }
}
