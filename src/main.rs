use std::{path::Path, sync::Arc};

use clap::Parser;
use log::{error, info, LevelFilter};
use snafu::{ensure_whatever, ResultExt, Whatever};

use cli::{Cli, Commands};
use clock::{Clock, StopSignal, SystemClock};
use config::models::Settings;
use cups_client::{CupsCli, Spooler};
use driver::{DriverConfig, PrintCycleDriver};
use images::ImageSupplier;
use job_poller::JobPoller;
use mqtt_client::client::{MqttClient, StatusPublisher};
use printer::{ModelFamily, PrinterDetector};
use process::{CommandRunner, SystemRunner};
use status::StatusStore;
use supervisor::Supervisor;
use usb::{UsbInventory, UsbLister};

mod cli;
mod clock;
mod config;
mod cups_client;
mod driver;
mod images;
mod job_poller;
mod monitor;
mod mqtt_client;
mod printer;
mod process;
mod registrar;
mod status;
mod supervisor;
mod usb;

#[cfg(test)]
mod test_support;

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), Whatever> {
    let cli = Cli::parse();

    let mut log_builder = colog::default_builder();
    log_builder.filter_level(if cli.verbose { LevelFilter::Debug } else { LevelFilter::Info });
    log_builder.parse_default_env();
    log_builder.init();

    let settings = config::loading::load_config(cli.config.as_deref()).whatever_context("Could not load settings")?;

    let _sentry = settings.sentry_dsn.as_deref().filter(|dsn| !dsn.is_empty()).map(|dsn| {
        sentry::init((dsn, sentry::ClientOptions { release: sentry::release_name!(), ..Default::default() }))
    });

    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
    let spooler: Arc<dyn Spooler> = Arc::new(CupsCli::new(runner.clone(), settings.cups.error_log.clone()));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(settings, runner, spooler, clock).await,
        Commands::Detect => detect(&settings, runner),
        Commands::Print { queue, image, family } => print_image(&settings, spooler, clock, &queue, &image, family),
    }
}

fn usb_inventory(settings: &Settings, runner: Arc<dyn CommandRunner>) -> Result<Arc<dyn UsbInventory>, Whatever> {
    let lister = UsbLister::from_settings(runner, &settings.usb);
    lister.probe().whatever_context("Cannot enumerate USB devices")?;
    Ok(Arc::new(lister))
}

async fn run(settings: Settings, runner: Arc<dyn CommandRunner>, spooler: Arc<dyn Spooler>, clock: Arc<dyn Clock>) -> Result<(), Whatever> {
    let inventory = usb_inventory(&settings, runner.clone())?;
    let stop = StopSignal::default();
    let status = StatusStore::default();

    let driver = PrintCycleDriver::new(
        spooler,
        inventory.clone(),
        clock.clone(),
        DriverConfig::from_settings(&settings),
        status.clone(),
        stop.clone(),
    );
    let mut supervisor = Supervisor::new(
        PrinterDetector::new(inventory),
        Arc::new(ImageSupplier::new(runner, settings.images.clone())),
        driver,
        status.clone(),
        clock.clone(),
        stop.clone(),
        settings.timing.detection_interval,
    );

    let publisher = settings.mqtt.enabled.then(|| {
        let publisher = StatusPublisher::new(Arc::new(MqttClient::new(&settings.mqtt)), status, &settings.mqtt, clock, stop.clone());
        tokio::task::spawn_blocking(move || publisher.run())
    });

    let signal_stop = stop.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Stop requested, letting running jobs finish.");
                signal_stop.trigger();
            }
            Err(e) => error!("Could not listen for Ctrl-C: {e}"),
        }
    });

    tokio::task::spawn_blocking(move || supervisor.run()).await.whatever_context("Supervisor crashed")?;
    if let Some(publisher) = publisher {
        publisher.await.whatever_context("Status publisher crashed")?;
    }

    info!("All printer runs finished.");
    Ok(())
}

fn detect(settings: &Settings, runner: Arc<dyn CommandRunner>) -> Result<(), Whatever> {
    let printers = PrinterDetector::new(usb_inventory(settings, runner)?).connected_printers();
    if printers.is_empty() {
        println!("No supported printers connected.");
    }
    for printer in printers {
        println!(
            "{}  {} ({})  {}  queue {}  {}",
            printer.identity, printer.name, printer.vendor, printer.usb_location, printer.queue_name, printer.device_uri
        );
    }
    Ok(())
}

fn print_image(settings: &Settings, spooler: Arc<dyn Spooler>, clock: Arc<dyn Clock>, queue: &str, image: &Path, family: ModelFamily) -> Result<(), Whatever> {
    ensure_whatever!(image.is_file(), "No image at {}", image.display());

    let config = DriverConfig::from_settings(settings);
    let poller = JobPoller::new(spooler, clock, config.poll_interval, config.job_timeout);

    ensure_whatever!(poller.submit_and_wait(queue, image, config.options.for_family(family)), "Printing {} on {queue} failed", image.display());
    println!("Printed {} on {queue}.", image.display());
    Ok(())
}
