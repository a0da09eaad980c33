pub mod download;
pub mod generate;

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use log::{debug, info, warn};
use serde_derive::Deserialize;
use snafu::Snafu;

use crate::{config::models::Images, printer::PrinterDescriptor, process::CommandRunner};

const DOWNLOAD_FILE: &str = "downloaded_test_image.jpg";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestImage {
    pub path: PathBuf,
    pub description: String,
}

/// Images printed in order on every cycle. Fixed for the whole run of one printer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestImageSet(Vec<TestImage>);

impl TestImageSet {
    pub fn new(images: Vec<TestImage>) -> Self {
        Self(images)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TestImage> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSource {
    /// A file that already exists on this machine.
    Local,
    /// A remote image, cached in the work directory after the first download.
    Download,
    /// Patterns rendered with ImageMagick.
    Generate,
}

/// Provides the test images for a printer that is about to be tested.
pub trait ImageSupply: Send + Sync {
    fn supply(&self, printer: &PrinterDescriptor) -> Result<TestImageSet, ImageError>;
}

pub struct ImageSupplier {
    runner: Arc<dyn CommandRunner>,
    settings: Images,
    /// Printer threads share one cached download.
    download_lock: Mutex<()>,
}

impl ImageSupplier {
    pub fn new(runner: Arc<dyn CommandRunner>, settings: Images) -> Self {
        Self { runner, settings, download_lock: Mutex::new(()) }
    }

    fn local(&self) -> Option<TestImage> {
        let path = self.settings.local_paths.iter().find(|path| path.is_file())?;
        Some(TestImage { path: path.clone(), description: format!("Local test image {}", file_name(path)) })
    }

    fn download(&self) -> Option<TestImage> {
        let url = self.settings.download_url.as_deref().filter(|url| !url.is_empty())?;
        let target = self.settings.work_dir.join(DOWNLOAD_FILE);

        let _guard = self.download_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if target.is_file() {
            debug!("Using cached download {}", target.display());
        } else if let Err(e) = download::download_image(url, &target) {
            warn!("Test image download failed: {e}");
            return None;
        }

        Some(TestImage { path: target, description: "Downloaded test image".to_owned() })
    }

    fn generate(&self, printer: &PrinterDescriptor) -> Vec<TestImage> {
        let dir = self.settings.work_dir.join(&printer.queue_name);
        if let Err(e) = fs::create_dir_all(&dir) {
            warn!("Could not create {}: {e}", dir.display());
            return Vec::new();
        }
        generate::render_patterns(self.runner.as_ref(), &dir, printer)
    }
}

impl ImageSupply for ImageSupplier {
    /// Tries every configured source in order, the first one yielding images wins.
    fn supply(&self, printer: &PrinterDescriptor) -> Result<TestImageSet, ImageError> {
        for source in &self.settings.sources {
            let images = match source {
                ImageSource::Local => self.local().into_iter().collect(),
                ImageSource::Download => self.download().into_iter().collect(),
                ImageSource::Generate => self.generate(printer),
            };

            if !images.is_empty() {
                info!("Using {} {source:?} test image(s) for {}", images.len(), printer.name);
                return Ok(TestImageSet::new(images));
            }
            debug!("{source:?} test image source produced nothing for {}", printer.name);
        }

        NoSourceSnafu { printer: printer.name.clone() }.fail()
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned())
}

// ////// //
// Errors //
// ////// //

#[derive(Debug, Snafu)]
pub enum ImageError {
    #[snafu(display("No test image source produced an image for {printer}"))]
    NoSource { printer: String },
}
