use std::{path::PathBuf, time::Duration};

use serde_derive::Deserialize;

use crate::images::ImageSource;
use crate::usb::ListingFormat;

// When changing anything here, make sure to add
// #[serde(alias = "ihavenounderscores")]
// where needed, so it can be read from the ENV vars.

#[derive(Debug, Clone, Deserialize)]
pub struct Usb {
    pub tool: String,
    pub format: ListingFormat,
    /// Root of the per-device nodes (`/dev/bus/usb`). Empty disables the existence check.
    #[serde(alias = "devicenodes")]
    pub device_nodes: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Cups {
    #[serde(alias = "errorlog")]
    pub error_log: PathBuf,
    pub location: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Timing {
    #[serde(alias = "pollinterval", with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(alias = "jobtimeout", with = "humantime_serde")]
    pub job_timeout: Duration,
    #[serde(alias = "printdelay", with = "humantime_serde")]
    pub print_delay: Duration,
    #[serde(alias = "cycledelay", with = "humantime_serde")]
    pub cycle_delay: Duration,
    #[serde(alias = "retrydelay", with = "humantime_serde")]
    pub retry_delay: Duration,
    #[serde(alias = "maxattempts")]
    pub max_attempts: usize,
    #[serde(alias = "detectioninterval", with = "humantime_serde")]
    pub detection_interval: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Print {
    #[serde(alias = "canonoptions")]
    pub canon_options: Vec<String>,
    #[serde(alias = "dnpoptions")]
    pub dnp_options: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Images {
    pub sources: Vec<ImageSource>,
    #[serde(alias = "localpaths")]
    pub local_paths: Vec<PathBuf>,
    #[serde(alias = "downloadurl")]
    pub download_url: Option<String>,
    #[serde(alias = "workdir")]
    pub work_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Mqtt {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(alias = "clientid")]
    pub client_id: String,
    #[serde(alias = "roottopic")]
    pub root_topic: String,
    #[serde(alias = "publishinterval", with = "humantime_serde")]
    pub publish_interval: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub usb: Usb,
    pub cups: Cups,
    pub timing: Timing,
    pub print: Print,
    pub images: Images,
    pub mqtt: Mqtt,
    #[serde(alias = "sentrydsn")]
    pub sentry_dsn: Option<String>,
}
