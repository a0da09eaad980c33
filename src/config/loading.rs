use std::path::Path;

use config::{Config, Environment, File};
use log::info;
use snafu::{ResultExt, Snafu};

use super::models::Settings;

const SYSTEM_CONFIG: &str = "/etc/prig/config";

pub fn load_config(config_file: Option<&Path>) -> Result<Settings, ConfigError> {
    // As Rust has no native support for .env files,
    // we use the dotenv_flow crate to import to actual ENV vars.
    if let Ok(dotenv_path) = dotenv_flow::dotenv_flow() {
        info!("Loaded dotenv file: {dotenv_path:?}");
    }

    let file = match config_file {
        Some(path) => File::from(path).required(true),
        None => File::with_name(SYSTEM_CONFIG).required(false),
    };

    let work_dir = std::env::temp_dir().join("prig");
    let default_usb_format = if cfg!(target_os = "macos") { "system_profiler" } else { "lsusb" };
    let default_usb_tool = if cfg!(target_os = "macos") { "system_profiler" } else { "lsusb" };
    let default_device_nodes = if cfg!(target_os = "linux") { "/dev/bus/usb" } else { "" };

    let config = Config::builder()
        .set_default("usb.tool", default_usb_tool).context(LoadSnafu)?
        .set_default("usb.format", default_usb_format).context(LoadSnafu)?
        .set_default("usb.devicenodes", default_device_nodes).context(LoadSnafu)?
        .set_default("cups.errorlog", "/var/log/cups/error_log").context(LoadSnafu)?
        .set_default("cups.location", "PRig Test Rig").context(LoadSnafu)?
        .set_default("timing.pollinterval", "2s").context(LoadSnafu)?
        .set_default("timing.jobtimeout", "120s").context(LoadSnafu)?
        .set_default("timing.printdelay", "5s").context(LoadSnafu)?
        .set_default("timing.cycledelay", "30s").context(LoadSnafu)?
        .set_default("timing.retrydelay", "5s").context(LoadSnafu)?
        .set_default("timing.maxattempts", 3).context(LoadSnafu)?
        .set_default("timing.detectioninterval", "3s").context(LoadSnafu)?
        .set_default("print.canonoptions", vec!["fit-to-page", "media=4x6", "ColorModel=RGB", "quality=5"]).context(LoadSnafu)?
        .set_default("print.dnpoptions", vec!["media=w288h432", "fit-to-page"]).context(LoadSnafu)?
        .set_default("images.sources", vec!["local", "download", "generate"]).context(LoadSnafu)?
        .set_default("images.localpaths", vec!["./test_images/test_image.jpg"]).context(LoadSnafu)?
        .set_default("images.workdir", work_dir.to_string_lossy().into_owned()).context(LoadSnafu)?
        .set_default("mqtt.enabled", false).context(LoadSnafu)?
        .set_default("mqtt.host", "localhost").context(LoadSnafu)?
        .set_default("mqtt.port", 1883).context(LoadSnafu)?
        .set_default("mqtt.username", "").context(LoadSnafu)?
        .set_default("mqtt.password", "").context(LoadSnafu)?
        .set_default("mqtt.clientid", "prig").context(LoadSnafu)?
        .set_default("mqtt.roottopic", "prig").context(LoadSnafu)?
        .set_default("mqtt.publishinterval", "5s").context(LoadSnafu)?
        .add_source(file)
        .add_source(Environment::default()
            .prefix("PRIG")
            .separator("_")
            .prefix_separator("_")
            .try_parsing(true)
            .with_list_parse_key("print.canonoptions")
            .with_list_parse_key("print.dnpoptions")
            .with_list_parse_key("images.sources")
            .with_list_parse_key("images.localpaths")
            .list_separator(","))
        .build().context(LoadSnafu)?;

    config.try_deserialize().context(DeserializeSnafu)
}

// ////// //
// Errors //
// ////// //

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("Could not load configuration"))]
    Load { source: config::ConfigError },

    #[snafu(display("Invalid configuration"))]
    Deserialize { source: config::ConfigError },
}
