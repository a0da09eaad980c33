use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use log::{debug, error, warn};
use snafu::{ResultExt, Snafu};

use crate::process::CommandRunner;

use super::models::{is_hex_id, ListingFormat, UsbDeviceRecord};

/// Anything that can enumerate the USB devices currently attached.
pub trait UsbInventory: Send + Sync {
    /// Never fails: a broken enumeration is reported as "no devices".
    fn list_connected_devices(&self) -> Vec<UsbDeviceRecord>;
}

/// Enumerates devices by shelling out to `lsusb` (or `system_profiler` on macOS).
pub struct UsbLister {
    runner: Arc<dyn CommandRunner>,
    tool: String,
    format: ListingFormat,
    device_nodes: Option<PathBuf>,
}

impl UsbLister {
    pub fn new(runner: Arc<dyn CommandRunner>, tool: impl Into<String>, format: ListingFormat, device_nodes: Option<PathBuf>) -> Self {
        Self { runner, tool: tool.into(), format, device_nodes }
    }

    pub fn from_settings(runner: Arc<dyn CommandRunner>, settings: &crate::config::models::Usb) -> Self {
        let device_nodes = (!settings.device_nodes.is_empty()).then(|| PathBuf::from(&settings.device_nodes));
        Self::new(runner, settings.tool.clone(), settings.format, device_nodes)
    }

    /// Runs the listing tool once. Fails only when the tool cannot be started at all.
    pub fn probe(&self) -> Result<(), UsbError> {
        let output = self.runner.run(&self.tool, &self.format.tool_args()).context(ToolUnavailableSnafu { program: self.tool.clone() })?;
        if !output.success() {
            warn!("{} exited with {:?}: {}", self.tool, output.code, output.stderr.trim());
        }
        Ok(())
    }

    fn parse(&self, text: &str) -> Vec<UsbDeviceRecord> {
        match self.format {
            ListingFormat::Lsusb => parse_lsusb(text)
                .into_iter()
                .filter_map(|record| self.with_device_node(record))
                .collect(),
            ListingFormat::SystemProfiler => parse_system_profiler(text),
        }
    }

    /// Attaches the device node path and drops records whose node has vanished.
    fn with_device_node(&self, mut record: UsbDeviceRecord) -> Option<UsbDeviceRecord> {
        let Some(root) = &self.device_nodes else {
            return Some(record);
        };

        let path = device_node_path(root, record.bus, record.device);
        if !path.exists() {
            debug!("USB device {}:{} no longer exists at {}", record.vendor_id, record.product_id, path.display());
            return None;
        }

        record.device_path = Some(path);
        Some(record)
    }
}

impl UsbInventory for UsbLister {
    fn list_connected_devices(&self) -> Vec<UsbDeviceRecord> {
        match self.runner.run(&self.tool, &self.format.tool_args()) {
            Ok(output) if output.success() => self.parse(&output.stdout),
            Ok(output) => {
                error!("{} command failed: {}", self.tool, output.stderr.trim());
                Vec::new()
            }
            Err(e) => {
                error!("Error getting USB devices from {}: {e}", self.tool);
                Vec::new()
            }
        }
    }
}

pub fn device_node_path(root: &Path, bus: u16, device: u16) -> PathBuf {
    root.join(format!("{bus:03}")).join(format!("{device:03}"))
}

/// Parses `lsusb` output, skipping every line that does not carry a readable id.
pub fn parse_lsusb(text: &str) -> Vec<UsbDeviceRecord> {
    text.lines().filter_map(parse_lsusb_line).collect()
}

fn parse_lsusb_line(line: &str) -> Option<UsbDeviceRecord> {
    let rest = line.trim().strip_prefix("Bus ")?;
    let (bus, rest) = rest.split_once(" Device ")?;
    let (device, rest) = rest.split_once(": ID ")?;
    let (id, description) = rest.split_once(' ').unwrap_or((rest, ""));
    let (vendor_id, product_id) = id.split_once(':')?;

    if !is_hex_id(vendor_id) || !is_hex_id(product_id) {
        return None;
    }

    Some(UsbDeviceRecord {
        bus: parse_number(bus)?,
        device: parse_number(device)?,
        vendor_id: vendor_id.to_ascii_lowercase(),
        product_id: product_id.to_ascii_lowercase(),
        description: description.trim().to_owned(),
        device_path: None,
    })
}

fn parse_number(value: &str) -> Option<u16> {
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

/// Parses `system_profiler SPUSBDataType`. A record is emitted as soon as both ids of a device were seen.
pub fn parse_system_profiler(text: &str) -> Vec<UsbDeviceRecord> {
    let mut devices = Vec::new();
    let mut block = ProfilerBlock::default();

    for line in text.lines().map(str::trim) {
        if let Some(value) = line.strip_prefix("Product ID:") {
            block.product_id = hex_field(value);
        } else if let Some(value) = line.strip_prefix("Vendor ID:") {
            block.vendor_id = hex_field(value);
        } else if let Some(value) = line.strip_prefix("Manufacturer:") {
            block.manufacturer = Some(value.trim().to_owned());
        } else if line.ends_with(':') {
            // A bus or device heading starts the next block.
            devices.extend(std::mem::take(&mut block).into_record());
        }
    }
    devices.extend(block.into_record());

    devices
}

/// Fields of one device heading, kept until the next heading.
#[derive(Default)]
struct ProfilerBlock {
    vendor_id: Option<String>,
    product_id: Option<String>,
    manufacturer: Option<String>,
}

impl ProfilerBlock {
    fn into_record(self) -> Option<UsbDeviceRecord> {
        Some(UsbDeviceRecord {
            bus: 1,
            device: 1,
            vendor_id: self.vendor_id?,
            product_id: self.product_id?,
            description: self.manufacturer.unwrap_or_else(|| "Unknown Device".to_owned()),
            device_path: None,
        })
    }
}

fn hex_field(value: &str) -> Option<String> {
    let digits = value.trim().strip_prefix("0x")?.get(..4)?;
    is_hex_id(digits).then(|| digits.to_ascii_lowercase())
}

// ////// //
// Errors //
// ////// //

#[derive(Debug, Snafu)]
pub enum UsbError {
    #[snafu(display("USB listing tool '{program}' is not available"))]
    ToolUnavailable { program: String, source: std::io::Error },
}
