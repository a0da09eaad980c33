use std::path::PathBuf;

use serde_derive::Deserialize;

/// One line of a USB listing. Discarded after identity comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbDeviceRecord {
    pub bus: u16,
    pub device: u16,
    /// Lowercase, 4 hex digits.
    pub vendor_id: String,
    /// Lowercase, 4 hex digits.
    pub product_id: String,
    pub description: String,
    pub device_path: Option<PathBuf>,
}

impl UsbDeviceRecord {
    pub fn location(&self) -> String {
        format!("Bus {:03} Device {:03}", self.bus, self.device)
    }
}

/// Which text format the listing tool produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingFormat {
    /// `Bus 001 Device 004: ID 04a9:327b Canon, Inc.`
    Lsusb,
    /// macOS `system_profiler SPUSBDataType`.
    SystemProfiler,
}

impl ListingFormat {
    /// Arguments the tool needs to produce this format.
    pub fn tool_args(self) -> Vec<String> {
        match self {
            ListingFormat::Lsusb => Vec::new(),
            ListingFormat::SystemProfiler => vec!["SPUSBDataType".to_owned()],
        }
    }
}

pub(crate) fn is_hex_id(value: &str) -> bool {
    value.len() == 4 && value.chars().all(|c| c.is_ascii_hexdigit())
}
