use std::fmt::{self, Display, Formatter};

use serde_derive::{Deserialize, Serialize};
use url::Url;

use crate::usb::models::is_hex_id;

/// The only criterion for "same physical device" across polls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PrinterIdentity {
    vendor_id: String,
    product_id: String,
}

impl PrinterIdentity {
    /// Returns `None` unless both ids are 4 hex digits. Ids are stored lowercase.
    pub fn new(vendor_id: &str, product_id: &str) -> Option<Self> {
        if !is_hex_id(vendor_id) || !is_hex_id(product_id) {
            return None;
        }
        Some(Self { vendor_id: vendor_id.to_ascii_lowercase(), product_id: product_id.to_ascii_lowercase() })
    }

    /// Parses the `vendor:product` catalog key form.
    #[cfg(test)]
    pub fn parse(key: &str) -> Option<Self> {
        let (vendor_id, product_id) = key.split_once(':')?;
        Self::new(vendor_id, product_id)
    }

    pub fn vendor_id(&self) -> &str {
        &self.vendor_id
    }

    pub fn product_id(&self) -> &str {
        &self.product_id
    }
}

impl Display for PrinterIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.vendor_id, self.product_id)
    }
}

/// Printer families that share submission options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    Canon,
    Dnp,
}

/// Everything needed to register and drive one supported printer.
/// Built fresh on every detection poll and never mutated.
#[derive(Debug, Clone)]
pub struct PrinterDescriptor {
    pub identity: PrinterIdentity,
    pub name: String,
    pub model: String,
    pub vendor: String,
    pub family: ModelFamily,
    pub queue_name: String,
    pub device_uri: Url,
    pub driver: String,
    /// `Bus 001 Device 004`, changes on every replug.
    pub usb_location: String,
}

/// Equal iff the identities are equal, wherever the device is plugged in.
impl PartialEq for PrinterDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl Eq for PrinterDescriptor {}
