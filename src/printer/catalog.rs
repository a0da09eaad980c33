use convert_case::{Case, Casing};
use log::warn;
use url::Url;

use crate::usb::UsbDeviceRecord;

use super::models::{ModelFamily, PrinterDescriptor, PrinterIdentity};

const QUEUE_PREFIX: &str = "prig";

pub struct CatalogEntry {
    pub key: &'static str,
    pub name: &'static str,
    pub model: &'static str,
    pub vendor: &'static str,
    pub family: ModelFamily,
    pub driver: &'static str,
}

pub static CATALOG: [CatalogEntry; 5] = [
    // Canon SELPHY
    CatalogEntry { key: "04a9:327b", name: "Canon SELPHY CP1300", model: "Canon SELPHY CP1300", vendor: "Canon", family: ModelFamily::Canon, driver: "raw" },
    CatalogEntry { key: "04a9:3302", name: "Canon SELPHY CP1500", model: "Canon SELPHY CP1500", vendor: "Canon", family: ModelFamily::Canon, driver: "raw" },
    CatalogEntry { key: "04a9:327a", name: "Canon SELPHY CP910", model: "Canon SELPHY CP910", vendor: "Canon", family: ModelFamily::Canon, driver: "raw" },
    // DNP
    CatalogEntry { key: "1343:0003", name: "DNP QW410", model: "DNP QW410", vendor: "DNP", family: ModelFamily::Dnp, driver: "raw" },
    CatalogEntry { key: "1452:9201", name: "DNP Photo Printer", model: "DNP Photo Printer", vendor: "DNP", family: ModelFamily::Dnp, driver: "raw" },
];

pub fn lookup(identity: &PrinterIdentity) -> Option<&'static CatalogEntry> {
    let key = identity.to_string();
    CATALOG.iter().find(|entry| entry.key == key)
}

/// Maps a USB record to a supported printer. Unknown ids and unbuildable URIs resolve to `None`.
pub fn resolve(device: &UsbDeviceRecord) -> Option<PrinterDescriptor> {
    let identity = PrinterIdentity::new(&device.vendor_id, &device.product_id)?;
    let entry = lookup(&identity)?;

    let device_uri = match build_device_uri(entry.vendor, entry.name) {
        Some(uri) if validate_device_uri(&uri) => uri,
        _ => {
            warn!("Could not build a valid device URI for {}", entry.name);
            return None;
        }
    };

    Some(PrinterDescriptor {
        identity,
        name: entry.name.to_owned(),
        model: entry.model.to_owned(),
        vendor: entry.vendor.to_owned(),
        family: entry.family,
        queue_name: queue_name_for(entry.model),
        device_uri,
        driver: entry.driver.to_owned(),
        usb_location: device.location(),
    })
}

/// `Canon SELPHY CP1300` becomes `prig_canon_selphy_cp1300`.
pub fn queue_name_for(model: &str) -> String {
    format!("{QUEUE_PREFIX}_{}", model.from_case(Case::Title).to_case(Case::Snake))
}

/// `usb:///<vendor>/<model>` with every segment percent-encoded.
pub fn build_device_uri(vendor: &str, model: &str) -> Option<Url> {
    let mut uri = Url::parse("usb:///").ok()?;
    uri.path_segments_mut().ok()?.clear().push(vendor).push(model);
    Some(uri)
}

/// Scheme `usb`, empty authority, at least two non-empty path segments.
pub fn validate_device_uri(uri: &Url) -> bool {
    let empty_authority = uri.host_str().map_or(true, str::is_empty) && uri.username().is_empty() && uri.port().is_none();
    let segments = uri.path_segments().map_or(0, |segments| segments.filter(|s| !s.is_empty()).count());

    uri.scheme() == "usb" && empty_authority && segments >= 2
}
