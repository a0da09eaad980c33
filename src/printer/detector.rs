use std::sync::Arc;

use log::debug;

use crate::usb::UsbInventory;

use super::{catalog::resolve, models::PrinterDescriptor};

/// Turns the current USB inventory into the list of supported printers.
#[derive(Clone)]
pub struct PrinterDetector {
    inventory: Arc<dyn UsbInventory>,
}

impl PrinterDetector {
    pub fn new(inventory: Arc<dyn UsbInventory>) -> Self {
        Self { inventory }
    }

    /// Connected supported printers, one per USB record. Unknown devices are skipped.
    pub fn connected_printers(&self) -> Vec<PrinterDescriptor> {
        self.inventory
            .list_connected_devices()
            .iter()
            .filter_map(|device| {
                let printer = resolve(device);
                if printer.is_none() {
                    debug!("Ignoring unsupported USB device {}:{} ({})", device.vendor_id, device.product_id, device.description);
                }
                printer
            })
            .collect()
    }
}
