use std::sync::Arc;

use crate::{printer::PrinterIdentity, usb::UsbInventory};

/// Decides whether a printer is still plugged in by re-enumerating USB.
/// A poll, there is no hot-plug subscription.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    inventory: Arc<dyn UsbInventory>,
}

impl ConnectivityMonitor {
    pub fn new(inventory: Arc<dyn UsbInventory>) -> Self {
        Self { inventory }
    }

    pub fn is_connected(&self, identity: &PrinterIdentity) -> bool {
        self.inventory
            .list_connected_devices()
            .iter()
            .any(|device| device.vendor_id == identity.vendor_id() && device.product_id == identity.product_id())
    }
}
