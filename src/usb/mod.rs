pub mod inventory;
pub mod models;

pub use inventory::{UsbInventory, UsbLister};
pub use models::{ListingFormat, UsbDeviceRecord};
