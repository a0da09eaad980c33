pub mod catalog;
pub mod detector;
pub mod models;

pub use detector::PrinterDetector;
pub use models::{ModelFamily, PrinterDescriptor, PrinterIdentity};
