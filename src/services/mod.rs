pub mod printer;

pub use printer::{PrintSession, PrinterHandle, PrinterService};
