//! Utility modules for genmf

pub mod logging;

pub use logging::{init_logging, LoggingConfig};
