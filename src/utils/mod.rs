//! Utility modules for Slipway

pub mod fs;
pub mod logging;

pub use fs::{remove_dir_robust, sanitize_component};
pub use logging::init_logging;
