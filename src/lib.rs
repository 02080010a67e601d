// Core infrastructure modules
pub mod core;

// Feature-specific modules
pub mod backend;
pub mod cli;
pub mod config;
pub mod input;
pub mod logging;
pub mod report;
pub mod scraper;

#[doc(hidden)]
pub mod test_utils;

#[doc(hidden)]
pub use once_cell;

pub use crate::core::{FundError, Result};
