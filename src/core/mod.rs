/// Core Module for Fundledger
///
/// The generic register framework (`db`) and the shared error type. Nothing
/// in here knows about funds; the domain lives in `backend`.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{FundError, Result};
