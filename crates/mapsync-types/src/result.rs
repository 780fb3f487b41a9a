//! Result type alias for mapsync operations

use crate::Error;

/// Result type alias for mapsync operations
pub type Result<T> = std::result::Result<T, Error>;
