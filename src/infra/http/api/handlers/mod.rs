//! API handlers organized by resource type.

mod health;
mod media;
mod reports;

pub use health::*;
pub use media::*;
pub use reports::*;

use super::error::ApiError;

/// Parses a report number taken from the path.
pub(crate) fn parse_number(raw: &str) -> Result<i64, ApiError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|number| *number >= 1)
        .ok_or_else(|| ApiError::invalid_argument(format!("invalid report number `{raw}`")))
}
