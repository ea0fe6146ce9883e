//! Unified error handling for the location-segments library.
//!
//! Segmentation itself is fail-soft: malformed samples degrade to invalid GPS
//! and unresolved days skip a single segment. The errors here cover the
//! boundaries where failing loudly is correct (configuration, IO, JSON) and
//! the collaborator contracts that report failures back to the core.

use chrono::NaiveDate;
use thiserror::Error;

/// Unified error type for location segmentation operations.
#[derive(Debug, Error)]
pub enum SegmentationError {
    /// Configuration rejected at startup
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A day object could not be looked up or created
    #[error("Day object for {date} unavailable: {message}")]
    DayObject { date: NaiveDate, message: String },

    /// A timestamp could not be parsed as ISO-8601
    #[error("Invalid timestamp '{value}'")]
    InvalidTimestamp { value: String },

    /// JSON (de)serialization failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File IO failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SegmentationError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        SegmentationError::Config {
            message: message.into(),
        }
    }
}

/// Result type alias for location-segments operations.
pub type Result<T> = std::result::Result<T, SegmentationError>;

/// Extension trait for converting Option to SegmentationError.
pub trait OptionExt<T> {
    /// Convert Option to Result with a day object error.
    fn ok_or_day(self, date: NaiveDate, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_day(self, date: NaiveDate, message: &str) -> Result<T> {
        self.ok_or_else(|| SegmentationError::DayObject {
            date,
            message: message.to_string(),
        })
    }
}
