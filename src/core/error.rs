// Error handling for series ingestion and raw decoding

use thiserror::Error;

use crate::core::format::{RawType, StreamId};

pub type Result<T> = std::result::Result<T, ReaderError>;

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unknown record type: {0}")]
    UnknownRecordType(u8),

    #[error("Stream {stream:?} not available in record of type {record_type:?}")]
    StreamNotAvailable {
        stream: StreamId,
        record_type: RawType,
    },

    #[error("Inconsistent sample interval: expected {expected_us} us, got {found_us} us")]
    IntervalMismatch { expected_us: u32, found_us: u32 },

    #[error("Truncated record at offset {offset}")]
    TruncatedRecord { offset: u64 },

    #[error("Loading cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ReaderError {
    /// Binary layout problems scoped to a single raw entry.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            ReaderError::UnknownRecordType(_)
                | ReaderError::StreamNotAvailable { .. }
                | ReaderError::IntervalMismatch { .. }
                | ReaderError::TruncatedRecord { .. }
        )
    }
}

impl From<csv::Error> for ReaderError {
    fn from(err: csv::Error) -> Self {
        let message = err.to_string();
        match err.into_kind() {
            csv::ErrorKind::Io(e) => ReaderError::Io(e),
            _ => ReaderError::Parse(message),
        }
    }
}

impl From<serde_json::Error> for ReaderError {
    fn from(err: serde_json::Error) -> Self {
        ReaderError::Config(err.to_string())
    }
}
