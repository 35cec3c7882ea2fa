// Time-series reader
// Main library entry point

pub mod config;
pub mod core;

// Re-export main types
pub use crate::config::EngineConfig;
pub use crate::core::aggregate::{get_buckets, PlotStyle, PlotWindow};
pub use crate::core::downsample::{get_downsampled, get_downsampled_entries};
pub use crate::core::error::{ReaderError, Result};
pub use crate::core::format::{DataSet, DownsampledPoint, RawDataEntry, RawType, StreamId};
pub use crate::core::ingest::{load_series, LoadStatus, LoadTask};
pub use crate::core::paths::expand_paths;
pub use crate::core::raw_reader::{decode_raw, RawIndex};
pub use crate::core::series::{time_extent, AggregateBucket, Series, TimeRange, ValueKind};
