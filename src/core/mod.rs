pub mod aggregate;
pub mod constants;
pub mod csv_reader;
pub mod downsample;
pub mod error;
pub mod format;
pub mod ingest;
pub mod paths;
pub mod raw_reader;
pub mod series;
pub mod stats;
