// Data structures for the raw sensor format

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use crate::core::constants::*;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RawType {
    Sync = TYPE_SYNC,
    Ks = TYPE_KS,
    SyncIntegral = TYPE_SYNC_INTEGRAL,
    SyncFullInt = TYPE_SYNC_FULL_INT,
    KsFloat = TYPE_KS_FLOAT,
}

impl RawType {
    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            TYPE_SYNC => Some(RawType::Sync),
            TYPE_KS => Some(RawType::Ks),
            TYPE_SYNC_INTEGRAL => Some(RawType::SyncIntegral),
            TYPE_SYNC_FULL_INT => Some(RawType::SyncFullInt),
            TYPE_KS_FLOAT => Some(RawType::KsFloat),
            _ => None,
        }
    }

    /// Payload slots in on-disk order. Each slot takes an equal share of the payload.
    /// Runtime has no slot of its own; it lives in the amplitude word.
    pub fn stream_layout(self) -> &'static [StreamId] {
        match self {
            RawType::Sync => &[StreamId::Amplitude],
            RawType::Ks | RawType::KsFloat => &[StreamId::Ks],
            RawType::SyncIntegral => &[StreamId::Amplitude, StreamId::CoE],
            RawType::SyncFullInt => &[
                StreamId::Amplitude,
                StreamId::Int1,
                StreamId::Int2,
                StreamId::CoE,
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StreamId {
    Amplitude,
    Runtime,
    CoE,
    Int1,
    Int2,
    Ks,
}

impl StreamId {
    /// The payload slot holding this stream.
    pub fn slot(self) -> StreamId {
        match self {
            StreamId::Runtime => StreamId::Amplitude,
            other => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawDataEntry {
    pub path: Arc<PathBuf>,
    pub offset: u64,
    pub record_type: RawType,
    pub dt_us: u32,
    pub timestamp: i64,
    pub meta_size: u32,
    pub data_size: u32,
}

impl RawDataEntry {
    /// Sample interval in seconds.
    pub fn dt(&self) -> f64 {
        f64::from(self.dt_us) / 1_000_000.0
    }

    pub fn payload_offset(&self) -> u64 {
        self.offset + RAW_HEADER_SIZE as u64 + u64::from(self.meta_size)
    }

    pub fn split_size(&self) -> usize {
        self.data_size as usize / self.record_type.stream_layout().len()
    }

    pub fn samples_per_stream(&self) -> usize {
        self.split_size() / SAMPLE_SIZE
    }

    pub fn duration(&self) -> f64 {
        self.dt() * self.samples_per_stream() as f64
    }

    pub fn end_offset(&self) -> u64 {
        self.payload_offset() + u64::from(self.data_size)
    }
}

/// An entry that could not be merged into a data set.
#[derive(Debug)]
pub struct EntryFailure {
    pub path: Arc<PathBuf>,
    pub offset: u64,
    pub error: crate::core::error::ReaderError,
}

#[derive(Debug, Default)]
pub struct DataSet {
    pub t0: i64,
    pub dt_us: Option<u32>,
    pub streams: HashMap<StreamId, Vec<f32>>,
    pub failures: Vec<EntryFailure>,
}

impl DataSet {
    pub fn dt(&self) -> Option<f64> {
        self.dt_us.map(|us| f64::from(us) / 1_000_000.0)
    }

    pub fn stream(&self, id: StreamId) -> &[f32] {
        self.streams.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn longest_stream(&self) -> usize {
        self.streams.values().map(Vec::len).max().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DownsampledEntry {
    pub mean: f32,
    pub min: f32,
    pub max: f32,
    pub stddev: f32,
}

impl DownsampledEntry {
    pub fn nan() -> Self {
        Self {
            mean: f32::NAN,
            min: f32::NAN,
            max: f32::NAN,
            stddev: f32::NAN,
        }
    }

    pub fn is_nan(&self) -> bool {
        self.mean.is_nan()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownsampledPoint {
    pub date: f64,
    pub streams: BTreeMap<StreamId, DownsampledEntry>,
}

impl DownsampledPoint {
    pub fn get(&self, id: StreamId) -> Option<&DownsampledEntry> {
        self.streams.get(&id)
    }
}

/// Consecutive entries of one file, as shown before decoding.
#[derive(Debug, Clone)]
pub struct Capture {
    pub path: Arc<PathBuf>,
    pub start: i64,
    pub duration: f64,
    pub entries: Vec<RawDataEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(record_type: RawType, data_size: u32) -> RawDataEntry {
        RawDataEntry {
            path: Arc::new(PathBuf::from("a.bin")),
            offset: 32,
            record_type,
            dt_us: 500,
            timestamp: 0,
            meta_size: 8,
            data_size,
        }
    }

    #[test]
    fn test_raw_type_codes() {
        assert_eq!(RawType::from_u8(3), Some(RawType::SyncFullInt));
        assert_eq!(RawType::from_u8(4), Some(RawType::KsFloat));
        assert_eq!(RawType::from_u8(5), None);
    }

    #[test]
    fn test_split_size_for_full_int() {
        let e = entry(RawType::SyncFullInt, 4000);
        assert_eq!(e.split_size(), 1000);
        assert_eq!(e.samples_per_stream(), 250);
        assert_eq!(e.payload_offset(), 32 + 16 + 8);
        assert!((e.duration() - 0.125).abs() < 1e-12);
    }

    #[test]
    fn test_runtime_shares_amplitude_slot() {
        assert_eq!(StreamId::Runtime.slot(), StreamId::Amplitude);
        assert_eq!(StreamId::CoE.slot(), StreamId::CoE);
    }
}
