// Raw sensor file reader: header index scan and on-demand stream decoding

use crate::core::constants::*;
use crate::core::error::{ReaderError, Result};
use crate::core::format::*;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RecordHeader {
    record_type: u8,
    dt_us: u32,
    t0: u32,
    meta_size: u32,
    data_size: u32,
}

fn be_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

impl RecordHeader {
    fn parse(buf: &[u8; RAW_HEADER_SIZE]) -> Self {
        Self {
            record_type: buf[0],
            dt_us: be_u32(buf, 1),
            t0: be_u32(buf, 5),
            // 24 bits at 9..12
            meta_size: be_u32(buf, 9) >> 8,
            data_size: be_u32(buf, 12),
        }
    }

    fn record_len(&self) -> u64 {
        RAW_HEADER_SIZE as u64 + u64::from(self.meta_size) + u64::from(self.data_size)
    }
}

pub fn decode_amplitude(word: u32) -> f32 {
    ((word & AMPLITUDE_MASK) as f32 * (5.0 / 4096.0) - 2.5) * 2.0
}

pub fn decode_runtime(word: u32) -> f32 {
    let value = word >> RUNTIME_SHIFT;

    if value & RUNTIME_COARSE_BIT == 0 {
        value as f32 / 512.0
    } else {
        (value >> 4) as f32 / 128.0
    }
}

/// Index of every record found in a set of raw files. Payloads are decoded on request.
#[derive(Debug, Clone, Default)]
pub struct RawIndex {
    entries: Vec<RawDataEntry>,
    clock_offset_secs: i64,
}

impl RawIndex {
    /// Scans each file in order. A file that cannot be read is logged and contributes nothing.
    pub fn scan<P: AsRef<Path>>(paths: &[P]) -> Self {
        let mut entries = Vec::new();

        for path in paths {
            let path = path.as_ref();
            match Self::scan_file(path) {
                Ok(found) => {
                    debug!("Indexed {} records in {}", found.len(), path.display());
                    entries.extend(found);
                }
                Err(e) => error!("Failed to scan {}: {}", path.display(), e),
            }
        }

        Self {
            entries,
            clock_offset_secs: 0,
        }
    }

    /// Seconds added to the first entry's start time when building a data set time axis.
    pub fn with_clock_offset(mut self, secs: i64) -> Self {
        self.clock_offset_secs = secs;
        self
    }

    pub fn from_entries(entries: Vec<RawDataEntry>) -> Self {
        Self {
            entries,
            clock_offset_secs: 0,
        }
    }

    pub fn scan_file(path: &Path) -> Result<Vec<RawDataEntry>> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();

        if file_size == 0 {
            warn!("File {} is empty", path.display());
            return Ok(Vec::new());
        }

        let shared_path = Arc::new(path.to_path_buf());
        let mut reader = BufReader::new(file);
        let mut buf = [0u8; RAW_HEADER_SIZE];
        let mut entries = Vec::new();
        let mut offset: u64 = 0;

        while offset + RAW_HEADER_SIZE as u64 <= file_size {
            reader.read_exact(&mut buf)?;
            let header = RecordHeader::parse(&buf);
            let next = offset + header.record_len();

            if next > file_size {
                debug!(
                    "Dropping truncated record at offset {} in {}",
                    offset,
                    path.display()
                );
                break;
            }

            match RawType::from_u8(header.record_type) {
                Some(record_type) => entries.push(RawDataEntry {
                    path: shared_path.clone(),
                    offset,
                    record_type,
                    dt_us: header.dt_us,
                    timestamp: i64::from(header.t0),
                    meta_size: header.meta_size,
                    data_size: header.data_size,
                }),
                None => warn!(
                    "Skipping record at offset {} in {}: {}",
                    offset,
                    path.display(),
                    ReaderError::UnknownRecordType(header.record_type)
                ),
            }

            reader.seek_relative((header.record_len() - RAW_HEADER_SIZE as u64) as i64)?;
            offset = next;
        }

        if offset < file_size {
            debug!(
                "Ignoring {} trailing bytes in {}",
                file_size - offset,
                path.display()
            );
        }

        Ok(entries)
    }

    pub fn entries(&self) -> &[RawDataEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries_for(&self, path: &Path) -> Vec<RawDataEntry> {
        self.entries
            .iter()
            .filter(|e| e.path.as_path() == path)
            .cloned()
            .collect()
    }

    /// Runs of consecutive entries from one file sharing record type and sample interval.
    pub fn captures(&self) -> Vec<Capture> {
        let mut captures: Vec<Capture> = Vec::new();

        for entry in &self.entries {
            let continues = captures.last().is_some_and(|c: &Capture| {
                c.path == entry.path
                    && c.entries.last().is_some_and(|last| {
                        last.record_type == entry.record_type && last.dt_us == entry.dt_us
                    })
            });

            if continues {
                if let Some(capture) = captures.last_mut() {
                    capture.duration += entry.duration();
                    capture.entries.push(entry.clone());
                }
            } else {
                captures.push(Capture {
                    path: entry.path.clone(),
                    start: entry.timestamp,
                    duration: entry.duration(),
                    entries: vec![entry.clone()],
                });
            }
        }

        captures
    }

    /// Concatenates the requested streams of `entries` into one data set. Entries that fail
    /// (missing stream, interval mismatch, short read) are recorded in `failures` and skipped.
    pub fn decode(&self, entries: &[RawDataEntry], requested: &[StreamId]) -> DataSet {
        let mut data_set = DataSet::default();
        let Some(first) = entries.first() else {
            return data_set;
        };
        data_set.t0 = first.timestamp + self.clock_offset_secs;

        for entry in entries {
            if let Err(e) = Self::merge_entry(&mut data_set, entry, requested) {
                error!(
                    "Skipping raw entry at offset {} in {}: {}",
                    entry.offset,
                    entry.path.display(),
                    e
                );
                data_set.failures.push(EntryFailure {
                    path: entry.path.clone(),
                    offset: entry.offset,
                    error: e,
                });
            }
        }

        data_set
    }

    /// Decodes a single entry, surfacing its error.
    pub fn decode_entry(&self, entry: &RawDataEntry, requested: &[StreamId]) -> Result<DataSet> {
        let mut data_set = DataSet {
            t0: entry.timestamp + self.clock_offset_secs,
            ..DataSet::default()
        };
        Self::merge_entry(&mut data_set, entry, requested)?;
        Ok(data_set)
    }

    fn merge_entry(
        data_set: &mut DataSet,
        entry: &RawDataEntry,
        requested: &[StreamId],
    ) -> Result<()> {
        if let Some(expected_us) = data_set.dt_us {
            if expected_us != entry.dt_us {
                return Err(ReaderError::IntervalMismatch {
                    expected_us,
                    found_us: entry.dt_us,
                });
            }
        }

        let streams = Self::read_streams(entry, requested)?;
        data_set.dt_us.get_or_insert(entry.dt_us);

        for (id, values) in streams {
            data_set.streams.entry(id).or_default().extend(values);
        }

        Ok(())
    }

    fn read_streams(entry: &RawDataEntry, requested: &[StreamId]) -> Result<Vec<(StreamId, Vec<f32>)>> {
        let layout = entry.record_type.stream_layout();

        // (slot, position in payload)
        let mut slots: Vec<(StreamId, usize)> = Vec::with_capacity(requested.len());
        for &stream in requested {
            let slot = stream.slot();
            let position = layout
                .iter()
                .position(|s| *s == slot)
                .ok_or(ReaderError::StreamNotAvailable {
                    stream,
                    record_type: entry.record_type,
                })?;

            if !slots.iter().any(|(s, _)| *s == slot) {
                slots.push((slot, position));
            }
        }

        let split_size = entry.split_size();
        let mut file = File::open(entry.path.as_path())?;
        let mut out = Vec::with_capacity(slots.len() + 1);

        for (slot, position) in slots {
            let offset = entry.payload_offset() + (position * split_size) as u64;
            debug!("Stream {:?}, offset {}", slot, offset);

            file.seek(SeekFrom::Start(offset))?;
            let mut buf = vec![0u8; split_size];
            file.read_exact(&mut buf).map_err(|e| match e.kind() {
                ErrorKind::UnexpectedEof => ReaderError::TruncatedRecord {
                    offset: entry.offset,
                },
                _ => ReaderError::Io(e),
            })?;

            let words = buf
                .chunks_exact(SAMPLE_SIZE)
                .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]));

            if slot == StreamId::Amplitude {
                let (amplitude, runtime): (Vec<f32>, Vec<f32>) = words
                    .map(|w| (decode_amplitude(w), decode_runtime(w)))
                    .unzip();
                out.push((StreamId::Amplitude, amplitude));
                out.push((StreamId::Runtime, runtime));
            } else {
                out.push((slot, words.map(f32::from_bits).collect()));
            }
        }

        Ok(out)
    }
}

/// Scans raw files into an index using the device clock offset.
pub fn decode_raw(paths: &[PathBuf]) -> RawIndex {
    RawIndex::scan(paths).with_clock_offset(RAW_CLOCK_OFFSET_SECS)
}
