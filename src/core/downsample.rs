// Fixed-stride overview of decoded raw streams

use std::collections::BTreeMap;
use tracing::debug;

use crate::core::format::{DataSet, DownsampledEntry, DownsampledPoint, RawDataEntry, StreamId};
use crate::core::raw_reader::RawIndex;
use crate::core::stats::summarize;

/// Block statistics with the same degenerate rule as aggregate buckets. An empty block is NaN.
pub fn downsample(block: &[f32]) -> DownsampledEntry {
    match summarize(block) {
        Some(s) => DownsampledEntry {
            mean: s.mean as f32,
            min: s.min as f32,
            max: s.max as f32,
            stddev: s.std as f32,
        },
        None => DownsampledEntry::nan(),
    }
}

/// Strides every stream of `data_set` in blocks of `reduction_factor` samples. The output follows
/// the longest stream; shorter streams report NaN once exhausted.
pub fn downsample_data_set(data_set: &DataSet, reduction_factor: usize) -> Vec<DownsampledPoint> {
    let reduction_factor = reduction_factor.max(1);
    let size = data_set.longest_stream();
    let dt = data_set.dt().unwrap_or(0.0);
    let t0 = data_set.t0 as f64;

    let mut ids: Vec<StreamId> = data_set.streams.keys().copied().collect();
    ids.sort();

    (0..size)
        .step_by(reduction_factor)
        .map(|i| {
            let streams: BTreeMap<StreamId, DownsampledEntry> = ids
                .iter()
                .map(|id| {
                    let data = data_set.stream(*id);
                    let block = if i < data.len() {
                        &data[i..(i + reduction_factor).min(data.len())]
                    } else {
                        &[]
                    };
                    (*id, downsample(block))
                })
                .collect();

            DownsampledPoint {
                date: t0 + dt * i as f64,
                streams,
            }
        })
        .collect()
}

/// Decodes `entries` once and reduces the requested streams for an overview plot.
pub fn get_downsampled_entries(
    index: &RawIndex,
    entries: &[RawDataEntry],
    requested: &[StreamId],
    reduction_factor: usize,
) -> Vec<DownsampledPoint> {
    let data_set = index.decode(entries, requested);
    if data_set.is_empty() {
        return Vec::new();
    }

    let points = downsample_data_set(&data_set, reduction_factor);
    debug!(
        "Downsampled {} raw samples into {} points (factor {})",
        data_set.longest_stream(),
        points.len(),
        reduction_factor
    );
    points
}

/// Overview over every entry in the index.
pub fn get_downsampled(
    index: &RawIndex,
    requested: &[StreamId],
    reduction_factor: usize,
) -> Vec<DownsampledPoint> {
    get_downsampled_entries(index, index.entries(), requested, reduction_factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::raw_reader::tests::{floats, record, write_file};
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn data_set(streams: &[(StreamId, Vec<f32>)]) -> DataSet {
        DataSet {
            t0: 100,
            dt_us: Some(500_000),
            streams: streams.iter().cloned().collect::<HashMap<_, _>>(),
            failures: Vec::new(),
        }
    }

    #[test]
    fn test_block_statistics() {
        let entry = downsample(&[1.0, 2.0, 3.0, 6.0]);
        assert_eq!(entry.mean, 3.0);
        assert_eq!(entry.min, 1.0);
        assert_eq!(entry.max, 6.0);
        assert!((entry.stddev - 3.5_f32.sqrt()).abs() < 1e-6);

        let short = downsample(&[4.0, 9.0]);
        assert_eq!((short.mean, short.min, short.max, short.stddev), (4.0, 4.0, 4.0, 0.0));

        assert!(downsample(&[]).is_nan());
    }

    #[test]
    fn test_output_follows_longest_stream() {
        let ds = data_set(&[
            (StreamId::Ks, (0..10).map(|i| i as f32).collect()),
            (StreamId::CoE, vec![1.0, 1.0, 1.0]),
        ]);
        let points = downsample_data_set(&ds, 4);

        assert_eq!(points.len(), 3);
        assert_eq!(points[0].date, 100.0);
        assert_eq!(points[1].date, 102.0);
        assert_eq!(points[2].date, 104.0);

        assert_eq!(points[0].get(StreamId::Ks).unwrap().mean, 1.5);
        assert_eq!(points[2].get(StreamId::Ks).unwrap().mean, 8.0);
        assert_eq!(points[0].get(StreamId::CoE).unwrap().mean, 1.0);
        assert!(points[1].get(StreamId::CoE).unwrap().is_nan());
        assert!(points[2].get(StreamId::CoE).unwrap().is_nan());
        assert!(points[0].get(StreamId::Int1).is_none());
    }

    #[test]
    fn test_zero_factor_is_unreduced() {
        let ds = data_set(&[(StreamId::Ks, vec![1.0, 2.0, 3.0])]);
        assert_eq!(downsample_data_set(&ds, 0).len(), 3);
    }

    #[test]
    fn test_overview_from_raw_files() {
        let dir = tempdir().unwrap();
        // SyncIntegral: amplitude words then CoE floats, 6 samples each
        let amplitude: Vec<u8> = (0..6u32).flat_map(|_| 2048u32.to_be_bytes()).collect();
        let coe = floats(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let payload = [amplitude, coe].concat();
        let path = write_file(
            dir.path(),
            "cap.bin",
            &[record(2, 1_000, 1_000, &[0; 4], &payload)],
        );

        let index = RawIndex::scan(&[path]).with_clock_offset(0);
        let points = get_downsampled(&index, &[StreamId::Amplitude, StreamId::CoE], 3);

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].date, 1_000.0);
        assert!((points[1].date - 1_000.003).abs() < 1e-9);
        assert_eq!(points[0].get(StreamId::Amplitude).unwrap().mean, 0.0);
        assert!(points[0].get(StreamId::Runtime).is_some());
        assert_eq!(points[0].get(StreamId::CoE).unwrap().mean, 2.0);
        assert_eq!(points[1].get(StreamId::CoE).unwrap().max, 6.0);
    }

    #[test]
    fn test_unavailable_stream_yields_nothing() {
        let dir = tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "ks.bin",
            &[record(4, 1_000, 0, &[], &floats(&[1.0, 2.0]))],
        );

        let index = RawIndex::scan(&[path]);
        assert!(get_downsampled(&index, &[StreamId::Int1], 10).is_empty());
        assert!(get_downsampled(&RawIndex::default(), &[StreamId::Ks], 10).is_empty());
    }
}
