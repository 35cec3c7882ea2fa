use anyhow::{bail, Context};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use series_reader::config::DEFAULT_CONFIG_FILE;
use series_reader::core::constants::{CSV_EXTENSION, RAW_EXTENSION};
use series_reader::core::paths::has_extension;
use series_reader::{
    decode_raw, expand_paths, get_downsampled_entries, time_extent, EngineConfig, LoadTask,
    StreamId,
};

const CONFIG_ENV: &str = "SERIES_READER_CONFIG";

fn is_raw(path: &Path) -> bool {
    path.is_file() && has_extension(RAW_EXTENSION)(path)
}

async fn load_csv(paths: Vec<PathBuf>, config: &EngineConfig) {
    let mut task = LoadTask::spawn(paths, config.parallel_loading);
    let mut reported = 0;

    while !task.is_finished() {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(100)) => {}
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, cancelling load");
                task.cancel();
            }
        }

        let status = task.status();
        if status.finished_files != reported {
            reported = status.finished_files;
            info!("Progress: {}/{} files", status.finished_files, status.required_files);
        }
    }

    let mut series = task.join().await;
    if series.is_empty() {
        warn!("No valid data found");
        return;
    }

    for s in series.iter_mut() {
        s.visible = true;
    }
    let Some(extent) = time_extent(&series) else {
        return;
    };
    info!("Time range: {} .. {}", extent.start, extent.end);

    for s in series.iter_mut() {
        let fit = s.full_zoom_range(config.max_data_points);
        let window = s.plot_window(extent, config.max_data_points);
        let (buckets, factor, style) = (window.buckets.len(), window.reduction_factor, window.style);
        info!(
            "{} [{}] {:?}: {} samples, dt {}s, {} buckets at factor {} ({:?}), range {:?}",
            s.name,
            s.unit,
            s.kind,
            s.len(),
            s.delta_t,
            buckets,
            factor,
            style,
            fit
        );
    }
}

fn overview_raw(paths: &[PathBuf], config: &EngineConfig) {
    let index = decode_raw(paths).with_clock_offset(config.raw_clock_offset_secs);
    if index.is_empty() {
        warn!("No raw records found");
        return;
    }

    for capture in index.captures() {
        let mut requested: Vec<StreamId> = capture
            .entries
            .first()
            .map(|e| e.record_type.stream_layout().to_vec())
            .unwrap_or_default();
        if requested.contains(&StreamId::Amplitude) {
            requested.push(StreamId::Runtime);
        }

        let points = get_downsampled_entries(
            &index,
            &capture.entries,
            &requested,
            config.raw_reduction_factor,
        );
        info!(
            "{}: start {}, {:.3}s over {} entries, {} overview points",
            capture.path.display(),
            capture.start + config.raw_clock_offset_secs,
            capture.duration,
            capture.entries.len(),
            points.len()
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path =
        PathBuf::from(std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into()));
    let config = EngineConfig::load_or_default(&config_path)
        .with_context(|| format!("reading {}", config_path.display()))?;

    tracing_subscriber::fmt()
        .with_max_level(config.tracing_level())
        .init();

    let args: Vec<PathBuf> = std::env::args_os().skip(1).map(PathBuf::from).collect();
    if args.is_empty() {
        bail!("usage: series_reader <file or directory>...");
    }

    let (raw_files, rest): (Vec<PathBuf>, Vec<PathBuf>) =
        args.into_iter().partition(|p| is_raw(p));
    let dirs: Vec<PathBuf> = rest.iter().filter(|p| p.is_dir()).cloned().collect();

    let raw = expand_paths(&[raw_files, dirs].concat(), has_extension(RAW_EXTENSION))
        .context("listing raw files")?;
    let csv = expand_paths(&rest, has_extension(CSV_EXTENSION)).context("listing csv files")?;
    info!("{} csv files, {} raw files", csv.len(), raw.len());

    if !csv.is_empty() {
        load_csv(csv, &config).await;
    }
    if !raw.is_empty() {
        overview_raw(&raw, &config);
    }

    Ok(())
}
