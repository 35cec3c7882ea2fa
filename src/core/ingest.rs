// Multi-file ingestion: parse every file, merge columns, finalize series

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::core::csv_reader::{parse_file, ParsedColumn};
use crate::core::error::ReaderError;
use crate::core::series::Series;

#[derive(Debug, Clone)]
struct FileJob {
    index: usize,
    total: usize,
    path: PathBuf,
}

fn run_job(job: &FileJob, finished: &AtomicUsize, cancel: &CancellationToken) -> Vec<ParsedColumn> {
    if cancel.is_cancelled() {
        return Vec::new();
    }

    let name = job
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    info!("Loading file: {} ({}/{})...", name, job.index, job.total);

    let columns = match parse_file(&job.path, cancel) {
        Ok(columns) => columns,
        Err(ReaderError::Cancelled) => {
            debug!("Loading of {} cancelled", name);
            Vec::new()
        }
        Err(e) => {
            error!("Failed to load {}: {}", job.path.display(), e);
            Vec::new()
        }
    };

    finished.fetch_add(1, Ordering::Relaxed);
    columns
}

fn worker_count() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

async fn run_parallel(
    jobs: Vec<FileJob>,
    finished: &Arc<AtomicUsize>,
    cancel: &CancellationToken,
) -> Vec<Vec<ParsedColumn>> {
    let permits = Arc::new(Semaphore::new(worker_count()));
    let mut handles = Vec::with_capacity(jobs.len());

    for job in jobs {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        let finished = finished.clone();
        let cancel = cancel.clone();

        handles.push(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            run_job(&job, &finished, &cancel)
        }));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(columns) => outcomes.push(columns),
            Err(e) => {
                error!("File job failed: {}", e);
                outcomes.push(Vec::new());
            }
        }
    }
    outcomes
}

async fn run_sequential(
    jobs: Vec<FileJob>,
    finished: &Arc<AtomicUsize>,
    cancel: &CancellationToken,
) -> Vec<Vec<ParsedColumn>> {
    let mut outcomes = Vec::with_capacity(jobs.len());

    for job in jobs {
        let finished = finished.clone();
        let cancel = cancel.clone();

        match tokio::task::spawn_blocking(move || run_job(&job, &finished, &cancel)).await {
            Ok(columns) => outcomes.push(columns),
            Err(e) => {
                error!("File job failed: {}", e);
                outcomes.push(Vec::new());
            }
        }
    }
    outcomes
}

/// Loads and merges CSV files into finalized series.
///
/// `finished` is incremented once per attempted file. A cancelled load returns nothing, even if
/// some files completed.
pub async fn load_series(
    paths: &[PathBuf],
    finished: &Arc<AtomicUsize>,
    cancel: &CancellationToken,
    parallel: bool,
) -> Vec<Series> {
    if paths.is_empty() {
        return Vec::new();
    }

    let total = paths.len();
    let jobs: Vec<FileJob> = paths
        .iter()
        .enumerate()
        .map(|(i, path)| FileJob {
            index: i + 1,
            total,
            path: path.clone(),
        })
        .collect();

    let outcomes = if parallel {
        run_parallel(jobs, finished, cancel).await
    } else {
        run_sequential(jobs, finished, cancel).await
    };

    if cancel.is_cancelled() {
        info!("Loading cancelled, discarding {} file results", outcomes.len());
        return Vec::new();
    }

    debug!("Merging data...");
    let series: Vec<Series> = merge_columns(outcomes).into_iter().map(finalize).collect();
    debug!("Merged into {} series", series.len());
    series
}

/// Concatenates columns with the same header across files, in file order.
/// Columns without any value are dropped.
pub fn merge_columns(files: Vec<Vec<ParsedColumn>>) -> Vec<ParsedColumn> {
    let mut merged: Vec<ParsedColumn> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();

    for column in files.into_iter().flatten() {
        if column.points.is_empty() {
            continue;
        }

        match by_key.get(&column.key) {
            Some(&i) => merged[i].points.extend(column.points),
            None => {
                by_key.insert(column.key.clone(), merged.len());
                merged.push(column);
            }
        }
    }

    merged
}

/// Stable sort by timestamp, then classification and interval estimation.
pub fn finalize(column: ParsedColumn) -> Series {
    let mut points = column.points;
    points.sort_by(|a, b| a.0.total_cmp(&b.0));
    Series::from_sorted_points(column.name, column.unit, &points)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadStatus {
    pub is_loading: bool,
    pub finished_files: usize,
    pub required_files: usize,
}

/// Background load polled by the caller. Dropping an unfinished task cancels it.
pub struct LoadTask {
    finished: Arc<AtomicUsize>,
    required: usize,
    cancel: CancellationToken,
    result: Option<oneshot::Receiver<Vec<Series>>>,
    handle: Option<JoinHandle<()>>,
}

impl LoadTask {
    /// Must be called from within a tokio runtime.
    pub fn spawn(paths: Vec<PathBuf>, parallel: bool) -> Self {
        let finished = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let required = paths.len();
        let (tx, rx) = oneshot::channel();

        let handle = tokio::spawn({
            let finished = finished.clone();
            let cancel = cancel.clone();
            async move {
                let series = load_series(&paths, &finished, &cancel, parallel).await;
                let _ = tx.send(series);
            }
        });

        Self {
            finished,
            required,
            cancel,
            result: Some(rx),
            handle: Some(handle),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    pub fn status(&self) -> LoadStatus {
        LoadStatus {
            is_loading: !self.is_finished(),
            finished_files: self.finished.load(Ordering::Relaxed),
            required_files: self.required,
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Non-blocking: the loaded series once, `None` while still running or after taking.
    pub fn try_take(&mut self) -> Option<Vec<Series>> {
        let rx = self.result.as_mut()?;

        match rx.try_recv() {
            Ok(series) => {
                self.result = None;
                Some(series)
            }
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                error!("Load task ended without a result");
                self.result = None;
                Some(Vec::new())
            }
        }
    }

    pub async fn join(mut self) -> Vec<Series> {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!("Load task failed: {}", e);
            }
        }
        self.try_take().unwrap_or_default()
    }
}

impl Drop for LoadTask {
    fn drop(&mut self) {
        if !self.is_finished() {
            self.cancel.cancel();
        }
    }
}
