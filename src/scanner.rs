use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime};

use log::{debug, info, warn};
use parking_lot::Mutex;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::cancel::CancelToken;
use crate::config::ScanConfig;
use crate::error::{Cancelled, ScanError};
use crate::format::{format_clock, group_thousands};
use crate::node::FolderNode;
use crate::progress::{
    LOG_INTERVAL, ProgressSink, REPORT_INTERVAL, ScanProgress, ThroughputEstimator,
};

const NEVER_EMITTED: u64 = u64::MAX;

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub threshold_bytes: u64,
    pub total_for_estimate: u64,
    pub max_depth: usize,
    pub parallel: bool,
    pub use_physical_size: bool,
    pub threads: Option<usize>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::from_config(&ScanConfig::default(), 0, 0)
    }
}

impl ScanOptions {
    pub fn from_config(config: &ScanConfig, threshold_bytes: u64, total_for_estimate: u64) -> Self {
        Self {
            threshold_bytes,
            total_for_estimate,
            max_depth: config.max_depth_for_count,
            parallel: config.use_parallel_scan,
            use_physical_size: config.use_physical_size,
            threads: config.scan_threads,
        }
    }
}

pub fn default_scan_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .clamp(2, 16)
}

pub fn count_entries(path: &Path, max_depth: usize, cancel: &CancelToken) -> Result<u64, Cancelled> {
    let mut count = 0u64;
    for entry in WalkDir::new(path).max_depth(max_depth).follow_links(false) {
        cancel.check()?;
        match entry {
            Ok(entry) if entry.file_type().is_dir() => count += 1,
            Ok(_) => {}
            Err(err) => debug!("lff count skipped entry: {err}"),
        }
    }
    Ok(count)
}

/// Walks `path` into a [`FolderNode`] tree, aggregating sizes bottom-up as
/// files are discovered and publishing progress snapshots to `sink`.
///
/// Every file and folder becomes a node regardless of size. Unreadable
/// directories below the root are left with whatever was collected before
/// the error.
pub fn scan(
    path: &Path,
    options: &ScanOptions,
    sink: &dyn ProgressSink,
    cancel: &CancelToken,
) -> Result<Arc<FolderNode>, ScanError> {
    cancel.check()?;
    let metadata = fs::metadata(path).map_err(|source| ScanError::Root {
        path: path.to_path_buf(),
        source,
    })?;
    if !metadata.is_dir() {
        return Err(ScanError::NotADirectory(path.to_path_buf()));
    }

    let cluster_size = if options.use_physical_size {
        cluster_size(path)
    } else {
        0
    };

    let root = FolderNode::new_root(path.to_string_lossy().into_owned(), metadata.modified().ok());
    info!(
        "lff scan started root={} threshold={} total={} parallel={} cluster_size={}",
        path.display(),
        options.threshold_bytes,
        options.total_for_estimate,
        options.parallel,
        cluster_size
    );

    let started = Instant::now();
    let ctx = ScanContext {
        options,
        cluster_size,
        sink,
        cancel,
        started,
        root: Arc::clone(&root),
        processed: AtomicU64::new(0),
        files: AtomicU64::new(0),
        fs_errors: AtomicU64::new(0),
        last_emit_ms: AtomicU64::new(NEVER_EMITTED),
        report: Mutex::new(ReportState {
            estimator: ThroughputEstimator::new(started),
            last_log: None,
        }),
    };

    let outcome = if options.parallel {
        let threads = options.threads.unwrap_or_else(default_scan_threads).max(1);
        match ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|idx| format!("lff-scan-{idx}"))
            .build()
        {
            Ok(pool) => pool.install(|| ctx.scan_dir(path, &root, 0)),
            Err(err) => {
                warn!("lff scan pool unavailable, using the global pool: {err}");
                ctx.scan_dir(path, &root, 0)
            }
        }
    } else {
        ctx.scan_dir(path, &root, 0)
    };

    info!(
        "lff scan stats root={} cancelled={} folders={} files={} bytes={} fs_errors={} elapsed={}",
        path.display(),
        outcome.is_err(),
        ctx.processed.load(Ordering::Relaxed),
        ctx.files.load(Ordering::Relaxed),
        root.size(),
        ctx.fs_errors.load(Ordering::Relaxed),
        format_clock(started.elapsed())
    );

    outcome?;
    Ok(root)
}

struct ReportState {
    estimator: ThroughputEstimator,
    last_log: Option<Instant>,
}

struct ScanContext<'a> {
    options: &'a ScanOptions,
    cluster_size: u64,
    sink: &'a dyn ProgressSink,
    cancel: &'a CancelToken,
    started: Instant,
    root: Arc<FolderNode>,
    processed: AtomicU64,
    files: AtomicU64,
    fs_errors: AtomicU64,
    last_emit_ms: AtomicU64,
    report: Mutex<ReportState>,
}

struct PendingDir {
    path: PathBuf,
    name: String,
    modified: Option<SystemTime>,
}

impl ScanContext<'_> {
    fn scan_dir(&self, dir: &Path, node: &Arc<FolderNode>, depth: usize) -> Result<(), Cancelled> {
        self.cancel.check()?;

        let processed = if depth <= self.options.max_depth {
            self.processed.fetch_add(1, Ordering::Relaxed) + 1
        } else {
            self.processed.load(Ordering::Relaxed)
        };
        self.maybe_report(processed, dir);

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                debug!("lff cannot read {}: {err}", dir.display());
                self.fs_errors.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
        };

        let mut file_bytes = 0u64;
        let mut subdirs = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!("lff enumeration error in {}: {err}", dir.display());
                    self.fs_errors.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            };
            let Ok(file_type) = entry.file_type() else {
                self.fs_errors.fetch_add(1, Ordering::Relaxed);
                continue;
            };
            if file_type.is_symlink() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            let metadata = entry.metadata().ok();
            let modified = metadata.as_ref().and_then(|meta| meta.modified().ok());

            if file_type.is_dir() {
                subdirs.push(PendingDir {
                    path: entry.path(),
                    name,
                    modified,
                });
            } else if file_type.is_file() {
                let length = metadata.as_ref().map(|meta| meta.len()).unwrap_or(0);
                let size = round_to_cluster(length, self.cluster_size);
                file_bytes += size;
                FolderNode::new_child(node, name, true, size, modified);
                self.files.fetch_add(1, Ordering::Relaxed);
            }
        }

        node.add_size(file_bytes);

        if self.options.parallel {
            subdirs.into_par_iter().try_for_each(|pending| {
                self.cancel.check()?;
                let child = FolderNode::new_child(node, pending.name, false, 0, pending.modified);
                self.scan_dir(&pending.path, &child, depth + 1)
            })
        } else {
            for pending in subdirs {
                self.cancel.check()?;
                let child = FolderNode::new_child(node, pending.name, false, 0, pending.modified);
                self.scan_dir(&pending.path, &child, depth + 1)?;
            }
            Ok(())
        }
    }

    fn maybe_report(&self, processed: u64, dir: &Path) {
        let elapsed = self.started.elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;
        let interval_ms = REPORT_INTERVAL.as_millis() as u64;

        let previous = self.last_emit_ms.load(Ordering::Acquire);
        if previous != NEVER_EMITTED && elapsed_ms.saturating_sub(previous) < interval_ms {
            return;
        }

        let mut state = self.report.lock();
        // another thread may have published while we waited for the lock
        let previous = self.last_emit_ms.load(Ordering::Acquire);
        if previous != NEVER_EMITTED && elapsed_ms.saturating_sub(previous) < interval_ms {
            return;
        }
        self.last_emit_ms.store(elapsed_ms, Ordering::Release);

        let now = Instant::now();
        let total = self.options.total_for_estimate;
        let eta = state.estimator.observe(processed, total, now);

        let log_due = state
            .last_log
            .is_none_or(|last| now.saturating_duration_since(last) >= LOG_INTERVAL);
        if log_due {
            let percent = if total > 0 {
                processed as f64 / total as f64 * 100.0
            } else {
                0.0
            };
            let remaining = eta.map(format_clock).unwrap_or_else(|| "unknown".into());
            info!(
                "lff progress {}/{} ({percent:.1}%) elapsed={} remaining={remaining} checking={}",
                group_thousands(processed),
                group_thousands(total),
                format_clock(elapsed),
                dir.display()
            );
            state.last_log = Some(now);
        }

        self.sink.report(ScanProgress {
            processed,
            total,
            eta,
            elapsed,
            root: Arc::clone(&self.root),
        });
    }
}

pub fn round_to_cluster(length: u64, cluster_size: u64) -> u64 {
    if cluster_size == 0 {
        return length;
    }
    length.div_ceil(cluster_size) * cluster_size
}

pub fn cluster_size(path: &Path) -> u64 {
    match fs2::allocation_granularity(path) {
        Ok(size) => size,
        Err(err) => {
            debug!("lff cluster size unavailable for {}: {err}", path.display());
            0
        }
    }
}
