use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::node::FolderNode;

pub const REPORT_INTERVAL: Duration = Duration::from_secs(5);
pub const LOG_INTERVAL: Duration = Duration::from_secs(20);

const SMOOTHING_ALPHA: f64 = 0.1;
const MIN_SAMPLES_FOR_ESTIMATE: u64 = 10;

#[derive(Debug, Clone)]
pub struct ScanProgress {
    pub processed: u64,
    pub total: u64,
    pub eta: Option<Duration>,
    pub elapsed: Duration,
    pub root: Arc<FolderNode>,
}

impl ScanProgress {
    pub fn fraction(&self) -> Option<f32> {
        if self.total == 0 {
            return None;
        }
        Some((self.processed as f32 / self.total as f32).clamp(0.0, 1.0))
    }
}

pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: ScanProgress);
}

impl<F> ProgressSink for F
where
    F: Fn(ScanProgress) + Send + Sync,
{
    fn report(&self, progress: ScanProgress) {
        self(progress)
    }
}

pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _progress: ScanProgress) {}
}

#[derive(Debug, Clone)]
pub struct ThroughputEstimator {
    started: Instant,
    smoothed_rate: Option<f64>,
    last_count: u64,
    last_report: Option<Instant>,
}

impl ThroughputEstimator {
    pub fn new(started: Instant) -> Self {
        Self {
            started,
            smoothed_rate: None,
            last_count: 0,
            last_report: None,
        }
    }

    pub fn rate(&self) -> Option<f64> {
        self.smoothed_rate
    }

    pub fn observe(&mut self, processed: u64, total: u64, now: Instant) -> Option<Duration> {
        if processed < MIN_SAMPLES_FOR_ESTIMATE && self.last_count == 0 {
            return None;
        }

        match self.last_report {
            None => {
                let elapsed = now.saturating_duration_since(self.started).as_secs_f64();
                if elapsed > 0.0 {
                    self.smoothed_rate = Some(processed as f64 / elapsed);
                }
            }
            Some(last) => {
                let since = now.saturating_duration_since(last).as_secs_f64();
                if since > 0.0 {
                    let instant = processed.saturating_sub(self.last_count) as f64 / since;
                    self.smoothed_rate = Some(match self.smoothed_rate {
                        Some(old) => SMOOTHING_ALPHA * instant + (1.0 - SMOOTHING_ALPHA) * old,
                        None => instant,
                    });
                }
            }
        }

        self.last_count = processed;
        self.last_report = Some(now);

        let remaining = total.saturating_sub(processed);
        match self.smoothed_rate {
            Some(rate) if rate > 0.0 && total > 0 && remaining > 0 => {
                Some(Duration::from_secs_f64(remaining as f64 / rate))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_estimate_before_warm_up() {
        let start = Instant::now();
        let mut estimator = ThroughputEstimator::new(start);
        assert_eq!(estimator.observe(3, 100, start + Duration::from_secs(1)), None);
        assert_eq!(estimator.rate(), None);
    }

    #[test]
    fn first_report_seeds_from_total_elapsed() {
        let start = Instant::now();
        let mut estimator = ThroughputEstimator::new(start);
        let eta = estimator.observe(20, 100, start + Duration::from_secs(2));
        assert_eq!(estimator.rate(), Some(10.0));
        assert_eq!(eta, Some(Duration::from_secs(8)));
    }

    #[test]
    fn later_reports_blend_with_alpha() {
        let start = Instant::now();
        let mut estimator = ThroughputEstimator::new(start);
        estimator.observe(20, 1000, start + Duration::from_secs(2));
        // 100 folders in 5s = 20/s; 0.1 * 20 + 0.9 * 10 = 11
        estimator.observe(120, 1000, start + Duration::from_secs(7));
        let rate = estimator.rate().expect("rate");
        assert!((rate - 11.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_total_gives_no_eta() {
        let start = Instant::now();
        let mut estimator = ThroughputEstimator::new(start);
        assert_eq!(estimator.observe(50, 0, start + Duration::from_secs(1)), None);
        assert!(estimator.rate().is_some());
    }

    #[test]
    fn fraction_requires_total() {
        let root = FolderNode::new_root("/", None);
        let mut progress = ScanProgress {
            processed: 5,
            total: 0,
            eta: None,
            elapsed: Duration::ZERO,
            root,
        };
        assert_eq!(progress.fraction(), None);
        progress.total = 10;
        assert_eq!(progress.fraction(), Some(0.5));
    }
}
