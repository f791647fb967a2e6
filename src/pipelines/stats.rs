use std::time::{Duration, Instant};

/// Statistics for one `run_batch` call.
#[derive(Debug, Clone)]
pub struct PipelineStats {
    /// Total execution time.
    pub total_time: Duration,
    /// Number of inputs processed, failed ones included.
    pub items_processed: usize,
    /// Number of inputs that produced a result.
    pub items_succeeded: usize,
}

impl PipelineStats {
    /// Create a new stats tracker (call at start of operation).
    pub(crate) fn start() -> PipelineStatsBuilder {
        PipelineStatsBuilder {
            start_time: Instant::now(),
        }
    }

    /// Inputs per second over the whole call.
    pub fn items_per_second(&self) -> f64 {
        let secs = self.total_time.as_secs_f64();
        if secs > 0.0 {
            self.items_processed as f64 / secs
        } else {
            0.0
        }
    }
}

/// Tracks timing from creation to `finish`.
pub(crate) struct PipelineStatsBuilder {
    start_time: Instant,
}

impl PipelineStatsBuilder {
    /// Finalize stats with the item counts.
    pub fn finish(self, items_processed: usize, items_succeeded: usize) -> PipelineStats {
        PipelineStats {
            total_time: self.start_time.elapsed(),
            items_processed,
            items_succeeded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PipelineStats;
    use std::time::Duration;

    #[test]
    fn calculates_rate() {
        let stats = PipelineStats {
            total_time: Duration::from_secs(2),
            items_processed: 8,
            items_succeeded: 7,
        };
        assert!((stats.items_per_second() - 4.0).abs() < 1e-9);

        let instant = PipelineStats::start().finish(3, 3);
        assert_eq!(instant.items_processed, 3);
    }
}
