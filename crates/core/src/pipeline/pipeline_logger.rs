use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

/// Observer for what the coordinator does each cycle.
///
/// Keeps the state machine free of any particular output mechanism.
pub trait PipelineLogger: Send {
    /// Called once per finished cycle, successful or not.
    fn cycle(&mut self, cycles: u64);

    /// How long one stage of one cycle took.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// A sampled value, e.g. detections per frame or frame age.
    fn metric(&mut self, name: &str, value: f64);

    /// Something that happened, e.g. an aborted cycle by reason.
    fn count(&mut self, name: &str);

    fn info(&mut self, message: &str);

    /// End-of-run report. Default: no-op.
    fn summary(&self) {}
}

/// Discards everything. For tests and embedders with their own reporting.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn cycle(&mut self, _cycles: u64) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn count(&mut self, _name: &str) {}
    fn info(&mut self, _message: &str) {}
}

/// Collects stage timings and metrics and reports them through `log`.
///
/// The pipeline runs indefinitely, so progress is logged every
/// `throttle_cycles` cycles rather than as a fraction of a total.
pub struct LogPipelineLogger {
    throttle_cycles: u64,
    timings: HashMap<String, Vec<f64>>,
    metrics: HashMap<String, Vec<f64>>,
    counts: BTreeMap<String, u64>,
    start_time: Instant,
    cycles: u64,
}

impl LogPipelineLogger {
    pub fn new(throttle_cycles: u64) -> Self {
        Self {
            throttle_cycles: throttle_cycles.max(1),
            timings: HashMap::new(),
            metrics: HashMap::new(),
            counts: BTreeMap::new(),
            start_time: Instant::now(),
            cycles: 0,
        }
    }

    /// Returns the formatted summary, or `None` before any cycle ran.
    pub fn summary_string(&self) -> Option<String> {
        if self.cycles == 0 && self.timings.is_empty() {
            return None;
        }

        let elapsed_s = self.start_time.elapsed().as_secs_f64();
        let mut lines = vec![format!(
            "Pipeline summary ({} cycles, {elapsed_s:.1}s):",
            self.cycles
        )];

        let mut stages: Vec<_> = self.timings.iter().collect();
        stages.sort_by(|a, b| a.0.cmp(b.0));
        for (stage, durations) in stages {
            let (avg, max) = avg_max(durations);
            lines.push(format!("  {stage:10}: avg {avg:6.1}ms  max {max:6.1}ms"));
        }

        let mut metrics: Vec<_> = self.metrics.iter().collect();
        metrics.sort_by(|a, b| a.0.cmp(b.0));
        for (name, values) in metrics {
            let (avg, _) = avg_max(values);
            lines.push(format!("  {name}: avg {avg:.1}"));
        }

        for (name, n) in &self.counts {
            lines.push(format!("  {name}: {n}"));
        }

        if self.cycles > 0 && elapsed_s > 0.0 {
            lines.push(format!(
                "  Throughput: {:.1} cycles/s",
                self.cycles as f64 / elapsed_s
            ));
        }

        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }

    pub fn count_of(&self, name: &str) -> u64 {
        self.counts.get(name).copied().unwrap_or(0)
    }
}

impl Default for LogPipelineLogger {
    fn default() -> Self {
        Self::new(50)
    }
}

impl PipelineLogger for LogPipelineLogger {
    fn cycle(&mut self, cycles: u64) {
        self.cycles = cycles;
        if cycles % self.throttle_cycles == 0 {
            log::info!("{cycles} cycles");
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics
            .entry(name.to_string())
            .or_default()
            .push(value);
    }

    fn count(&mut self, name: &str) {
        *self.counts.entry(name.to_string()).or_default() += 1;
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}

fn avg_max(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let avg = values.iter().sum::<f64>() / values.len() as f64;
    let max = values.iter().copied().fold(f64::MIN, f64::max);
    (avg, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_null_logger_is_silent() {
        let mut logger = NullPipelineLogger;
        logger.cycle(1);
        logger.timing("inference", 5.0);
        logger.metric("objects", 3.0);
        logger.count("aborted.timeout");
        logger.info("hello");
        logger.summary();
    }

    #[test]
    fn test_timings_are_recorded_per_stage() {
        let mut logger = LogPipelineLogger::new(10);
        logger.timing("inference", 20.0);
        logger.timing("inference", 30.0);
        logger.timing("dispatch", 1.0);

        assert_eq!(logger.timings_for("inference").unwrap(), &[20.0, 30.0]);
        assert_eq!(logger.timings_for("dispatch").unwrap().len(), 1);
        assert!(logger.timings_for("matching").is_none());
    }

    #[test]
    fn test_counts_accumulate() {
        let mut logger = LogPipelineLogger::new(10);
        logger.count("aborted.timeout");
        logger.count("aborted.timeout");
        logger.count("aborted.stall");

        assert_eq!(logger.count_of("aborted.timeout"), 2);
        assert_eq!(logger.count_of("aborted.stall"), 1);
        assert_eq!(logger.count_of("aborted.failure"), 0);
    }

    #[test]
    fn test_summary_lists_stages_metrics_and_counts() {
        let mut logger = LogPipelineLogger::new(10);
        for i in 1..=4 {
            logger.cycle(i);
        }
        logger.timing("inference", 40.0);
        logger.metric("objects", 2.0);
        logger.metric("objects", 5.0);
        logger.count("aborted.timeout");

        let summary = logger.summary_string().unwrap();
        assert!(summary.contains("4 cycles"));
        assert!(summary.contains("inference"));
        assert!(summary.contains("objects: avg 3.5"));
        assert!(summary.contains("aborted.timeout: 1"));
        assert!(summary.contains("cycles/s"));
    }

    #[test]
    fn test_empty_summary_returns_none() {
        assert!(LogPipelineLogger::default().summary_string().is_none());
    }

    #[test]
    fn test_avg_max() {
        let (avg, max) = avg_max(&[1.0, 4.0, 7.0]);
        assert_relative_eq!(avg, 4.0);
        assert_relative_eq!(max, 7.0);
        assert_eq!(avg_max(&[]), (0.0, 0.0));
    }
}
