//! Named metric collection and periodic progress reporting.

use std::{
    collections::BTreeMap,
    fmt,
    time::{Duration, Instant},
};

use crate::{
    dist::ProcessGroup,
    smoothed::{SmoothedValue, ValueFormat},
};

/// A set of named [`SmoothedValue`]s updated once per iteration.
///
/// Meters that were not registered with [`MetricLogger::add_meter`] are created
/// with the default window and format on first update.
#[derive(Debug, Clone)]
pub struct MetricLogger {
    meters: BTreeMap<String, SmoothedValue>,
    delimiter: String,
}

impl MetricLogger {
    pub fn new(delimiter: impl Into<String>) -> Self {
        Self {
            meters: BTreeMap::new(),
            delimiter: delimiter.into(),
        }
    }

    /// Register `meter` under `name`, replacing any existing meter.
    pub fn add_meter(&mut self, name: impl Into<String>, meter: SmoothedValue) {
        self.meters.insert(name.into(), meter);
    }

    /// Record a single observation for `name`.
    pub fn update(&mut self, name: &str, value: f64) {
        match self.meters.get_mut(name) {
            Some(meter) => meter.update(value, 1),
            None => {
                let mut meter = SmoothedValue::default();
                meter.update(value, 1);
                self.meters.insert(name.to_string(), meter);
            }
        }
    }

    /// Record one observation for each `(name, value)` pair.
    pub fn update_all<'a, I>(&mut self, values: I)
    where
        I: IntoIterator<Item = (&'a String, &'a f64)>,
    {
        for (name, value) in values {
            self.update(name, *value);
        }
    }

    pub fn meter(&self, name: &str) -> Option<&SmoothedValue> {
        self.meters.get(name)
    }

    pub fn meters(&self) -> impl Iterator<Item = (&String, &SmoothedValue)> {
        self.meters.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.meters.is_empty()
    }

    /// Drop every meter.
    pub fn clear(&mut self) {
        self.meters.clear();
    }

    /// Sum each meter's `count` and `total` over all workers.
    ///
    /// Afterwards [`SmoothedValue::global_avg`] is the average over every value
    /// recorded by any worker. Windows are not synchronised.
    pub fn synchronize_between_processes(&mut self, group: &dyn ProcessGroup) {
        if group.world_size() < 2 {
            return;
        }
        for meter in self.meters.values_mut() {
            let mut slots = [meter.count() as f64, meter.total()];
            group.all_reduce_sum(&mut slots);
            meter.set_totals(slots[0].round() as usize, slots[1]);
        }
    }

    /// The global average of every meter.
    pub fn global_averages(&self) -> BTreeMap<String, f64> {
        self.meters
            .iter()
            .map(|(name, meter)| (name.clone(), meter.global_avg()))
            .collect()
    }
}

impl Default for MetricLogger {
    fn default() -> Self {
        Self::new("  ")
    }
}

impl fmt::Display for MetricLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, meter)) in self.meters.iter().enumerate() {
            if i > 0 {
                f.write_str(&self.delimiter)?;
            }
            write!(f, "{name}: {meter}")?;
        }
        Ok(())
    }
}

/// Times the iterations of a loop and logs a progress line every `print_freq`
/// iterations and on the last one.
///
/// Call [`data_ready`](Self::data_ready) once the batch has been fetched and
/// [`step`](Self::step) once the iteration body is done.
#[derive(Debug)]
pub struct ProgressTracker {
    header: String,
    print_freq: usize,
    total: Option<usize>,
    index: usize,
    start: Instant,
    last: Instant,
    iter_time: SmoothedValue,
    data_time: SmoothedValue,
}

impl ProgressTracker {
    pub fn new(header: impl Into<String>, print_freq: usize, total: Option<usize>) -> Self {
        let now = Instant::now();
        Self {
            header: header.into(),
            print_freq: print_freq.max(1),
            total,
            index: 0,
            start: now,
            last: now,
            iter_time: SmoothedValue::new(
                SmoothedValue::DEFAULT_WINDOW,
                ValueFormat::Value { precision: 4 },
            ),
            data_time: SmoothedValue::new(
                SmoothedValue::DEFAULT_WINDOW,
                ValueFormat::Value { precision: 4 },
            ),
        }
    }

    pub fn data_ready(&mut self) {
        self.data_time.update(self.last.elapsed().as_secs_f64(), 1);
    }

    pub fn step(&mut self, logger: &MetricLogger) {
        self.iter_time.update(self.last.elapsed().as_secs_f64(), 1);

        let is_last = self.total.is_some_and(|total| self.index + 1 == total);
        if self.index % self.print_freq == 0 || is_last {
            self.log(logger);
        }

        self.index += 1;
        self.last = Instant::now();
    }

    /// Iterations completed so far.
    pub const fn iterations(&self) -> usize {
        self.index
    }

    /// Log and return the elapsed wall time.
    pub fn finish(&self) -> Duration {
        let elapsed = self.start.elapsed();
        let per_iter = if self.index == 0 {
            0.0
        } else {
            elapsed.as_secs_f64() / self.index as f64
        };
        tracing::info!(
            "{} Total time: {} ({per_iter:.4} s / it)",
            self.header,
            format_duration(elapsed)
        );
        elapsed
    }

    fn log(&self, logger: &MetricLogger) {
        match self.total {
            Some(total) => {
                let remaining = total.saturating_sub(self.index) as f64;
                let eta = Duration::from_secs_f64((self.iter_time.global_avg() * remaining).max(0.0));
                tracing::info!(
                    "{} [{}/{}]  eta: {}  {}  time: {}  data: {}",
                    self.header,
                    self.index,
                    total,
                    format_duration(eta),
                    logger,
                    self.iter_time,
                    self.data_time
                );
            }
            None => {
                tracing::info!(
                    "{} [{}]  {}  time: {}  data: {}",
                    self.header,
                    self.index,
                    logger,
                    self.iter_time,
                    self.data_time
                );
            }
        }
    }
}

/// `H:MM:SS`, like Python's `timedelta` string form without fractions.
fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    struct Doubled;

    impl ProcessGroup for Doubled {
        fn world_size(&self) -> usize {
            2
        }

        fn rank(&self) -> usize {
            1
        }

        fn all_reduce_sum(&self, values: &mut [f64]) {
            for v in values {
                *v *= 2.0;
            }
        }
    }

    #[test]
    fn unknown_meters_are_created_on_update() {
        let mut logger = MetricLogger::default();
        logger.update("loss", 2.0);
        logger.update("loss", 4.0);

        assert_relative_eq!(logger.meter("loss").unwrap().global_avg(), 3.0);
    }

    #[test]
    fn registered_meters_keep_their_format() {
        let mut logger = MetricLogger::new(" | ");
        logger.add_meter("lr", SmoothedValue::new(1, ValueFormat::Value { precision: 6 }));
        logger.update("lr", 0.001);
        logger.update("loss", 1.0);

        assert_eq!(logger.to_string(), "loss: 1.0000 (1.0000) | lr: 0.001000");
    }

    #[test]
    fn synchronization_combines_counts_and_totals() {
        let mut logger = MetricLogger::default();
        logger.update("loss", 1.0);
        logger.update("loss", 3.0);
        logger.synchronize_between_processes(&Doubled);

        let meter = logger.meter("loss").unwrap();
        assert_eq!(meter.count(), 4);
        assert_relative_eq!(meter.global_avg(), 2.0);
    }

    #[test]
    fn clear_removes_all_meters() {
        let mut logger = MetricLogger::default();
        logger.update("loss", 1.0);
        logger.clear();
        assert!(logger.is_empty());
        assert!(logger.global_averages().is_empty());
    }

    #[test]
    fn tracker_counts_iterations() {
        let logger = MetricLogger::default();
        let mut tracker = ProgressTracker::new("Epoch: [0]", 2, Some(3));
        for _ in 0..3 {
            tracker.data_ready();
            tracker.step(&logger);
        }
        assert_eq!(tracker.iterations(), 3);
        tracker.finish();
    }

    #[test]
    fn durations_render_as_hours_minutes_seconds() {
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
        assert_eq!(format_duration(Duration::from_secs(59)), "0:00:59");
    }
}
