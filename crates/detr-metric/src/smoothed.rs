//! Windowed scalar series.

use std::{collections::VecDeque, fmt};

/// How a [`SmoothedValue`] renders itself in progress lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueFormat {
    /// `"{median} ({global_avg})"` with the given number of decimals.
    MedianGlobalAvg { precision: usize },
    /// The most recent value only.
    Value { precision: usize },
}

impl Default for ValueFormat {
    fn default() -> Self {
        Self::MedianGlobalAvg { precision: 4 }
    }
}

/// Tracks a series of values and exposes smoothed views over a window
/// as well as the average over every value seen.
#[derive(Debug, Clone)]
pub struct SmoothedValue {
    window: VecDeque<f64>,
    window_size: usize,
    total: f64,
    count: usize,
    format: ValueFormat,
}

impl SmoothedValue {
    pub const DEFAULT_WINDOW: usize = 20;

    /// Create a tracker keeping the last `window_size` values.
    pub fn new(window_size: usize, format: ValueFormat) -> Self {
        let window_size = window_size.max(1);
        Self {
            window: VecDeque::with_capacity(window_size),
            window_size,
            total: 0.0,
            count: 0,
            format,
        }
    }

    /// Record `value`, counted `n` times in the global average.
    pub fn update(&mut self, value: f64, n: usize) {
        if self.window.len() == self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(value);
        self.count += n;
        self.total += value * n as f64;
    }

    /// Lower median of the window, matching `torch.median`.
    pub fn median(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self.window.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        sorted[(sorted.len() - 1) / 2]
    }

    pub fn avg(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.window.iter().sum::<f64>() / self.window.len() as f64
    }

    /// Average over every recorded value, not just the window.
    ///
    /// Returns `NaN` when nothing has been recorded.
    pub fn global_avg(&self) -> f64 {
        self.total / self.count as f64
    }

    pub fn max(&self) -> f64 {
        self.window.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Most recent value.
    pub fn value(&self) -> f64 {
        self.window.back().copied().unwrap_or(0.0)
    }

    pub const fn count(&self) -> usize {
        self.count
    }

    pub const fn total(&self) -> f64 {
        self.total
    }

    /// Replace the global counters, e.g. after an all-reduce.
    ///
    /// The window stays local to this process.
    pub fn set_totals(&mut self, count: usize, total: f64) {
        self.count = count;
        self.total = total;
    }
}

impl Default for SmoothedValue {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WINDOW, ValueFormat::default())
    }
}

impl fmt::Display for SmoothedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.format {
            ValueFormat::MedianGlobalAvg { precision } => write!(
                f,
                "{:.p$} ({:.p$})",
                self.median(),
                self.global_avg(),
                p = precision
            ),
            ValueFormat::Value { precision } => write!(f, "{:.p$}", self.value(), p = precision),
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn window_drops_oldest_values_but_global_average_keeps_them() {
        let mut value = SmoothedValue::new(2, ValueFormat::default());
        for v in [1.0, 2.0, 3.0, 4.0] {
            value.update(v, 1);
        }

        assert_relative_eq!(value.avg(), 3.5);
        assert_relative_eq!(value.global_avg(), 2.5);
        assert_relative_eq!(value.max(), 4.0);
        assert_relative_eq!(value.value(), 4.0);
        assert_eq!(value.count(), 4);
    }

    #[test]
    fn median_takes_lower_middle_for_even_windows() {
        let mut value = SmoothedValue::new(4, ValueFormat::default());
        for v in [4.0, 1.0, 3.0, 2.0] {
            value.update(v, 1);
        }

        assert_relative_eq!(value.median(), 2.0);
    }

    #[test]
    fn weighted_updates_count_towards_global_average() {
        let mut value = SmoothedValue::default();
        value.update(1.0, 3);
        value.update(5.0, 1);

        assert_relative_eq!(value.global_avg(), 2.0);
    }

    #[test]
    fn display_follows_format() {
        let mut lr = SmoothedValue::new(1, ValueFormat::Value { precision: 6 });
        lr.update(1e-4, 1);
        assert_eq!(lr.to_string(), "0.000100");

        let mut loss = SmoothedValue::default();
        loss.update(0.5, 1);
        loss.update(1.5, 1);
        assert_eq!(loss.to_string(), "0.5000 (1.0000)");
    }

    #[test]
    fn empty_series_has_no_global_average() {
        let value = SmoothedValue::default();
        assert!(value.global_avg().is_nan());
        assert_eq!(value.median(), 0.0);
    }
}
