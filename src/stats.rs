//! Sample set statistics
//!
//! A [`SampleStats`] wraps an immutable sample set and derives count, min,
//! max, mean, sample standard deviation, median and sum on first access.
//! Derived values are cached; an empty set reports 0 everywhere.

use serde::Serialize;
use std::cell::OnceCell;

/// Lazily computed statistics over one sample set
#[derive(Debug, Clone, Default)]
pub struct SampleStats {
    data: Vec<f64>,
    min: OnceCell<f64>,
    max: OnceCell<f64>,
    mean: OnceCell<f64>,
    stdev: OnceCell<f64>,
    median: OnceCell<f64>,
    sum: OnceCell<f64>,
}

/// Plain snapshot of every derived statistic
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatsSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stdev: f64,
    pub median: f64,
    pub sum: f64,
}

impl StatsSummary {
    /// Same summary with every value but the count divided by `divisor`
    pub fn scaled(self, divisor: f64) -> Self {
        Self {
            count: self.count,
            min: self.min / divisor,
            max: self.max / divisor,
            mean: self.mean / divisor,
            stdev: self.stdev / divisor,
            median: self.median / divisor,
            sum: self.sum / divisor,
        }
    }
}

impl SampleStats {
    pub fn new(data: Vec<f64>) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    /// Build from integer nanosecond samples
    pub fn from_nanos(samples: &[i64]) -> Self {
        Self::new(samples.iter().map(|&ns| ns as f64).collect())
    }

    /// Statistics over the concatenation of several sample sets
    pub fn union<'a>(parts: impl IntoIterator<Item = &'a SampleStats>) -> Self {
        Self::new(
            parts
                .into_iter()
                .flat_map(|part| part.data.iter().copied())
                .collect(),
        )
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn count(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn cached(&self, cell: &OnceCell<f64>, compute: impl FnOnce(&[f64]) -> f64) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        *cell.get_or_init(|| compute(&self.data))
    }

    pub fn min(&self) -> f64 {
        self.cached(&self.min, |data| {
            data.iter().copied().fold(f64::INFINITY, f64::min)
        })
    }

    pub fn max(&self) -> f64 {
        self.cached(&self.max, |data| {
            data.iter().copied().fold(f64::NEG_INFINITY, f64::max)
        })
    }

    pub fn sum(&self) -> f64 {
        self.cached(&self.sum, |data| data.iter().sum())
    }

    pub fn mean(&self) -> f64 {
        let sum = self.sum();
        self.cached(&self.mean, |data| sum / data.len() as f64)
    }

    /// Sample standard deviation (n - 1 denominator), 0 below two samples
    pub fn stdev(&self) -> f64 {
        if self.data.len() < 2 {
            return 0.0;
        }
        let mean = self.mean();
        self.cached(&self.stdev, |data| {
            let squares: f64 = data.iter().map(|x| (x - mean) * (x - mean)).sum();
            (squares / (data.len() - 1) as f64).sqrt()
        })
    }

    /// Middle value, or the mean of the two middle values for even counts
    pub fn median(&self) -> f64 {
        self.cached(&self.median, |data| {
            let mut sorted = data.to_vec();
            sorted.sort_by(|a, b| a.total_cmp(b));
            let mid = sorted.len() / 2;
            if sorted.len() % 2 == 0 {
                (sorted[mid - 1] + sorted[mid]) / 2.0
            } else {
                sorted[mid]
            }
        })
    }

    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            count: self.count(),
            min: self.min(),
            max: self.max(),
            mean: self.mean(),
            stdev: self.stdev(),
            median: self.median(),
            sum: self.sum(),
        }
    }
}
