use serde::{Deserialize, Serialize};

/// Running statistics of a stream of values (Welford's algorithm).
#[derive(Debug, Clone)]
pub struct RunningStats {
    n_vals: usize,
    mean: f64,
    diff_2_sum: f64,
    min: f64,
    max: f64,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct StatsReport {
    pub n_vals: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

impl RunningStats {
    pub fn new() -> Self {
        Self {
            n_vals: 0,
            mean: 0.0,
            diff_2_sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    pub fn push(&mut self, val: f64) {
        self.n_vals += 1;
        self.min = self.min.min(val);
        self.max = self.max.max(val);

        let diff_a = val - self.mean;
        self.mean += diff_a / self.n_vals as f64;
        let diff_b = val - self.mean;
        self.diff_2_sum += diff_a * diff_b;
    }

    /// Sample standard deviation; NaN with fewer than two values.
    pub fn std_dev(&self) -> f64 {
        if self.n_vals < 2 {
            return f64::NAN;
        }
        (self.diff_2_sum / (self.n_vals - 1) as f64).sqrt()
    }

    pub fn report(&self) -> StatsReport {
        if self.n_vals == 0 {
            return StatsReport {
                n_vals: 0,
                mean: f64::NAN,
                std_dev: f64::NAN,
                min: f64::NAN,
                max: f64::NAN,
            };
        }
        StatsReport {
            n_vals: self.n_vals,
            mean: self.mean,
            std_dev: self.std_dev(),
            min: self.min,
            max: self.max,
        }
    }
}
