// Streaming weighted mean, used wherever a centroid is grown one point
// at a time (ROI representative m/z, aligned feature centroids).

/// Incremental weighted mean that also keeps the observed min/max.
///
/// # Example
///
/// ```
/// use mzalign::utils::streaming_calculators::RunningStatsCalculator;
///
/// let mut calc = RunningStatsCalculator::new(1.0, 10.0);
/// calc.add(3.0, 20.0);
/// assert_eq!(calc.mean(), Some(17.5));
/// assert_eq!(calc.min(), 10.0);
/// assert_eq!(calc.max(), 20.0);
/// ```
///
/// Weights that are not strictly positive (or not finite) are ignored,
/// so a zero-intensity point never moves the mean.
#[derive(Debug, Clone, Copy)]
pub struct RunningStatsCalculator {
    weight: f64,
    mean_n: f64,
    min: f64,
    max: f64,
}

impl Default for RunningStatsCalculator {
    fn default() -> Self {
        Self {
            weight: 0.0,
            mean_n: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

fn usable_weight(weight: f64) -> bool {
    weight.is_finite() && weight > 0.0
}

impl RunningStatsCalculator {
    pub fn new(weight: f64, mean: f64) -> Self {
        let mut out = Self::default();
        out.add(weight, mean);
        out
    }

    /// Mean that would result from adding `value` with `weight`,
    /// without changing the calculator.
    pub fn peek_add(&self, weight: f64, value: f64) -> f64 {
        if !usable_weight(weight) {
            return if self.weight > 0.0 { self.mean_n } else { value };
        }
        let total = self.weight + weight;
        let mean = self.mean_n + (value - self.mean_n) * (weight / total);
        // Squeeze into the observed span, float error can push it outside.
        mean.clamp(self.min.min(value), self.max.max(value))
    }

    pub fn add(&mut self, weight: f64, value: f64) {
        if !usable_weight(weight) {
            return;
        }
        self.mean_n = self.peek_add(weight, value);
        self.weight += weight;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn mean(&self) -> Option<f64> {
        if self.weight > 0.0 {
            Some(self.mean_n)
        } else {
            None
        }
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
