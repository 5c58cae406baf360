use super::SignalFilter;
use crate::{Error, Result};

/// Exponential moving average
pub struct ExponentialFilter {
    alpha: f64,
    last: Option<f64>,
}

impl ExponentialFilter {
    /// Create a filter; `alpha` must lie in (0, 1]
    pub fn new(alpha: f64) -> Result<Self> {
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(Error::ConfigError(format!("Alpha must be in (0, 1], got {alpha}")));
        }
        Ok(Self { alpha, last: None })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Last filtered value, if any sample has been seen
    pub fn current(&self) -> Option<f64> {
        self.last
    }
}

impl SignalFilter for ExponentialFilter {
    fn apply(&mut self, value: f64) -> f64 {
        let filtered = match self.last {
            Some(last) => self.alpha * value + (1.0 - self.alpha) * last,
            None => value,
        };
        self.last = Some(filtered);
        filtered
    }

    fn reset(&mut self) {
        self.last = None;
    }

    fn name(&self) -> &str {
        "ExponentialFilter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_filter() {
        let mut filter = ExponentialFilter::new(0.5).unwrap();

        // First value passes through
        assert_eq!(filter.apply(10.0), 10.0);

        // Second value is smoothed
        assert_eq!(filter.apply(20.0), 15.0); // 0.5 * 20 + 0.5 * 10
    }

    #[test]
    fn test_alpha_bounds() {
        // High alpha = less smoothing
        let mut filter1 = ExponentialFilter::new(0.9).unwrap();
        filter1.apply(10.0);
        assert!((filter1.apply(20.0) - 19.0).abs() < 0.001);

        // Low alpha = more smoothing
        let mut filter2 = ExponentialFilter::new(0.1).unwrap();
        filter2.apply(10.0);
        assert!((filter2.apply(20.0) - 11.0).abs() < 0.001);

        assert!(ExponentialFilter::new(1.5).is_err());
        assert!(ExponentialFilter::new(f64::NAN).is_err());
    }

    #[test]
    fn test_reset_forgets_history() {
        let mut filter = ExponentialFilter::new(0.3).unwrap();
        filter.apply(100.0);
        filter.reset();
        assert_eq!(filter.current(), None);
        assert_eq!(filter.apply(5.0), 5.0);
    }
}
