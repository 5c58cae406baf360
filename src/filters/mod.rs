//! Scalar signal filters for smoothing noisy joint angles.
//!
//! Pose models jitter by a few degrees from frame to frame. The biomechanics
//! layer runs every tracked angle through one of these before differentiating.

/// Moving average filter for simple smoothing
pub mod moving_average;

/// Exponential filter for responsive smoothing
pub mod exponential;

use crate::Result;

/// Trait for all angle filters
pub trait SignalFilter: Send + Sync {
    /// Apply filter to one input sample
    fn apply(&mut self, value: f64) -> f64;

    /// Reset filter state
    fn reset(&mut self);

    /// Get filter name
    fn name(&self) -> &str;
}

/// No-op filter that passes through values unchanged
pub struct NoFilter;

impl SignalFilter for NoFilter {
    fn apply(&mut self, value: f64) -> f64 {
        value
    }

    fn reset(&mut self) {}

    fn name(&self) -> &str {
        "NoFilter"
    }
}

/// Create a signal filter by type name
///
/// `alpha` is the EMA smoothing factor. A moving average gets the window with
/// the same center of mass, `2 / alpha - 1` samples.
pub fn create_filter(filter_type: &str, alpha: f64) -> Result<Box<dyn SignalFilter>> {
    match filter_type.to_lowercase().as_str() {
        "none" | "nofilter" => Ok(Box::new(NoFilter)),
        "exponential" | "ema" => Ok(Box::new(exponential::ExponentialFilter::new(alpha)?)),
        "moving_average" | "movingaverage" => {
            if !(alpha > 0.0 && alpha <= 1.0) {
                return Err(crate::Error::ConfigError(format!("Alpha must be in (0, 1], got {alpha}")));
            }
            let window = crate::utils::safe_cast::f64_to_u32_clamp(2.0 / alpha - 1.0, 1, 1000) as usize;
            Ok(Box::new(moving_average::MovingAverageFilter::new(window)))
        }
        _ => Err(crate::Error::ConfigError(format!("Unknown filter type: {filter_type}"))),
    }
}
