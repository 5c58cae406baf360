//! Checked numeric conversions for frame indices, durations and scores

use crate::{Error, Result};

/// Safely convert usize to u32 with overflow checking
///
/// # Errors
///
/// Returns an error if the value exceeds u32::MAX
pub fn usize_to_u32(value: usize) -> Result<u32> {
    value
        .try_into()
        .map_err(|_| Error::InvalidInput(format!("Value {value} too large to fit in u32")))
}

/// Clamp and convert f64 milliseconds to u64, non-finite and negative values become 0
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // Clamped before the cast
pub fn f64_to_u64_clamp(value: f64) -> u64 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    value.min(u64::MAX as f64) as u64
}

/// Round and clamp f64 into an inclusive u32 range
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // Clamped before the cast
pub fn f64_to_u32_clamp(value: f64, min: u32, max: u32) -> u32 {
    let (min, max) = if min <= max { (min, max) } else { (max, min) };
    if !value.is_finite() {
        return min;
    }
    value.round().clamp(f64::from(min), f64::from(max)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_usize_to_u32() {
        assert_eq!(usize_to_u32(42).unwrap(), 42);
        assert_eq!(usize_to_u32(u32::MAX as usize).unwrap(), u32::MAX);
        if std::mem::size_of::<usize>() > 4 {
            assert!(usize_to_u32(u32::MAX as usize + 1).is_err());
        }
    }

    #[test]
    fn test_f64_to_u64_clamp() {
        assert_eq!(f64_to_u64_clamp(1500.7), 1500);
        assert_eq!(f64_to_u64_clamp(-3.0), 0);
        assert_eq!(f64_to_u64_clamp(f64::NAN), 0);
    }

    #[test]
    fn test_f64_to_u32_clamp() {
        assert_eq!(f64_to_u32_clamp(99.6, 0, 100), 100);
        assert_eq!(f64_to_u32_clamp(140.0, 0, 100), 100);
        assert_eq!(f64_to_u32_clamp(-5.0, 0, 100), 0);
        assert_eq!(f64_to_u32_clamp(f64::INFINITY, 0, 100), 0);
    }

    proptest! {
        #[test]
        fn prop_f64_to_u32_clamp_within_bounds(value in any::<f64>(), min in 0u32..50, max in 50u32..200) {
            let result = f64_to_u32_clamp(value, min, max);
            prop_assert!(result >= min);
            prop_assert!(result <= max);
        }
    }
}
