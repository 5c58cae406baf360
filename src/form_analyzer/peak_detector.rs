//! Wrist-height apex detection.
//!
//! The live detector confirms that the bell has passed its highest point: the
//! smoothed wrist height rose to a maximum inside a short rolling window and has
//! since dropped by a margin proportional to torso length. [`find_peaks`] is the
//! offline counterpart used to list top-position candidates from a whole track.

use crate::filters::moving_average::MovingAverageFilter;
use crate::filters::SignalFilter;
use std::collections::VecDeque;

/// Rolling wrist-height peak detector
pub struct WristPeakDetector {
    smoothing: MovingAverageFilter,
    window: VecDeque<f64>,
    window_size: usize,
    drop_ratio: f64,
}

impl WristPeakDetector {
    #[must_use]
    pub fn new(window_size: usize, smoothing_window: usize, drop_ratio: f64) -> Self {
        let window_size = window_size.max(3);
        Self {
            smoothing: MovingAverageFilter::new(smoothing_window),
            window: VecDeque::with_capacity(window_size),
            window_size,
            drop_ratio,
        }
    }

    /// Push a raw wrist height; returns true once an apex is confirmed
    pub fn push(&mut self, wrist_height: f64, torso_length: f64) -> bool {
        let smoothed = self.smoothing.apply(wrist_height);
        if self.window.len() >= self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(smoothed);
        self.is_peak(torso_length)
    }

    fn is_peak(&self, torso_length: f64) -> bool {
        let n = self.window.len();
        if n < 3 {
            return false;
        }
        let (max_index, max) = self
            .window
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, v)| if v > best.1 { (i, v) } else { best });
        let last = self.window[n - 1];
        max_index > 0 && max_index < n - 1 && last < max - self.drop_ratio * torso_length.abs()
    }

    pub fn reset(&mut self) {
        self.smoothing.reset();
        self.window.clear();
    }
}

/// Indices of local maxima at least `min_distance` apart
///
/// A sample is a peak when it rises above its left neighbour and is not
/// exceeded by its right neighbour. Peaks closer than `min_distance` are
/// resolved in favour of the higher one. Output is ascending.
#[must_use]
pub fn find_peaks(values: &[f64], min_distance: usize, threshold: Option<f64>) -> Vec<usize> {
    if values.len() < 3 {
        return Vec::new();
    }
    let mut candidates: Vec<usize> = (1..values.len() - 1)
        .filter(|&i| values[i] > values[i - 1] && values[i] >= values[i + 1])
        .filter(|&i| threshold.map_or(true, |t| values[i] >= t))
        .collect();

    candidates.sort_by(|&a, &b| values[b].total_cmp(&values[a]).then(a.cmp(&b)));

    let mut kept: Vec<usize> = Vec::with_capacity(candidates.len());
    for index in candidates {
        if kept.iter().all(|&k| k.abs_diff(index) >= min_distance) {
            kept.push(index);
        }
    }
    kept.sort_unstable();
    kept
}
