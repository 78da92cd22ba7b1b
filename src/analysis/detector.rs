//! # Anomaly Detector
//!
//! Flags a sample that lies more than two population standard deviations
//! from the mean of its window.
//!
//! The window passed in already contains the new sample, so the sample
//! contributes to the mean and deviation it is tested against. Nothing is
//! classified until the window is full.
//!
//! ```
//! use edge_sentinel::analysis::{classify, RollingWindow};
//!
//! let mut window = RollingWindow::default();
//! for _ in 0..9 {
//!     window.push(10.0);
//! }
//! window.push(100.0);
//! assert!(classify(100.0, &window));
//! ```

use super::window::RollingWindow;

/// Number of standard deviations beyond which a sample is anomalous
pub const SIGMA_THRESHOLD: f64 = 2.0;

/// Mean and population standard deviation of a window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub mean: f64,
    pub std_dev: f64,
}

impl WindowStats {
    /// Computes statistics over every sample, dividing by N (not N - 1).
    ///
    /// Returns `None` for an empty window.
    pub fn from_window(window: &RollingWindow) -> Option<Self> {
        let mean = window.mean()?;
        let n = window.len() as f64;
        let variance = window
            .values()
            .map(|v| {
                let d = v - mean;
                d * d
            })
            .sum::<f64>()
            / n;

        Some(Self {
            mean,
            std_dev: variance.sqrt(),
        })
    }
}

/// Classifies the newest sample of `window`.
///
/// # Arguments
///
/// * `new_value` - The sample just appended to `window`
/// * `window` - History including `new_value`
///
/// # Returns
///
/// `true` iff the window is full and `|new_value - mean| > 2 * std_dev`.
/// With a uniform window (`std_dev == 0`) only a value different from the
/// mean is flagged.
pub fn classify(new_value: f64, window: &RollingWindow) -> bool {
    if !window.is_full() {
        return false;
    }

    match WindowStats::from_window(window) {
        Some(stats) => (new_value - stats.mean).abs() > SIGMA_THRESHOLD * stats.std_dev,
        None => false,
    }
}
