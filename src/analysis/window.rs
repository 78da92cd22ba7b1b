//! # Rolling Window
//!
//! Fixed-capacity FIFO history of numeric samples. Once full, each push
//! evicts the oldest sample.
//!
//! ## Usage
//!
//! ```
//! use edge_sentinel::analysis::RollingWindow;
//!
//! let mut window = RollingWindow::with_capacity(3);
//! for v in [1.0, 2.0, 3.0, 4.0] {
//!     window.push(v);
//! }
//! assert_eq!(window.values().collect::<Vec<_>>(), vec![2.0, 3.0, 4.0]);
//! ```

use std::collections::VecDeque;

/// Samples kept per metric on an edge node
pub const WINDOW_CAPACITY: usize = 10;

/// Bounded sample history
#[derive(Debug, Clone)]
pub struct RollingWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl Default for RollingWindow {
    fn default() -> Self {
        Self::with_capacity(WINDOW_CAPACITY)
    }
}

impl RollingWindow {
    /// Creates an empty window holding at most `capacity` samples.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a sample, evicting the oldest one when full.
    pub fn push(&mut self, value: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    /// Samples in insertion order, oldest first
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().copied()
    }

    /// Arithmetic mean, or `None` for an empty window
    ///
    /// Finite samples always give a finite mean, even when their sum
    /// overflows.
    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let n = self.samples.len() as f64;
        let sum = self.samples.iter().sum::<f64>();
        if sum.is_finite() {
            return Some(sum / n);
        }
        Some(self.samples.iter().map(|v| v / n).sum())
    }
}
