//! # Analysis Module
//!
//! Rolling sample history and the anomaly classifier that runs over it.

pub mod window;
pub mod detector;

pub use detector::{classify, WindowStats};
pub use window::{RollingWindow, WINDOW_CAPACITY};
