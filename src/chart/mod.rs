//! Chart module for displaying the live price line.
//!
//! This module provides:
//! - `LineChart` - Price line with axes, legend and hover cursor
//! - `EguiChartBackend` - Creates line charts for the feed controller

mod base;
mod line;

pub use base::*;
pub use line::{EguiChartBackend, LineChart};
