//! Renderer seam between the feed controller and whatever draws the chart.

use chrono::{DateTime, Local, Utc};

use super::object::PricePoint;

/// How the horizontal axis presents time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AxisMode {
    /// Pre-labeled category axis with locale-formatted time strings
    Category,
    /// True time-scale axis with "Time"/"Price" titles and ticks from the data
    #[default]
    Time,
}

impl AxisMode {
    /// Label shown for a point on this axis
    pub fn format_label(&self, timestamp: &DateTime<Utc>) -> String {
        match self {
            AxisMode::Category => timestamp.with_timezone(&Local).format("%H:%M:%S").to_string(),
            AxisMode::Time => timestamp.to_rfc3339(),
        }
    }

    /// Axis titles `(x, y)`, only drawn on a time-scale axis
    pub fn titles(&self) -> Option<(&'static str, &'static str)> {
        match self {
            AxisMode::Category => None,
            AxisMode::Time => Some(("Time", "Price")),
        }
    }
}

/// Dataset label policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartLabel {
    Fixed(String),
    /// Use the active ticker identifier
    Ticker,
}

impl Default for ChartLabel {
    fn default() -> Self {
        ChartLabel::Fixed("Ticker price".to_string())
    }
}

/// Everything a backend needs to construct one chart
#[derive(Debug, Clone, PartialEq)]
pub struct ChartConfig {
    pub ticker: String,
    pub label: String,
    pub axis: AxisMode,
}

/// A live chart instance owned by the controller
pub trait PriceChart {
    /// Append one point at the right edge
    fn push_point(&mut self, point: &PricePoint);

    /// Drop the oldest point
    fn shift_point(&mut self);

    /// Redraw after a batch of pushes/shifts
    fn update(&mut self);

    /// Detach from the render target. The chart is dropped right after.
    fn destroy(&mut self);
}

/// Factory for charts bound to the single render target
pub trait ChartBackend {
    type Chart: PriceChart;

    fn create_chart(&mut self, config: ChartConfig, points: &[PricePoint]) -> Self::Chart;
}
