//! Price Tracker - Live ticker price chart in Rust
//!
//! This crate keeps one chart bound to the selected ticker:
//!
//! - Bulk price history over HTTP (`feed::PriceRestClient`)
//! - Incremental points over a WebSocket with reconnect and backoff
//!   (`feed::PriceWebSocketClient`)
//! - A sans-IO `ChartFeedController` that owns the chart, the series window
//!   and the watermark, driven by the async `FeedEngine`
//! - Line chart rendering (with `gui` feature)
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use price_tracker::tracker::{FeedEngine, FeedSetting, SETTINGS};
//! use price_tracker::feed::PriceRestClient;
//! # use price_tracker::tracker::{ChartBackend, ChartConfig, PriceChart, PricePoint};
//! # struct NoChart;
//! # impl PriceChart for NoChart {
//! #     fn push_point(&mut self, _: &PricePoint) {}
//! #     fn shift_point(&mut self) {}
//! #     fn update(&mut self) {}
//! #     fn destroy(&mut self) {}
//! # }
//! # struct NoBackend;
//! # impl ChartBackend for NoBackend {
//! #     type Chart = NoChart;
//! #     fn create_chart(&mut self, _: ChartConfig, _: &[PricePoint]) -> NoChart { NoChart }
//! # }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let setting = FeedSetting::from_settings(&SETTINGS)?;
//!     let datafeed = Arc::new(PriceRestClient::new(&setting)?);
//!     let mut engine = FeedEngine::new(NoBackend, &setting, datafeed, tokio::runtime::Handle::current())?;
//!
//!     engine.start();
//!     engine.select("ticker_01");
//!     loop {
//!         engine.process_next().await;
//!     }
//! }
//! ```

pub mod feed;
pub mod tracker;

#[cfg(feature = "gui")]
pub mod chart;

// Re-export commonly used types
pub use feed::{PriceRestClient, PriceWebSocketClient, ReconnectPolicy};
pub use tracker::{
    // Controller
    ChartFeedController, FeedCommand, FeedEngine, FeedEvent, FeedState,
    // Data objects
    ClientMessage, ConnectionState, PricePoint, SeriesWindow, WindowBound,
    // Rendering seam
    AxisMode, ChartBackend, ChartConfig, ChartLabel, PriceChart,
    // Configuration and errors
    FeedError, FeedSetting, StreamMode,
};

#[cfg(feature = "gui")]
pub use chart::{EguiChartBackend, LineChart};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
