//! Tracker core: data model, settings, logging and the feed controller.

pub mod controller;
pub mod datafeed;
pub mod engine;
pub mod error;
pub mod logger;
pub mod object;
pub mod render;
pub mod setting;
pub mod utility;
pub mod window;

pub use controller::{ChartFeedController, FeedCommand, FeedState};
pub use datafeed::{PriceDatafeed, StaticDatafeed};
pub use engine::{FeedEngine, FeedEvent, FeedEventSender, StreamEvent};
pub use error::FeedError;
pub use object::{format_timestamp, parse_stream_payload, parse_timestamp, ClientMessage, ConnectionState, PriceMessage, PricePoint};
pub use render::{AxisMode, ChartBackend, ChartConfig, ChartLabel, PriceChart};
pub use setting::{FeedSetting, SettingValue, Settings, StreamMode, SETTINGS};
pub use window::{SeriesWindow, WindowBound};
