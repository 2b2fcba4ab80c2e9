//! Feed controller keeping one live chart bound to the selected ticker.
//!
//! The controller performs no I/O. Every entry point mutates its state
//! synchronously and returns the [`FeedCommand`]s the caller must execute:
//! fetch a history, open/close a stream connection, or send a message on it.
//! Results come back through `on_history_received`, `on_stream_state` and
//! `on_stream_message`, one at a time.
//!
//! State machine:
//!
//! ```text
//! Idle --select--> Loading --history ok--> Live --message--> Live
//!                     |                      |
//!                     +--history err--> Idle +--select--> Loading
//! ```

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::error::FeedError;
use super::object::{parse_stream_payload, ClientMessage, ConnectionState, PricePoint};
use super::render::{AxisMode, ChartBackend, ChartConfig, ChartLabel, PriceChart};
use super::setting::{FeedSetting, StreamMode};
use super::window::{SeriesWindow, WindowBound};

/// Controller lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedState {
    #[default]
    Idle,
    Loading,
    Live,
}

/// Side effect requested by the controller
#[derive(Debug, Clone, PartialEq)]
pub enum FeedCommand {
    /// Fetch the full history of `ticker`; reply with `on_history_received(generation, ..)`
    FetchHistory { generation: u64, ticker: String },
    OpenStream { connection: u64 },
    CloseStream { connection: u64 },
    Send { connection: u64, message: ClientMessage },
}

/// Owns the chart, the series window, the watermark and the stream binding
pub struct ChartFeedController<B: ChartBackend> {
    backend: B,
    window_bound: WindowBound,
    stream_mode: StreamMode,
    axis: AxisMode,
    label: ChartLabel,

    state: FeedState,
    ticker: Option<String>,
    /// Bumped on every selection; history results from older generations are dropped
    generation: u64,
    chart: Option<B::Chart>,
    window: SeriesWindow,
    watermark: Option<DateTime<Utc>>,

    connection: Option<u64>,
    connection_state: ConnectionState,
    next_connection: u64,

    last_error: Option<String>,
}

impl<B: ChartBackend> ChartFeedController<B> {
    pub fn new(backend: B, setting: &FeedSetting) -> Self {
        Self {
            backend,
            window_bound: setting.window,
            stream_mode: setting.stream_mode,
            axis: setting.axis,
            label: setting.label.clone(),
            state: FeedState::Idle,
            ticker: None,
            generation: 0,
            chart: None,
            window: SeriesWindow::new(setting.window),
            watermark: None,
            connection: None,
            connection_state: ConnectionState::Closed,
            next_connection: 0,
            last_error: None,
        }
    }

    /// Lifecycle start. Poll mode opens its shared connection here.
    pub fn start(&mut self) -> Vec<FeedCommand> {
        match self.stream_mode {
            StreamMode::Poll { .. } if self.connection.is_none() => vec![self.open_stream()],
            _ => Vec::new(),
        }
    }

    /// The user picked `ticker`: drop the current chart and fetch a fresh history
    pub fn on_ticker_selected(&mut self, ticker: &str) -> Vec<FeedCommand> {
        self.generation += 1;
        self.destroy_chart();
        self.window = SeriesWindow::new(self.window_bound);
        self.watermark = None;
        self.ticker = Some(ticker.to_string());
        self.state = FeedState::Loading;
        self.last_error = None;

        info!("Ticker selected: {} (generation {})", ticker, self.generation);

        let mut commands = vec![FeedCommand::FetchHistory {
            generation: self.generation,
            ticker: ticker.to_string(),
        }];

        // Poll mode keeps its connection; the next poll goes out once the history is in
        if self.stream_mode == StreamMode::Reconnect {
            commands.extend(self.close_stream());
        }

        commands
    }

    /// Completion of a `FetchHistory` command
    pub fn on_history_received(
        &mut self,
        generation: u64,
        result: Result<Vec<PricePoint>, FeedError>,
    ) -> Vec<FeedCommand> {
        if generation != self.generation || self.state != FeedState::Loading {
            debug!("Dropping stale history (generation {}, current {})", generation, self.generation);
            return Vec::new();
        }
        let Some(ticker) = self.ticker.clone() else {
            return Vec::new();
        };

        let history = match result {
            Ok(history) => history,
            Err(e) => {
                warn!("Failed to load price history for {}: {}", ticker, e);
                self.last_error = Some(format!("Failed to load {}: {}", ticker, e));
                self.state = FeedState::Idle;
                return Vec::new();
            }
        };

        self.window = SeriesWindow::from_points(self.window_bound, history);
        self.watermark = self.window.last().map(|p| p.timestamp);

        self.destroy_chart();
        let config = self.chart_config(&ticker);
        let points = self.window.to_vec();
        self.chart = Some(self.backend.create_chart(config, &points));
        self.state = FeedState::Live;

        info!(
            "Chart built for {} with {} points, watermark {:?}",
            ticker,
            self.window.len(),
            self.watermark
        );

        match self.stream_mode {
            StreamMode::Reconnect => {
                let mut commands: Vec<FeedCommand> = self.close_stream().into_iter().collect();
                commands.push(self.open_stream());
                commands
            }
            StreamMode::Poll { .. } if self.connection.is_none() => vec![self.open_stream()],
            StreamMode::Poll { .. } => self.send_poll().into_iter().collect(),
        }
    }

    /// State change of a stream connection. Returns the greeting once it opens.
    pub fn on_stream_state(&mut self, connection: u64, state: ConnectionState) -> Vec<FeedCommand> {
        if self.connection != Some(connection) {
            return Vec::new();
        }

        let was_open = self.connection_state.is_open();
        self.connection_state = state;

        if !state.is_open() || was_open {
            return Vec::new();
        }

        match self.stream_mode {
            StreamMode::Reconnect => match (&self.ticker, self.state) {
                (Some(ticker), FeedState::Live) => vec![FeedCommand::Send {
                    connection,
                    message: ClientMessage::Ticker(ticker.clone()),
                }],
                _ => Vec::new(),
            },
            StreamMode::Poll { .. } => self.send_poll().into_iter().collect(),
        }
    }

    /// Apply a payload received on `connection`. Returns the number of points appended.
    pub fn on_stream_message(&mut self, connection: u64, payload: &str) -> Result<usize, FeedError> {
        if self.connection != Some(connection) || self.state != FeedState::Live {
            debug!("Ignoring message on connection {} while {:?}", connection, self.state);
            return Ok(0);
        }

        let messages = match parse_stream_payload(payload) {
            Ok(messages) => messages,
            Err(e) => {
                warn!("Malformed stream payload: {}", e);
                self.last_error = Some(format!("Malformed stream payload: {}", e));
                return Err(e);
            }
        };

        let ticker = self.ticker.as_deref().unwrap_or_default();
        let total = messages.len();
        let points: Vec<PricePoint> = messages
            .iter()
            .filter(|m| m.belongs_to(ticker))
            .map(|m| m.point())
            .collect();
        if points.len() < total {
            debug!("Dropped {} points for other tickers", total - points.len());
        }

        Ok(self.apply_points(points))
    }

    /// Periodic poll trigger (poll mode only)
    pub fn tick(&mut self) -> Vec<FeedCommand> {
        match self.stream_mode {
            StreamMode::Poll { .. } if self.state == FeedState::Live => {
                self.send_poll().into_iter().collect()
            }
            _ => Vec::new(),
        }
    }

    /// Tear everything down; the controller returns to Idle
    pub fn dispose(&mut self) -> Vec<FeedCommand> {
        self.generation += 1;
        self.destroy_chart();
        self.window.clear();
        self.watermark = None;
        self.ticker = None;
        self.state = FeedState::Idle;
        self.close_stream().into_iter().collect()
    }

    fn apply_points(&mut self, points: Vec<PricePoint>) -> usize {
        let Some(chart) = self.chart.as_mut() else {
            return 0;
        };

        let mut applied = 0;
        for point in points {
            if self.watermark.is_some_and(|w| point.timestamp <= w) {
                continue;
            }
            let evicted = self.window.push(point);
            chart.push_point(&point);
            for _ in 0..evicted {
                chart.shift_point();
            }
            self.watermark = Some(point.timestamp);
            applied += 1;
        }

        for _ in 0..self.window.enforce_bound() {
            chart.shift_point();
        }

        if applied > 0 {
            chart.update();
        }
        applied
    }

    fn chart_config(&self, ticker: &str) -> ChartConfig {
        let label = match &self.label {
            ChartLabel::Fixed(label) => label.clone(),
            ChartLabel::Ticker => ticker.to_string(),
        };
        ChartConfig {
            ticker: ticker.to_string(),
            label,
            axis: self.axis,
        }
    }

    fn destroy_chart(&mut self) {
        if let Some(mut chart) = self.chart.take() {
            chart.destroy();
        }
    }

    fn open_stream(&mut self) -> FeedCommand {
        self.next_connection += 1;
        self.connection = Some(self.next_connection);
        self.connection_state = ConnectionState::Connecting;
        FeedCommand::OpenStream {
            connection: self.next_connection,
        }
    }

    fn close_stream(&mut self) -> Option<FeedCommand> {
        let connection = self.connection.take()?;
        self.connection_state = ConnectionState::Closed;
        Some(FeedCommand::CloseStream { connection })
    }

    /// Poll request for the current ticker, if Live and the shared connection is open
    fn send_poll(&self) -> Option<FeedCommand> {
        let StreamMode::Poll { with_watermark } = self.stream_mode else {
            return None;
        };
        if self.state != FeedState::Live {
            return None;
        }
        let connection = self.connection?;
        if !self.connection_state.is_open() {
            return None;
        }
        let ticker = self.ticker.clone()?;

        let message = if with_watermark {
            ClientMessage::Poll {
                ticker,
                watermark: self.watermark,
            }
        } else {
            ClientMessage::Ticker(ticker)
        };
        Some(FeedCommand::Send { connection, message })
    }

    pub fn state(&self) -> FeedState {
        self.state
    }

    pub fn ticker(&self) -> Option<&str> {
        self.ticker.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn chart(&self) -> Option<&B::Chart> {
        self.chart.as_ref()
    }

    pub fn chart_mut(&mut self) -> Option<&mut B::Chart> {
        self.chart.as_mut()
    }

    pub fn window(&self) -> &SeriesWindow {
        &self.window
    }

    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        self.watermark
    }

    pub fn connection(&self) -> Option<u64> {
        self.connection
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection_state
    }

    pub fn stream_mode(&self) -> StreamMode {
        self.stream_mode
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}
