//! Async driver of the [`ChartFeedController`].
//!
//! The engine executes the controller's commands on a tokio runtime and
//! routes every completion back through a single channel, so the controller
//! only ever sees one event at a time on the owning thread.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::controller::{ChartFeedController, FeedCommand};
use super::datafeed::PriceDatafeed;
use super::error::FeedError;
use super::object::{ConnectionState, PricePoint};
use super::render::ChartBackend;
use super::setting::{FeedSetting, StreamMode};
use crate::feed::{PriceWebSocketClient, StreamConnection};

/// Activity on one stream connection
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    State(ConnectionState),
    /// Raw text frame
    Message(String),
}

/// Completion delivered to the engine
#[derive(Debug)]
pub enum FeedEvent {
    Tickers(Result<Vec<String>, FeedError>),
    History {
        generation: u64,
        result: Result<Vec<PricePoint>, FeedError>,
    },
    Stream {
        connection: u64,
        event: StreamEvent,
    },
    Tick,
}

pub type FeedEventSender = mpsc::UnboundedSender<FeedEvent>;

/// Runs the controller against the datafeed and the price stream
pub struct FeedEngine<B: ChartBackend> {
    controller: ChartFeedController<B>,
    datafeed: Arc<dyn PriceDatafeed>,
    stream_client: PriceWebSocketClient,
    runtime: Handle,

    event_tx: FeedEventSender,
    event_rx: mpsc::UnboundedReceiver<FeedEvent>,

    connections: HashMap<u64, StreamConnection>,
    poll_interval: Duration,
    timer: Option<JoinHandle<()>>,
    tickers: Vec<String>,
    /// Set once the ticker list request has completed, successfully or not
    tickers_loaded: bool,
}

impl<B: ChartBackend> FeedEngine<B> {
    pub fn new(
        backend: B,
        setting: &FeedSetting,
        datafeed: Arc<dyn PriceDatafeed>,
        runtime: Handle,
    ) -> Result<Self, FeedError> {
        let stream_client = PriceWebSocketClient::new(setting.stream_url()?, setting.reconnect);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Ok(Self {
            controller: ChartFeedController::new(backend, setting),
            datafeed,
            stream_client,
            runtime,
            event_tx,
            event_rx,
            connections: HashMap::new(),
            poll_interval: setting.poll_interval,
            timer: None,
            tickers: setting.default_tickers.clone(),
            tickers_loaded: false,
        })
    }

    /// Load the ticker list, start the poll timer and the controller
    pub fn start(&mut self) {
        let datafeed = self.datafeed.clone();
        let tx = self.event_tx.clone();
        self.runtime.spawn(async move {
            let result = datafeed.query_tickers().await;
            let _ = tx.send(FeedEvent::Tickers(result));
        });

        if matches!(self.controller.stream_mode(), StreamMode::Poll { .. }) && self.timer.is_none() {
            let tx = self.event_tx.clone();
            let period = self.poll_interval;
            self.timer = Some(self.runtime.spawn(async move {
                let mut interval = tokio::time::interval(period);
                // First tick completes immediately
                interval.tick().await;
                loop {
                    interval.tick().await;
                    if tx.send(FeedEvent::Tick).is_err() {
                        break;
                    }
                }
            }));
            info!("Poll timer started, every {:?}", period);
        }

        let commands = self.controller.start();
        self.execute(commands);
    }

    /// Forward a selection from the selector widget
    pub fn select(&mut self, ticker: &str) {
        let commands = self.controller.on_ticker_selected(ticker);
        self.execute(commands);
    }

    /// Handle every pending event without blocking. Returns how many were handled.
    pub fn process_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.event_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Wait for the next event and handle it
    pub async fn process_next(&mut self) {
        if let Some(event) = self.event_rx.recv().await {
            self.handle_event(event);
        }
    }

    pub fn handle_event(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::Tickers(result) => {
                match result {
                    Ok(tickers) if !tickers.is_empty() => {
                        info!("Loaded {} tickers", tickers.len());
                        self.tickers = tickers;
                    }
                    Ok(_) => {
                        warn!("Ticker list is empty, keeping {} default tickers", self.tickers.len());
                    }
                    Err(e) => {
                        warn!("Failed to load tickers, keeping defaults: {}", e);
                    }
                }
                self.tickers_loaded = true;
            }
            FeedEvent::History { generation, result } => {
                if let Err(e) = &result {
                    error!("History request {} failed: {}", generation, e);
                }
                let commands = self.controller.on_history_received(generation, result);
                self.execute(commands);
            }
            FeedEvent::Stream {
                connection,
                event: StreamEvent::State(state),
            } => {
                debug!("Stream {}: {}", connection, state.label());
                let commands = self.controller.on_stream_state(connection, state);
                self.execute(commands);
            }
            FeedEvent::Stream {
                connection,
                event: StreamEvent::Message(payload),
            } => match self.controller.on_stream_message(connection, &payload) {
                Ok(0) => {}
                Ok(applied) => debug!("Stream {}: applied {} points", connection, applied),
                Err(e) => warn!("Stream {}: dropped message: {}", connection, e),
            },
            FeedEvent::Tick => {
                let commands = self.controller.tick();
                self.execute(commands);
            }
        }
    }

    fn execute(&mut self, commands: Vec<FeedCommand>) {
        for command in commands {
            match command {
                FeedCommand::FetchHistory { generation, ticker } => {
                    let datafeed = self.datafeed.clone();
                    let tx = self.event_tx.clone();
                    self.runtime.spawn(async move {
                        let result = datafeed.query_price_history(&ticker).await;
                        let _ = tx.send(FeedEvent::History { generation, result });
                    });
                }
                FeedCommand::OpenStream { connection } => {
                    let handle = self
                        .stream_client
                        .spawn(&self.runtime, connection, self.event_tx.clone());
                    self.connections.insert(connection, handle);
                }
                FeedCommand::CloseStream { connection } => {
                    if let Some(handle) = self.connections.remove(&connection) {
                        handle.close();
                    }
                }
                FeedCommand::Send { connection, message } => {
                    let result = self
                        .connections
                        .get(&connection)
                        .ok_or(FeedError::NotConnected(connection))
                        .and_then(|handle| handle.send(&message));
                    if let Err(e) = result {
                        warn!("Failed to send {:?}: {}", message, e);
                    }
                }
            }
        }
    }

    /// Destroy the chart, close every connection and stop the poll timer
    pub fn dispose(&mut self) {
        let commands = self.controller.dispose();
        self.execute(commands);

        for (_, handle) in self.connections.drain() {
            handle.close();
        }
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        info!("Feed engine disposed");
    }

    pub fn controller(&self) -> &ChartFeedController<B> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut ChartFeedController<B> {
        &mut self.controller
    }

    /// Tickers offered by the selector
    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn tickers_loaded(&self) -> bool {
        self.tickers_loaded
    }

    /// Ticker the selector should switch to: the first listed one, once the
    /// list is known, when nothing valid is selected.
    pub fn initial_selection(&self, current: Option<&str>) -> Option<String> {
        if !self.tickers_loaded {
            return None;
        }
        match current {
            Some(ticker) if self.tickers.iter().any(|t| t == ticker) => None,
            _ => self.tickers.first().cloned(),
        }
    }

    pub fn open_connections(&self) -> usize {
        self.connections.len()
    }
}

impl<B: ChartBackend> Drop for FeedEngine<B> {
    fn drop(&mut self) {
        for (_, handle) in self.connections.drain() {
            handle.close();
        }
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::controller::FeedState;
    use crate::tracker::datafeed::StaticDatafeed;
    use crate::tracker::render::{ChartConfig, PriceChart};
    use chrono::{TimeZone, Utc};

    #[derive(Default)]
    struct VecChart {
        points: Vec<PricePoint>,
    }

    impl PriceChart for VecChart {
        fn push_point(&mut self, point: &PricePoint) {
            self.points.push(*point);
        }

        fn shift_point(&mut self) {
            if !self.points.is_empty() {
                self.points.remove(0);
            }
        }

        fn update(&mut self) {}

        fn destroy(&mut self) {}
    }

    struct VecBackend;

    impl ChartBackend for VecBackend {
        type Chart = VecChart;

        fn create_chart(&mut self, _config: ChartConfig, points: &[PricePoint]) -> VecChart {
            VecChart {
                points: points.to_vec(),
            }
        }
    }

    fn point(second: u32, price: f64) -> PricePoint {
        PricePoint::new(Utc.with_ymd_and_hms(2022, 3, 1, 0, 0, second).unwrap(), price)
    }

    fn offline_setting() -> FeedSetting {
        FeedSetting {
            // Nothing listens on port 1; the stream keeps backing off
            host: "http://127.0.0.1:1".to_string(),
            default_tickers: vec!["ticker_01".to_string()],
            ..FeedSetting::default()
        }
    }

    fn engine(datafeed: StaticDatafeed) -> FeedEngine<VecBackend> {
        FeedEngine::new(
            VecBackend,
            &offline_setting(),
            Arc::new(datafeed),
            Handle::current(),
        )
        .unwrap()
    }

    async fn process_until<B: ChartBackend>(engine: &mut FeedEngine<B>, done: impl Fn(&FeedEngine<B>) -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !done(engine) {
                engine.process_next().await;
            }
        })
        .await
        .expect("condition not reached");
    }

    #[tokio::test]
    async fn test_selection_builds_chart_from_datafeed() {
        let datafeed = StaticDatafeed::new().with_history("ticker_01", vec![point(1, 10.0), point(2, 12.0)]);
        let mut engine = engine(datafeed);
        engine.start();
        engine.select("ticker_01");

        process_until(&mut engine, |e| e.controller().state() == FeedState::Live).await;

        let chart = engine.controller().chart().unwrap();
        assert_eq!(chart.points, vec![point(1, 10.0), point(2, 12.0)]);
        assert_eq!(engine.open_connections(), 1);

        engine.dispose();
        assert_eq!(engine.controller().state(), FeedState::Idle);
        assert_eq!(engine.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_ticker_list_replaces_defaults() {
        let datafeed = StaticDatafeed::new()
            .with_history("ticker_07", Vec::new())
            .with_history("ticker_08", Vec::new());
        let mut engine = engine(datafeed);
        assert_eq!(engine.tickers(), ["ticker_01".to_string()]);

        engine.start();
        process_until(&mut engine, |e| e.tickers().len() == 2).await;
        assert_eq!(engine.tickers(), ["ticker_07".to_string(), "ticker_08".to_string()]);
    }

    #[tokio::test]
    async fn test_initial_selection_waits_for_ticker_list() {
        let datafeed = StaticDatafeed::new().with_history("ticker_09", Vec::new());
        let mut engine = engine(datafeed);
        assert_eq!(engine.initial_selection(None), None);

        engine.start();
        process_until(&mut engine, |e| e.tickers_loaded()).await;

        assert_eq!(engine.initial_selection(None), Some("ticker_09".to_string()));
        assert_eq!(engine.initial_selection(Some("ticker_01")), Some("ticker_09".to_string()));
        assert_eq!(engine.initial_selection(Some("ticker_09")), None);
    }

    #[test]
    fn test_failed_ticker_list_keeps_defaults() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut engine = FeedEngine::new(
            VecBackend,
            &offline_setting(),
            Arc::new(StaticDatafeed::new()),
            runtime.handle().clone(),
        )
        .unwrap();

        engine.handle_event(FeedEvent::Tickers(Err(FeedError::NotConnected(0))));
        assert!(engine.tickers_loaded());
        assert_eq!(engine.initial_selection(None), Some("ticker_01".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_ticker_leaves_engine_idle() {
        let mut engine = engine(StaticDatafeed::new());
        engine.select("missing");
        assert_eq!(engine.controller().state(), FeedState::Loading);

        process_until(&mut engine, |e| e.controller().state() == FeedState::Idle).await;
        assert!(engine.controller().chart().is_none());
        assert!(engine.controller().last_error().is_some());
    }

    #[tokio::test]
    async fn test_injected_stream_message_is_applied() {
        let datafeed = StaticDatafeed::new().with_history("ticker_01", vec![point(1, 10.0)]);
        let mut engine = engine(datafeed);
        engine.select("ticker_01");
        process_until(&mut engine, |e| e.controller().state() == FeedState::Live).await;

        let connection = engine.controller().connection().unwrap();
        engine.handle_event(FeedEvent::Stream {
            connection,
            event: StreamEvent::Message(
                r#"[{"created_at": "2022-03-01T00:00:01+00:00", "price": 10},
                    {"created_at": "2022-03-01T00:00:02+00:00", "price": 11}]"#
                    .to_string(),
            ),
        });

        assert_eq!(engine.controller().window().to_vec(), vec![point(1, 10.0), point(2, 11.0)]);
    }
}
