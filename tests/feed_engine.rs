//! End-to-end tests of the feed engine against a local price service.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};

use price_tracker::feed::PriceRestClient;
use price_tracker::tracker::{
    ChartBackend, ChartConfig, FeedEngine, FeedError, FeedSetting, FeedState, PriceChart, PricePoint,
    StreamMode,
};

const HISTORY: &str = r#"[
    {"created_at": "2022-03-01T00:00:01", "price": 10},
    {"created_at": "2022-03-01T00:00:02", "price": 12}
]"#;

const STREAM_BATCH: &str = r#"[
    {"name": "ticker_01", "created_at": "2022-03-01T00:00:02", "price": 12},
    {"name": "ticker_01", "created_at": "2022-03-01T00:00:03", "price": 15}
]"#;

type Route = fn(&str) -> (u16, &'static str);

fn price_routes(path: &str) -> (u16, &'static str) {
    if path.starts_with("/ticker-price?ticker_name=ticker_01") {
        (200, HISTORY)
    } else if path == "/tickers" {
        (200, r#"["ticker_01", "ticker_02"]"#)
    } else {
        (404, r#"{"detail": "Not Found"}"#)
    }
}

/// Serve HTTP routes and WebSocket upgrades on one port. Every text frame
/// received on a socket is forwarded to `received` and answered with
/// `STREAM_BATCH`.
async fn spawn_service(routes: Route, received: mpsc::UnboundedSender<String>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let received = received.clone();
            tokio::spawn(async move {
                let head = peek_head(&stream).await;
                if head.to_ascii_lowercase().contains("upgrade: websocket") {
                    serve_socket(stream, received).await;
                } else {
                    serve_http(stream, head, routes).await;
                }
            });
        }
    });

    addr
}

async fn peek_head(stream: &TcpStream) -> String {
    let mut buf = vec![0u8; 8192];
    loop {
        let n = stream.peek(&mut buf).await.unwrap();
        let text = String::from_utf8_lossy(&buf[..n]).to_string();
        if n == 0 || text.contains("\r\n\r\n") {
            return text;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

async fn serve_http(mut stream: TcpStream, head: String, routes: Route) {
    let head_len = head.find("\r\n\r\n").map_or(head.len(), |ix| ix + 4);
    let mut consumed = vec![0u8; head_len];
    stream.read_exact(&mut consumed).await.unwrap();

    let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
    let (status, body) = routes(&path);
    let response = format!(
        "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await.unwrap();
    let _ = stream.shutdown().await;
}

async fn serve_socket(stream: TcpStream, received: mpsc::UnboundedSender<String>) {
    let Ok(mut socket) = accept_async(stream).await else {
        return;
    };
    while let Some(Ok(message)) = socket.next().await {
        if let Message::Text(text) = message {
            let _ = received.send(text.as_str().to_string());
            if socket.send(Message::Text(STREAM_BATCH.to_string().into())).await.is_err() {
                break;
            }
        }
    }
}

#[derive(Default)]
struct VecChart {
    points: Vec<PricePoint>,
    updates: usize,
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

    fn update(&mut self) {
        self.updates += 1;
    }

    fn destroy(&mut self) {
        self.points.clear();
    }
}

struct VecBackend;

impl ChartBackend for VecBackend {
    type Chart = VecChart;

    fn create_chart(&mut self, _config: ChartConfig, points: &[PricePoint]) -> VecChart {
        VecChart {
            points: points.to_vec(),
            updates: 0,
        }
    }
}

fn setting(addr: SocketAddr, stream_mode: StreamMode) -> FeedSetting {
    FeedSetting {
        host: format!("http://{}", addr),
        default_tickers: vec!["ticker_01".to_string()],
        stream_mode,
        poll_interval: Duration::from_millis(50),
        ..FeedSetting::default()
    }
}

fn engine(setting: &FeedSetting) -> FeedEngine<VecBackend> {
    let datafeed = Arc::new(PriceRestClient::new(setting).unwrap());
    FeedEngine::new(VecBackend, setting, datafeed, Handle::current()).unwrap()
}

async fn process_until(engine: &mut FeedEngine<VecBackend>, done: impl Fn(&FeedEngine<VecBackend>) -> bool) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !done(engine) {
            engine.process_next().await;
        }
    })
    .await
    .expect("engine did not reach the expected state");
}

#[tokio::test]
async fn test_history_then_stream_in_reconnect_mode() {
    let (tx, mut received) = mpsc::unbounded_channel();
    let addr = spawn_service(price_routes, tx).await;
    let setting = setting(addr, StreamMode::Reconnect);

    let mut engine = engine(&setting);
    engine.start();
    engine.select("ticker_01");

    process_until(&mut engine, |e| e.controller().state() == FeedState::Live).await;
    assert_eq!(engine.controller().window().len(), 2);

    process_until(&mut engine, |e| e.controller().window().len() == 3).await;

    let greeting = received.recv().await.unwrap();
    assert_eq!(greeting, "ticker_01");

    let prices: Vec<f64> = engine.controller().window().iter().map(|p| p.price).collect();
    assert_eq!(prices, vec![10.0, 12.0, 15.0]);

    let chart = engine.controller().chart().unwrap();
    assert_eq!(chart.points.len(), 3);
    assert_eq!(chart.updates, 1);
    assert!(engine.controller().connection_state().is_open());

    process_until(&mut engine, |e| e.tickers().len() == 2).await;
    assert_eq!(engine.tickers(), ["ticker_01".to_string(), "ticker_02".to_string()]);

    engine.dispose();
    assert!(engine.controller().chart().is_none());
}

#[tokio::test]
async fn test_poll_mode_advances_watermark() {
    let (tx, mut received) = mpsc::unbounded_channel();
    let addr = spawn_service(price_routes, tx).await;
    let setting = setting(addr, StreamMode::Poll { with_watermark: true });

    let mut engine = engine(&setting);
    engine.start();
    engine.select("ticker_01");

    process_until(&mut engine, |e| e.controller().window().len() == 3).await;
    assert_eq!(
        engine.controller().watermark().map(|w| w.to_rfc3339()),
        Some("2022-03-01T00:00:03+00:00".to_string())
    );

    // Ticks keep polling with the advanced watermark
    let expected = r#"["ticker_01","2022-03-01T00:00:03+00:00"]"#;
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            tokio::select! {
                message = received.recv() => {
                    if message.as_deref() == Some(expected) {
                        break;
                    }
                }
                _ = engine.process_next() => {}
            }
        }
    })
    .await
    .expect("no poll with the advanced watermark");

    // Replayed points never grow the window
    assert_eq!(engine.controller().window().len(), 3);
    engine.dispose();
}

#[tokio::test]
async fn test_rest_client_errors_and_null_bodies() {
    fn routes(path: &str) -> (u16, &'static str) {
        if path.starts_with("/ticker-price") {
            (500, "boom")
        } else {
            (200, "null")
        }
    }

    let (tx, _received) = mpsc::unbounded_channel();
    let addr = spawn_service(routes, tx).await;
    let client = PriceRestClient::new(&setting(addr, StreamMode::Reconnect)).unwrap();

    let result = client.query_price_history("ticker_01").await;
    match result {
        Err(FeedError::Status { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("unexpected result: {:?}", other),
    }

    assert!(client.query_tickers().await.unwrap().is_empty());
}
