//! WebSocket client for the price stream.
//!
//! Every connection runs in its own task and reconnects with backoff until it
//! is closed. State changes and text frames are reported as [`FeedEvent`]s
//! tagged with the connection id.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

use super::backoff::{Backoff, ReconnectPolicy};
use crate::tracker::{ClientMessage, ConnectionState, FeedError, FeedEvent, FeedEventSender, StreamEvent};

pub type PriceSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Factory for stream connections to one endpoint
#[derive(Debug, Clone)]
pub struct PriceWebSocketClient {
    url: Url,
    policy: ReconnectPolicy,
}

impl PriceWebSocketClient {
    pub fn new(url: Url, policy: ReconnectPolicy) -> Self {
        Self { url, policy }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Start connection `id` on `runtime`, reporting to `events`
    pub fn spawn(&self, runtime: &Handle, id: u64, events: FeedEventSender) -> StreamConnection {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = runtime.spawn(run_connection(
            self.url.clone(),
            self.policy,
            id,
            outgoing_rx,
            shutdown_rx,
            events,
        ));

        StreamConnection {
            id,
            outgoing: outgoing_tx,
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

/// Handle to a running stream connection
#[derive(Debug)]
pub struct StreamConnection {
    id: u64,
    outgoing: mpsc::UnboundedSender<Message>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl StreamConnection {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Queue a message for the socket. Messages queued while reconnecting are dropped.
    pub fn send(&self, message: &ClientMessage) -> Result<(), FeedError> {
        let text = message.to_text()?;
        debug!("Stream {}: sending {}", self.id, text);
        self.outgoing
            .send(Message::Text(text.into()))
            .map_err(|_| FeedError::NotConnected(self.id))
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the connection. The task reports `Closed` once it is done.
    pub fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        info!("Stream {}: closing", self.id);
    }
}

enum SessionEnd {
    Shutdown,
    Lost,
    Failed(FeedError),
}

/// Open the WebSocket handshake against `url`
pub async fn connect(url: &Url) -> Result<PriceSocket, FeedError> {
    let (socket, _) = connect_async(url.as_str()).await?;
    Ok(socket)
}

fn emit(events: &FeedEventSender, connection: u64, event: StreamEvent) {
    if events.send(FeedEvent::Stream { connection, event }).is_err() {
        debug!("Stream {}: event receiver dropped", connection);
    }
}

async fn run_connection(
    url: Url,
    policy: ReconnectPolicy,
    id: u64,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
    mut shutdown: oneshot::Receiver<()>,
    events: FeedEventSender,
) {
    let mut backoff = Backoff::new(policy);

    loop {
        emit(&events, id, StreamEvent::State(ConnectionState::Connecting));
        info!("Stream {}: connecting to {}", id, url);

        let connected = tokio::select! {
            _ = &mut shutdown => break,
            result = connect(&url) => result,
        };

        match connected {
            Ok(socket) => {
                info!("Stream {}: connected", id);
                backoff.reset();
                // Anything queued before the socket opened targets a dead session
                while outgoing.try_recv().is_ok() {}
                emit(&events, id, StreamEvent::State(ConnectionState::Open));

                match run_session(id, socket, &mut outgoing, &mut shutdown, &events).await {
                    SessionEnd::Shutdown => break,
                    SessionEnd::Lost => warn!("Stream {}: connection lost", id),
                    SessionEnd::Failed(e) => warn!("Stream {}: connection lost: {}", id, e),
                }
            }
            Err(e) => {
                error!("Stream {}: connection failed: {}", id, e);
            }
        }

        let delay = backoff.next_delay();
        emit(
            &events,
            id,
            StreamEvent::State(ConnectionState::Backoff {
                attempt: backoff.attempt(),
                delay,
            }),
        );
        debug!("Stream {}: retry #{} in {:?}", id, backoff.attempt(), delay);

        tokio::select! {
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    emit(&events, id, StreamEvent::State(ConnectionState::Closed));
    info!("Stream {}: closed", id);
}

async fn run_session(
    id: u64,
    socket: PriceSocket,
    outgoing: &mut mpsc::UnboundedReceiver<Message>,
    shutdown: &mut oneshot::Receiver<()>,
    events: &FeedEventSender,
) -> SessionEnd {
    let (mut write, mut read) = socket.split();

    loop {
        tokio::select! {
            _ = &mut *shutdown => {
                let _ = write.send(Message::Close(None)).await;
                return SessionEnd::Shutdown;
            }
            message = outgoing.recv() => match message {
                Some(message) => {
                    if let Err(e) = write.send(message).await {
                        error!("Stream {}: write error: {}", id, e);
                        return SessionEnd::Failed(e.into());
                    }
                }
                None => {
                    let _ = write.send(Message::Close(None)).await;
                    return SessionEnd::Shutdown;
                }
            },
            result = read.next() => match result {
                Some(Ok(Message::Text(text))) => {
                    emit(events, id, StreamEvent::Message(text.as_str().to_string()));
                }
                Some(Ok(Message::Ping(_))) => {
                    debug!("Stream {}: received ping", id);
                }
                Some(Ok(Message::Pong(_))) => {
                    debug!("Stream {}: received pong", id);
                }
                Some(Ok(Message::Close(_))) => {
                    warn!("Stream {}: closed by server", id);
                    return SessionEnd::Lost;
                }
                Some(Ok(Message::Binary(_))) => {
                    debug!("Stream {}: ignoring binary message", id);
                }
                Some(Ok(Message::Frame(_))) => {}
                Some(Err(e)) => {
                    error!("Stream {}: read error: {}", id, e);
                    return SessionEnd::Failed(e.into());
                }
                None => {
                    warn!("Stream {}: read loop ended", id);
                    return SessionEnd::Lost;
                }
            },
        }
    }
}
