//! Network clients for the price service.

pub mod backoff;
pub mod rest_client;
pub mod websocket_client;

pub use backoff::{Backoff, ReconnectPolicy};
pub use rest_client::PriceRestClient;
pub use websocket_client::{PriceWebSocketClient, StreamConnection};
