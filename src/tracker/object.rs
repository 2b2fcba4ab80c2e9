//! Data objects exchanged with the price service.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::error::FeedError;

/// A single observed price of a ticker.
///
/// Wire form is `{"created_at": "<ISO-8601>", "price": <number>}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    #[serde(rename = "created_at", deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(deserialize_with = "deserialize_price")]
    pub price: f64,
}

impl PricePoint {
    pub fn new(timestamp: DateTime<Utc>, price: f64) -> Self {
        Self { timestamp, price }
    }
}

/// Parse an ISO-8601 timestamp. Values without an offset are taken as UTC.
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, FeedError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|_| FeedError::Timestamp(text.to_string()))
}

/// Format a watermark the way the stream endpoint expects it.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    parse_timestamp(&text).map_err(serde::de::Error::custom)
}

fn deserialize_price<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawPrice {
        Number(f64),
        Text(String),
    }

    match RawPrice::deserialize(deserializer)? {
        RawPrice::Number(n) => Ok(n),
        RawPrice::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid price `{}`", s))),
    }
}

/// Price point as pushed on the stream, tagged with its ticker when the server sends one
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PriceMessage {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "created_at", deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(deserialize_with = "deserialize_price")]
    pub price: f64,
}

impl PriceMessage {
    pub fn point(&self) -> PricePoint {
        PricePoint::new(self.timestamp, self.price)
    }

    /// Untagged messages are taken to belong to whatever ticker is active
    pub fn belongs_to(&self, ticker: &str) -> bool {
        self.name.as_deref().is_none_or(|name| name == ticker)
    }
}

/// Parse a stream payload: a single point object or an array of points.
pub fn parse_stream_payload(text: &str) -> Result<Vec<PriceMessage>, FeedError> {
    let value: Value = serde_json::from_str(text)?;
    match value {
        Value::Array(_) => Ok(serde_json::from_value(value)?),
        other => Ok(vec![serde_json::from_value(other)?]),
    }
}

/// Client to server message on the price stream
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Bare ticker name
    Ticker(String),
    /// `[ticker, watermark|null]`, asking only for points newer than the watermark
    Poll {
        ticker: String,
        watermark: Option<DateTime<Utc>>,
    },
}

impl ClientMessage {
    pub fn ticker(&self) -> &str {
        match self {
            ClientMessage::Ticker(ticker) => ticker,
            ClientMessage::Poll { ticker, .. } => ticker,
        }
    }

    /// Encode as the text frame sent over the socket
    pub fn to_text(&self) -> Result<String, FeedError> {
        match self {
            ClientMessage::Ticker(ticker) => Ok(ticker.clone()),
            ClientMessage::Poll { ticker, watermark } => {
                let watermark = watermark.as_ref().map(format_timestamp);
                Ok(serde_json::to_string(&(ticker, watermark))?)
            }
        }
    }
}

/// Lifecycle of one stream connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Closed,
    Connecting,
    Open,
    /// Waiting before reconnect attempt number `attempt`
    Backoff { attempt: u32, delay: Duration },
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    pub fn label(&self) -> String {
        match self {
            ConnectionState::Closed => "closed".to_string(),
            ConnectionState::Connecting => "connecting".to_string(),
            ConnectionState::Open => "live".to_string(),
            ConnectionState::Backoff { attempt, delay } => format!(
                "connection lost, retry #{} in {:.1}s",
                attempt,
                delay.as_secs_f64()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_single_point() {
        let points =
            parse_stream_payload(r#"{"name": "ticker_00", "price": 2, "created_at": "2022-04-03T00:00:00+00:00"}"#)
                .unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].price, 2.0);
        assert_eq!(points[0].timestamp, Utc.with_ymd_and_hms(2022, 4, 3, 0, 0, 0).unwrap());
        assert_eq!(points[0].name.as_deref(), Some("ticker_00"));
    }

    #[test]
    fn test_message_ticker_tag() {
        let messages = parse_stream_payload(
            r#"[{"name": "ticker_01", "created_at": "2022-03-01T00:00:00", "price": 1},
                {"name": null, "created_at": "2022-03-01T00:00:01", "price": 2},
                {"created_at": "2022-03-01T00:00:02", "price": 3}]"#,
        )
        .unwrap();

        assert!(messages[0].belongs_to("ticker_01"));
        assert!(!messages[0].belongs_to("ticker_02"));
        assert!(messages[1].belongs_to("ticker_02"));
        assert!(messages[2].belongs_to("ticker_02"));
        assert_eq!(messages[2].point(), PricePoint::new(Utc.with_ymd_and_hms(2022, 3, 1, 0, 0, 2).unwrap(), 3.0));
    }

    #[test]
    fn test_parse_batch_and_empty() {
        let points = parse_stream_payload(
            r#"[{"created_at": "2022-03-01T00:00:00", "price": 10},
                {"created_at": "2022-03-01T00:00:01.250", "price": "12.5"}]"#,
        )
        .unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].price, 12.5);
        assert!(points[0].timestamp < points[1].timestamp);

        assert!(parse_stream_payload("[]").unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(parse_stream_payload("not json"), Err(FeedError::Parse(_))));
        assert!(parse_stream_payload(r#"{"created_at": "yesterday", "price": 1}"#).is_err());
        assert!(parse_stream_payload(r#"{"price": 1}"#).is_err());
    }

    #[test]
    fn test_client_message_text() {
        let msg = ClientMessage::Ticker("ticker_01".to_string());
        assert_eq!(msg.to_text().unwrap(), "ticker_01");

        let msg = ClientMessage::Poll {
            ticker: "ticker_01".to_string(),
            watermark: None,
        };
        assert_eq!(msg.to_text().unwrap(), r#"["ticker_01",null]"#);

        let msg = ClientMessage::Poll {
            ticker: "ticker_01".to_string(),
            watermark: Some(Utc.with_ymd_and_hms(2022, 3, 1, 12, 0, 0).unwrap()),
        };
        assert_eq!(msg.to_text().unwrap(), r#"["ticker_01","2022-03-01T12:00:00+00:00"]"#);
        assert_eq!(msg.ticker(), "ticker_01");
    }

    #[test]
    fn test_connection_state_label() {
        assert!(ConnectionState::Open.is_open());
        let backoff = ConnectionState::Backoff {
            attempt: 2,
            delay: Duration::from_millis(1500),
        };
        assert!(!backoff.is_open());
        assert_eq!(backoff.label(), "connection lost, retry #2 in 1.5s");
    }
}
