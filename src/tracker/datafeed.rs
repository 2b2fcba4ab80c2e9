//! Datafeed seam for the ticker list and the bulk price history.

use std::collections::HashMap;

use async_trait::async_trait;

use super::error::FeedError;
use super::object::PricePoint;

/// Source of tickers and their price histories
#[async_trait]
pub trait PriceDatafeed: Send + Sync {
    /// Tickers available for selection
    async fn query_tickers(&self) -> Result<Vec<String>, FeedError>;

    /// Full price history of `ticker`, oldest first
    async fn query_price_history(&self, ticker: &str) -> Result<Vec<PricePoint>, FeedError>;
}

/// In-memory datafeed serving fixed histories
#[derive(Debug, Clone, Default)]
pub struct StaticDatafeed {
    histories: HashMap<String, Vec<PricePoint>>,
    tickers: Vec<String>,
}

impl StaticDatafeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a ticker with its history. Tickers keep insertion order.
    pub fn with_history(mut self, ticker: &str, points: Vec<PricePoint>) -> Self {
        if !self.histories.contains_key(ticker) {
            self.tickers.push(ticker.to_string());
        }
        self.histories.insert(ticker.to_string(), points);
        self
    }
}

#[async_trait]
impl PriceDatafeed for StaticDatafeed {
    async fn query_tickers(&self) -> Result<Vec<String>, FeedError> {
        Ok(self.tickers.clone())
    }

    async fn query_price_history(&self, ticker: &str) -> Result<Vec<PricePoint>, FeedError> {
        self.histories
            .get(ticker)
            .cloned()
            .ok_or_else(|| FeedError::Status {
                status: 404,
                body: format!("unknown ticker {}", ticker),
            })
    }
}
