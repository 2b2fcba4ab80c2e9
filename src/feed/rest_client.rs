//! REST client for the ticker list and the bulk price history.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, error};
use url::Url;

use crate::tracker::{FeedError, FeedSetting, PriceDatafeed, PricePoint};

/// HTTP client for the price service
#[derive(Debug, Clone)]
pub struct PriceRestClient {
    client: Client,
    history_url: Url,
    tickers_url: Url,
}

impl PriceRestClient {
    /// Create a client for the endpoints named in `setting`
    pub fn new(setting: &FeedSetting) -> Result<Self, FeedError> {
        let client = Client::builder().timeout(setting.timeout).build()?;

        Ok(Self {
            client,
            history_url: setting.history_url()?,
            tickers_url: setting.tickers_url()?,
        })
    }

    pub fn history_url(&self) -> &Url {
        &self.history_url
    }

    pub fn tickers_url(&self) -> &Url {
        &self.tickers_url
    }

    /// GET `url` and decode the JSON body
    async fn request<T: DeserializeOwned>(&self, url: Url) -> Result<T, FeedError> {
        debug!("Price API request: GET {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            error!("Price API error {}: {}", status, text);
            return Err(FeedError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(serde_json::from_str(&text)?)
    }

    /// Full history of `ticker`. A `null` body is an empty history.
    pub async fn query_price_history(&self, ticker: &str) -> Result<Vec<PricePoint>, FeedError> {
        let mut url = self.history_url.clone();
        url.query_pairs_mut().append_pair("ticker_name", ticker);

        let points: Option<Vec<PricePoint>> = self.request(url).await?;
        let points = points.unwrap_or_default();
        debug!("Received {} points for {}", points.len(), ticker);
        Ok(points)
    }

    pub async fn query_tickers(&self) -> Result<Vec<String>, FeedError> {
        let tickers: Option<Vec<String>> = self.request(self.tickers_url.clone()).await?;
        Ok(tickers.unwrap_or_default())
    }
}

#[async_trait]
impl PriceDatafeed for PriceRestClient {
    async fn query_tickers(&self) -> Result<Vec<String>, FeedError> {
        PriceRestClient::query_tickers(self).await
    }

    async fn query_price_history(&self, ticker: &str) -> Result<Vec<PricePoint>, FeedError> {
        PriceRestClient::query_price_history(self, ticker).await
    }
}
