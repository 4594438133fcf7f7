//! HTTP client for a running gateway.

use reqwest::StatusCode;
use tidegate_core::{Info, TorrentMetrics};
use url::Url;

/// Errors raised while talking to a gateway.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Invalid gateway address '{address}'")]
    InvalidAddress {
        address: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Request to gateway failed")]
    Request(#[from] reqwest::Error),

    #[error("Gateway responded with {status}")]
    Status { status: StatusCode },
}

/// Authenticated client for the gateway API.
pub struct GatewayClient {
    base: Url,
    username: String,
    password: String,
    http: reqwest::Client,
}

impl GatewayClient {
    /// Creates a client for the gateway at `address`.
    ///
    /// # Errors
    /// - `ClientError::InvalidAddress` - `address` is not an absolute URL
    pub fn new(address: &str, username: String, password: String) -> Result<Self, ClientError> {
        let base = Url::parse(address).map_err(|source| ClientError::InvalidAddress {
            address: address.to_string(),
            source,
        })?;
        Ok(Self {
            base,
            username,
            password,
            http: reqwest::Client::new(),
        })
    }

    /// Fetches the description of the torrent behind `magnet`.
    ///
    /// # Errors
    /// - `ClientError::Request` - Connection failed or the body is not valid JSON
    /// - `ClientError::Status` - Gateway answered with a non-200 status
    pub async fn info(&self, magnet: &str) -> Result<Info, ClientError> {
        let mut url = self.endpoint("/info");
        url.query_pairs_mut().append_pair("magnet", magnet);
        self.get(url).await?.json().await.map_err(ClientError::from)
    }

    /// Fetches the download progress of every torrent on the gateway.
    ///
    /// # Errors
    /// - `ClientError::Request` - Connection failed or the body is not valid JSON
    /// - `ClientError::Status` - Gateway answered with a non-200 status
    pub async fn metrics(&self) -> Result<Vec<TorrentMetrics>, ClientError> {
        let url = self.endpoint("/metrics");
        self.get(url).await?.json().await.map_err(ClientError::from)
    }

    /// URL that streams `path` of the torrent behind `magnet`.
    pub fn stream_url(&self, magnet: &str, path: &str) -> Url {
        let mut url = self.endpoint("/stream");
        url.query_pairs_mut()
            .append_pair("magnet", magnet)
            .append_pair("path", path);
        url
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base.clone();
        url.set_path(path);
        url.set_query(None);
        url
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response, ClientError> {
        let response = self
            .http
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ClientError::Status { status });
        }
        Ok(response)
    }
}
