//! Resource client for the cloud-drive API.
//!
//! Lists the root of the signed-in user's drive and streams items converted
//! to another format. A rejected token surfaces as
//! [`ResourceError::Unauthorized`], distinct from every other failure, so the
//! caller can ask the engine for a fresh token.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tokio_stream::{Stream, StreamExt};
use url::Url;

use crate::config::AuthConfig;
use crate::token::AccessToken;

/// Error type for resource API calls.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The API rejected the access token.
    #[error("access token rejected by the resource API")]
    Unauthorized,

    /// The requested item does not exist.
    #[error("drive item not found: {id}")]
    NotFound { id: String },

    /// Any other non-success status.
    #[error("resource API returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The request never got an answer.
    #[error("network error: {message}")]
    Network { message: String },

    /// The response body could not be understood.
    #[error("malformed response: {message}")]
    Malformed { message: String },
}

impl ResourceError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

/// An item in the drive listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveEntry {
    pub id: String,
    pub name: String,
    pub size: Option<u64>,
    pub folder: bool,
    pub web_url: Option<String>,
}

/// Formats items can be converted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    Pdf,
}

impl TargetFormat {
    /// Value of the `format` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
        }
    }

    /// File extension for converted output.
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            other => Err(format!("unsupported target format: {}", other)),
        }
    }
}

/// Converted content, chunk by chunk.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ResourceError>> + Send>>;

/// The resource API as seen by the presentation layer.
#[async_trait]
pub trait DriveResource: Send + Sync {
    /// List the entries at the root of the drive.
    async fn list_entries(&self, token: &AccessToken) -> Result<Vec<DriveEntry>, ResourceError>;

    /// Stream item `id` converted to `format`.
    async fn convert(&self, token: &AccessToken, id: &str, format: TargetFormat) -> Result<ByteStream, ResourceError>;
}

/// Drain a [`ByteStream`] into memory.
pub async fn collect_bytes(mut stream: ByteStream) -> Result<Vec<u8>, ResourceError> {
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk?);
    }
    Ok(out)
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    value: Vec<GraphItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphItem {
    id: String,
    name: String,
    size: Option<u64>,
    folder: Option<serde_json::Value>,
    web_url: Option<String>,
}

impl From<GraphItem> for DriveEntry {
    fn from(item: GraphItem) -> Self {
        Self {
            id: item.id,
            name: item.name,
            size: item.size,
            folder: item.folder.is_some(),
            web_url: item.web_url,
        }
    }
}

/// HTTP client for the Graph drive endpoints.
///
/// Listing is bounded by a total deadline. Conversion downloads are only
/// bounded per read, so a large file may take as long as it keeps flowing.
#[derive(Clone)]
pub struct GraphDriveClient {
    http: reqwest::Client,
    base_url: Url,
    list_timeout: Option<Duration>,
}

impl GraphDriveClient {
    /// Create a client for the configured resource API.
    pub fn new(config: &AuthConfig) -> Result<Self, ResourceError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.network_timeout())
            .read_timeout(config.network_timeout())
            .build()
            .map_err(|e| ResourceError::Network {
                message: format!("failed to build HTTP client: {}", e),
            })?;
        let mut client = Self::with_client(http, &config.graph_url)?;
        client.list_timeout = Some(config.network_timeout());
        Ok(client)
    }

    /// Create a client on an existing `reqwest` client.
    pub fn with_client(http: reqwest::Client, base_url: &str) -> Result<Self, ResourceError> {
        let base_url = Url::parse(base_url).map_err(|e| ResourceError::Malformed {
            message: format!("invalid resource URL {}: {}", base_url, e),
        })?;
        Ok(Self {
            http,
            base_url,
            list_timeout: None,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ResourceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ResourceError::Malformed {
                message: format!("resource URL cannot be a base: {}", self.base_url),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get(
        &self,
        url: Url,
        token: &AccessToken,
        item: &str,
        deadline: Option<Duration>,
    ) -> Result<reqwest::Response, ResourceError> {
        let mut request = self
            .http
            .get(url)
            .header(reqwest::header::AUTHORIZATION, token.authorization_header());
        if let Some(deadline) = deadline {
            request = request.timeout(deadline);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ResourceError::Network { message: e.to_string() })?;

        match response.status() {
            s if s.is_success() => Ok(response),
            reqwest::StatusCode::UNAUTHORIZED => Err(ResourceError::Unauthorized),
            reqwest::StatusCode::NOT_FOUND => Err(ResourceError::NotFound { id: item.to_string() }),
            status => {
                let message = response.text().await.unwrap_or_default();
                Err(ResourceError::Http {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }
}

impl fmt::Debug for GraphDriveClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphDriveClient")
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

#[async_trait]
impl DriveResource for GraphDriveClient {
    async fn list_entries(&self, token: &AccessToken) -> Result<Vec<DriveEntry>, ResourceError> {
        let url = self.endpoint(&["drive", "root", "children"])?;
        tracing::debug!(%url, "listing drive root");

        let body: ListResponse = self
            .get(url, token, "root", self.list_timeout)
            .await?
            .json()
            .await
            .map_err(|e| ResourceError::Malformed { message: e.to_string() })?;

        Ok(body.value.into_iter().map(DriveEntry::from).collect())
    }

    async fn convert(&self, token: &AccessToken, id: &str, format: TargetFormat) -> Result<ByteStream, ResourceError> {
        let mut url = self.endpoint(&["drive", "items", id, "content"])?;
        url.query_pairs_mut().append_pair("format", format.as_str());
        tracing::debug!(%url, "converting drive item");

        let response = self.get(url, token, id, None).await?;
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| ResourceError::Network { message: e.to_string() }));
        Ok(Box::pin(stream))
    }
}
