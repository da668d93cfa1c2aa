//! JSON request executor shared by every resource client

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error};

/// Errors surfaced by the HTTP layer
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Non-2xx response, normalized
    #[error("API Error: {status} {status_text} - {detail}")]
    Status {
        status: u16,
        status_text: String,
        detail: String,
    },

    /// Network or protocol failure, passed through untouched
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error("Failed to decode response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

impl ApiError {
    /// Build the normalized error for a non-success response body
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let detail = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| match v.get("detail") {
                Some(serde_json::Value::String(s)) => Some(s.clone()),
                Some(serde_json::Value::Null) | None => None,
                Some(other) => Some(other.to_string()),
            })
            .unwrap_or_else(|| "Unknown error".to_string());

        ApiError::Status {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            detail,
        }
    }

    /// HTTP status code, when the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Settings for building a [`Transport`]
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Base URL + HTTP client
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
    base_url: String,
    request_timeout: Duration,
}

impl Transport {
    /// Stock reqwest client with the default request timeout
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::from_client(
            Client::new(),
            base_url,
            TransportOptions::default().request_timeout,
        )
    }

    pub fn with_options(
        base_url: impl Into<String>,
        options: TransportOptions,
    ) -> Result<Self, ApiError> {
        // No client-wide timeout: the event stream stays open far longer than a JSON call.
        let client = Client::builder()
            .connect_timeout(options.connect_timeout)
            .build()?;

        Ok(Self::from_client(client, base_url, options.request_timeout))
    }

    fn from_client(client: Client, base_url: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request::<T, ()>(Method::GET, path, None).await
    }

    pub async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        self.request_with_query::<T, ()>(Method::GET, path, query, None)
            .await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.request(Method::POST, path, Some(body)).await
    }

    /// POST with no body
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request::<T, ()>(Method::POST, path, None).await
    }

    /// Issue one JSON request and decode the response
    pub async fn request<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError> {
        self.request_with_query(method, path, &[], body).await
    }

    pub async fn request_with_query<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<T, ApiError> {
        let url = self.url(path);
        debug!("{} {} {:?}", method, url, query);

        let mut builder: RequestBuilder = self
            .client
            .request(method, &url)
            .timeout(self.request_timeout)
            .header(reqwest::header::ACCEPT, "application/json");
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        } else {
            builder = builder.header(reqwest::header::CONTENT_TYPE, "application/json");
        }

        let response = match builder.send().await {
            Ok(r) => r,
            Err(e) => {
                error!("API request failed for {}: {}", path, e);
                return Err(ApiError::Transport(e));
            }
        };

        let status = response.status();
        debug!("Response status: {}", status);

        let text = response.text().await?;

        if !status.is_success() {
            let err = ApiError::from_response(status, &text);
            error!("API request failed for {}: {}", path, err);
            return Err(err);
        }

        serde_json::from_str(&text).map_err(|source| ApiError::Decode {
            path: path.to_string(),
            source,
        })
    }
}
