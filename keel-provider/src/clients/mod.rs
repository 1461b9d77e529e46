//! Clients for the remote control plane.
//!
//! One [`ApiClient`] carries the HTTP connection pool and credentials; the
//! per-service clients wrap it with typed endpoints:
//! - iaas: networks
//! - dsa: data service instances and their offerings
//! - postgres_flex: database users
//! - argus: scrape jobs

pub mod argus;
pub mod dsa;
pub mod iaas;
pub mod postgres_flex;

pub use argus::ArgusClient;
pub use dsa::DsaClient;
pub use iaas::IaasClient;
pub use postgres_flex::PostgresFlexClient;

use std::time::Duration;

use keel_engine::{ApiError, ApiResult};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

/// Connection settings for [`ApiClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL, e.g. `https://api.example.cloud`.
    pub endpoint: String,
    pub token: Option<String>,
    /// Upper bound on a single HTTP request.
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Shared JSON-over-HTTP client. Cheap to clone.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> ApiResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let response = send(self.request(Method::GET, path)).await?;
        decode(response).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = send(self.request(Method::POST, path).json(body)).await?;
        decode(response).await
    }

    /// POST whose response body carries nothing of interest.
    pub async fn post_accepted<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiResult<()> {
        send(self.request(Method::POST, path).json(body)).await?;
        Ok(())
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = send(self.request(Method::PUT, path).json(body)).await?;
        decode(response).await
    }

    pub async fn put_accepted<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiResult<()> {
        send(self.request(Method::PUT, path).json(body)).await?;
        Ok(())
    }

    pub async fn patch_accepted<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiResult<()> {
        send(self.request(Method::PATCH, path).json(body)).await?;
        Ok(())
    }

    pub async fn delete(&self, path: &str) -> ApiResult<()> {
        send(self.request(Method::DELETE, path)).await?;
        Ok(())
    }
}

/// Send a request; any non-2xx status becomes [`ApiError::Status`].
async fn send(builder: RequestBuilder) -> ApiResult<Response> {
    let response = builder
        .send()
        .await
        .map_err(|e| ApiError::Transport(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::Status {
            code: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

async fn decode<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| ApiError::Transport(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
}
