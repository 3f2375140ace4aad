use super::ResultSink;
use crate::counter::WindowResult;
use crate::error::DeliveryError;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

const JSON: &str = "application/json";

/// Shared outbound HTTP client for sinks and the ingest echo.
#[derive(Debug, Clone)]
pub struct CallbackClient {
    client: Client,
}

impl CallbackClient {
    pub fn new(timeout: Duration) -> Result<Self, DeliveryError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// POSTs `body` as JSON and maps the outcome onto [`DeliveryError`].
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        content_type: &str,
        body: &T,
    ) -> Result<(), DeliveryError> {
        let payload = serde_json::to_vec(body)?;
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, content_type)
            .body(payload)
            .send()
            .await
            .map_err(|e| classify(url, e))?;

        let status = response.status();
        debug!(url, status = status.as_u16(), "Callback answered");
        match status {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(DeliveryError::InvalidEndpoint(url.to_string())),
            StatusCode::BAD_REQUEST => Err(DeliveryError::BadRequest(url.to_string())),
            s => Err(DeliveryError::UnexpectedStatus(s.as_u16())),
        }
    }

    /// POSTs a window result as plain JSON.
    pub async fn post_result(&self, url: &str, result: &WindowResult) -> Result<(), DeliveryError> {
        self.post_json(url, JSON, result).await
    }
}

fn classify(url: &str, err: reqwest::Error) -> DeliveryError {
    if err.is_timeout() {
        DeliveryError::Timeout
    } else if err.is_connect() {
        DeliveryError::ConnectionRefused(url.to_string())
    } else {
        DeliveryError::Request(err)
    }
}

/// POSTs each window result to a fixed endpoint.
#[derive(Debug, Clone)]
pub struct HttpCallbackSink {
    client: CallbackClient,
    endpoint: String,
}

impl HttpCallbackSink {
    pub fn new(client: CallbackClient, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
        }
    }
}

#[async_trait]
impl ResultSink for HttpCallbackSink {
    async fn deliver(&self, result: &WindowResult) -> Result<(), DeliveryError> {
        self.client.post_result(&self.endpoint, result).await
    }
}
