use crate::constants::network::MAX_REDIRECTS;
use crate::errors::ToolError;
use crate::services::logger::Logger;
use crate::utils::redact::redact_url;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::header::{HeaderMap, CONTENT_TYPE, LOCATION};
use reqwest::{Client, Method};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>, headers: HeaderMap) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers,
            body: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Final URL after redirects.
    pub url: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    pub fn location(&self) -> Option<&str> {
        self.headers.get(LOCATION).and_then(|v| v.to_str().ok())
    }

    /// Parses the body as JSON; `None` for empty or non-JSON bodies.
    pub fn json(&self) -> Option<serde_json::Value> {
        if self.body.is_empty() {
            return None;
        }
        serde_json::from_slice(&self.body).ok()
    }
}

/// Minimal HTTP contract the engine dispatches through. Performs no retries.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ToolError>;
}

pub struct ReqwestTransport {
    client: Client,
    timeout: Duration,
    max_response_bytes: usize,
    logger: Logger,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration, max_response_bytes: usize, logger: Logger) -> Result<Self, ToolError> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|err| ToolError::internal(format!("Failed to build HTTP client: {}", err)))?;
        Ok(Self {
            client,
            timeout,
            max_response_bytes,
            logger: logger.child("transport"),
        })
    }

    async fn read_body(&self, response: reqwest::Response) -> Result<Bytes, ToolError> {
        let mut buffer = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            if buffer.len() + chunk.len() > self.max_response_bytes {
                return Err(ToolError::transport(format!(
                    "Response body exceeds {} bytes",
                    self.max_response_bytes
                ))
                .with_hint("Raise APIBRIDGE_MAX_RESPONSE_BYTES or request less data."));
            }
            buffer.extend_from_slice(&chunk);
        }
        Ok(Bytes::from(buffer))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ToolError> {
        let started = Instant::now();
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.as_str())
            .headers(request.headers)
            .timeout(self.timeout);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let url = response.url().to_string();
        let body = self.read_body(response).await?;

        self.logger.debug(
            "HTTP exchange finished",
            Some(&serde_json::json!({
                "method": request.method.as_str(),
                "url": redact_url(&request.url),
                "status": status,
                "bytes": body.len(),
                "duration_ms": started.elapsed().as_millis() as u64,
            })),
        );

        Ok(HttpResponse {
            status,
            headers,
            body,
            url,
        })
    }
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> ToolError {
    if err.is_timeout() {
        return ToolError::timeout("HTTP request timed out");
    }
    let (connect, redirect) = (err.is_connect(), err.is_redirect());
    // The URL may carry signed query parameters.
    let message = err.without_url().to_string();
    if connect {
        return ToolError::transport(format!("Connection failed: {}", message));
    }
    if redirect {
        return ToolError::transport(format!("Redirect failed: {}", message));
    }
    ToolError::transport(message)
}
