#![allow(dead_code)]

use apibridge::errors::ToolError;
use apibridge::managers::engine::{EngineConfig, ExecutionEngine};
use apibridge::services::auth::{Credential, CredentialManager, TokenSource};
use apibridge::services::endpoints::{EndpointDescriptor, EndpointStore};
use apibridge::services::logger::Logger;
use apibridge::services::schema_registry::SchemaRegistry;
use apibridge::services::transport::{HttpRequest, HttpResponse, Transport};
use async_trait::async_trait;
use bytes::Bytes;
use once_cell::sync::Lazy;
use reqwest::header::HeaderMap;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub static ENV_LOCK: Lazy<tokio::sync::Mutex<()>> = Lazy::new(|| tokio::sync::Mutex::new(()));

pub const BASE_URL: &str = "https://graph.example.com/v1.0";

pub fn restore_env(key: &str, previous: Option<String>) {
    match previous {
        Some(value) => std::env::set_var(key, value),
        None => std::env::remove_var(key),
    }
}

pub fn json_response(status: u16, body: Value) -> HttpResponse {
    let mut headers = HeaderMap::new();
    headers.insert("content-type", "application/json".parse().unwrap());
    HttpResponse {
        status,
        headers,
        body: Bytes::from(serde_json::to_vec(&body).unwrap()),
        url: String::new(),
    }
}

pub fn bytes_response(status: u16, content_type: &str, body: &[u8]) -> HttpResponse {
    let mut headers = HeaderMap::new();
    headers.insert("content-type", content_type.parse().unwrap());
    HttpResponse {
        status,
        headers,
        body: Bytes::copy_from_slice(body),
        url: String::new(),
    }
}

type Handler = Box<dyn Fn(&HttpRequest) -> Result<HttpResponse, ToolError> + Send + Sync>;

/// Transport that records every request and answers from a closure.
pub struct FakeTransport {
    handler: Handler,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeTransport {
    pub fn new(
        handler: impl Fn(&HttpRequest) -> Result<HttpResponse, ToolError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ToolError> {
        self.requests.lock().unwrap().push(request.clone());
        tokio::time::sleep(Duration::from_millis(1)).await;
        (self.handler)(&request)
    }
}

/// Token source issuing `token-1`, `token-2`, ... and counting exchanges.
pub struct FakeTokenSource {
    calls: AtomicUsize,
    ttl_seconds: Option<i64>,
    delay: Duration,
}

impl FakeTokenSource {
    pub fn new() -> Arc<Self> {
        Self::with_ttl(None)
    }

    pub fn with_ttl(ttl_seconds: Option<i64>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            ttl_seconds,
            delay: Duration::from_millis(25),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenSource for FakeTokenSource {
    async fn exchange(&self) -> Result<Credential, ToolError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.delay).await;
        let credential = Credential::new(format!("token-{}", n));
        Ok(match self.ttl_seconds {
            Some(ttl) => credential.expiring_in(ttl),
            None => credential,
        })
    }

    fn describe(&self) -> &'static str {
        "fake"
    }
}

pub fn build_engine(
    endpoints: Value,
    schemas: Value,
    transport: Arc<FakeTransport>,
    source: Arc<FakeTokenSource>,
    max_pages: usize,
) -> ExecutionEngine {
    let descriptors: Vec<EndpointDescriptor> = serde_json::from_value(endpoints).unwrap();
    let logger = Logger::new("test");
    let auth = Arc::new(CredentialManager::new(
        source,
        Duration::from_secs(60),
        logger.clone(),
    ));
    ExecutionEngine::new(
        EndpointStore::from_descriptors(descriptors).unwrap(),
        SchemaRegistry::from_value(schemas).unwrap(),
        auth,
        transport,
        EngineConfig {
            base_url: url::Url::parse(BASE_URL).unwrap(),
            max_pages,
        },
        &logger,
    )
    .unwrap()
}

pub fn header<'a>(request: &'a HttpRequest, name: &str) -> Option<&'a str> {
    request.headers.get(name).and_then(|v| v.to_str().ok())
}

/// Fresh directory under the system temp dir for artifact files.
pub fn temp_dir(label: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("apibridge-{}-{}", label, uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
