use crate::constants::limits::ERROR_BODY_MAX_BYTES;
use crate::constants::network::USER_AGENT;
use crate::constants::protocols::ALLOWED_HTTP;
use crate::errors::{LoadError, ToolError, ToolErrorKind};
use crate::managers::normalize::{download_reference, same_origin, NormalizedResponse};
use crate::managers::pagination::{collect_pages, PageFetcher};
use crate::managers::request_builder::{ConstructedRequest, RequestBuilder};
use crate::services::auth::CredentialManager;
use crate::services::endpoints::{EndpointDescriptor, EndpointStore, HttpMethod, ResponseMode};
use crate::services::logger::Logger;
use crate::services::schema_registry::{RequestSchema, SchemaRegistry};
use crate::services::transport::{HttpRequest, HttpResponse, Transport};
use crate::services::validation::Validation;
use crate::utils::redact::{redact_text, redact_url};
use crate::utils::text::body_preview;
use crate::utils::tool_errors::unknown_tool_error;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT as UA};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub base_url: url::Url,
    pub max_pages: usize,
}

/// One advertised tool: name, description and argument schema.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSummary {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Generic interpreter over endpoint descriptors and request schemas.
pub struct ExecutionEngine {
    endpoints: EndpointStore,
    schemas: SchemaRegistry,
    builder: RequestBuilder,
    base_url: url::Url,
    max_pages: usize,
    auth: Arc<CredentialManager>,
    transport: Arc<dyn Transport>,
    validation: Validation,
    logger: Logger,
}

impl ExecutionEngine {
    pub fn new(
        endpoints: EndpointStore,
        schemas: SchemaRegistry,
        auth: Arc<CredentialManager>,
        transport: Arc<dyn Transport>,
        config: EngineConfig,
        logger: &Logger,
    ) -> Result<Self, LoadError> {
        endpoints.check_against(&schemas)?;
        Ok(Self {
            builder: RequestBuilder::new(&config.base_url),
            base_url: config.base_url,
            max_pages: config.max_pages.max(1),
            endpoints,
            schemas,
            auth,
            transport,
            validation: Validation::new(),
            logger: logger.child("engine"),
        })
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.endpoints.names()
    }

    pub fn list_tools(&self) -> Vec<ToolSummary> {
        self.endpoints
            .iter()
            .filter_map(|descriptor| {
                let schema = self.schemas.get(&descriptor.tool_name)?;
                Some(ToolSummary {
                    name: descriptor.tool_name.clone(),
                    description: describe(descriptor),
                    input_schema: advertised_schema(descriptor, schema),
                })
            })
            .collect()
    }

    /// Entry point for adapters that hold raw JSON arguments.
    pub async fn execute_value(
        &self,
        tool: &str,
        args: Option<&Value>,
    ) -> Result<NormalizedResponse, ToolError> {
        let tool = self.validation.ensure_identifier(tool, "Tool name")?;
        let args = self.validation.ensure_args_object(args)?;
        self.execute(&tool, &args).await
    }

    pub async fn execute(
        &self,
        tool: &str,
        args: &Map<String, Value>,
    ) -> Result<NormalizedResponse, ToolError> {
        let trace_id = uuid::Uuid::new_v4().to_string();
        let started = Instant::now();
        self.logger.debug(
            "Tool call started",
            Some(&serde_json::json!({ "tool": tool, "trace_id": trace_id })),
        );
        let result = self.run(tool, args, &trace_id).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(response) => self.logger.info(
                "Tool call finished",
                Some(&serde_json::json!({
                    "tool": tool,
                    "trace_id": trace_id,
                    "status": response.status,
                    "pages": response.pages,
                    "duration_ms": duration_ms,
                })),
            ),
            Err(err) => self.logger.warn(
                "Tool call failed",
                Some(&serde_json::json!({
                    "tool": tool,
                    "trace_id": trace_id,
                    "kind": err.kind,
                    "code": err.code,
                    "status": err.status,
                    "message": err.message,
                    "duration_ms": duration_ms,
                })),
            ),
        }
        result
    }

    async fn run(
        &self,
        tool: &str,
        args: &Map<String, Value>,
        trace_id: &str,
    ) -> Result<NormalizedResponse, ToolError> {
        let (descriptor, schema) = match (self.endpoints.get(tool), self.schemas.get(tool)) {
            (Some(descriptor), Some(schema)) => (descriptor, schema),
            _ => return Err(unknown_tool_error(tool, &self.endpoints.names())),
        };

        let request = self.builder.build(descriptor, schema, args)?;
        self.logger.debug(
            "Dispatching",
            Some(&serde_json::json!({
                "tool": tool,
                "trace_id": trace_id,
                "method": request.method.as_str(),
                "url": redact_url(&request.url),
            })),
        );
        let response = self.dispatch(&request).await?;
        let mut normalized = NormalizedResponse::from_http(&response);

        if descriptor.fetch_all_pages {
            if let Some(first) = normalized.json().filter(|v| v.is_object()).cloned() {
                let fetcher = ContinuationFetcher {
                    engine: self,
                    headers: continuation_headers(&request.headers),
                };
                let collected = collect_pages(first, &fetcher, self.max_pages).await?;
                normalized = normalized.with_pages(collected.body, collected.pages);
            }
        }

        if descriptor.response_mode == ResponseMode::DownloadUrl {
            normalized = self.download(tool, &response, normalized).await?;
        }
        Ok(normalized)
    }

    /// Authenticated send; one transparent retry after a 401 with a refreshed credential.
    async fn dispatch(&self, request: &ConstructedRequest) -> Result<HttpResponse, ToolError> {
        let mut rejected = false;
        loop {
            let credential = self.auth.acquire().await?;
            let response = self.transport.send(request.authorize(&credential)?).await?;
            if response.status == 401 {
                if rejected {
                    return Err(ToolError::authentication(
                        "Remote API rejected the refreshed credential",
                    )
                    .with_status(401)
                    .with_hint("Check that the credential carries the scopes this tool requires.")
                    .with_details(serde_json::json!({ "body": error_body(&response) })));
                }
                rejected = true;
                let invalidated = self.auth.invalidate_if(&credential);
                self.logger.info(
                    "Credential rejected, refreshing once",
                    Some(&serde_json::json!({
                        "url": redact_url(&request.url),
                        "invalidated": invalidated,
                    })),
                );
                continue;
            }
            if !response.is_success() {
                return Err(ToolError::remote_api(response.status, error_body(&response)));
            }
            return Ok(response);
        }
    }

    fn resolve_reference(&self, reference: &str) -> Result<url::Url, ToolError> {
        let target = self.base_url.join(reference).map_err(|err| {
            ToolError::new(
                ToolErrorKind::RemoteApi,
                "INVALID_REFERENCE",
                format!("Remote API returned an unusable URL: {}", err),
            )
        })?;
        let scheme = format!("{}:", target.scheme());
        if !ALLOWED_HTTP.contains(&scheme.as_str()) {
            return Err(ToolError::new(
                ToolErrorKind::RemoteApi,
                "INVALID_REFERENCE",
                format!("Remote API returned a non-HTTP URL ({})", target.scheme()),
            ));
        }
        Ok(target)
    }

    async fn download(
        &self,
        tool: &str,
        response: &HttpResponse,
        normalized: NormalizedResponse,
    ) -> Result<NormalizedResponse, ToolError> {
        let Some(reference) = download_reference(response, &normalized.body) else {
            if normalized.json().is_some() {
                return Err(ToolError::new(
                    ToolErrorKind::RemoteApi,
                    "DOWNLOAD_REFERENCE_MISSING",
                    format!("{} response carried no download URL", tool),
                )
                .with_status(normalized.status));
            }
            // Redirect already followed: the body is the content.
            return Ok(normalized);
        };
        let target = self.resolve_reference(&reference)?;
        self.logger.debug(
            "Following download reference",
            Some(&serde_json::json!({ "tool": tool, "url": redact_url(target.as_str()) })),
        );

        let headers = download_headers();
        let content = if same_origin(&target, &self.base_url) {
            self.dispatch(&ConstructedRequest {
                method: HttpMethod::Get,
                url: target.to_string(),
                headers,
                body: None,
            })
            .await?
        } else {
            // Pre-authenticated link on another host: never forward the bearer token.
            let content = self
                .transport
                .send(HttpRequest::get(target.to_string(), headers))
                .await?;
            if !content.is_success() {
                return Err(ToolError::remote_api(content.status, error_body(&content)));
            }
            content
        };
        Ok(NormalizedResponse::from_http(&content))
    }
}

struct ContinuationFetcher<'a> {
    engine: &'a ExecutionEngine,
    headers: HeaderMap,
}

#[async_trait]
impl PageFetcher for ContinuationFetcher<'_> {
    async fn fetch(&self, url: &str) -> Result<Value, ToolError> {
        let target = self.engine.resolve_reference(url)?;
        if !same_origin(&target, &self.engine.base_url) {
            let mut err = ToolError::transport(format!(
                "Continuation link {} leaves the API origin",
                redact_url(target.as_str())
            ));
            err.retryable = false;
            return Err(err);
        }
        let response = self
            .engine
            .dispatch(&ConstructedRequest {
                method: HttpMethod::Get,
                url: target.to_string(),
                headers: self.headers.clone(),
                body: None,
            })
            .await?;
        response.json().ok_or_else(|| {
            ToolError::new(
                ToolErrorKind::RemoteApi,
                "INVALID_PAGE",
                "Continuation page is not a JSON document",
            )
            .with_status(response.status)
        })
    }
}

fn continuation_headers(original: &HeaderMap) -> HeaderMap {
    let mut headers = original.clone();
    headers.remove(CONTENT_TYPE);
    headers
}

fn download_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(UA, HeaderValue::from_static(USER_AGENT));
    headers
}

fn error_body(response: &HttpResponse) -> String {
    redact_text(&body_preview(&response.body, ERROR_BODY_MAX_BYTES), ERROR_BODY_MAX_BYTES)
}

fn describe(descriptor: &EndpointDescriptor) -> String {
    let mut out = descriptor.description.clone().unwrap_or_else(|| {
        format!(
            "{} {}",
            descriptor.method.as_str(),
            descriptor.path_pattern.as_str()
        )
    });
    if let Some(guidance) = descriptor.guidance_text.as_deref().filter(|g| !g.trim().is_empty()) {
        out.push_str("\n\n");
        out.push_str(guidance.trim());
    }
    if !descriptor.required_scopes.is_empty() {
        out.push_str("\n\nRequired scopes: ");
        out.push_str(&descriptor.required_scopes.join(", "));
    }
    out
}

/// Request schema plus the descriptor's dynamic parameters.
fn advertised_schema(descriptor: &EndpointDescriptor, schema: &RequestSchema) -> Value {
    let mut document = schema.input_schema().clone();
    if descriptor.dynamic_parameters.is_empty() {
        return document;
    }
    if let Some(properties) = document
        .get_mut("properties")
        .and_then(|p| p.as_object_mut())
    {
        for param in &descriptor.dynamic_parameters {
            let mut prop = serde_json::json!({ "type": param.kind.json_type() });
            if let Some(description) = &param.description {
                prop["description"] = Value::String(description.clone());
            }
            properties.insert(param.name.clone(), prop);
        }
    }
    document
}
