use crate::constants::network::USER_AGENT;
use crate::constants::query::DIRECTIVES;
use crate::errors::{FieldError, ToolError};
use crate::services::auth::Credential;
use crate::services::endpoints::{
    DynamicParameter, EndpointDescriptor, HttpMethod, ParamTarget, PathPart,
};
use crate::services::schema_registry::{ParamLocation, RequestSchema};
use crate::services::transport::HttpRequest;
use crate::services::validation::Validation;
use crate::utils::encoding::{encode_path_segment, encode_query_key, encode_query_value};
use bytes::Bytes;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT as UA,
};
use serde_json::{Map, Value};

/// Fully resolved request, minus the credential.
#[derive(Debug, Clone)]
pub struct ConstructedRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl ConstructedRequest {
    /// Attaches the bearer header last so nothing configured can replace it.
    pub fn authorize(&self, credential: &Credential) -> Result<HttpRequest, ToolError> {
        let mut headers = self.headers.clone();
        let mut value = HeaderValue::from_str(&credential.bearer())
            .map_err(|_| ToolError::authentication("Credential is not a valid header value"))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
        Ok(HttpRequest {
            method: self.method.to_reqwest(),
            url: self.url.clone(),
            headers,
            body: self.body.clone(),
        })
    }

    pub fn body_json(&self) -> Option<Value> {
        self.body
            .as_ref()
            .and_then(|body| serde_json::from_slice(body).ok())
    }
}

/// Caller arguments split by where they end up.
struct Partitioned<'a> {
    schema_args: Map<String, Value>,
    directives: Vec<(&'a str, &'a Value)>,
    dynamic: Vec<(&'a DynamicParameter, &'a Value)>,
}

#[derive(Clone)]
pub struct RequestBuilder {
    base_url: String,
    validation: Validation,
}

impl RequestBuilder {
    pub fn new(base_url: &url::Url) -> Self {
        Self {
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            validation: Validation::new(),
        }
    }

    pub fn build(
        &self,
        descriptor: &EndpointDescriptor,
        schema: &RequestSchema,
        args: &Map<String, Value>,
    ) -> Result<ConstructedRequest, ToolError> {
        let tool = descriptor.tool_name.as_str();
        let parts = partition(descriptor, schema, args);

        let mut fields = match schema.validate(&parts.schema_args) {
            Ok(()) => Vec::new(),
            Err(fields) => fields,
        };
        for (param, value) in &parts.dynamic {
            if !value.is_null() && !param.kind.matches(value) {
                fields.push(FieldError::new(
                    param.name.clone(),
                    format!("expected {}", param.kind.json_type()),
                ));
            }
        }
        if !fields.is_empty() {
            return Err(ToolError::invalid_fields(tool, fields));
        }

        let path = self.resolve_path(descriptor, schema, &parts.schema_args)?;
        let query = build_query(schema, &parts);
        let body = build_body(descriptor, schema, &parts)?;
        let headers = self.build_headers(descriptor, schema, &parts, body.is_some())?;

        let mut url = format!("{}{}", self.base_url, path);
        if !query.is_empty() {
            let encoded = query
                .iter()
                .map(|(k, v)| format!("{}={}", encode_query_key(k), encode_query_value(v)))
                .collect::<Vec<_>>()
                .join("&");
            url.push('?');
            url.push_str(&encoded);
        }

        Ok(ConstructedRequest {
            method: descriptor.method,
            url,
            headers,
            body: body.map(Bytes::from),
        })
    }

    fn resolve_path(
        &self,
        descriptor: &EndpointDescriptor,
        schema: &RequestSchema,
        args: &Map<String, Value>,
    ) -> Result<String, ToolError> {
        let tool = descriptor.tool_name.as_str();
        let mut out = String::new();
        let mut missing = Vec::new();
        for part in descriptor.path_pattern.parts() {
            let name = match part {
                PathPart::Literal(text) => {
                    out.push_str(text);
                    continue;
                }
                PathPart::Placeholder(name) => name,
            };
            let bound = schema
                .param(name)
                .is_some_and(|p| p.location == ParamLocation::Path);
            if !bound {
                return Err(ToolError::validation(format!(
                    "Path placeholder {{{}}} of {} is not bound by a path parameter",
                    name, tool
                ))
                .with_details(serde_json::json!({ "placeholder": name })));
            }
            match args.get(name).and_then(render_scalar) {
                Some(text) if !text.is_empty() => out.push_str(&encode_path_segment(&text)),
                Some(_) => missing.push(FieldError::new(name.clone(), "must not be empty")),
                None => missing.push(FieldError::new(name.clone(), "is required")),
            }
        }
        if !missing.is_empty() {
            return Err(ToolError::invalid_fields(tool, missing));
        }
        Ok(out)
    }

    fn build_headers(
        &self,
        descriptor: &EndpointDescriptor,
        schema: &RequestSchema,
        parts: &Partitioned<'_>,
        has_body: bool,
    ) -> Result<HeaderMap, ToolError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(UA, HeaderValue::from_static(USER_AGENT));
        if has_body {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        for param in schema.params() {
            if param.location != ParamLocation::Header {
                continue;
            }
            if let Some(text) = parts.schema_args.get(&param.name).and_then(render_scalar) {
                self.insert_header(&mut headers, &param.name, &text)?;
            }
        }
        for (param, value) in &parts.dynamic {
            if param.target != ParamTarget::Header {
                continue;
            }
            if let Some(text) = render_scalar(value) {
                self.insert_header(&mut headers, param.binding_key(), &param.render(&text))?;
            }
        }
        for (name, value) in &descriptor.extra_headers {
            self.insert_header(&mut headers, name, value)?;
        }
        Ok(headers)
    }

    fn insert_header(&self, headers: &mut HeaderMap, name: &str, value: &str) -> Result<(), ToolError> {
        let header = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|_| ToolError::validation(format!("Invalid header name: {}", name)))?;
        if header == AUTHORIZATION {
            return Ok(());
        }
        self.validation.ensure_header_value(name, value)?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| ToolError::validation(format!("Invalid value for header {}", name)))?;
        headers.insert(header, value);
        Ok(())
    }
}

fn partition<'a>(
    descriptor: &'a EndpointDescriptor,
    schema: &RequestSchema,
    args: &'a Map<String, Value>,
) -> Partitioned<'a> {
    let mut parts = Partitioned {
        schema_args: Map::new(),
        directives: Vec::new(),
        dynamic: Vec::new(),
    };
    for (key, value) in args {
        if let Some(param) = descriptor.dynamic_parameter(key) {
            parts.dynamic.push((param, value));
        } else if !schema.declares(key) && DIRECTIVES.contains(&key.as_str()) {
            parts.directives.push((key.as_str(), value));
        } else {
            parts.schema_args.insert(key.clone(), value.clone());
        }
    }
    parts
}

fn render_scalar(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        other => Some(other.to_string()),
    }
}

/// Appends one query parameter; arrays join with commas unless `explode`.
fn push_query(out: &mut Vec<(String, String)>, key: &str, value: &Value, explode: bool) {
    match value {
        Value::Null => {}
        Value::String(text) if text.is_empty() => {}
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().filter_map(render_scalar).collect();
            if rendered.is_empty() {
                return;
            }
            if explode {
                out.extend(rendered.into_iter().map(|item| (key.to_string(), item)));
            } else {
                out.push((key.to_string(), rendered.join(",")));
            }
        }
        other => {
            if let Some(text) = render_scalar(other) {
                out.push((key.to_string(), text));
            }
        }
    }
}

fn build_query(schema: &RequestSchema, parts: &Partitioned<'_>) -> Vec<(String, String)> {
    let mut query = Vec::new();
    for param in schema.params() {
        if param.location != ParamLocation::Query {
            continue;
        }
        if let Some(value) = parts.schema_args.get(&param.name) {
            push_query(&mut query, &param.name, value, param.explode);
        }
    }
    for (key, value) in &parts.directives {
        push_query(&mut query, key, value, false);
    }
    for (param, value) in &parts.dynamic {
        if param.target != ParamTarget::Query {
            continue;
        }
        if let Some(text) = render_scalar(value).filter(|t| !t.is_empty()) {
            query.push((param.binding_key().to_string(), param.render(&text)));
        }
    }
    query
}

fn build_body(
    descriptor: &EndpointDescriptor,
    schema: &RequestSchema,
    parts: &Partitioned<'_>,
) -> Result<Option<Vec<u8>>, ToolError> {
    let tool = descriptor.tool_name.as_str();
    let mut payload = schema
        .body()
        .and_then(|body| parts.schema_args.get(&body.name))
        .filter(|value| !value.is_null())
        .cloned();

    let mut merged: Vec<(String, Value)> = Vec::new();
    for param in schema.params() {
        if param.location != ParamLocation::Body {
            continue;
        }
        if let Some(value) = parts.schema_args.get(&param.name).filter(|v| !v.is_null()) {
            merged.push((param.name.clone(), value.clone()));
        }
    }
    for (param, value) in &parts.dynamic {
        if param.target != ParamTarget::Body || value.is_null() {
            continue;
        }
        let bound = match (&param.format, render_scalar(value)) {
            (Some(_), Some(text)) => Value::String(param.render(&text)),
            _ => (*value).clone(),
        };
        merged.push((param.binding_key().to_string(), bound));
    }

    if !merged.is_empty() {
        let target = payload.get_or_insert_with(|| Value::Object(Map::new()));
        let Some(object) = target.as_object_mut() else {
            return Err(ToolError::validation(format!(
                "{} body is not an object, so body fields cannot be merged into it",
                tool
            )));
        };
        for (key, value) in merged {
            object.insert(key, value);
        }
    }

    let Some(payload) = payload else {
        return Ok(None);
    };
    if !descriptor.method.allows_body() {
        return Err(ToolError::validation(format!(
            "{} is a {} tool and does not accept a request body",
            tool,
            descriptor.method.as_str()
        )));
    }
    serde_json::to_vec(&payload)
        .map(Some)
        .map_err(|err| ToolError::internal(format!("Failed to serialize body: {}", err)))
}
