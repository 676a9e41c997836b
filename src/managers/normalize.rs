use crate::constants::download::URL_FIELDS;
use crate::constants::headers::KEPT;
use crate::services::transport::HttpResponse;
use base64::Engine as _;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseBody {
    Empty,
    Json { value: Value },
    Text { text: String },
    Binary { base64: String, bytes: usize },
}

impl ResponseBody {
    fn classify(content_type: Option<&str>, raw: &[u8]) -> Self {
        if raw.is_empty() {
            return ResponseBody::Empty;
        }
        let media = content_type
            .map(|ct| ct.split(';').next().unwrap_or("").trim().to_lowercase())
            .unwrap_or_default();

        if media.is_empty() || media.contains("json") {
            if let Ok(value) = serde_json::from_slice::<Value>(raw) {
                return ResponseBody::Json { value };
            }
        }
        let textual = media.is_empty()
            || media.starts_with("text/")
            || media.contains("json")
            || media.contains("xml")
            || media == "application/x-www-form-urlencoded"
            || media == "application/javascript";
        if textual {
            if let Ok(text) = std::str::from_utf8(raw) {
                return ResponseBody::Text {
                    text: text.to_string(),
                };
            }
        }
        ResponseBody::Binary {
            base64: base64::engine::general_purpose::STANDARD.encode(raw),
            bytes: raw.len(),
        }
    }
}

/// Status, content type, relevant headers and decoded body of a tool call.
#[derive(Debug, Clone, Serialize)]
pub struct NormalizedResponse {
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub body: ResponseBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<usize>,
}

impl NormalizedResponse {
    pub fn from_http(response: &HttpResponse) -> Self {
        let headers = KEPT
            .iter()
            .filter_map(|name| {
                response
                    .header(name)
                    .map(|value| (name.to_string(), value.to_string()))
            })
            .collect();
        let content_type = response.content_type().map(String::from);
        Self {
            status: response.status,
            body: ResponseBody::classify(content_type.as_deref(), &response.body),
            content_type,
            headers,
            pages: None,
        }
    }

    pub fn json(&self) -> Option<&Value> {
        match &self.body {
            ResponseBody::Json { value } => Some(value),
            _ => None,
        }
    }

    pub fn with_pages(mut self, body: Value, pages: usize) -> Self {
        self.body = ResponseBody::Json { value: body };
        self.pages = Some(pages);
        self
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Download reference: a known URL field, a bare JSON string, or a `Location` header.
pub fn download_reference(response: &HttpResponse, body: &ResponseBody) -> Option<String> {
    if let ResponseBody::Json { value } = body {
        if let Some(object) = value.as_object() {
            for field in URL_FIELDS {
                if let Some(url) = object.get(*field).and_then(|v| v.as_str()) {
                    if !url.trim().is_empty() {
                        return Some(url.trim().to_string());
                    }
                }
            }
        }
        if let Some(url) = value.as_str() {
            if !url.trim().is_empty() {
                return Some(url.trim().to_string());
            }
        }
    }
    response.location().map(|loc| loc.trim().to_string()).filter(|loc| !loc.is_empty())
}

pub fn same_origin(a: &url::Url, b: &url::Url) -> bool {
    a.origin() == b.origin()
}
