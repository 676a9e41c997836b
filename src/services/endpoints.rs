use crate::errors::LoadError;
use crate::services::schema_registry::{ParamKind, SchemaRegistry};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

const ARTIFACT: &str = "endpoint";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpMethod {
    #[serde(rename = "GET", alias = "get")]
    Get,
    #[serde(rename = "POST", alias = "post")]
    Post,
    #[serde(rename = "PATCH", alias = "patch")]
    Patch,
    #[serde(rename = "PUT", alias = "put")]
    Put,
    #[serde(rename = "DELETE", alias = "delete")]
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    pub fn allows_body(self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Patch | HttpMethod::Put)
    }

    pub fn to_reqwest(self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResponseMode {
    #[default]
    Raw,
    DownloadUrl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamTarget {
    Header,
    Query,
    Body,
}

/// Caller-supplied parameter that is not part of the generated schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicParameter {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: ParamKind,
    #[serde(rename = "in")]
    pub target: ParamTarget,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl DynamicParameter {
    /// Header name, query key or body field the value binds to.
    pub fn binding_key(&self) -> &str {
        self.key.as_deref().unwrap_or(&self.name)
    }

    /// Applies `format` (`{value}` placeholder) to a rendered value.
    pub fn render(&self, value: &str) -> String {
        match &self.format {
            Some(template) => template.replace("{value}", value),
            None => value.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPart {
    Literal(String),
    Placeholder(String),
}

/// Parsed `pathPattern` such as `/chats/{chat-id}/messages`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    parts: Vec<PathPart>,
}

impl PathTemplate {
    pub fn parse(raw: &str) -> Result<Self, String> {
        if !raw.starts_with('/') {
            return Err(format!("path pattern '{}' must start with '/'", raw));
        }
        let mut parts = Vec::new();
        let mut rest = raw;
        while let Some(start) = rest.find('{') {
            let (literal, tail) = rest.split_at(start);
            if literal.contains('}') {
                return Err(format!("unbalanced '}}' in path pattern '{}'", raw));
            }
            if !literal.is_empty() {
                parts.push(PathPart::Literal(literal.to_string()));
            }
            let end = tail
                .find('}')
                .ok_or_else(|| format!("unterminated placeholder in path pattern '{}'", raw))?;
            let name = &tail[1..end];
            if name.trim().is_empty() || name.contains('{') {
                return Err(format!("invalid placeholder in path pattern '{}'", raw));
            }
            parts.push(PathPart::Placeholder(name.to_string()));
            rest = &tail[end + 1..];
        }
        if rest.contains('}') {
            return Err(format!("unbalanced '}}' in path pattern '{}'", raw));
        }
        if !rest.is_empty() {
            parts.push(PathPart::Literal(rest.to_string()));
        }
        Ok(Self {
            raw: raw.to_string(),
            parts,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn parts(&self) -> &[PathPart] {
        &self.parts
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|part| match part {
            PathPart::Placeholder(name) => Some(name.as_str()),
            PathPart::Literal(_) => None,
        })
    }
}

impl TryFrom<String> for PathTemplate {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PathTemplate::parse(&value)
    }
}

impl From<PathTemplate> for String {
    fn from(value: PathTemplate) -> Self {
        value.raw
    }
}

impl Serialize for PathTemplate {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for PathTemplate {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        PathTemplate::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Static configuration for one tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDescriptor {
    pub tool_name: String,
    pub path_pattern: PathTemplate,
    pub method: HttpMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, alias = "scopes")]
    pub required_scopes: Vec<String>,
    #[serde(default, alias = "headers")]
    pub extra_headers: BTreeMap<String, String>,
    #[serde(default, alias = "llmTip", skip_serializing_if = "Option::is_none")]
    pub guidance_text: Option<String>,
    #[serde(default)]
    pub fetch_all_pages: bool,
    #[serde(default)]
    pub response_mode: ResponseMode,
    #[serde(default)]
    pub dynamic_parameters: Vec<DynamicParameter>,
}

impl EndpointDescriptor {
    pub fn new(tool_name: &str, method: HttpMethod, path_pattern: &str) -> Result<Self, String> {
        Ok(Self {
            tool_name: tool_name.to_string(),
            path_pattern: PathTemplate::parse(path_pattern)?,
            method,
            description: None,
            required_scopes: Vec::new(),
            extra_headers: BTreeMap::new(),
            guidance_text: None,
            fetch_all_pages: false,
            response_mode: ResponseMode::Raw,
            dynamic_parameters: Vec::new(),
        })
    }

    pub fn dynamic_parameter(&self, name: &str) -> Option<&DynamicParameter> {
        self.dynamic_parameters.iter().find(|p| p.name == name)
    }

    fn check(&self) -> Result<(), LoadError> {
        let name = self.tool_name.trim();
        if name.is_empty() || name != self.tool_name || name.contains(char::is_whitespace) {
            return Err(LoadError::invalid(
                ARTIFACT,
                &self.tool_name,
                "toolName must be a non-empty identifier without whitespace",
            ));
        }
        if self
            .extra_headers
            .keys()
            .any(|k| k.trim().eq_ignore_ascii_case("authorization"))
        {
            return Err(LoadError::invalid(
                ARTIFACT,
                name,
                "extraHeaders may not set Authorization",
            ));
        }
        let mut seen = HashSet::new();
        for param in &self.dynamic_parameters {
            if param.name.trim().is_empty() {
                return Err(LoadError::invalid(
                    ARTIFACT,
                    name,
                    "dynamic parameter without a name",
                ));
            }
            if !seen.insert(param.name.as_str()) {
                return Err(LoadError::invalid(
                    ARTIFACT,
                    name,
                    format!("duplicate dynamic parameter '{}'", param.name),
                ));
            }
            if param.target == ParamTarget::Header
                && param.binding_key().eq_ignore_ascii_case("authorization")
            {
                return Err(LoadError::invalid(
                    ARTIFACT,
                    name,
                    "dynamic parameters may not bind to Authorization",
                ));
            }
            if param.target == ParamTarget::Body && !self.method.allows_body() {
                return Err(LoadError::invalid(
                    ARTIFACT,
                    name,
                    format!(
                        "dynamic parameter '{}' binds to the body of a {} request",
                        param.name,
                        self.method.as_str()
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// Tools excluded at load time (read-only mode, enabled-tools pattern).
#[derive(Debug, Clone, Default)]
pub struct ToolFilter {
    pub read_only: bool,
    pub enabled: Option<Regex>,
}

impl ToolFilter {
    pub fn allows(&self, descriptor: &EndpointDescriptor) -> bool {
        if self.read_only && descriptor.method != HttpMethod::Get {
            return false;
        }
        match &self.enabled {
            Some(pattern) => pattern.is_match(&descriptor.tool_name),
            None => true,
        }
    }
}

/// Ordered, immutable map from tool name to descriptor.
#[derive(Debug, Clone, Default)]
pub struct EndpointStore {
    descriptors: Vec<Arc<EndpointDescriptor>>,
    index: HashMap<String, usize>,
}

impl EndpointStore {
    pub fn from_descriptors(descriptors: Vec<EndpointDescriptor>) -> Result<Self, LoadError> {
        let mut store = Self::default();
        for descriptor in descriptors {
            descriptor.check()?;
            if store.index.contains_key(&descriptor.tool_name) {
                return Err(LoadError::invalid(
                    ARTIFACT,
                    &descriptor.tool_name,
                    "duplicate toolName",
                ));
            }
            store
                .index
                .insert(descriptor.tool_name.clone(), store.descriptors.len());
            store.descriptors.push(Arc::new(descriptor));
        }
        Ok(store)
    }

    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let raw = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let descriptors: Vec<EndpointDescriptor> =
            serde_json::from_str(&raw).map_err(|source| LoadError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_descriptors(descriptors)
    }

    pub fn filtered(self, filter: &ToolFilter) -> Self {
        let kept = self
            .descriptors
            .into_iter()
            .filter(|d| filter.allows(d))
            .collect::<Vec<_>>();
        let index = kept
            .iter()
            .enumerate()
            .map(|(idx, d)| (d.tool_name.clone(), idx))
            .collect();
        Self {
            descriptors: kept,
            index,
        }
    }

    /// Every descriptor needs a schema, and dynamic parameters may not shadow schema fields.
    pub fn check_against(&self, registry: &SchemaRegistry) -> Result<(), LoadError> {
        for descriptor in &self.descriptors {
            let schema = registry.get(&descriptor.tool_name).ok_or_else(|| {
                LoadError::invalid(ARTIFACT, &descriptor.tool_name, "no request schema generated")
            })?;
            for param in &descriptor.dynamic_parameters {
                if schema.declares(&param.name) {
                    return Err(LoadError::invalid(
                        ARTIFACT,
                        &descriptor.tool_name,
                        format!(
                            "dynamic parameter '{}' collides with a schema field",
                            param.name
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, tool_name: &str) -> Option<&Arc<EndpointDescriptor>> {
        self.index.get(tool_name).map(|idx| &self.descriptors[*idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<EndpointDescriptor>> {
        self.descriptors.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.descriptors.iter().map(|d| d.tool_name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
