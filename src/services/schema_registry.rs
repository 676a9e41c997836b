use crate::errors::{FieldError, LoadError};
use jsonschema::error::{TypeKind, ValidationErrorKind};
use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

const ARTIFACT: &str = "schema";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    #[default]
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

impl ParamKind {
    pub fn json_type(self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Number => "number",
            ParamKind::Integer => "integer",
            ParamKind::Boolean => "boolean",
            ParamKind::Object => "object",
            ParamKind::Array => "array",
        }
    }

    pub fn matches(self, value: &Value) -> bool {
        match self {
            ParamKind::String => value.is_string(),
            ParamKind::Number => value.is_number(),
            ParamKind::Integer => value.is_i64() || value.is_u64(),
            ParamKind::Boolean => value.is_boolean(),
            ParamKind::Object => value.is_object(),
            ParamKind::Array => value.is_array(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Body,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "in")]
    pub location: ParamLocation,
    #[serde(default)]
    pub required: bool,
    #[serde(rename = "type", default)]
    pub kind: ParamKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    /// Arrays repeat the query key instead of joining with commas.
    #[serde(default)]
    pub explode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodySpec {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

/// One entry of the generated schema file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaArtifact {
    #[serde(default)]
    pub parameters: Vec<ParamSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<BodySpec>,
    #[serde(default)]
    pub additional_properties: bool,
}

/// Compiled request-shape contract for one tool.
#[derive(Clone)]
pub struct RequestSchema {
    tool: String,
    params: Vec<ParamSpec>,
    body: Option<BodySpec>,
    closed: bool,
    document: Value,
    validator: Arc<JSONSchema>,
}

impl fmt::Debug for RequestSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSchema")
            .field("tool", &self.tool)
            .field("params", &self.params)
            .field("body", &self.body)
            .field("closed", &self.closed)
            .finish()
    }
}

impl RequestSchema {
    pub fn compile(tool: &str, artifact: SchemaArtifact) -> Result<Self, LoadError> {
        let mut seen = HashSet::new();
        for param in &artifact.parameters {
            if param.name.trim().is_empty() {
                return Err(LoadError::invalid(ARTIFACT, tool, "parameter without a name"));
            }
            if !seen.insert(param.name.as_str()) {
                return Err(LoadError::invalid(
                    ARTIFACT,
                    tool,
                    format!("duplicate parameter '{}'", param.name),
                ));
            }
            if param.location == ParamLocation::Path && !param.required {
                return Err(LoadError::invalid(
                    ARTIFACT,
                    tool,
                    format!("path parameter '{}' must be required", param.name),
                ));
            }
        }
        if let Some(body) = &artifact.request_body {
            if seen.contains(body.name.as_str()) {
                return Err(LoadError::invalid(
                    ARTIFACT,
                    tool,
                    format!("request body '{}' collides with a parameter", body.name),
                ));
            }
        }

        let document = build_document(&artifact);
        let validator = JSONSchema::compile(&document)
            .map_err(|err| LoadError::invalid(ARTIFACT, tool, err.to_string()))?;

        Ok(Self {
            tool: tool.to_string(),
            params: artifact.parameters,
            body: artifact.request_body,
            closed: !artifact.additional_properties,
            document,
            validator: Arc::new(validator),
        })
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn body(&self) -> Option<&BodySpec> {
        self.body.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// True when `name` is a parameter or the request body argument.
    pub fn declares(&self, name: &str) -> bool {
        self.param(name).is_some() || self.body.as_ref().is_some_and(|b| b.name == name)
    }

    /// JSON Schema advertised to callers.
    pub fn input_schema(&self) -> &Value {
        &self.document
    }

    pub fn validate(&self, args: &Map<String, Value>) -> Result<(), Vec<FieldError>> {
        let instance = Value::Object(args.clone());
        let result = self.validator.validate(&instance);
        let Err(errors) = result else {
            return Ok(());
        };
        let mut fields = Vec::new();
        for err in errors {
            match &err.kind {
                ValidationErrorKind::Required { property } => {
                    let name = property
                        .as_str()
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| property.to_string());
                    fields.push(FieldError::new(name, "is required"));
                }
                ValidationErrorKind::AdditionalProperties { unexpected } => {
                    for name in unexpected {
                        fields.push(FieldError::new(name.clone(), "is not a parameter of this tool"));
                    }
                }
                ValidationErrorKind::Type { kind } => {
                    fields.push(FieldError::new(
                        top_level_field(&err.instance_path.to_string()),
                        format!("expected {}", format_type_kind(kind)),
                    ));
                }
                _ => {
                    fields.push(FieldError::new(
                        top_level_field(&err.instance_path.to_string()),
                        err.to_string(),
                    ));
                }
            }
        }
        if fields.is_empty() {
            return Ok(());
        }
        Err(fields)
    }
}

fn build_document(artifact: &SchemaArtifact) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for param in &artifact.parameters {
        let mut prop = param
            .schema
            .clone()
            .unwrap_or_else(|| serde_json::json!({ "type": param.kind.json_type() }));
        if let (Some(obj), Some(description)) = (prop.as_object_mut(), &param.description) {
            obj.entry("description")
                .or_insert_with(|| Value::String(description.clone()));
        }
        properties.insert(param.name.clone(), prop);
        if param.required {
            required.push(Value::String(param.name.clone()));
        }
    }
    if let Some(body) = &artifact.request_body {
        let mut prop = body
            .schema
            .clone()
            .unwrap_or_else(|| serde_json::json!({ "type": "object" }));
        if let (Some(obj), Some(description)) = (prop.as_object_mut(), &body.description) {
            obj.entry("description")
                .or_insert_with(|| Value::String(description.clone()));
        }
        properties.insert(body.name.clone(), prop);
        if body.required {
            required.push(Value::String(body.name.clone()));
        }
    }
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": artifact.additional_properties,
    })
}

fn top_level_field(instance_path: &str) -> String {
    let first = instance_path
        .trim_start_matches('/')
        .split('/')
        .next()
        .unwrap_or_default();
    if first.is_empty() {
        return "(root)".to_string();
    }
    first.replace("~1", "/").replace("~0", "~")
}

fn format_type_kind(kind: &TypeKind) -> String {
    match kind {
        TypeKind::Single(primitive) => primitive.to_string(),
        TypeKind::Multiple(types) => {
            let list: Vec<String> = (*types).into_iter().map(|t| t.to_string()).collect();
            if list.is_empty() {
                "unknown".to_string()
            } else {
                list.join(" | ")
            }
        }
    }
}

/// Tool name to compiled request schema; read-only after load.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Arc<RequestSchema>>,
}

impl SchemaRegistry {
    pub fn from_artifacts(artifacts: BTreeMap<String, SchemaArtifact>) -> Result<Self, LoadError> {
        let mut schemas = HashMap::new();
        for (tool, artifact) in artifacts {
            let schema = RequestSchema::compile(&tool, artifact)?;
            schemas.insert(tool, Arc::new(schema));
        }
        Ok(Self { schemas })
    }

    pub fn from_value(value: Value) -> Result<Self, LoadError> {
        let artifacts: BTreeMap<String, SchemaArtifact> = serde_json::from_value(value)
            .map_err(|err| LoadError::invalid(ARTIFACT, "(root)", err.to_string()))?;
        Self::from_artifacts(artifacts)
    }

    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let raw = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let artifacts: BTreeMap<String, SchemaArtifact> =
            serde_json::from_str(&raw).map_err(|source| LoadError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_artifacts(artifacts)
    }

    pub fn get(&self, tool: &str) -> Option<&Arc<RequestSchema>> {
        self.schemas.get(tool)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
