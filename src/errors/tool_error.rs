use serde::Serialize;
use serde_json::Value;
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    Validation,
    NotFound,
    Authentication,
    Transport,
    RemoteApi,
    PaginationLimitExceeded,
    Internal,
}

/// One argument that failed schema validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolError {
    pub kind: ToolErrorKind,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
    pub retryable: bool,
}

impl ToolError {
    pub fn new(kind: ToolErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            hint: None,
            details: None,
            status: None,
            fields: Vec::new(),
            retryable: matches!(kind, ToolErrorKind::Transport),
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Validation, "VALIDATION", message)
    }

    /// Validation failure naming every offending argument.
    pub fn invalid_fields(tool: &str, fields: Vec<FieldError>) -> Self {
        let listed = fields
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        let mut err = Self::validation(format!("Invalid arguments for {}: {}", tool, listed));
        err.fields = fields;
        err
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::NotFound, "NOT_FOUND", message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Authentication, "AUTHENTICATION", message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Transport, "TRANSPORT", message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Transport, "TIMEOUT", message)
    }

    pub fn remote_api(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let mut err = Self::new(
            ToolErrorKind::RemoteApi,
            "REMOTE_API",
            format!("Remote API responded with status {}", status),
        )
        .with_status(status)
        .with_details(serde_json::json!({ "body": body }));
        err.retryable = status == 408 || status == 429 || status >= 500;
        err
    }

    pub fn pagination_limit(max_pages: usize, partial: Value) -> Self {
        Self::new(
            ToolErrorKind::PaginationLimitExceeded,
            "PAGINATION_LIMIT_EXCEEDED",
            format!("Pagination stopped after {} pages", max_pages),
        )
        .with_hint("Narrow the query (for example with $filter or $top) or raise APIBRIDGE_MAX_PAGES.")
        .with_details(serde_json::json!({
            "max_pages": max_pages,
            "partial": partial,
        }))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Internal, "INTERNAL", message)
    }

    /// Accumulated result carried by a `PaginationLimitExceeded` error.
    pub fn partial_result(&self) -> Option<&Value> {
        if self.kind != ToolErrorKind::PaginationLimitExceeded {
            return None;
        }
        self.details.as_ref().and_then(|d| d.get("partial"))
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for ToolError {}

impl From<std::io::Error> for ToolError {
    fn from(err: std::io::Error) -> Self {
        ToolError::internal(err.to_string())
    }
}
