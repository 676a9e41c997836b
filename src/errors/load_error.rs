use crate::errors::ToolError;
use std::path::PathBuf;

/// Failure to read one of the startup artifacts (descriptors, schemas).
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{artifact} entry '{entry}' is invalid: {reason}")]
    Invalid {
        artifact: &'static str,
        entry: String,
        reason: String,
    },
}

impl LoadError {
    pub fn invalid(artifact: &'static str, entry: impl Into<String>, reason: impl Into<String>) -> Self {
        LoadError::Invalid {
            artifact,
            entry: entry.into(),
            reason: reason.into(),
        }
    }
}

impl From<LoadError> for ToolError {
    fn from(err: LoadError) -> Self {
        let hint = match &err {
            LoadError::Io { .. } => {
                "Check APIBRIDGE_ENDPOINTS_PATH / APIBRIDGE_SCHEMAS_PATH or APIBRIDGE_CONFIG_DIR."
            }
            LoadError::Parse { .. } => "The file must be valid JSON.",
            LoadError::Invalid { .. } => "Regenerate the artifacts or fix the descriptor entry.",
        };
        ToolError::internal(err.to_string()).with_hint(hint)
    }
}
