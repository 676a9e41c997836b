use crate::constants::auth::{DEFAULT_GRANT_TYPE, DEFAULT_TOKEN_PATH, EXPIRY_MARGIN_MS};
use crate::constants::network::{
    DEFAULT_BASE_URL, MAX_RESPONSE_BYTES, TIMEOUT_API_REQUEST_MS, TIMEOUT_TOKEN_COMMAND_MS,
};
use crate::constants::pagination::MAX_PAGES;
use crate::errors::ToolError;
use crate::services::auth::{CommandConfig, OAuth2Config, TokenFormat};
use crate::services::endpoints::ToolFilter;
use crate::services::validation::Validation;
use crate::utils::env::{endpoints_path, env_flag, env_value, schemas_path};
use regex::Regex;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum TokenSourceConfig {
    Static(String),
    OAuth2(OAuth2Config),
    Command(CommandConfig),
}

impl TokenSourceConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            TokenSourceConfig::Static(_) => "static",
            TokenSourceConfig::OAuth2(_) => "oauth2",
            TokenSourceConfig::Command(_) => "command",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub base_url: url::Url,
    pub endpoints_path: PathBuf,
    pub schemas_path: PathBuf,
    pub timeout: Duration,
    pub max_pages: usize,
    pub expiry_margin: Duration,
    pub max_response_bytes: usize,
    pub filter: ToolFilter,
    pub token_source: TokenSourceConfig,
}

impl Settings {
    pub fn from_env() -> Result<Self, ToolError> {
        let validation = Validation::new();
        let read_u64 = |key: &str, default: u64| -> Result<u64, ToolError> {
            match env_value(key) {
                Some(raw) => validation.ensure_positive_int(&raw, key),
                None => Ok(default),
            }
        };

        let base_url = validation.ensure_http_url(
            &env_value("APIBRIDGE_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            "APIBRIDGE_BASE_URL",
        )?;
        let enabled = match env_value("APIBRIDGE_ENABLED_TOOLS") {
            Some(pattern) => Some(Regex::new(&pattern).map_err(|err| {
                ToolError::validation(format!("APIBRIDGE_ENABLED_TOOLS is not a valid regex: {}", err))
            })?),
            None => None,
        };

        Ok(Self {
            base_url,
            endpoints_path: endpoints_path(),
            schemas_path: schemas_path(),
            timeout: Duration::from_millis(read_u64("APIBRIDGE_TIMEOUT_MS", TIMEOUT_API_REQUEST_MS)?),
            max_pages: read_u64("APIBRIDGE_MAX_PAGES", MAX_PAGES as u64)? as usize,
            expiry_margin: Duration::from_millis(read_u64(
                "APIBRIDGE_TOKEN_EXPIRY_MARGIN_MS",
                EXPIRY_MARGIN_MS,
            )?),
            max_response_bytes: read_u64("APIBRIDGE_MAX_RESPONSE_BYTES", MAX_RESPONSE_BYTES as u64)?
                as usize,
            filter: ToolFilter {
                read_only: env_flag("APIBRIDGE_READ_ONLY"),
                enabled,
            },
            token_source: token_source_from_env(&validation)?,
        })
    }
}

/// Precedence: static token, then OAuth2 endpoint, then external command.
fn token_source_from_env(validation: &Validation) -> Result<TokenSourceConfig, ToolError> {
    if let Some(token) = env_value("APIBRIDGE_ACCESS_TOKEN") {
        return Ok(TokenSourceConfig::Static(token));
    }

    if let Some(token_url) = env_value("APIBRIDGE_TOKEN_URL") {
        validation.ensure_http_url(&token_url, "APIBRIDGE_TOKEN_URL")?;
        let client_id = env_value("APIBRIDGE_CLIENT_ID").ok_or_else(|| {
            ToolError::validation("APIBRIDGE_CLIENT_ID is required with APIBRIDGE_TOKEN_URL")
        })?;
        let grant_type =
            env_value("APIBRIDGE_GRANT_TYPE").unwrap_or_else(|| DEFAULT_GRANT_TYPE.to_string());
        let client_secret = env_value("APIBRIDGE_CLIENT_SECRET");
        let refresh_token = env_value("APIBRIDGE_REFRESH_TOKEN");
        match grant_type.as_str() {
            "client_credentials" if client_secret.is_none() => {
                return Err(ToolError::validation(
                    "APIBRIDGE_CLIENT_SECRET is required for the client_credentials grant",
                ));
            }
            "refresh_token" if refresh_token.is_none() => {
                return Err(ToolError::validation(
                    "APIBRIDGE_REFRESH_TOKEN is required for the refresh_token grant",
                ));
            }
            "client_credentials" | "refresh_token" => {}
            other => {
                return Err(ToolError::validation(format!(
                    "Unsupported APIBRIDGE_GRANT_TYPE '{}'",
                    other
                )));
            }
        }
        return Ok(TokenSourceConfig::OAuth2(OAuth2Config {
            token_url,
            client_id,
            client_secret,
            scope: env_value("APIBRIDGE_SCOPE"),
            grant_type,
            refresh_token,
        }));
    }

    if let Some(command) = env_value("APIBRIDGE_TOKEN_COMMAND") {
        let args = env_value("APIBRIDGE_TOKEN_COMMAND_ARGS")
            .map(|raw| raw.split_whitespace().map(String::from).collect())
            .unwrap_or_default();
        let raw_format = env_value("APIBRIDGE_TOKEN_FORMAT").unwrap_or_default();
        let format = TokenFormat::parse(&raw_format).ok_or_else(|| {
            ToolError::validation(format!(
                "APIBRIDGE_TOKEN_FORMAT must be raw or json, got '{}'",
                raw_format
            ))
        })?;
        return Ok(TokenSourceConfig::Command(CommandConfig {
            command,
            args,
            format,
            token_path: env_value("APIBRIDGE_TOKEN_PATH")
                .unwrap_or_else(|| DEFAULT_TOKEN_PATH.to_string()),
            timeout: Duration::from_millis(TIMEOUT_TOKEN_COMMAND_MS),
        }));
    }

    Err(ToolError::validation("No token source configured").with_hint(
        "Set APIBRIDGE_ACCESS_TOKEN, APIBRIDGE_TOKEN_URL with client credentials, or APIBRIDGE_TOKEN_COMMAND.",
    ))
}
