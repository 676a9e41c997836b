use crate::constants::auth::{DEFAULT_GRANT_TYPE, DEFAULT_TOKEN_PATH, MAX_TOKEN_LIFETIME_SECS};
use crate::constants::limits::ERROR_BODY_MAX_BYTES;
use crate::errors::{ToolError, ToolErrorKind};
use crate::services::logger::Logger;
use crate::services::transport::{HttpRequest, Transport};
use crate::utils::json_path::lookup;
use crate::utils::redact::redact_text;
use crate::utils::text::body_preview;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Method;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// Bearer token with its expiry and granted scopes. Replaced whole, never mutated.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: None,
            scopes: Vec::new(),
        }
    }

    pub fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn expiring_in(self, seconds: i64) -> Self {
        match expiry_after(seconds) {
            Some(expires_at) => self.expiring_at(expires_at),
            None => self,
        }
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Usable for at least `margin` more at `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>, margin: chrono::Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => now + margin < expires_at,
            None => true,
        }
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Backend that performs one token exchange with the issuing authority.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn exchange(&self) -> Result<Credential, ToolError>;

    fn describe(&self) -> &'static str;
}

pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn exchange(&self) -> Result<Credential, ToolError> {
        Ok(Credential::new(self.token.clone()))
    }

    fn describe(&self) -> &'static str {
        "static"
    }
}

#[derive(Debug, Clone)]
pub struct OAuth2Config {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub scope: Option<String>,
    pub grant_type: String,
    pub refresh_token: Option<String>,
}

impl OAuth2Config {
    pub fn client_credentials(token_url: &str, client_id: &str, client_secret: &str) -> Self {
        Self {
            token_url: token_url.to_string(),
            client_id: client_id.to_string(),
            client_secret: Some(client_secret.to_string()),
            scope: None,
            grant_type: DEFAULT_GRANT_TYPE.to_string(),
            refresh_token: None,
        }
    }
}

/// OAuth2 token endpoint (`client_credentials` or `refresh_token` grant).
pub struct OAuth2TokenSource {
    config: OAuth2Config,
    transport: Arc<dyn Transport>,
}

impl OAuth2TokenSource {
    pub fn new(config: OAuth2Config, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    fn form(&self) -> Result<String, ToolError> {
        let mut payload: Vec<(&str, &str)> = vec![
            ("grant_type", self.config.grant_type.as_str()),
            ("client_id", self.config.client_id.as_str()),
        ];
        if let Some(secret) = &self.config.client_secret {
            payload.push(("client_secret", secret.as_str()));
        }
        if let Some(scope) = &self.config.scope {
            payload.push(("scope", scope.as_str()));
        }
        if self.config.grant_type == "refresh_token" {
            let refresh = self.config.refresh_token.as_deref().ok_or_else(|| {
                ToolError::authentication("refresh_token grant requires APIBRIDGE_REFRESH_TOKEN")
            })?;
            payload.push(("refresh_token", refresh));
        }
        serde_urlencoded::to_string(&payload)
            .map_err(|err| ToolError::internal(format!("Failed to encode token request: {}", err)))
    }
}

#[async_trait]
impl TokenSource for OAuth2TokenSource {
    async fn exchange(&self) -> Result<Credential, ToolError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let response = self
            .transport
            .send(HttpRequest {
                method: Method::POST,
                url: self.config.token_url.clone(),
                headers,
                body: Some(Bytes::from(self.form()?)),
            })
            .await?;

        if !response.is_success() {
            let body = redact_text(
                &body_preview(&response.body, ERROR_BODY_MAX_BYTES),
                ERROR_BODY_MAX_BYTES,
            );
            return Err(ToolError::authentication(format!(
                "OAuth2 token request failed ({})",
                response.status
            ))
            .with_status(response.status)
            .with_details(serde_json::json!({ "body": body })));
        }

        let payload = response
            .json()
            .ok_or_else(|| ToolError::authentication("OAuth2 token response is not JSON"))?;
        let token = lookup(&payload, DEFAULT_TOKEN_PATH)
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        if token.is_empty() {
            return Err(ToolError::authentication("OAuth2 token not found in response"));
        }
        let mut credential = Credential::new(token);
        if let Some(expires_at) = expiry_from_payload(&payload) {
            credential = credential.expiring_at(expires_at);
        }
        if let Some(scope) = payload.get("scope").and_then(|v| v.as_str()) {
            credential = credential.with_scopes(scope.split_whitespace().map(String::from).collect());
        }
        Ok(credential)
    }

    fn describe(&self) -> &'static str {
        "oauth2"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenFormat {
    Raw,
    Json,
}

impl TokenFormat {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "" | "raw" | "text" => Some(TokenFormat::Raw),
            "json" => Some(TokenFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandConfig {
    pub command: String,
    pub args: Vec<String>,
    pub format: TokenFormat,
    pub token_path: String,
    pub timeout: Duration,
}

/// Runs an external command (for example a CLI login helper) that prints a token.
pub struct CommandTokenSource {
    config: CommandConfig,
}

impl CommandTokenSource {
    pub fn new(config: CommandConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TokenSource for CommandTokenSource {
    async fn exchange(&self) -> Result<Credential, ToolError> {
        let mut cmd = tokio::process::Command::new(&self.config.command);
        cmd.args(&self.config.args).kill_on_drop(true);
        let output = tokio::time::timeout(self.config.timeout, cmd.output())
            .await
            .map_err(|_| ToolError::authentication("Token command timed out"))?
            .map_err(|err| {
                ToolError::authentication(format!(
                    "Failed to run token command {}: {}",
                    self.config.command, err
                ))
            })?;
        if !output.status.success() {
            let stderr = redact_text(
                &body_preview(&output.stderr, ERROR_BODY_MAX_BYTES),
                ERROR_BODY_MAX_BYTES,
            );
            return Err(ToolError::authentication(format!(
                "Token command exited with {}",
                output.status
            ))
            .with_details(serde_json::json!({ "stderr": stderr })));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let credential = match self.config.format {
            TokenFormat::Raw => Credential::new(stdout),
            TokenFormat::Json => {
                let parsed: Value = serde_json::from_str(&stdout)
                    .map_err(|_| ToolError::authentication("Token command returned invalid JSON"))?;
                let token = lookup(&parsed, &self.config.token_path)
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                let mut credential = Credential::new(token);
                if let Some(expires_at) = expiry_from_payload(&parsed) {
                    credential = credential.expiring_at(expires_at);
                }
                credential
            }
        };
        if credential.access_token.is_empty() {
            return Err(ToolError::authentication("Token command did not return a token"));
        }
        Ok(credential)
    }

    fn describe(&self) -> &'static str {
        "command"
    }
}

/// Relative lifetime from the token authority, clamped to `0..=MAX_TOKEN_LIFETIME_SECS`.
fn expiry_after(seconds: i64) -> Option<DateTime<Utc>> {
    chrono::Duration::try_seconds(seconds.clamp(0, MAX_TOKEN_LIFETIME_SECS))
        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
}

/// Reads `expires_in` (seconds from now) or `expires_on` / `expiresOn` (absolute).
fn expiry_from_payload(payload: &Value) -> Option<DateTime<Utc>> {
    if let Some(raw) = payload.get("expires_in") {
        let seconds = raw
            .as_i64()
            .or_else(|| raw.as_str().and_then(|s| s.trim().parse::<i64>().ok()))?;
        return expiry_after(seconds);
    }
    let raw = payload.get("expires_on").or_else(|| payload.get("expiresOn"))?;
    if let Some(epoch) = raw
        .as_i64()
        .or_else(|| raw.as_str().and_then(|s| s.trim().parse::<i64>().ok()))
    {
        return Utc.timestamp_opt(epoch, 0).single();
    }
    let text = raw.as_str()?;
    DateTime::parse_from_rfc3339(text.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Process-wide credential cache with coalesced refresh.
pub struct CredentialManager {
    source: Arc<dyn TokenSource>,
    cached: RwLock<Option<Arc<Credential>>>,
    refresh: tokio::sync::Mutex<()>,
    last_failure: Mutex<Option<ToolError>>,
    exchanges: AtomicU64,
    /// Bumped once an exchange has resolved, success or failure.
    completed: AtomicU64,
    margin: chrono::Duration,
    logger: Logger,
}

impl CredentialManager {
    pub fn new(source: Arc<dyn TokenSource>, margin: Duration, logger: Logger) -> Self {
        let margin = chrono::Duration::from_std(margin).unwrap_or_else(|_| chrono::Duration::zero());
        Self {
            source,
            cached: RwLock::new(None),
            refresh: tokio::sync::Mutex::new(()),
            last_failure: Mutex::new(None),
            exchanges: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            margin,
            logger: logger.child("auth"),
        }
    }

    /// Number of token exchanges attempted so far.
    pub fn exchange_count(&self) -> u64 {
        self.exchanges.load(Ordering::SeqCst)
    }

    fn cached_within(&self, margin: chrono::Duration) -> Option<Arc<Credential>> {
        let guard = self.cached.read().unwrap_or_else(|err| err.into_inner());
        guard
            .as_ref()
            .filter(|c| c.is_fresh(Utc::now(), margin))
            .cloned()
    }

    pub async fn acquire(&self) -> Result<Arc<Credential>, ToolError> {
        if let Some(credential) = self.cached_within(self.margin) {
            return Ok(credential);
        }
        let observed = self.completed.load(Ordering::SeqCst);
        let _guard = self.refresh.lock().await;

        if let Some(credential) = self.cached_within(self.margin) {
            return Ok(credential);
        }
        if self.completed.load(Ordering::SeqCst) != observed {
            // An exchange resolved while we waited: share its outcome. A token issued with a
            // lifetime shorter than the margin is still served until it actually expires.
            let failure = self.last_failure.lock().unwrap_or_else(|err| err.into_inner()).clone();
            if let Some(err) = failure {
                return Err(err);
            }
            if let Some(credential) = self.cached_within(chrono::Duration::zero()) {
                return Ok(credential);
            }
        }

        let attempt = self.exchanges.fetch_add(1, Ordering::SeqCst) + 1;
        self.logger.debug(
            "Exchanging token",
            Some(&serde_json::json!({ "source": self.source.describe(), "attempt": attempt })),
        );
        let outcome = self.source.exchange().await;
        let result = match outcome {
            Ok(credential) => {
                let credential = Arc::new(credential);
                *self.cached.write().unwrap_or_else(|err| err.into_inner()) = Some(credential.clone());
                *self.last_failure.lock().unwrap_or_else(|err| err.into_inner()) = None;
                self.logger.info(
                    "Credential refreshed",
                    Some(&serde_json::json!({
                        "source": self.source.describe(),
                        "expires_at": credential.expires_at.map(|t| t.to_rfc3339()),
                    })),
                );
                Ok(credential)
            }
            Err(err) => {
                let err = as_authentication_error(err);
                self.logger.warn(
                    "Credential acquisition failed",
                    Some(&serde_json::json!({
                        "source": self.source.describe(),
                        "error": err.message,
                    })),
                );
                *self.last_failure.lock().unwrap_or_else(|e| e.into_inner()) = Some(err.clone());
                Err(err)
            }
        };
        self.completed.fetch_add(1, Ordering::SeqCst);
        result
    }

    /// Forces the next `acquire` to exchange.
    pub fn invalidate(&self) {
        *self.cached.write().unwrap_or_else(|err| err.into_inner()) = None;
    }

    /// Invalidates only if `rejected` is still the cached credential.
    pub fn invalidate_if(&self, rejected: &Credential) -> bool {
        let mut guard = self.cached.write().unwrap_or_else(|err| err.into_inner());
        let matches = guard
            .as_ref()
            .is_some_and(|current| current.access_token == rejected.access_token);
        if matches {
            *guard = None;
        }
        matches
    }
}

fn as_authentication_error(err: ToolError) -> ToolError {
    if err.kind == ToolErrorKind::Authentication {
        return err;
    }
    let mut mapped = ToolError::authentication(format!("Failed to acquire credential: {}", err.message))
        .with_hint("Check the APIBRIDGE_* token source settings.");
    mapped.status = err.status;
    mapped.details = err.details;
    mapped
}
