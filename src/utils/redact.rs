use crate::utils::text::truncate_utf8_prefix;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

const MASK: &str = "[REDACTED]";

/// Header names whose values are credentials.
const CREDENTIAL_HEADERS: &[&str] = &[
    "authorization",
    "proxy-authorization",
    "cookie",
    "set-cookie",
    "x-api-key",
];

/// Query parameters that make a download link pre-authenticated.
const SIGNED_LINK_PARAMS: &[&str] = &["tempauth", "sig", "signature", "token", "access_token", "code"];

/// Token endpoint and token command fields.
const TOKEN_FIELDS: &[&str] = &[
    "access_token",
    "refresh_token",
    "id_token",
    "client_secret",
    "assertion",
    "password",
];

/// Patterns for credentials embedded in free text (remote error bodies, command stderr).
static TEXT_RULES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"\b(Bearer)\s+[A-Za-z0-9._~+/=-]{8,}", "$1 [REDACTED]"),
        (r"\beyJ[A-Za-z0-9_-]{8,}\.[A-Za-z0-9_-]{8,}\.[A-Za-z0-9_-]{8,}", MASK),
        (
            r#""(access_token|refresh_token|id_token|client_secret)"\s*:\s*"[^"]*""#,
            r#""$1":"[REDACTED]""#,
        ),
        (
            r"\b(client_secret|refresh_token|access_token|assertion)=[^\s&]+",
            "$1=[REDACTED]",
        ),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
    .collect()
});

fn lower(key: &str) -> String {
    key.trim().to_ascii_lowercase()
}

/// Field names treated as secrets in structured data.
pub fn is_secret_field(key: &str) -> bool {
    let key = lower(key);
    TOKEN_FIELDS.contains(&key.as_str()) || key.ends_with("token") || key.contains("secret")
}

/// Masks embedded credentials, then caps the result at `max_bytes`.
pub fn redact_text(value: &str, max_bytes: usize) -> String {
    let mut out = value.to_string();
    for (re, replacement) in TEXT_RULES.iter() {
        out = re.replace_all(&out, *replacement).into_owned();
    }
    if out.len() > max_bytes {
        out = format!("{}...", truncate_utf8_prefix(&out, max_bytes));
    }
    out
}

/// Masks signed-link query parameters so URLs can be logged.
pub fn redact_url(raw: &str) -> String {
    let Ok(mut url) = url::Url::parse(raw) else {
        return redact_text(raw, usize::MAX);
    };
    let signed = url
        .query_pairs()
        .any(|(k, _)| SIGNED_LINK_PARAMS.contains(&lower(&k).as_str()));
    if !signed {
        return url.to_string();
    }
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if SIGNED_LINK_PARAMS.contains(&lower(&k).as_str()) {
                MASK.to_string()
            } else {
                v.into_owned()
            };
            (k.into_owned(), v)
        })
        .collect();
    url.query_pairs_mut().clear().extend_pairs(pairs);
    url.to_string()
}

/// Log metadata with credentials masked and strings capped at `max_bytes`.
pub fn redact_meta(value: &Value, max_bytes: usize) -> Value {
    match value {
        Value::String(text) => Value::String(redact_text(text, max_bytes)),
        Value::Array(items) => Value::Array(items.iter().map(|v| redact_meta(v, max_bytes)).collect()),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, entry) in map {
                let masked = match entry {
                    Value::String(text) if key == "url" => Value::String(redact_url(text)),
                    Value::Object(headers) if key == "headers" => Value::Object(
                        headers
                            .iter()
                            .map(|(name, v)| {
                                let v = if CREDENTIAL_HEADERS.contains(&lower(name).as_str()) {
                                    Value::String(MASK.to_string())
                                } else {
                                    redact_meta(v, max_bytes)
                                };
                                (name.clone(), v)
                            })
                            .collect(),
                    ),
                    _ if is_secret_field(key) => Value::String(MASK.to_string()),
                    other => redact_meta(other, max_bytes),
                };
                out.insert(key.clone(), masked);
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn meta_masks_credential_headers_and_token_fields() {
        let out = redact_meta(
            &json!({
                "headers": {"Authorization": "Bearer abcdefghijklmnop", "Accept": "application/json"},
                "refresh_token": "r-123",
                "tool": "list-mail-messages",
            }),
            usize::MAX,
        );
        assert_eq!(out["headers"]["Authorization"], MASK);
        assert_eq!(out["headers"]["Accept"], "application/json");
        assert_eq!(out["refresh_token"], MASK);
        assert_eq!(out["tool"], "list-mail-messages");
    }

    #[test]
    fn text_masks_bearer_and_token_json() {
        let out = redact_text(
            r#"sent Bearer eyJhbGciOiJIUzI1NiJ9xx and {"access_token":"secretvalue"}"#,
            usize::MAX,
        );
        assert!(!out.contains("secretvalue"));
        assert!(out.contains("Bearer [REDACTED]"));
    }

    #[test]
    fn text_is_capped() {
        assert_eq!(redact_text("abcdef", 3), "abc...");
    }

    #[test]
    fn url_masks_signed_link_params_only() {
        let out = redact_url("https://files.example.com/download.aspx?UniqueId=42&tempauth=abc123");
        assert!(out.contains("UniqueId=42"));
        assert!(!out.contains("abc123"));
        let plain = "https://graph.example.com/v1.0/me/messages?$top=5";
        assert_eq!(redact_url(plain), plain);
    }
}
