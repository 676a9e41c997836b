use std::path::PathBuf;

/// Trimmed, non-empty value of an environment variable.
pub fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn env_flag(key: &str) -> bool {
    env_value(key).is_some_and(|v| {
        matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
    })
}

fn env_path(key: &str) -> Option<PathBuf> {
    let raw = env_value(key)?;
    match raw.strip_prefix("~/") {
        Some(rest) => Some(home_dir().unwrap_or_default().join(rest)),
        None => Some(PathBuf::from(raw)),
    }
}

fn home_dir() -> Option<PathBuf> {
    env_value("HOME").map(PathBuf::from)
}

/// `APIBRIDGE_CONFIG_DIR`, else `$XDG_CONFIG_HOME/apibridge`, else `~/.config/apibridge`.
pub fn config_dir() -> PathBuf {
    if let Some(dir) = env_path("APIBRIDGE_CONFIG_DIR") {
        return dir;
    }
    env_path("XDG_CONFIG_HOME")
        .or_else(|| home_dir().map(|home| home.join(".config")))
        .map(|base| base.join("apibridge"))
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn endpoints_path() -> PathBuf {
    env_path("APIBRIDGE_ENDPOINTS_PATH").unwrap_or_else(|| config_dir().join("endpoints.json"))
}

pub fn schemas_path() -> PathBuf {
    env_path("APIBRIDGE_SCHEMAS_PATH").unwrap_or_else(|| config_dir().join("schemas.json"))
}
