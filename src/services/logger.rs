use crate::constants::limits::LOG_STRING_MAX_BYTES;
use crate::utils::redact::redact_meta;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

impl LogLevel {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "error" => LogLevel::Error,
            "warn" | "warning" => LogLevel::Warn,
            "debug" | "trace" => LogLevel::Debug,
            _ => LogLevel::Info,
        }
    }

    fn label(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

/// Lines emitted per level, shared by a logger and its children.
#[derive(Debug, Default)]
struct Emitted([AtomicU64; 4]);

/// Stderr logger; stdout carries the protocol.
///
/// `APIBRIDGE_LOG_LEVEL` (or `LOG_LEVEL`) picks the threshold. `APIBRIDGE_LOG_FORMAT=json` switches
/// to one JSON object per line. Metadata passes through [`redact_meta`] before it is written.
#[derive(Debug, Clone)]
pub struct Logger {
    context: String,
    level: LogLevel,
    json: bool,
    emitted: Arc<Emitted>,
}

impl Logger {
    pub fn new(context: &str) -> Self {
        let level = std::env::var("APIBRIDGE_LOG_LEVEL")
            .or_else(|_| std::env::var("LOG_LEVEL"))
            .map(|raw| LogLevel::parse(&raw))
            .unwrap_or(LogLevel::Info);
        let json = std::env::var("APIBRIDGE_LOG_FORMAT")
            .map(|raw| raw.trim().eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        Self {
            context: context.to_string(),
            level,
            json,
            emitted: Arc::new(Emitted::default()),
        }
    }

    pub fn child(&self, name: &str) -> Self {
        Self {
            context: format!("{}:{}", self.context, name),
            ..self.clone()
        }
    }

    pub fn set_level(&mut self, level: LogLevel) {
        self.level = level;
    }

    fn write(&self, level: LogLevel, message: &str, meta: Option<&Value>) {
        if level > self.level {
            return;
        }
        self.emitted.0[level as usize].fetch_add(1, Ordering::Relaxed);
        let ts = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let meta = meta
            .filter(|m| !m.is_null())
            .map(|m| redact_meta(m, LOG_STRING_MAX_BYTES));
        if self.json {
            let mut record = serde_json::json!({
                "ts": ts,
                "level": level.label(),
                "ctx": self.context,
                "msg": message,
            });
            if let Some(meta) = meta {
                record["meta"] = meta;
            }
            eprintln!("{}", record);
        } else {
            match meta {
                Some(meta) => eprintln!("{} {:>5} {} {} {}", ts, level.label(), self.context, message, meta),
                None => eprintln!("{} {:>5} {} {}", ts, level.label(), self.context, message),
            }
        }
    }

    pub fn error(&self, message: &str, meta: Option<&Value>) {
        self.write(LogLevel::Error, message, meta);
    }

    pub fn warn(&self, message: &str, meta: Option<&Value>) {
        self.write(LogLevel::Warn, message, meta);
    }

    pub fn info(&self, message: &str, meta: Option<&Value>) {
        self.write(LogLevel::Info, message, meta);
    }

    pub fn debug(&self, message: &str, meta: Option<&Value>) {
        self.write(LogLevel::Debug, message, meta);
    }

    /// Per-level line counts across this logger's family.
    pub fn stats(&self) -> Value {
        let count = |level: LogLevel| self.emitted.0[level as usize].load(Ordering::Relaxed);
        serde_json::json!({
            "error": count(LogLevel::Error),
            "warn": count(LogLevel::Warn),
            "info": count(LogLevel::Info),
            "debug": count(LogLevel::Debug),
        })
    }
}
