use anyhow::{Result, bail};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024; // 20MB

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub host: String,
    pub port: u16,
    /// Fixed model name. When unset the model is discovered at startup.
    pub model: Option<String>,
    pub api_base: String,
    pub request_timeout: Duration,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup, so tests don't touch the process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let Some(api_key) = non_empty("GOOGLE_API_KEY").or_else(|| non_empty("GEMINI_API_KEY")) else {
            bail!("GOOGLE_API_KEY not set");
        };

        let api_base = non_empty("GEMINI_API_BASE")
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            api_key,
            host: non_empty("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_or(&lookup, "PORT", DEFAULT_PORT),
            model: non_empty("GEMINI_MODEL").map(|m| m.trim().to_string()),
            api_base,
            request_timeout: Duration::from_secs(parse_or(
                &lookup,
                "GEMINI_TIMEOUT_SECS",
                DEFAULT_TIMEOUT_SECS,
            )),
            max_upload_bytes: parse_or(&lookup, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
        })
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse()
            .map_err(|e| anyhow::anyhow!("Invalid listen address {}: {}", addr, e))
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}={:?}, using default {}", key, raw, default);
            default
        }),
        None => default,
    }
}

#[cfg(test)]
pub(crate) const TEST_API_KEY: &str = "test-key";

#[cfg(test)]
pub(crate) fn test_config(api_base: &str) -> Config {
    Config {
        api_key: TEST_API_KEY.to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        model: None,
        api_base: api_base.trim_end_matches('/').to_string(),
        request_timeout: Duration::from_secs(5),
        max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
    }
}
