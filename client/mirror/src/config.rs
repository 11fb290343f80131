use std::{env, fmt::Display, fs::read_to_string, str::FromStr, time::Duration};

use tracing::{info, warn};

use crate::error::SyncError;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
const TOKEN_SECRET: &str = "QUEUE_API_TOKEN";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub api_token: Option<String>,
    pub poll_interval: Duration,
    pub appointment_poll_interval: Duration,
    pub reconnect_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_token: None,
            poll_interval: Duration::from_millis(10_000),
            appointment_poll_interval: Duration::from_millis(15_000),
            reconnect_delay: Duration::from_millis(5_000),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, SyncError> {
        let api_url: String = try_load("QUEUE_API_URL", DEFAULT_API_URL)?;

        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            api_token: read_secret(TOKEN_SECRET),
            poll_interval: Duration::from_millis(try_load("QUEUE_POLL_MS", "10000")?),
            appointment_poll_interval: Duration::from_millis(try_load(
                "QUEUE_APPOINTMENT_POLL_MS",
                "15000",
            )?),
            reconnect_delay: Duration::from_millis(try_load("QUEUE_RECONNECT_MS", "5000")?),
        })
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Socket root for the configured API host, `http` becomes `ws` and
    /// `https` becomes `wss`. Anything else is passed through and fails at
    /// connect time.
    pub fn ws_url(&self) -> String {
        let (scheme, rest) = match self.api_url.split_once("://") {
            Some(("https", rest)) => ("wss", rest),
            Some(("http", rest)) => ("ws", rest),
            Some((scheme, rest)) => (scheme, rest),
            None => return self.api_url.clone(),
        };

        let host = rest.split('/').next().unwrap_or(rest);
        format!("{scheme}://{host}")
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        info!("{key} not set");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T, SyncError>
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
            SyncError::Config(format!("invalid {key}: {e}"))
        })
}

fn read_secret(secret_name: &str) -> Option<String> {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            info!("No {secret_name} secret file ({e}), falling back to environment");
        })
        .or_else(|_| var(secret_name))
        .map_err(|_| {
            warn!("{secret_name} not provided, requests will be unauthenticated");
        })
        .ok()
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_url_from_http() {
        let config = Config::default().with_api_url("http://localhost:8000/api/");
        assert_eq!(config.ws_url(), "ws://localhost:8000");
    }

    #[test]
    fn test_ws_url_from_https() {
        let config = Config::default().with_api_url("https://queue.example.com");
        assert_eq!(config.ws_url(), "wss://queue.example.com");
    }

    #[test]
    fn test_ws_url_passes_through_garbage() {
        let config = Config::default().with_api_url("not a url");
        assert_eq!(config.ws_url(), "not a url");
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.appointment_poll_interval, Duration::from_secs(15));
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
    }
}
