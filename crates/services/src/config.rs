use std::env;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

pub const ENV_BASE_URL: &str = "STUDY_API_BASE_URL";
pub const ENV_API_TOKEN: &str = "STUDY_API_TOKEN";
pub const ENV_TIMEOUT_SECS: &str = "STUDY_API_TIMEOUT_SECS";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Connection settings for the study server.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub base_url: Url,
    pub api_token: Option<String>,
    pub timeout: Duration,
}

impl GatewayConfig {
    /// Builds a config for `base_url` with the default timeout and no token.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidBaseUrl` if the URL does not parse or is not http(s).
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            api_token: None,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.api_token = Some(token).filter(|t| !t.trim().is_empty());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reads `STUDY_API_*` variables. Returns `Ok(None)` when no base URL is set.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but invalid.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`GatewayConfig::from_env`] with an injectable variable source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>, ConfigError> {
        let Some(base_url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) else {
            return Ok(None);
        };
        let mut config = Self::new(&base_url)?;
        if let Some(token) = lookup(ENV_API_TOKEN) {
            config = config.with_token(token);
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            let secs: u64 = raw
                .trim()
                .parse()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ConfigError::InvalidTimeout { raw })?;
            config = config.with_timeout(Duration::from_secs(secs));
        }
        Ok(Some(config))
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let trimmed = raw.trim();
    // `Url::join` drops the last path segment unless the base ends with '/'.
    let normalized = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    let url = Url::parse(&normalized).map_err(|err| ConfigError::InvalidBaseUrl {
        raw: raw.to_string(),
        reason: err.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidBaseUrl {
            raw: raw.to_string(),
            reason: format!("unsupported scheme {}", url.scheme()),
        });
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_base_url_means_unconfigured() {
        let config = GatewayConfig::from_lookup(lookup(&[])).unwrap();
        assert!(config.is_none());
    }

    #[test]
    fn base_url_gets_trailing_slash() {
        let config = GatewayConfig::from_lookup(lookup(&[
            (ENV_BASE_URL, "https://study.example.com/api"),
            (ENV_API_TOKEN, "secret"),
            (ENV_TIMEOUT_SECS, "5"),
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(config.base_url.as_str(), "https://study.example.com/api/");
        assert_eq!(config.api_token.as_deref(), Some("secret"));
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            GatewayConfig::new("ftp://files.example.com"),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));
        assert!(matches!(
            GatewayConfig::from_lookup(lookup(&[
                (ENV_BASE_URL, "http://localhost:8080"),
                (ENV_TIMEOUT_SECS, "0"),
            ])),
            Err(ConfigError::InvalidTimeout { .. })
        ));
    }

    #[test]
    fn blank_token_is_ignored() {
        let config = GatewayConfig::new("http://localhost").unwrap().with_token("  ");
        assert!(config.api_token.is_none());
    }
}
