use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

pub const DEFAULT_API_URL: &str = "http://localhost:3001";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api_url: String,
    pub timeout: Duration,
    /// JSON log file, rotated daily, when set.
    pub log_file: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = lookup("BOLETIM_API_URL")
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let timeout_secs = match lookup("BOLETIM_HTTP_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .with_context(|| {
                    format!("BOLETIM_HTTP_TIMEOUT_SECS must be a positive integer, got {raw:?}")
                })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let log_file = lookup("BOLETIM_LOG_FILE")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            api_url,
            timeout: Duration::from_secs(timeout_secs),
            log_file,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.log_file, None);
    }

    #[test]
    fn log_file_is_optional() {
        let config = Config::from_lookup(lookup(&[("BOLETIM_LOG_FILE", "logs/boletim.log")])).unwrap();
        assert_eq!(config.log_file, Some(PathBuf::from("logs/boletim.log")));
        let config = Config::from_lookup(lookup(&[("BOLETIM_LOG_FILE", "  ")])).unwrap();
        assert_eq!(config.log_file, None);
    }

    #[test]
    fn trailing_slash_is_removed() {
        let config =
            Config::from_lookup(lookup(&[("BOLETIM_API_URL", "https://escola.example/api/")]))
                .unwrap();
        assert_eq!(config.api_url, "https://escola.example/api");
    }

    #[test]
    fn timeout_must_be_positive() {
        assert!(Config::from_lookup(lookup(&[("BOLETIM_HTTP_TIMEOUT_SECS", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("BOLETIM_HTTP_TIMEOUT_SECS", "soon")])).is_err());
        let config = Config::from_lookup(lookup(&[("BOLETIM_HTTP_TIMEOUT_SECS", " 5 ")])).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(5));
    }
}
