use std::{env, path::PathBuf, time::Duration};

use anyhow::Result;

pub const DEFAULT_API_URL: &str = "http://localhost:5000";
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Clone, Debug)]
pub struct Config {
    pub api_url: String,
    pub timeout: Duration,
    pub log_path: PathBuf,
    pub log_filter: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_env_reader(|key| env::var(key).ok())
    }

    pub fn from_env_reader<F>(reader: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = read_env_optional(&reader, "GITLAB_TREE_API_URL")
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
            .trim()
            .trim_end_matches('/')
            .to_string();
        if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
            anyhow::bail!("GITLAB_TREE_API_URL must start with http:// or https://: {api_url}");
        }

        let timeout_seconds = read_env_u64_optional(&reader, "GITLAB_TREE_TIMEOUT_SECONDS")?
            .unwrap_or(DEFAULT_TIMEOUT_SECONDS);
        if timeout_seconds == 0 {
            anyhow::bail!("GITLAB_TREE_TIMEOUT_SECONDS must be greater than zero");
        }

        let log_path = read_env_optional(&reader, "GITLAB_TREE_LOG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(default_log_path);
        let log_filter = read_env_optional(&reader, "GITLAB_TREE_LOG")
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Ok(Self {
            api_url,
            timeout: Duration::from_secs(timeout_seconds),
            log_path,
            log_filter,
        })
    }
}

fn read_env_optional<F>(reader: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    reader(key).filter(|value| !value.trim().is_empty())
}

fn read_env_u64_optional<F>(reader: &F, key: &str) -> Result<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = read_env_optional(reader, key) else {
        return Ok(None);
    };
    let parsed = value
        .trim()
        .parse::<u64>()
        .map_err(|_| anyhow::anyhow!("invalid integer for {key}: {value}"))?;
    Ok(Some(parsed))
}

pub fn default_log_path() -> PathBuf {
    let base = dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("gitlab-tree").join("gitlab-tree.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_env_reader_uses_defaults() {
        let reader = |_key: &str| None;

        let config = Config::from_env_reader(reader).expect("config should load");
        assert_eq!(config.api_url, "http://localhost:5000");
        assert_eq!(config.timeout.as_secs(), 30);
        assert_eq!(config.log_filter, "warn");
        assert!(config
            .log_path
            .ends_with(PathBuf::from("gitlab-tree").join("gitlab-tree.log")));
    }

    #[test]
    fn from_env_reader_reads_overrides() {
        let reader = |key: &str| match key {
            "GITLAB_TREE_API_URL" => Some("https://dash.example.com/".to_string()),
            "GITLAB_TREE_TIMEOUT_SECONDS" => Some("5".to_string()),
            "GITLAB_TREE_LOG_PATH" => Some("/tmp/gitlab-tree.log".to_string()),
            "GITLAB_TREE_LOG" => Some("gitlab_tree=debug".to_string()),
            _ => None,
        };

        let config = Config::from_env_reader(reader).expect("config should load");
        assert_eq!(config.api_url, "https://dash.example.com");
        assert_eq!(config.timeout.as_secs(), 5);
        assert_eq!(config.log_path, PathBuf::from("/tmp/gitlab-tree.log"));
        assert_eq!(config.log_filter, "gitlab_tree=debug");
    }

    #[test]
    fn from_env_reader_treats_blank_as_unset() {
        let reader = |key: &str| match key {
            "GITLAB_TREE_API_URL" => Some("   ".to_string()),
            _ => None,
        };

        let config = Config::from_env_reader(reader).expect("config should load");
        assert_eq!(config.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn from_env_reader_rejects_invalid_timeout() {
        let reader = |key: &str| match key {
            "GITLAB_TREE_TIMEOUT_SECONDS" => Some("soon".to_string()),
            _ => None,
        };
        assert!(Config::from_env_reader(reader).is_err());

        let reader = |key: &str| match key {
            "GITLAB_TREE_TIMEOUT_SECONDS" => Some("0".to_string()),
            _ => None,
        };
        assert!(Config::from_env_reader(reader).is_err());
    }

    #[test]
    fn from_env_reader_rejects_url_without_scheme() {
        let reader = |key: &str| match key {
            "GITLAB_TREE_API_URL" => Some("localhost:5000".to_string()),
            _ => None,
        };
        assert!(Config::from_env_reader(reader).is_err());
    }
}
