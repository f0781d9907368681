use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::intercom::{RetryPolicy, DEFAULT_BASE_URL};
use crate::{Error, Result};

/// Environment variable holding the Intercom access token
pub const TOKEN_ENV: &str = "INTERCOM_API_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct EtlConfig {
    pub database: Option<String>,
    pub api_base_url: Option<String>,
    pub retries: Option<usize>,
    pub backoff_secs: Option<u64>,
    /// JSON file of `{"VARIABLE": "value"}` pairs, consulted when a
    /// variable is missing from the environment
    pub credentials: Option<String>,
}

impl EtlConfig {
    /// Config written by `init`, with every default spelled out
    pub fn starter() -> Self {
        let retry = RetryPolicy::default();
        Self {
            database: Some(default_database_path().display().to_string()),
            api_base_url: Some(DEFAULT_BASE_URL.to_string()),
            retries: Some(retry.retries),
            backoff_secs: Some(retry.backoff.as_secs()),
            credentials: Some(default_credentials_path().display().to_string()),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let default = RetryPolicy::default();
        RetryPolicy {
            retries: self.retries.unwrap_or(default.retries),
            backoff: self.backoff_secs.map(Duration::from_secs).unwrap_or(default.backoff),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.database.as_deref().map(PathBuf::from).unwrap_or_else(default_database_path)
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.credentials.as_deref().map(PathBuf::from).unwrap_or_else(default_credentials_path)
    }

    pub fn base_url(&self) -> &str {
        self.api_base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("intercom-etl.toml")
}

pub fn default_database_path() -> PathBuf {
    PathBuf::from("intercom.db")
}

pub fn default_credentials_path() -> PathBuf {
    PathBuf::from("credentials.json")
}

pub fn load_config(path: Option<&Path>) -> Result<Option<EtlConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: EtlConfig = toml::from_str(&contents)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &EtlConfig, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(Error::Config(format!(
            "config already exists at {} (use --force to overwrite)",
            path.display()
        )));
    }

    let contents = toml::to_string_pretty(config).map_err(|e| Error::Config(e.to_string()))?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Read a credentials file; a missing file holds no credentials
pub fn load_credentials(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let contents = std::fs::read_to_string(path)?;
    let credentials: HashMap<String, String> = serde_json::from_str(&contents)?;
    tracing::debug!("Loaded {} credential(s) from {}", credentials.len(), path.display());
    Ok(credentials)
}

/// The API token: the environment value wins over the credentials file
pub fn resolve_token(from_env: Option<String>, credentials_path: &Path) -> Result<String> {
    if let Some(token) = from_env.filter(|t| !t.is_empty()) {
        return Ok(token);
    }

    match load_credentials(credentials_path)?.remove(TOKEN_ENV) {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(Error::Config(format!(
            "{} is not set and {} does not provide it",
            TOKEN_ENV,
            credentials_path.display()
        ))),
    }
}
