//! Storage configuration from the environment.

use std::path::PathBuf;

use crate::error::{StorageError, StorageResult};

/// Connection settings for an S3-compatible endpoint, or a local root.
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    /// S3 API endpoint; `None` uses the AWS default for the region
    pub endpoint_url: Option<String>,
    /// Static credentials; the default provider chain is used when absent
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Region ("auto" for R2)
    pub region: String,
    /// Bucket used for outputs without an explicit `s3://bucket/`
    pub default_bucket: Option<String>,
    /// Path-style addressing (required by R2 and most S3 clones)
    pub force_path_style: bool,
    /// Store objects under this directory instead of a remote endpoint
    pub local_root: Option<PathBuf>,
}

impl StorageConfig {
    /// Read `STORAGE_*` variables.
    pub fn from_env() -> StorageResult<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        let config = Self {
            endpoint_url: var("STORAGE_ENDPOINT_URL"),
            access_key_id: var("STORAGE_ACCESS_KEY_ID"),
            secret_access_key: var("STORAGE_SECRET_ACCESS_KEY"),
            region: var("STORAGE_REGION").unwrap_or_else(|| "auto".to_string()),
            default_bucket: var("STORAGE_BUCKET"),
            force_path_style: var("STORAGE_FORCE_PATH_STYLE")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            local_root: var("STORAGE_LOCAL_ROOT").map(PathBuf::from),
        };
        config.check()?;
        Ok(config)
    }

    /// Credentials come in pairs.
    pub fn check(&self) -> StorageResult<()> {
        match (&self.access_key_id, &self.secret_access_key) {
            (Some(_), None) => Err(StorageError::config_error(
                "STORAGE_ACCESS_KEY_ID set without STORAGE_SECRET_ACCESS_KEY",
            )),
            (None, Some(_)) => Err(StorageError::config_error(
                "STORAGE_SECRET_ACCESS_KEY set without STORAGE_ACCESS_KEY_ID",
            )),
            _ => Ok(()),
        }
    }

    pub fn is_local(&self) -> bool {
        self.local_root.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_must_pair() {
        let config = StorageConfig {
            access_key_id: Some("key".to_string()),
            ..StorageConfig::default()
        };
        assert!(matches!(config.check(), Err(StorageError::ConfigError(_))));

        let config = StorageConfig {
            access_key_id: Some("key".to_string()),
            secret_access_key: Some("secret".to_string()),
            ..StorageConfig::default()
        };
        assert!(config.check().is_ok());
    }
}
