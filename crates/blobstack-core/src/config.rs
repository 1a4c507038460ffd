//! Configuration for the Blobstack service.
//!
//! All configuration is driven by environment variables, with sensible
//! defaults for local development. The signing secret is resolved by the
//! binary (inline value, file, or generated) and is fatal when absent.

use std::path::PathBuf;

/// Global configuration for Blobstack.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobConfig {
    /// Bind address for the HTTP server.
    pub listen: String,
    /// Root directory for blob files.
    pub data_dir: String,
    /// Append-only metadata log path. Defaults to `<data_dir>/metadata.log`.
    pub log_file: Option<String>,
    /// Path to a file holding the token-signing secret.
    pub secret_file: Option<String>,
    /// Inline token-signing secret; takes precedence over `secret_file`.
    pub secret: Option<String>,
    /// Generate a random 32-byte secret instead of reading one. Tokens stop
    /// verifying across restarts; development only.
    pub generate_secret: bool,
    /// Log level filter.
    pub log_level: String,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8088".to_owned(),
            data_dir: "./data".to_owned(),
            log_file: None,
            secret_file: None,
            secret: None,
            generate_secret: false,
            log_level: "info".to_owned(),
        }
    }
}

impl BlobConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("BLOBSTACK_LISTEN") {
            config.listen = v;
        }
        if let Ok(v) = std::env::var("BLOBSTACK_DATA_DIR") {
            config.data_dir = v;
        }
        if let Ok(v) = std::env::var("BLOBSTACK_LOG_FILE") {
            config.log_file = Some(v);
        }
        if let Ok(v) = std::env::var("BLOBSTACK_SECRET_FILE") {
            config.secret_file = Some(v);
        }
        if let Ok(v) = std::env::var("BLOBSTACK_SECRET") {
            config.secret = Some(v);
        }
        if let Ok(v) = std::env::var("BLOBSTACK_GENERATE_SECRET") {
            config.generate_secret = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            config.log_level = v;
        }

        config
    }

    /// The effective metadata log path: the configured override, or
    /// `metadata.log` beneath the data directory.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.log_file.as_ref().map_or_else(
            || PathBuf::from(&self.data_dir).join("metadata.log"),
            PathBuf::from,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_create_default_config() {
        let config = BlobConfig::default();
        assert_eq!(config.listen, "0.0.0.0:8088");
        assert_eq!(config.data_dir, "./data");
        assert!(!config.generate_secret);
        assert_eq!(config.log_path(), PathBuf::from("./data/metadata.log"));
    }

    #[test]
    fn test_should_honor_log_file_override() {
        let config = BlobConfig {
            log_file: Some("/var/lib/blobstack/db.log".to_owned()),
            ..BlobConfig::default()
        };
        assert_eq!(
            config.log_path(),
            PathBuf::from("/var/lib/blobstack/db.log")
        );
    }
}
