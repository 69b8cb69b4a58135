//! Settings (ambient stack): a layered configuration surface — an optional
//! TOML file under built-in defaults, with environment variables and CLI
//! flags merged on top — grounded on the teacher's `config/s3.rs`
//! `merge_cli` pattern and `config::Config::builder()` layering idiom.

use crate::cli::Cli;
use crate::storage::S3Config;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration file: {0}")]
    File(#[from] config::ConfigError),
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub local_root: PathBuf,
    pub s3: S3Config,
    pub ttl_seconds: i64,
    pub bearer_token: Option<String>,
    pub query_splitting: bool,
    pub log_level: String,
}

/// Shape of the optional TOML file. Every field is optional; only present
/// ones override the built-in defaults, same as the teacher's layered
/// `Settings::new_with_cli`.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct FileSettings {
    server: ServerSettings,
    storage_root: Option<PathBuf>,
    ttl_seconds: Option<i64>,
    query_splitting: Option<bool>,
    log_level: Option<String>,
    s3_bucket: Option<String>,
    s3_region: Option<String>,
    s3_endpoint: Option<String>,
    s3_path_style: Option<bool>,
}

impl Settings {
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let file: FileSettings = config::Config::builder()
            .add_source(config::File::from(cli.config.clone()).required(false))
            .build()?
            .try_deserialize()
            .unwrap_or_default();

        let mut settings = Settings {
            host: "0.0.0.0".to_string(),
            port: 8080,
            local_root: PathBuf::from("./data"),
            s3: S3Config::default(),
            ttl_seconds: 0,
            bearer_token: None,
            query_splitting: false,
            log_level: "info".to_string(),
        };

        if let Some(host) = file.server.host {
            settings.host = host;
        }
        if let Some(port) = file.server.port {
            settings.port = port;
        }
        if let Some(root) = file.storage_root {
            settings.local_root = root;
        }
        if let Some(ttl) = file.ttl_seconds {
            settings.ttl_seconds = ttl;
        }
        if let Some(qs) = file.query_splitting {
            settings.query_splitting = qs;
        }
        if let Some(level) = file.log_level {
            settings.log_level = level;
        }
        settings.s3.bucket = file.s3_bucket;
        settings.s3.region = file.s3_region;
        settings.s3.endpoint = file.s3_endpoint;
        settings.s3.path_style = file.s3_path_style.unwrap_or(false);

        settings.merge_env();
        settings.merge_cli(cli);

        Ok(settings)
    }

    /// Environment variables named exactly per spec.md §6 — these are the
    /// system's external contract and don't carry a `DUCKPOND_` prefix.
    fn merge_env(&mut self) {
        if let Ok(v) = std::env::var("BEARER_TOKEN") {
            if !v.is_empty() {
                self.bearer_token = Some(v);
            }
        }
        if let Ok(v) = std::env::var("AWS_ACCESS_KEY_ID") {
            self.s3.access_key = Some(v);
        }
        if let Ok(v) = std::env::var("AWS_SECRET_ACCESS_KEY") {
            self.s3.secret_key = Some(v);
        }
        if let Ok(v) = std::env::var("AWS_REGION") {
            self.s3.region = Some(v);
        }
        if let Ok(v) = std::env::var("S3_ENDPOINT") {
            self.s3.endpoint = Some(v);
        }
        if let Ok(v) = std::env::var("S3_BUCKET") {
            self.s3.bucket = Some(v);
        }
        if let Ok(v) = std::env::var("S3_USE_PATH_STYLE") {
            self.s3.path_style = v.eq_ignore_ascii_case("true") || v == "1";
        }
        if let Ok(v) = std::env::var("TTL_SECONDS") {
            if let Ok(ttl) = v.parse() {
                self.ttl_seconds = ttl;
            }
        }
    }

    /// CLI flags take precedence over everything else.
    fn merge_cli(&mut self, cli: &Cli) {
        if let Some(host) = &cli.host {
            self.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(root) = &cli.storage_root {
            self.local_root = root.clone();
        }
        if let Some(qs) = cli.query_splitting {
            self.query_splitting = qs;
        }
        if let Some(level) = &cli.log_level {
            self.log_level = level.clone();
        }
    }

    pub fn stale_cache_quirk(&self) -> bool {
        crate::log::detect_stale_cache_quirk(self.s3.endpoint.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn defaults_with_no_file_and_no_overrides() {
        let cli = Cli::parse_from(["duckpond", "--config", "/nonexistent/duckpond.toml"]);
        let settings = Settings::load(&cli).unwrap();
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.ttl_seconds, 0);
        assert!(!settings.query_splitting);
    }

    #[test]
    fn cli_flags_override_defaults() {
        let cli = Cli::parse_from([
            "duckpond",
            "--config",
            "/nonexistent/duckpond.toml",
            "--port",
            "9090",
            "--query-splitting",
        ]);
        let settings = Settings::load(&cli).unwrap();
        assert_eq!(settings.port, 9090);
        assert!(settings.query_splitting);
    }
}
