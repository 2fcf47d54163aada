//! Configuration management

use anyhow::{self, Context, Result};
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to
    pub http_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// NATS server URL (real-time import events; optional at runtime)
    pub nats_url: String,

    /// JWT secret key for token validation
    pub jwt_secret: String,

    /// Directory holding staged import files, one per job
    pub imports_dir: PathBuf,

    /// Maximum accepted size of an uploaded file, in bytes
    pub max_upload_bytes: u64,

    /// Deadline for a single import run, in seconds
    pub import_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let http_addr = std::env::var("HTTP_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let database_url = std::env::var("DATABASE_URL")
            .context("DATABASE_URL must be set")?;

        let nats_url = std::env::var("NATS_URL")
            .unwrap_or_else(|_| "nats://localhost:4222".to_string());

        let jwt_secret = std::env::var("JWT_SECRET")
            .context("JWT_SECRET must be set — generate one with: openssl rand -base64 48")?;

        if jwt_secret.len() < 32 {
            anyhow::bail!(
                "JWT_SECRET must be at least 32 bytes (current: {} bytes). Generate one with: openssl rand -base64 48",
                jwt_secret.len()
            );
        }

        let imports_dir = std::env::var("IMPORTS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("tmp/imports"));

        let max_upload_mb: u64 = std::env::var("MAX_UPLOAD_SIZE_MB")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1024);

        let import_timeout_secs: u64 = std::env::var("IMPORT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(600);

        Ok(Self {
            http_addr,
            database_url,
            nats_url,
            jwt_secret,
            imports_dir,
            max_upload_bytes: max_upload_mb * 1024 * 1024,
            import_timeout_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_required_vars() {
        std::env::set_var("DATABASE_URL", "postgres://test");
        std::env::set_var("JWT_SECRET", "0123456789abcdef0123456789abcdef");
    }

    #[test]
    fn test_config_defaults() {
        set_required_vars();

        let config = Config::from_env().unwrap();
        assert_eq!(config.nats_url, "nats://localhost:4222");
        assert_eq!(config.imports_dir, PathBuf::from("tmp/imports"));
        assert_eq!(config.import_timeout_secs, 600);
    }

    #[test]
    #[ignore] // requires --test-threads=1 due to env var race
    fn test_config_rejects_short_jwt_secret() {
        std::env::set_var("DATABASE_URL", "postgres://test");
        std::env::set_var("JWT_SECRET", "too-short");

        assert!(Config::from_env().is_err());

        // Cleanup
        std::env::remove_var("JWT_SECRET");
    }

    #[test]
    #[ignore] // requires --test-threads=1 due to env var race
    fn test_config_upload_limit_from_env() {
        set_required_vars();
        std::env::set_var("MAX_UPLOAD_SIZE_MB", "2");

        let config = Config::from_env().unwrap();
        assert_eq!(config.max_upload_bytes, 2 * 1024 * 1024);

        // Cleanup
        std::env::remove_var("MAX_UPLOAD_SIZE_MB");
    }
}
