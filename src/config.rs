use crate::services::remote_store::RetryPolicy;
use anyhow::{Context, Result};
use clap::Parser;
use std::{env, fmt::Display, str::FromStr, time::Duration};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub staging_dir: String,
    pub remote_base_url: String,
    pub remote_api_key: String,
    pub max_chunk_bytes: u64,
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub compress: bool,
    pub cache_ttl_secs: u64,
    pub chunk_timeout_secs: u64,
    pub complete_timeout_secs: u64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Chunked DICOM upload backend")]
pub struct Args {
    /// Host to bind to (overrides DICOM_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides DICOM_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where chunks are staged (overrides DICOM_STORE_STAGING_DIR)
    #[arg(long)]
    pub staging_dir: Option<String>,

    /// Database URL (overrides DICOM_STORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Remote object store base URL (overrides DICOM_STORE_REMOTE_URL)
    #[arg(long)]
    pub remote_base_url: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("DICOM_STORE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = parsed_env("DICOM_STORE_PORT", 3000u16)?;
        let env_staging =
            env::var("DICOM_STORE_STAGING_DIR").unwrap_or_else(|_| "./data/staging".into());
        let env_db = env::var("DICOM_STORE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/dicom_store.db".into());
        let env_remote = env::var("DICOM_STORE_REMOTE_URL")
            .unwrap_or_else(|_| "https://objects.example.com".into());
        let remote_api_key = env::var("DICOM_STORE_REMOTE_API_KEY").unwrap_or_default();

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            staging_dir: args.staging_dir.unwrap_or(env_staging),
            database_url: args.database_url.unwrap_or(env_db),
            remote_base_url: args.remote_base_url.unwrap_or(env_remote),
            remote_api_key,
            max_chunk_bytes: parsed_env("DICOM_STORE_MAX_CHUNK_BYTES", 16 * 1024 * 1024u64)?,
            retry_max_attempts: parsed_env("DICOM_STORE_RETRY_ATTEMPTS", 3u32)?,
            retry_base_delay_ms: parsed_env("DICOM_STORE_RETRY_BASE_DELAY_MS", 1000u64)?,
            compress: parsed_env("DICOM_STORE_COMPRESS", true)?,
            cache_ttl_secs: parsed_env("DICOM_STORE_CACHE_TTL_SECS", 600u64)?,
            chunk_timeout_secs: parsed_env("DICOM_STORE_CHUNK_TIMEOUT_SECS", 300u64)?,
            complete_timeout_secs: parsed_env("DICOM_STORE_COMPLETE_TIMEOUT_SECS", 900u64)?,
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_secs(self.chunk_timeout_secs)
    }

    pub fn complete_timeout(&self) -> Duration {
        Duration::from_secs(self.complete_timeout_secs)
    }
}

/// Read an env var and parse it, falling back to `default` when unset.
fn parsed_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .map_err(|err| anyhow::anyhow!("parsing {} value `{}`: {}", key, value, err)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).context(format!("reading {key}")),
    }
}
