//! Worker process configuration.
//!
//! A single `Config` struct loads every recognized key from the process
//! environment with typed defaults, using a plain `std::env`-based
//! settings struct rather than a config-file DSL.

use std::env;
use std::time::Duration;

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    Local,
    S3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub queue_url: Option<String>,

    pub max_cost_limit_default: f64,
    pub temp_file_ttl_hours: i64,
    pub max_file_size_mb: u64,
    pub max_archive_size_mb: u64,
    pub max_extraction_files: u32,
    pub per_stage_timeout_seconds: u64,
    pub cleanup_stage_timeout_seconds: u64,
    pub worker_concurrency: u32,
    pub max_retries: u32,
    pub llm_timeout_seconds: u64,

    pub storage_type: StorageType,
    pub storage_root: String,

    pub openai_api_key: Option<String>,
    pub openrouter_api_key: Option<String>,
    pub litellm_base_url: Option<String>,
    pub litellm_api_key: Option<String>,

    pub log_format: LogFormat,
    pub log_filter: String,
}

impl Config {
    pub fn from_env() -> Self {
        let storage_type = match env_string("STORAGE_TYPE", "local").to_lowercase().as_str() {
            "s3" => StorageType::S3,
            _ => StorageType::Local,
        };
        let log_format = match env_string("DIPC_LOG_FORMAT", "pretty").to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Self {
            database_url: env_string("DATABASE_URL", "postgres://localhost:5432/dipc"),
            queue_url: env_opt_string("QUEUE_URL"),

            max_cost_limit_default: env_f64("MAX_COST_LIMIT_DEFAULT", 50.0),
            temp_file_ttl_hours: env_u64("TEMP_FILE_TTL_HOURS", 24) as i64,
            max_file_size_mb: env_u64("MAX_FILE_SIZE_MB", 100),
            max_archive_size_mb: env_u64("MAX_ARCHIVE_SIZE_MB", 500),
            max_extraction_files: env_u32("MAX_EXTRACTION_FILES", 1000),
            per_stage_timeout_seconds: env_u64("PER_STAGE_TIMEOUT_SECONDS", 300),
            cleanup_stage_timeout_seconds: env_u64("CLEANUP_STAGE_TIMEOUT_SECONDS", 60),
            worker_concurrency: env_u32("WORKER_CONCURRENCY", 4),
            max_retries: env_u32("MAX_RETRIES", 3),
            llm_timeout_seconds: env_u64("LLM_TIMEOUT_SECONDS", 120),

            storage_type,
            storage_root: env_string("STORAGE_ROOT", "/tmp/dipc-storage"),

            openai_api_key: env_opt_string("OPENAI_API_KEY"),
            openrouter_api_key: env_opt_string("OPENROUTER_API_KEY"),
            litellm_base_url: env_opt_string("LITELM_BASE_URL"),
            litellm_api_key: env_opt_string("LITELM_API_KEY"),

            log_format,
            log_filter: env_string("RUST_LOG", "info,dipc=debug"),
        }
    }

    pub fn per_stage_timeout(&self) -> Duration {
        Duration::from_secs(self.per_stage_timeout_seconds)
    }

    pub fn cleanup_stage_timeout(&self) -> Duration {
        Duration::from_secs(self.cleanup_stage_timeout_seconds)
    }

    pub fn max_archive_bytes(&self) -> u64 {
        self.max_archive_size_mb * 1024 * 1024
    }

    pub fn has_llm_provider(&self) -> bool {
        self.openai_api_key.is_some() || self.openrouter_api_key.is_some() || self.litellm_api_key.is_some()
    }

    /// Collects every configuration error instead of failing on the first
    /// one, so an operator sees the whole list in one run.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.max_file_size_mb == 0 {
            errors.push("MAX_FILE_SIZE_MB must be positive".to_string());
        }
        if self.per_stage_timeout_seconds == 0 {
            errors.push("PER_STAGE_TIMEOUT_SECONDS must be positive".to_string());
        }
        if self.worker_concurrency == 0 {
            errors.push("WORKER_CONCURRENCY must be positive".to_string());
        }
        if self.storage_type == StorageType::S3 {
            errors.push("STORAGE_TYPE=s3 is not wired by this binary; use STORAGE_TYPE=local".to_string());
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        // SAFETY (test-only): env var manipulation is safe here because
        // these tests don't run concurrently with other env-var readers
        // in this process (no #[tokio::test] shares this env).
        let config = Config::from_env();
        assert_eq!(config.max_cost_limit_default, 50.0);
        assert_eq!(config.temp_file_ttl_hours, 24);
        assert_eq!(config.max_file_size_mb, 100);
        assert_eq!(config.max_archive_size_mb, 500);
        assert_eq!(config.max_extraction_files, 1000);
        assert_eq!(config.per_stage_timeout_seconds, 300);
        assert!(config.validate().is_ok());
    }
}
