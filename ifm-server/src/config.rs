//! Server configuration, loaded from environment variables at startup.

use std::path::PathBuf;
use std::time::Duration;

use ifm_core::{ActivityOptions, RetryPolicy};

/// Runtime configuration for ifm-server.
///
/// Every field has a sensible default so the server works out-of-the-box
/// without any environment variables set.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:3000"`).
    pub bind_address: String,

    /// sqlx SQLite URL of the analysis store
    /// (default: `"sqlite://ifm.db?mode=rwc"`).
    pub database_url: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Orchestrator command-queue capacity.
    pub queue_capacity: usize,

    /// Root directory of the managed uploads.
    pub upload_root: PathBuf,

    /// Staging directory for archive documents.
    pub work_dir: PathBuf,

    /// External defect-recognition program.
    pub recognizer_program: String,

    /// Leading arguments passed to the recognition program.
    pub recognizer_args: Vec<String>,

    /// Start-to-close timeout of the model run, in seconds.
    pub model_timeout_secs: u64,

    /// Start-to-close timeout of the parse and archive steps, in seconds.
    pub step_timeout_secs: u64,

    /// Attempt ceiling shared by every step; `0` retries without limit.
    pub max_attempts: u32,

    /// Seconds a finished run stays queryable; `0` keeps runs until restart.
    pub run_retention_secs: u64,

    /// Serve Swagger UI at `/swagger-ui` (default: `true`).
    pub enable_swagger: bool,

    /// Comma-separated list of allowed CORS origins; `None` allows any.
    pub cors_allowed_origins: Option<String>,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            bind_address: env_or("IFM_BIND", "0.0.0.0:3000"),
            database_url: env_or("IFM_DATABASE_URL", "sqlite://ifm.db?mode=rwc"),
            log_level: env_or("IFM_LOG", "info"),
            log_json: parse_bool("IFM_LOG_JSON", false),
            queue_capacity: parse_env("IFM_QUEUE_CAPACITY", 64),
            upload_root: PathBuf::from(env_or("IFM_UPLOAD_ROOT", "./uploads")),
            work_dir: std::env::var("IFM_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| std::env::temp_dir().join("ifm-workflows")),
            recognizer_program: env_or("IFM_RECOGNIZER", "ifm-defect-recognition"),
            recognizer_args: std::env::var("IFM_RECOGNIZER_ARGS")
                .map(|v| v.split_whitespace().map(str::to_owned).collect())
                .unwrap_or_default(),
            model_timeout_secs: parse_env("IFM_MODEL_TIMEOUT_SECS", 600),
            step_timeout_secs: parse_env("IFM_STEP_TIMEOUT_SECS", 60),
            max_attempts: parse_env("IFM_MAX_ATTEMPTS", 5),
            run_retention_secs: parse_env("IFM_RUN_RETENTION_SECS", 86_400),
            enable_swagger: parse_bool("IFM_ENABLE_SWAGGER", true),
            cors_allowed_origins: std::env::var("IFM_CORS_ORIGINS").ok(),
        }
    }

    /// Inference runtime configuration derived from this server config.
    pub fn core_config(&self) -> ifm_core::Config {
        let retry = RetryPolicy {
            maximum_attempts: self.max_attempts,
            ..RetryPolicy::default()
        };
        let step = |secs: u64| {
            ActivityOptions::new(Duration::from_secs(secs)).with_retry_policy(retry.clone())
        };
        ifm_core::Config {
            queue_capacity: self.queue_capacity,
            work_dir: self.work_dir.clone(),
            run_model: step(self.model_timeout_secs),
            parse_results: step(self.step_timeout_secs),
            write_archive: step(self.step_timeout_secs),
            run_retention: (self.run_retention_secs > 0)
                .then(|| Duration::from_secs(self.run_retention_secs)),
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}
