use std::path::PathBuf;
use std::time::Duration;

use airlock_engine::subprocess::DEFAULT_RESULT_MARKER;
use airlock_engine::SubprocessConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`). Applies to the
    /// control-plane routes only; `/generate` and WebSocket sessions run
    /// as long as the caller keeps them open.
    pub request_timeout_secs: u64,
    /// SQLite connection URL (default: `sqlite://jobs.db`).
    pub database_url: String,
    /// Engine idle period before unload, in seconds (default: `20`).
    pub idle_timeout_secs: u64,
    /// Dispatch loop polling interval in milliseconds (default: `1000`).
    pub poll_interval_ms: u64,
    /// Startup prune: completed jobs older than this many days are
    /// removed (default: `7`).
    pub completed_retention_days: i64,
    /// Startup prune: jobs of any status older than this many days are
    /// removed (default: `30`).
    pub retention_days: i64,
    /// Top-level payload fields every submission must carry, from the
    /// comma-separated `REQUIRED_FIELDS` env var (default: none).
    pub required_fields: Vec<String>,
    /// Backing engine subprocess settings.
    pub engine: EngineConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                 |
    /// |---------------------------|-------------------------|
    /// | `HOST`                    | `0.0.0.0`               |
    /// | `PORT`                    | `3000`                  |
    /// | `CORS_ORIGINS`            | `http://localhost:5678` |
    /// | `REQUEST_TIMEOUT_SECS`    | `30`                    |
    /// | `DATABASE_URL`            | `sqlite://jobs.db`      |
    /// | `IDLE_TIMEOUT_SECS`       | `20`                    |
    /// | `POLL_INTERVAL_MS`        | `1000`                  |
    /// | `COMPLETED_RETENTION_DAYS`| `7`                     |
    /// | `RETENTION_DAYS`          | `30`                    |
    /// | `REQUIRED_FIELDS`         | (empty)                 |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5678".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://jobs.db".into());

        let idle_timeout_secs: u64 = std::env::var("IDLE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "20".into())
            .parse()
            .expect("IDLE_TIMEOUT_SECS must be a valid u64");

        let poll_interval_ms: u64 = std::env::var("POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "1000".into())
            .parse()
            .expect("POLL_INTERVAL_MS must be a valid u64");

        let completed_retention_days: i64 = std::env::var("COMPLETED_RETENTION_DAYS")
            .unwrap_or_else(|_| "7".into())
            .parse()
            .expect("COMPLETED_RETENTION_DAYS must be a valid i64");

        let retention_days: i64 = std::env::var("RETENTION_DAYS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("RETENTION_DAYS must be a valid i64");

        let required_fields: Vec<String> = std::env::var("REQUIRED_FIELDS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let engine = EngineConfig::from_env();

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            database_url,
            idle_timeout_secs,
            poll_interval_ms,
            completed_retention_days,
            retention_days,
            required_fields,
            engine,
        }
    }
}

/// Backing engine subprocess configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Engine name used in logs and `/status` (default: `engine`).
    pub name: String,
    /// Worker command line; the per-job payload file is appended as the
    /// final argument.
    pub command: Vec<String>,
    /// Working directory for the worker process.
    pub workdir: Option<PathBuf>,
    /// Extra environment variables for the worker (`KEY=VALUE` pairs).
    pub env: Vec<(String, String)>,
    /// Directory for per-job payload files.
    pub job_dir: PathBuf,
    /// Directory where finished artifacts are parked.
    pub output_dir: PathBuf,
    /// Per-run wall-clock budget in seconds.
    pub timeout_secs: u64,
    /// Stdout marker the worker prints in front of its artifact path.
    pub result_marker: String,
}

impl EngineConfig {
    /// Load engine configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default             |
    /// |------------------------|---------------------|
    /// | `ENGINE_NAME`          | `engine`            |
    /// | `ENGINE_COMMAND`       | `python3 worker.py` |
    /// | `ENGINE_WORKDIR`       | (none)              |
    /// | `ENGINE_ENV`           | (none)              |
    /// | `ENGINE_JOB_DIR`       | `jobs`              |
    /// | `ENGINE_OUTPUT_DIR`    | `outputs`           |
    /// | `ENGINE_TIMEOUT_SECS`  | `600`               |
    /// | `ENGINE_RESULT_MARKER` | `[RESULT-PATH]`     |
    pub fn from_env() -> Self {
        let name = std::env::var("ENGINE_NAME").unwrap_or_else(|_| "engine".into());

        let command: Vec<String> = std::env::var("ENGINE_COMMAND")
            .unwrap_or_else(|_| "python3 worker.py".into())
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let workdir = std::env::var("ENGINE_WORKDIR").ok().map(PathBuf::from);

        let env: Vec<(String, String)> = std::env::var("ENGINE_ENV")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                let (key, value) = entry
                    .split_once('=')
                    .unwrap_or_else(|| panic!("Invalid ENGINE_ENV entry '{entry}', expected KEY=VALUE"));
                (key.to_string(), value.to_string())
            })
            .collect();

        let job_dir = PathBuf::from(std::env::var("ENGINE_JOB_DIR").unwrap_or_else(|_| "jobs".into()));

        let output_dir =
            PathBuf::from(std::env::var("ENGINE_OUTPUT_DIR").unwrap_or_else(|_| "outputs".into()));

        let timeout_secs: u64 = std::env::var("ENGINE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "600".into())
            .parse()
            .expect("ENGINE_TIMEOUT_SECS must be a valid u64");

        let result_marker = std::env::var("ENGINE_RESULT_MARKER")
            .unwrap_or_else(|_| DEFAULT_RESULT_MARKER.into());

        Self {
            name,
            command,
            workdir,
            env,
            job_dir,
            output_dir,
            timeout_secs,
            result_marker,
        }
    }

    /// Convert to the engine crate's subprocess settings.
    pub fn to_subprocess_config(&self) -> SubprocessConfig {
        SubprocessConfig {
            name: self.name.clone(),
            command: self.command.clone(),
            workdir: self.workdir.clone(),
            env: self.env.clone(),
            job_dir: self.job_dir.clone(),
            output_dir: self.output_dir.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            result_marker: self.result_marker.clone(),
        }
    }
}
