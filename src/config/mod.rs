use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:8000"). Ignored by worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string. Without it jobs live in process memory.
    pub database_url: Option<String>,

    /// Redis connection string for the job queue. Without it the API server
    /// runs its own in-process worker pool.
    pub redis_url: Option<String>,

    /// Groq API key used by the caption stage.
    pub groq_api_key: Option<String>,

    /// OpenAI-compatible Groq endpoint
    #[serde(default = "default_groq_base_url")]
    pub groq_base_url: String,

    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,

    #[serde(default = "default_caption_model")]
    pub caption_model: String,

    /// R2 bucket name
    pub r2_bucket: Option<String>,

    /// R2 endpoint URL
    pub r2_endpoint: Option<String>,

    /// R2 access key ID (S3-compatible)
    pub r2_access_key: Option<String>,

    /// R2 secret access key (S3-compatible)
    pub r2_secret_key: Option<String>,

    /// Local artifact directory, used when R2 is not configured.
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    /// Root for per-job scratch directories.
    pub scratch_dir: Option<PathBuf>,

    /// Netscape cookies file handed to yt-dlp.
    pub cookies_file: Option<PathBuf>,

    /// Banner burned into the top of every clip.
    #[serde(default = "default_overlay_text")]
    pub overlay_text: String,

    #[serde(default = "default_stage_timeout_secs")]
    pub stage_timeout_secs: u64,

    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// How long a claimed job stays reserved for its worker without a
    /// renewal. Running workers renew it continuously.
    #[serde(default = "default_job_lease_secs")]
    pub job_lease_secs: u64,

    /// Prefix of the queue consumer names. Must be unique per worker process
    /// and stable across its restarts, so a restarted worker reclaims only
    /// the jobs it had in flight. Falls back to `HOSTNAME`.
    pub worker_name: Option<String>,

    /// Set by container runtimes.
    pub hostname: Option<String>,
}

/// R2 credentials, present only when every field is set.
#[derive(Debug, Clone)]
pub struct R2Settings {
    pub bucket: String,
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_groq_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_transcription_model() -> String {
    "whisper-large-v3".to_string()
}

fn default_caption_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("./artifacts")
}

fn default_overlay_text() -> String {
    "LINK IN BIO!".to_string()
}

fn default_stage_timeout_secs() -> u64 {
    600
}

fn default_worker_concurrency() -> usize {
    2
}

fn default_job_lease_secs() -> u64 {
    60
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config: Self = envy::from_env()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "WORKER_CONCURRENCY must be at least 1".to_string(),
            ));
        }
        if self.stage_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "STAGE_TIMEOUT_SECS must be at least 1".to_string(),
            ));
        }
        if self.job_lease_secs == 0 {
            return Err(ConfigError::Invalid(
                "JOB_LEASE_SECS must be at least 1".to_string(),
            ));
        }
        if self.worker_name.as_ref().is_some_and(|n| n.trim().is_empty()) {
            return Err(ConfigError::Invalid("WORKER_NAME must not be empty".to_string()));
        }
        // jobs recorded in one process's memory are invisible to remote workers
        if self.redis_url.is_some() && self.database_url.is_none() {
            return Err(ConfigError::Invalid(
                "REDIS_URL requires DATABASE_URL: a shared queue needs a shared job store"
                    .to_string(),
            ));
        }
        self.r2()?;
        Ok(())
    }

    /// R2 settings if configured. A partial configuration is an error so a
    /// typo doesn't silently fall back to local artifacts.
    pub fn r2(&self) -> Result<Option<R2Settings>, ConfigError> {
        match (
            &self.r2_bucket,
            &self.r2_endpoint,
            &self.r2_access_key,
            &self.r2_secret_key,
        ) {
            (None, None, None, None) => Ok(None),
            (Some(bucket), Some(endpoint), Some(access_key), Some(secret_key)) => {
                Ok(Some(R2Settings {
                    bucket: bucket.clone(),
                    endpoint: endpoint.clone(),
                    access_key: access_key.clone(),
                    secret_key: secret_key.clone(),
                }))
            }
            _ => Err(ConfigError::Invalid(
                "R2_BUCKET, R2_ENDPOINT, R2_ACCESS_KEY and R2_SECRET_KEY must be set together"
                    .to_string(),
            )),
        }
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    pub fn job_lease(&self) -> Duration {
        Duration::from_secs(self.job_lease_secs)
    }

    /// Consumer name prefix for this process: `WORKER_NAME`, else `HOSTNAME`.
    pub fn worker_name(&self) -> Option<String> {
        [&self.worker_name, &self.hostname]
            .into_iter()
            .flatten()
            .map(|n| n.trim())
            .find(|n| !n.is_empty())
            .map(str::to_string)
    }

    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
