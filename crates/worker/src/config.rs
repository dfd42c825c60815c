use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clipforge_core::resources::ResourceLimits;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub redis_url: String,
    pub storage_url: String,
    pub storage_service_key: String,
    pub storage_bucket: String,
    pub openai_api_key: String,
    pub gemini_api_key: String,
    /// Image sent to Gemini as a visual style reference.
    pub style_reference_image: Option<PathBuf>,
    pub elevenlabs_api_key: String,
    pub elevenlabs_voice_id: Option<String>,
    /// Present only when image-to-video is enabled.
    pub xai_api_key: Option<String>,
    pub background_music: Option<PathBuf>,
    /// Concurrent jobs per stage queue.
    pub workers_per_stage: usize,
    pub limits: ResourceLimits,
    /// Grace period for in-flight jobs on shutdown.
    pub shutdown_timeout: Duration,
    pub render_width: u32,
    pub render_height: u32,
}

impl WorkerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                        | Default                  |
    /// |--------------------------------|--------------------------|
    /// | `DATABASE_URL`                 | required                 |
    /// | `REDIS_URL`                    | `redis://localhost:6379` |
    /// | `STORAGE_URL`                  | required                 |
    /// | `STORAGE_SERVICE_KEY`          | required                 |
    /// | `STORAGE_BUCKET`               | `clipforge-videos`       |
    /// | `OPENAI_API_KEY`               | required                 |
    /// | `GEMINI_API_KEY`               | required                 |
    /// | `GEMINI_STYLE_REFERENCE_IMAGE` | none                     |
    /// | `ELEVENLABS_API_KEY`           | required                 |
    /// | `ELEVENLABS_VOICE_ID`          | provider default         |
    /// | `XAI_VIDEO_ENABLED`            | `false`                  |
    /// | `XAI_API_KEY`                  | required when enabled    |
    /// | `BACKGROUND_MUSIC_PATH`        | none                     |
    /// | `MAX_CONCURRENT_JOBS`          | `5`                      |
    /// | `STORAGE_CONCURRENCY`          | `3`                      |
    /// | `IMAGE_CONCURRENCY`            | `2`                      |
    /// | `SPEECH_CONCURRENCY`           | `4`                      |
    /// | `VIDEO_CONCURRENCY`            | `2`                      |
    /// | `RENDER_CONCURRENCY`           | `2`                      |
    /// | `SHUTDOWN_TIMEOUT_SECS`        | `30`                     |
    /// | `RENDER_WIDTH`                 | `1080`                   |
    /// | `RENDER_HEIGHT`                | `1920`                   |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns the raw value
    /// of a variable if it is set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };
        let defaults = ResourceLimits::default();

        let xai_enabled = env.parse_or("XAI_VIDEO_ENABLED", false)?;
        let xai_api_key = if xai_enabled {
            Some(env.required("XAI_API_KEY")?)
        } else {
            None
        };

        Ok(Self {
            database_url: env.required("DATABASE_URL")?,
            redis_url: env
                .optional("REDIS_URL")
                .unwrap_or_else(|| "redis://localhost:6379".into()),
            storage_url: env.required("STORAGE_URL")?,
            storage_service_key: env.required("STORAGE_SERVICE_KEY")?,
            storage_bucket: env
                .optional("STORAGE_BUCKET")
                .unwrap_or_else(|| "clipforge-videos".into()),
            openai_api_key: env.required("OPENAI_API_KEY")?,
            gemini_api_key: env.required("GEMINI_API_KEY")?,
            style_reference_image: env
                .optional("GEMINI_STYLE_REFERENCE_IMAGE")
                .map(PathBuf::from),
            elevenlabs_api_key: env.required("ELEVENLABS_API_KEY")?,
            elevenlabs_voice_id: env.optional("ELEVENLABS_VOICE_ID"),
            xai_api_key,
            background_music: env.optional("BACKGROUND_MUSIC_PATH").map(PathBuf::from),
            workers_per_stage: env.positive_or("MAX_CONCURRENT_JOBS", 5)?,
            limits: ResourceLimits {
                storage: env.positive_or("STORAGE_CONCURRENCY", defaults.storage)?,
                image_gen: env.positive_or("IMAGE_CONCURRENCY", defaults.image_gen)?,
                speech: env.positive_or("SPEECH_CONCURRENCY", defaults.speech)?,
                video_gen: env.positive_or("VIDEO_CONCURRENCY", defaults.video_gen)?,
                render: env.positive_or("RENDER_CONCURRENCY", defaults.render)?,
            },
            shutdown_timeout: Duration::from_secs(env.parse_or("SHUTDOWN_TIMEOUT_SECS", 30)?),
            render_width: env.positive_or("RENDER_WIDTH", 1080)?,
            render_height: env.positive_or("RENDER_HEIGHT", 1920)?,
        })
    }

    pub fn video_enabled(&self) -> bool {
        self.xai_api_key.is_some()
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Set and non-blank, trimmed.
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.optional(key).ok_or(ConfigError::Missing(key))
    }

    fn parse_or<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(key) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value,
            }),
        }
    }

    fn positive_or<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr + PartialOrd + Default + ToString,
        T::Err: std::fmt::Display,
    {
        let value = self.parse_or(key, default)?;
        if value <= T::default() {
            return Err(ConfigError::Invalid {
                key,
                value: value.to_string(),
                reason: "must be greater than zero".into(),
            });
        }
        Ok(value)
    }
}
