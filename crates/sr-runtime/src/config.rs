//! Runtime configuration: defaults, JSON documents and `SR_*` environment
//! overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sr_sampler::SamplingPolicy;

use crate::error::ConfigError;

/// What unload does with a session whose call did not finish in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownPolicy {
    /// Never free the native resources.
    #[default]
    Leak,
    /// Let the last shared owner free them once the in-flight call returns.
    ReleaseOnLastReference,
}

impl TeardownPolicy {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "leak" => Some(TeardownPolicy::Leak),
            "release_on_last_reference" => Some(TeardownPolicy::ReleaseOnLastReference),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnloadConfig {
    /// Upper bound on how long unload waits for an in-flight call.
    pub wait_ms: u64,
    pub poll_ms: u64,
    pub on_timeout: TeardownPolicy,
}

impl Default for UnloadConfig {
    fn default() -> Self {
        Self {
            wait_ms: 300,
            poll_ms: 10,
            on_timeout: TeardownPolicy::Leak,
        }
    }
}

impl UnloadConfig {
    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.wait_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub unload: UnloadConfig,
    pub sampling: SamplingPolicy,
    /// Prepend the model's BOS token to every prompt.
    pub add_bos: bool,
    pub use_mmap: bool,
    /// Path to `libllama` for the llama.cpp backend.
    pub llama_library: Option<PathBuf>,
    /// `EnvFilter` directive for the log subscriber.
    pub log_filter: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            unload: UnloadConfig::default(),
            sampling: SamplingPolicy::Deterministic,
            add_bos: true,
            use_mmap: true,
            llama_library: None,
            log_filter: "info".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override fields from `SR_*` variables obtained through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SR_UNLOAD_WAIT_MS") {
            self.unload.wait_ms = parse_u64("SR_UNLOAD_WAIT_MS", &v)?;
        }
        if let Some(v) = lookup("SR_UNLOAD_POLL_MS") {
            self.unload.poll_ms = parse_u64("SR_UNLOAD_POLL_MS", &v)?;
        }
        if let Some(v) = lookup("SR_UNLOAD_ON_TIMEOUT") {
            self.unload.on_timeout =
                TeardownPolicy::parse(v.trim()).ok_or_else(|| invalid("SR_UNLOAD_ON_TIMEOUT", &v))?;
        }

        let seed = match lookup("SR_SEED") {
            Some(v) => Some(parse_u64("SR_SEED", &v)?),
            None => None,
        };
        match lookup("SR_SAMPLING").as_deref().map(str::trim) {
            Some("deterministic") => self.sampling = SamplingPolicy::Deterministic,
            Some("stochastic") => {
                self.sampling = SamplingPolicy::Stochastic {
                    seed: seed.unwrap_or(0),
                }
            }
            Some(other) => return Err(invalid("SR_SAMPLING", other)),
            None => {
                if let (SamplingPolicy::Stochastic { seed: current }, Some(seed)) =
                    (&mut self.sampling, seed)
                {
                    *current = seed;
                }
            }
        }

        if let Some(v) = lookup("SR_LLAMA_LIB") {
            self.llama_library = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("SR_LOG") {
            self.log_filter = v;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.unload.poll_ms == 0 {
            return Err(invalid("unload.poll_ms", "0"));
        }
        Ok(())
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}
