//! Configuration types for the reflection orchestrator.
//!
//! Configuration is read once at startup from `reflect.json` (optional),
//! then overridden by environment variables and finally by CLI flags. The
//! resulting [`Config`] is immutable for the lifetime of the process.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ReflectError, Result};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "reflect.json";

/// Environment variable holding the collaborator API key.
pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
/// Environment variable overriding [`Config::max_iterations`].
pub const ENV_MAX_ITERATIONS: &str = "MAX_ITERATIONS";
/// Environment variable overriding [`Config::quality_threshold`].
pub const ENV_QUALITY_THRESHOLD: &str = "QUALITY_THRESHOLD";
/// Environment variable overriding [`Config::model`].
pub const ENV_MODEL_NAME: &str = "MODEL_NAME";
/// Environment variable overriding [`Config::api_base`].
pub const ENV_API_BASE: &str = "OPENAI_BASE_URL";

const fn default_max_iterations() -> u32 {
    3
}

const fn default_quality_threshold() -> f64 {
    0.8
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

const fn default_request_timeout() -> u64 {
    60
}

const fn default_max_retries() -> u32 {
    2
}

const fn default_generator_temperature() -> f32 {
    0.7
}

const fn default_reflector_temperature() -> f32 {
    0.3
}

const fn default_refiner_temperature() -> f32 {
    0.5
}

const fn default_max_tokens() -> u32 {
    2000
}

const fn default_top_p() -> f32 {
    1.0
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    3000
}

fn default_static_dir() -> String {
    "public".to_string()
}

/// Main configuration for the reflection agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Maximum number of generate/refine + critique iterations per run.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Score at or above which a run stops early.
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f64,

    /// Model identifier sent to the collaborator.
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of the OpenAI-compatible API.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// API credential. Only ever read from the environment.
    #[serde(skip)]
    pub api_key: Option<String>,

    /// Per-request timeout for collaborator calls, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Retries per step on transient collaborator failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Sampling parameters for each step.
    #[serde(default)]
    pub sampling: SamplingConfig,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            quality_threshold: default_quality_threshold(),
            model: default_model(),
            api_base: default_api_base(),
            api_key: None,
            request_timeout_secs: default_request_timeout(),
            max_retries: default_max_retries(),
            sampling: SamplingConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `reflect.json` in the current directory and falls back to
    /// defaults when it does not exist.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            ReflectError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `reflect.json` inside `dir`.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        Self::load_from_file(&config_path)
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns `ReflectError::ConfigParseError` if the file exists but contains
    /// invalid JSON, and `ReflectError::ConfigValidationError` if any value is
    /// out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(ReflectError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| ReflectError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset. Values that fail to parse produce a
    /// `ConfigValidationError` naming the variable.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(key) = get(ENV_API_KEY) {
            self.api_key = Some(key);
        }

        if let Some(raw) = get(ENV_MAX_ITERATIONS) {
            self.max_iterations = raw.trim().parse().map_err(|_| {
                ReflectError::config_validation(
                    format!("{ENV_MAX_ITERATIONS} must be a positive integer, got '{raw}'"),
                    format!("Set {ENV_MAX_ITERATIONS} to a whole number such as 3"),
                )
            })?;
        }

        if let Some(raw) = get(ENV_QUALITY_THRESHOLD) {
            self.quality_threshold = raw.trim().parse().map_err(|_| {
                ReflectError::config_validation(
                    format!("{ENV_QUALITY_THRESHOLD} must be a number, got '{raw}'"),
                    format!("Set {ENV_QUALITY_THRESHOLD} to a value between 0 and 1"),
                )
            })?;
        }

        if let Some(model) = get(ENV_MODEL_NAME) {
            self.model = model;
        }

        if let Some(base) = get(ENV_API_BASE) {
            self.api_base = base;
        }

        self.validate()
    }

    /// Returns the settings the orchestrator needs for its loop.
    ///
    /// # Errors
    ///
    /// Returns `ReflectError::ConfigValidationError` if the iteration budget
    /// or the threshold is out of range.
    pub fn reflection_settings(&self) -> Result<ReflectionSettings> {
        ReflectionSettings::new(self.max_iterations, self.quality_threshold)
    }

    /// Validates the configuration values.
    ///
    /// Checks that:
    /// - `max_iterations` is greater than 0
    /// - `quality_threshold` is within [0, 1]
    /// - `model` and `api_base` are not empty
    /// - `request_timeout_secs` is greater than 0
    /// - sampling parameters are within their API ranges
    ///
    /// # Errors
    ///
    /// Returns `ReflectError::ConfigValidationError` if any validation check fails.
    pub fn validate(&self) -> Result<()> {
        self.reflection_settings()?;

        if self.model.trim().is_empty() {
            return Err(ReflectError::config_validation(
                "model must not be empty",
                "Provide a model name such as 'gpt-4o-mini' in your reflect.json or MODEL_NAME",
            ));
        }

        if self.api_base.trim().is_empty() {
            return Err(ReflectError::config_validation(
                "apiBase must not be empty",
                "Provide the API base URL, e.g. 'https://api.openai.com/v1'",
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(ReflectError::config_validation(
                "requestTimeoutSecs must be greater than 0",
                "Set requestTimeoutSecs to at least 1 second in your reflect.json",
            ));
        }

        self.sampling.validate()
    }
}

/// Immutable loop settings handed to the orchestrator constructor.
///
/// Only [`ReflectionSettings::new`] builds one, so the iteration budget is
/// always at least 1 and the threshold always lies in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReflectionSettings {
    max_iterations: u32,
    quality_threshold: f64,
}

impl ReflectionSettings {
    /// Creates validated loop settings.
    ///
    /// # Errors
    ///
    /// Returns `ReflectError::ConfigValidationError` if `max_iterations` is 0
    /// or `quality_threshold` is outside [0, 1].
    pub fn new(max_iterations: u32, quality_threshold: f64) -> Result<Self> {
        if max_iterations == 0 {
            return Err(ReflectError::config_validation(
                "maxIterations must be greater than 0",
                "Set maxIterations to at least 1 in your reflect.json or MAX_ITERATIONS",
            ));
        }

        if !(0.0..=1.0).contains(&quality_threshold) {
            return Err(ReflectError::config_validation(
                format!("qualityThreshold must be between 0 and 1, got {quality_threshold}"),
                "Set qualityThreshold to a value such as 0.8 in your reflect.json or QUALITY_THRESHOLD",
            ));
        }

        Ok(Self {
            max_iterations,
            quality_threshold,
        })
    }

    /// Maximum number of iterations.
    #[must_use]
    pub const fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Early-stop threshold (inclusive).
    #[must_use]
    pub const fn quality_threshold(&self) -> f64 {
        self.quality_threshold
    }
}

impl Default for ReflectionSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            quality_threshold: default_quality_threshold(),
        }
    }
}

/// Fixed per-step sampling parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingConfig {
    /// Temperature for the initial generation step.
    #[serde(default = "default_generator_temperature")]
    pub generator_temperature: f32,

    /// Temperature for the critique step.
    #[serde(default = "default_reflector_temperature")]
    pub reflector_temperature: f32,

    /// Temperature for the refinement step.
    #[serde(default = "default_refiner_temperature")]
    pub refiner_temperature: f32,

    /// Completion token limit per call.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Nucleus sampling parameter.
    #[serde(default = "default_top_p")]
    pub top_p: f32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            generator_temperature: default_generator_temperature(),
            reflector_temperature: default_reflector_temperature(),
            refiner_temperature: default_refiner_temperature(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
        }
    }
}

impl SamplingConfig {
    fn validate(&self) -> Result<()> {
        let temperatures = [
            ("sampling.generatorTemperature", self.generator_temperature),
            ("sampling.reflectorTemperature", self.reflector_temperature),
            ("sampling.refinerTemperature", self.refiner_temperature),
        ];
        for (name, value) in temperatures {
            if !(0.0..=2.0).contains(&value) {
                return Err(ReflectError::config_validation(
                    format!("{name} must be between 0 and 2, got {value}"),
                    format!("Set {name} to a value such as 0.5 in your reflect.json"),
                ));
            }
        }

        if self.max_tokens == 0 {
            return Err(ReflectError::config_validation(
                "sampling.maxTokens must be greater than 0",
                "Set sampling.maxTokens to at least 1 in your reflect.json",
            ));
        }

        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(ReflectError::config_validation(
                format!("sampling.topP must be in (0, 1], got {}", self.top_p),
                "Set sampling.topP to 1.0 unless you need nucleus sampling",
            ));
        }

        Ok(())
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Interface to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory served for the browser UI.
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: default_static_dir(),
        }
    }
}
