use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub places: PlacesConfig,
    pub dialogue: DialogueConfig,
    pub speech: SpeechConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct PlacesConfig {
    pub enabled: bool,
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub max_results: u32,
}

#[derive(Clone, Debug)]
pub struct DialogueConfig {
    pub confidence_threshold: f64,
    pub turn_timeout_secs: u64,
    pub response_seed: Option<u64>,
    pub top_picks: usize,
    pub responses_path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct SpeechConfig {
    pub language: String,
    pub voice: String,
    pub record_secs: u32,
    pub record_command: String,
    pub playback_command: String,
    pub transcription_model: String,
    pub tts_model: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub places_enabled: Option<bool>,
    pub response_seed: Option<u64>,
}

impl ConfigOverrides {
    /// Dotted key paths replaced by this set of overrides.
    pub fn key_paths(&self) -> Vec<&'static str> {
        [
            ("database.url", self.database_url.is_some()),
            ("logging.level", self.log_level.is_some()),
            ("llm.provider", self.llm_provider.is_some()),
            ("llm.model", self.llm_model.is_some()),
            ("places.enabled", self.places_enabled.is_some()),
            ("dialogue.response_seed", self.response_seed.is_some()),
        ]
        .into_iter()
        .filter_map(|(path, set)| set.then_some(path))
        .collect()
    }
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://tablebook.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: None,
                model: "llama3.1".to_string(),
                timeout_secs: 30,
            },
            places: PlacesConfig {
                enabled: false,
                api_key: None,
                base_url: "https://places.googleapis.com/v1".to_string(),
                max_results: 10,
            },
            dialogue: DialogueConfig {
                confidence_threshold: 0.9,
                turn_timeout_secs: 30,
                response_seed: None,
                top_picks: 3,
                responses_path: None,
            },
            speech: SpeechConfig {
                language: "en".to_string(),
                voice: "ash".to_string(),
                record_secs: 5,
                record_command: "arecord -q -f S16_LE -r 44100 -c 1 -d {secs} {path}".to_string(),
                playback_command: "aplay -q -f S16_LE -r 24000 -c 1 {path}".to_string(),
                transcription_model: "whisper-1".to_string(),
                tts_model: "tts-1".to_string(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl LlmProvider {
    /// Chat-completions root used when `llm.base_url` is not set.
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Ollama => "http://localhost:11434/v1",
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("tablebook.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(places) = patch.places {
            if let Some(enabled) = places.enabled {
                self.places.enabled = enabled;
            }
            if let Some(places_api_key_value) = places.api_key {
                self.places.api_key = Some(secret_value(places_api_key_value));
            }
            if let Some(base_url) = places.base_url {
                self.places.base_url = base_url;
            }
            if let Some(max_results) = places.max_results {
                self.places.max_results = max_results;
            }
        }

        if let Some(dialogue) = patch.dialogue {
            if let Some(confidence_threshold) = dialogue.confidence_threshold {
                self.dialogue.confidence_threshold = confidence_threshold;
            }
            if let Some(turn_timeout_secs) = dialogue.turn_timeout_secs {
                self.dialogue.turn_timeout_secs = turn_timeout_secs;
            }
            if let Some(response_seed) = dialogue.response_seed {
                self.dialogue.response_seed = Some(response_seed);
            }
            if let Some(top_picks) = dialogue.top_picks {
                self.dialogue.top_picks = top_picks;
            }
            if let Some(responses_path) = dialogue.responses_path {
                self.dialogue.responses_path = Some(responses_path);
            }
        }

        if let Some(speech) = patch.speech {
            if let Some(language) = speech.language {
                self.speech.language = language;
            }
            if let Some(voice) = speech.voice {
                self.speech.voice = voice;
            }
            if let Some(record_secs) = speech.record_secs {
                self.speech.record_secs = record_secs;
            }
            if let Some(record_command) = speech.record_command {
                self.speech.record_command = record_command;
            }
            if let Some(playback_command) = speech.playback_command {
                self.speech.playback_command = playback_command;
            }
            if let Some(transcription_model) = speech.transcription_model {
                self.speech.transcription_model = transcription_model;
            }
            if let Some(tts_model) = speech.tts_model {
                self.speech.tts_model = tts_model;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("TABLEBOOK_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("TABLEBOOK_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("TABLEBOOK_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("TABLEBOOK_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("TABLEBOOK_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TABLEBOOK_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("TABLEBOOK_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("TABLEBOOK_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("TABLEBOOK_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("TABLEBOOK_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("TABLEBOOK_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TABLEBOOK_PLACES_ENABLED") {
            self.places.enabled = parse_bool("TABLEBOOK_PLACES_ENABLED", &value)?;
        }
        if let Some(value) = read_env("TABLEBOOK_PLACES_API_KEY") {
            self.places.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("TABLEBOOK_PLACES_BASE_URL") {
            self.places.base_url = value;
        }
        if let Some(value) = read_env("TABLEBOOK_PLACES_MAX_RESULTS") {
            self.places.max_results = parse_u32("TABLEBOOK_PLACES_MAX_RESULTS", &value)?;
        }

        if let Some(value) = read_env("TABLEBOOK_DIALOGUE_CONFIDENCE_THRESHOLD") {
            self.dialogue.confidence_threshold =
                parse_f64("TABLEBOOK_DIALOGUE_CONFIDENCE_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("TABLEBOOK_DIALOGUE_TURN_TIMEOUT_SECS") {
            self.dialogue.turn_timeout_secs =
                parse_u64("TABLEBOOK_DIALOGUE_TURN_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("TABLEBOOK_DIALOGUE_RESPONSE_SEED") {
            self.dialogue.response_seed =
                Some(parse_u64("TABLEBOOK_DIALOGUE_RESPONSE_SEED", &value)?);
        }
        if let Some(value) = read_env("TABLEBOOK_DIALOGUE_TOP_PICKS") {
            self.dialogue.top_picks = parse_u32("TABLEBOOK_DIALOGUE_TOP_PICKS", &value)? as usize;
        }
        if let Some(value) = read_env("TABLEBOOK_DIALOGUE_RESPONSES_PATH") {
            self.dialogue.responses_path = Some(PathBuf::from(value));
        }

        if let Some(value) = read_env("TABLEBOOK_SPEECH_LANGUAGE") {
            self.speech.language = value;
        }
        if let Some(value) = read_env("TABLEBOOK_SPEECH_VOICE") {
            self.speech.voice = value;
        }
        if let Some(value) = read_env("TABLEBOOK_SPEECH_RECORD_SECS") {
            self.speech.record_secs = parse_u32("TABLEBOOK_SPEECH_RECORD_SECS", &value)?;
        }
        if let Some(value) = read_env("TABLEBOOK_SPEECH_RECORD_COMMAND") {
            self.speech.record_command = value;
        }
        if let Some(value) = read_env("TABLEBOOK_SPEECH_PLAYBACK_COMMAND") {
            self.speech.playback_command = value;
        }

        let log_level =
            read_env("TABLEBOOK_LOGGING_LEVEL").or_else(|| read_env("TABLEBOOK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("TABLEBOOK_LOGGING_FORMAT").or_else(|| read_env("TABLEBOOK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(places_enabled) = overrides.places_enabled {
            self.places.enabled = places_enabled;
        }
        if let Some(response_seed) = overrides.response_seed {
            self.dialogue.response_seed = Some(response_seed);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_places(&self.places)?;
        validate_dialogue(&self.dialogue)?;
        validate_speech(&self.speech)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// Candidate config file locations, first existing one wins.
pub const CONFIG_FILE_CANDIDATES: [&str; 2] = ["tablebook.toml", "config/tablebook.toml"];

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    CONFIG_FILE_CANDIDATES.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    if llm.provider == LlmProvider::OpenAi {
        let missing = llm
            .api_key
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(
                "llm.api_key is required for the openai provider".to_string(),
            ));
        }
    }

    if let Some(base_url) = &llm.base_url {
        let base_url = base_url.trim();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_places(places: &PlacesConfig) -> Result<(), ConfigError> {
    if places.enabled {
        let missing = places
            .api_key
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(
                "places.enabled is true but places.api_key is not configured".to_string(),
            ));
        }
    }

    if !places.base_url.starts_with("http://") && !places.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "places.base_url must start with http:// or https://".to_string(),
        ));
    }

    if places.max_results == 0 || places.max_results > 20 {
        return Err(ConfigError::Validation(
            "places.max_results must be in range 1..=20".to_string(),
        ));
    }

    Ok(())
}

fn validate_dialogue(dialogue: &DialogueConfig) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&dialogue.confidence_threshold) {
        return Err(ConfigError::Validation(
            "dialogue.confidence_threshold must be in range 0.0..=1.0".to_string(),
        ));
    }

    if dialogue.turn_timeout_secs == 0 || dialogue.turn_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "dialogue.turn_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if dialogue.top_picks == 0 {
        return Err(ConfigError::Validation(
            "dialogue.top_picks must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_speech(speech: &SpeechConfig) -> Result<(), ConfigError> {
    if speech.record_secs == 0 || speech.record_secs > 60 {
        return Err(ConfigError::Validation(
            "speech.record_secs must be in range 1..=60".to_string(),
        ));
    }

    for (key, command) in
        [("record_command", &speech.record_command), ("playback_command", &speech.playback_command)]
    {
        if !command.contains("{path}") {
            return Err(ConfigError::Validation(format!(
                "speech.{key} must contain the `{{path}}` placeholder"
            )));
        }
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.parse::<f64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    places: Option<PlacesPatch>,
    dialogue: Option<DialoguePatch>,
    speech: Option<SpeechPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PlacesPatch {
    enabled: Option<bool>,
    api_key: Option<String>,
    base_url: Option<String>,
    max_results: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct DialoguePatch {
    confidence_threshold: Option<f64>,
    turn_timeout_secs: Option<u64>,
    response_seed: Option<u64>,
    top_picks: Option<usize>,
    responses_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct SpeechPatch {
    language: Option<String>,
    voice: Option<String>,
    record_secs: Option<u32>,
    record_command: Option<String>,
    playback_command: Option<String>,
    transcription_model: Option<String>,
    tts_model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid_without_any_file_or_env() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.llm.provider == LlmProvider::Ollama, "default provider should be ollama")?;
        ensure(
            (config.dialogue.confidence_threshold - 0.9).abs() < f64::EPSILON,
            "default confidence threshold should be 0.9",
        )?;
        ensure(!config.places.enabled, "places search should be disabled by default")?;
        ensure(config.dialogue.top_picks == 3, "three picks by default")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_TABLEBOOK_OPENAI_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("tablebook.toml");
            fs::write(
                &path,
                r#"
[llm]
provider = "open_ai"
api_key = "${TEST_TABLEBOOK_OPENAI_KEY}"
model = "gpt-4o-mini"

[dialogue]
response_seed = 42
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret() == "sk-from-env")
                    == Some(true),
                "api key should be loaded from environment",
            )?;
            ensure(config.llm.provider == LlmProvider::OpenAi, "provider should come from file")?;
            ensure(config.dialogue.response_seed == Some(42), "seed should come from file")?;
            Ok(())
        })();

        clear_vars(&["TEST_TABLEBOOK_OPENAI_KEY"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TABLEBOOK_LOG_LEVEL", "warn");
        env::set_var("TABLEBOOK_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["TABLEBOOK_LOG_LEVEL", "TABLEBOOK_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TABLEBOOK_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("TABLEBOOK_DIALOGUE_CONFIDENCE_THRESHOLD", "0.75");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("tablebook.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[dialogue]
confidence_threshold = 0.5
turn_timeout_secs = 12

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                (config.dialogue.confidence_threshold - 0.75).abs() < f64::EPSILON,
                "env threshold should win over file",
            )?;
            ensure(config.dialogue.turn_timeout_secs == 12, "file timeout should beat default")?;
            Ok(())
        })();

        clear_vars(&["TABLEBOOK_DATABASE_URL", "TABLEBOOK_DIALOGUE_CONFIDENCE_THRESHOLD"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TABLEBOOK_LLM_PROVIDER", "openai");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("llm.api_key")
            );
            ensure(has_message, "validation failure should mention llm.api_key")
        })();

        clear_vars(&["TABLEBOOK_LLM_PROVIDER"]);
        result
    }

    #[test]
    fn out_of_range_threshold_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TABLEBOOK_DIALOGUE_CONFIDENCE_THRESHOLD", "1.5");
        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("threshold above 1.0 should be rejected".to_string()),
            Err(ConfigError::Validation(message)) => {
                ensure(message.contains("confidence_threshold"), "message names the field")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
        };

        clear_vars(&["TABLEBOOK_DIALOGUE_CONFIDENCE_THRESHOLD"]);
        result
    }

    #[test]
    fn llm_base_url_must_be_http() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TABLEBOOK_LLM_BASE_URL", "localhost:11434");
        let result = AppConfig::load(LoadOptions::default());
        clear_vars(&["TABLEBOOK_LLM_BASE_URL"]);

        ensure(
            matches!(result, Err(ConfigError::Validation(ref message)) if message.contains("llm.base_url")),
            "a base url without scheme should fail",
        )?;
        ensure(
            LlmProvider::Ollama.default_base_url() == "http://localhost:11434/v1",
            "ollama falls back to the local server",
        )
    }

    #[test]
    fn places_requires_key_when_enabled() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides { places_enabled: Some(true), ..ConfigOverrides::default() },
            ..LoadOptions::default()
        });

        ensure(
            matches!(result, Err(ConfigError::Validation(ref message)) if message.contains("places.api_key")),
            "enabling places without a key should fail",
        )
    }

    #[test]
    fn override_key_paths_list_only_set_fields() -> Result<(), String> {
        let overrides = ConfigOverrides {
            llm_provider: Some(LlmProvider::OpenAi),
            response_seed: Some(7),
            ..ConfigOverrides::default()
        };

        ensure(
            overrides.key_paths() == vec!["llm.provider", "dialogue.response_seed"],
            "only set overrides should be listed",
        )?;
        ensure(ConfigOverrides::default().key_paths().is_empty(), "defaults override nothing")
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TABLEBOOK_LLM_API_KEY", "sk-secret-value");
        env::set_var("TABLEBOOK_PLACES_API_KEY", "places-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain llm key")?;
            ensure(
                !debug.contains("places-secret-value"),
                "debug output should not contain places key",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["TABLEBOOK_LLM_API_KEY", "TABLEBOOK_PLACES_API_KEY"]);
        result
    }
}
