use std::env;
use std::fs;
use std::path::Path;

use secrecy::{ExposeSecret, SecretString};
use tablebook_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

pub fn run(options: LoadOptions) -> String {
    let config_file_path = resolve_config_path(options.config_path.as_deref());
    let cli_keys = options.overrides.key_paths();
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        if cli_keys.iter().any(|key| *key == key_path) {
            return "cli".to_string();
        }
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines =
        vec!["effective config (source precedence: cli > env > file > default):".to_string()];
    let mut push = |key_path: &str, value: &str, env_keys: &[&str]| {
        lines.push(render_line(key_path, value, source(key_path, env_keys)));
    };

    push("database.url", &config.database.url, &["TABLEBOOK_DATABASE_URL"]);
    push(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        &["TABLEBOOK_DATABASE_MAX_CONNECTIONS"],
    );
    push(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        &["TABLEBOOK_DATABASE_TIMEOUT_SECS"],
    );

    push("llm.provider", &format!("{:?}", config.llm.provider), &["TABLEBOOK_LLM_PROVIDER"]);
    push("llm.model", &config.llm.model, &["TABLEBOOK_LLM_MODEL"]);
    push(
        "llm.base_url",
        config.llm.base_url.as_deref().unwrap_or("<unset>"),
        &["TABLEBOOK_LLM_BASE_URL"],
    );
    push("llm.api_key", &redact_secret(config.llm.api_key.as_ref()), &["TABLEBOOK_LLM_API_KEY"]);
    push(
        "llm.timeout_secs",
        &config.llm.timeout_secs.to_string(),
        &["TABLEBOOK_LLM_TIMEOUT_SECS"],
    );

    push("places.enabled", &config.places.enabled.to_string(), &["TABLEBOOK_PLACES_ENABLED"]);
    push(
        "places.api_key",
        &redact_secret(config.places.api_key.as_ref()),
        &["TABLEBOOK_PLACES_API_KEY"],
    );
    push("places.base_url", &config.places.base_url, &["TABLEBOOK_PLACES_BASE_URL"]);
    push(
        "places.max_results",
        &config.places.max_results.to_string(),
        &["TABLEBOOK_PLACES_MAX_RESULTS"],
    );

    push(
        "dialogue.confidence_threshold",
        &config.dialogue.confidence_threshold.to_string(),
        &["TABLEBOOK_DIALOGUE_CONFIDENCE_THRESHOLD"],
    );
    push(
        "dialogue.turn_timeout_secs",
        &config.dialogue.turn_timeout_secs.to_string(),
        &["TABLEBOOK_DIALOGUE_TURN_TIMEOUT_SECS"],
    );
    push(
        "dialogue.response_seed",
        &config.dialogue.response_seed.map_or_else(|| "<unset>".to_string(), |s| s.to_string()),
        &["TABLEBOOK_DIALOGUE_RESPONSE_SEED"],
    );
    push(
        "dialogue.top_picks",
        &config.dialogue.top_picks.to_string(),
        &["TABLEBOOK_DIALOGUE_TOP_PICKS"],
    );
    push(
        "dialogue.responses_path",
        &config
            .dialogue
            .responses_path
            .as_deref()
            .map_or_else(|| "<built-in>".to_string(), |path| path.display().to_string()),
        &["TABLEBOOK_DIALOGUE_RESPONSES_PATH"],
    );

    push("speech.language", &config.speech.language, &["TABLEBOOK_SPEECH_LANGUAGE"]);
    push("speech.voice", &config.speech.voice, &["TABLEBOOK_SPEECH_VOICE"]);
    push(
        "speech.record_secs",
        &config.speech.record_secs.to_string(),
        &["TABLEBOOK_SPEECH_RECORD_SECS"],
    );
    push(
        "speech.record_command",
        &config.speech.record_command,
        &["TABLEBOOK_SPEECH_RECORD_COMMAND"],
    );
    push(
        "speech.playback_command",
        &config.speech.playback_command,
        &["TABLEBOOK_SPEECH_PLAYBACK_COMMAND"],
    );
    push("speech.transcription_model", &config.speech.transcription_model, &[]);
    push("speech.tts_model", &config.speech.tts_model, &[]);

    push(
        "logging.level",
        &config.logging.level,
        &["TABLEBOOK_LOGGING_LEVEL", "TABLEBOOK_LOG_LEVEL"],
    );
    push(
        "logging.format",
        &format!("{:?}", config.logging.format),
        &["TABLEBOOK_LOGGING_FORMAT", "TABLEBOOK_LOG_FORMAT"],
    );

    lines.join("\n")
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(secret: Option<&SecretString>) -> String {
    let Some(secret) = secret else {
        return "<unset>".to_string();
    };

    let trimmed = secret.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
