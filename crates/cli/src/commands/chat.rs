use std::fs;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tablebook_agent::{
    ChatCompletionsClient, Collaborators, ConsoleSpeech, DialogueRuntime, IntentRecognizer,
    LlmClient, LlmIntentRecognizer, LlmRestaurantAdvisor, PlacesTextSearch, RestaurantAdvisor,
    RestaurantSearch, RuntimeSettings, SessionSummary, SpeechChannel, VoiceSpeech,
};
use tablebook_core::config::{AppConfig, DialogueConfig, LoadOptions};
use tablebook_core::dialogue::{ResponseCatalog, ResponseGenerator};
use tablebook_db::connection::connect_from_config;
use tablebook_db::migrations;
use tablebook_db::repositories::{BookingRepository, SqlBookingRepository};

use crate::commands::CommandResult;

type Failure = (&'static str, String, u8);

pub fn run(debug: bool, options: LoadOptions) -> CommandResult {
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };
    crate::logging::init(&config.logging);

    let responses = match build_responses(&config.dialogue) {
        Ok(responses) => responses,
        Err(error) => {
            return CommandResult::failure("chat", "config_validation", format!("{error:#}"), 2);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_from_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let repository: Arc<dyn BookingRepository> =
            Arc::new(SqlBookingRepository::new(pool.clone()));
        let collaborators = build_collaborators(&config, repository)
            .map_err(|error| ("integration_setup", format!("{error:#}"), 6u8))?;
        let speech = open_speech(&config, debug)
            .map_err(|error| ("integration_setup", format!("{error:#}"), 6u8))?;

        let mode = if debug { "console" } else { "voice" };
        tracing::info!(
            event_name = "cli.chat.started",
            mode = mode,
            places_search = config.places.enabled,
            llm_model = %config.llm.model,
            "starting booking conversation"
        );
        let mut dialogue = DialogueRuntime::new(
            collaborators,
            responses,
            RuntimeSettings::from_config(&config.dialogue),
        );
        let finished = tokio::select! {
            summary = dialogue.run(speech.as_ref()) => Some(summary),
            _ = tokio::signal::ctrl_c() => None,
        };
        pool.close().await;

        match finished {
            Some(Ok(summary)) => Ok::<SessionSummary, Failure>(summary),
            Some(Err(error)) => Err((error.error_class(), error.to_string(), 7u8)),
            None => Err(("interrupted", "conversation interrupted".to_string(), 130u8)),
        }
    });

    match result {
        Ok(summary) => report(summary),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("chat", error_class, message, exit_code)
        }
    }
}

/// Reply variants, read from `dialogue.responses_path` when configured.
pub fn build_responses(config: &DialogueConfig) -> anyhow::Result<ResponseGenerator> {
    let catalog = match &config.responses_path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("reading responses file `{}`", path.display()))?;
            ResponseCatalog::from_json_str(&raw)
                .with_context(|| format!("parsing responses file `{}`", path.display()))?
        }
        None => ResponseCatalog::default(),
    };
    Ok(ResponseGenerator::new(catalog, config.response_seed))
}

/// Wires the language model, the session store and, when places search is
/// enabled, the restaurant lookup.
pub fn build_collaborators(
    config: &AppConfig,
    repository: Arc<dyn BookingRepository>,
) -> anyhow::Result<Collaborators> {
    let llm: Arc<dyn LlmClient> = Arc::new(
        ChatCompletionsClient::from_config(&config.llm).context("building llm client")?,
    );
    let recognizer: Arc<dyn IntentRecognizer> =
        Arc::new(LlmIntentRecognizer::new(llm.clone(), config.dialogue.confidence_threshold));

    let (search, advisor) = if config.places.enabled {
        let search = PlacesTextSearch::from_config(
            &config.places,
            Duration::from_secs(config.llm.timeout_secs),
        )
        .context("building places search")?;
        let search: Arc<dyn RestaurantSearch> = Arc::new(search);
        let advisor: Arc<dyn RestaurantAdvisor> = Arc::new(LlmRestaurantAdvisor::new(llm));
        (Some(search), Some(advisor))
    } else {
        (None, None)
    };

    Ok(Collaborators { recognizer, repository, search, advisor })
}

fn open_speech(config: &AppConfig, debug: bool) -> anyhow::Result<Box<dyn SpeechChannel>> {
    if debug {
        return Ok(Box::new(ConsoleSpeech::stdio()));
    }

    let voice = VoiceSpeech::from_config(
        &config.speech,
        &config.llm,
        Duration::from_secs(config.llm.timeout_secs),
    )
    .context("opening voice channel (use --debug for the text console)")?;
    Ok(Box::new(voice))
}

fn report(summary: SessionSummary) -> CommandResult {
    let outcome = summary.outcome.map_or("unfinished", |outcome| outcome.as_str());
    let message = match summary.accuracy_ratio {
        Some(ratio) => format!(
            "session {} {outcome} after {} turns (accuracy {:.2})",
            summary.session_id, summary.turn_count, ratio
        ),
        None => {
            format!("session {} {outcome} after {} turns", summary.session_id, summary.turn_count)
        }
    };
    CommandResult::success_with_report("chat", message, serde_json::to_value(&summary).ok())
}
