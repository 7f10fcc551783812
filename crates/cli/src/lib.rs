pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Args, Parser, Subcommand};
use tablebook_core::config::{ConfigOverrides, LlmProvider, LoadOptions};

#[derive(Debug, Parser)]
#[command(
    name = "tablebook",
    about = "Tablebook voice booking assistant",
    long_about = "Hold a restaurant booking conversation, apply session store migrations, and inspect configuration.",
    after_help = "Examples:\n  tablebook chat --debug\n  tablebook --database-url sqlite::memory: migrate\n  tablebook config --llm-provider openai"
)]
pub struct Cli {
    #[command(flatten)]
    overrides: OverrideArgs,
    #[command(subcommand)]
    command: Command,
}

/// Command-line settings that win over env and file configuration.
#[derive(Debug, Args)]
struct OverrideArgs {
    #[arg(long, global = true, value_name = "PATH", help = "Load this config file (must exist)")]
    config: Option<PathBuf>,
    #[arg(long, global = true, value_name = "URL", help = "Override database.url")]
    database_url: Option<String>,
    #[arg(long, global = true, value_name = "LEVEL", help = "Override logging.level")]
    log_level: Option<String>,
    #[arg(
        long,
        global = true,
        value_name = "PROVIDER",
        help = "Override llm.provider (openai|ollama)"
    )]
    llm_provider: Option<LlmProvider>,
    #[arg(long, global = true, value_name = "MODEL", help = "Override llm.model")]
    llm_model: Option<String>,
    #[arg(
        long,
        global = true,
        value_name = "BOOL",
        action = ArgAction::Set,
        help = "Override places.enabled"
    )]
    places: Option<bool>,
    #[arg(long, global = true, value_name = "SEED", help = "Override dialogue.response_seed")]
    seed: Option<u64>,
}

impl OverrideArgs {
    fn into_load_options(self) -> LoadOptions {
        LoadOptions {
            require_file: self.config.is_some(),
            config_path: self.config,
            overrides: ConfigOverrides {
                database_url: self.database_url,
                log_level: self.log_level,
                llm_provider: self.llm_provider,
                llm_model: self.llm_model,
                places_enabled: self.places,
                response_seed: self.seed,
            },
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Start a booking conversation and print the session report on exit")]
    Chat {
        #[arg(long, help = "Type utterances on the console instead of using the microphone")]
        debug: bool,
    },
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.overrides.into_load_options();

    let result = match cli.command {
        Command::Chat { debug } => commands::chat::run(debug, options),
        Command::Migrate => commands::migrate::run(options),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(options) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
