//! Command-line interface parsing and handling
//!
//! This module parses command-line arguments and dispatches to the chat
//! loop, the listing commands, `say`, and the `set`/`unset` settings editor.

pub mod chat;
pub mod model_list;
pub mod provider_list;
pub mod say;
pub mod settings;
pub mod terminal;

use std::error::Error;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::cli::chat::{run_chat, ChatOptions};
use crate::cli::model_list::{list_all_models, list_models};
use crate::cli::provider_list::list_providers;
use crate::cli::say::run_say;
use crate::cli::settings::{apply_set, apply_unset};
use crate::core::catalog::{CatalogSource, HttpCatalogSource};
use crate::core::config::{Config, SessionSettings};
use crate::core::providers::{EnvCredentials, ProviderError};
use crate::core::session::SessionStore;
use crate::logging::{default_level, init_tracing};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("VERGEN_GIT_DESCRIBE"),
    ")"
);

#[derive(Parser)]
#[command(name = "palaver")]
#[command(version = VERSION)]
#[command(about = "A terminal chat client for OpenAI-compatible providers")]
#[command(
    long_about = "Palaver is a line-oriented terminal chat client that talks to many providers \
exposing an OpenAI-compatible API. Replies stream as they arrive, except for reasoning models \
which are answered in one piece. Conversations can be rewound and, when sessions are enabled, \
saved and resumed.\n\n\
Credentials:\n\
  Each provider reads its key from one environment variable (e.g. OPENAI_API_KEY).\n\
  Run 'palaver providers' to see which ones are set.\n\n\
Environment Variables:\n\
  PALAVER_CONFIG    Use this config file instead of the default location\n\
  PALAVER_LOG       Diagnostic log filter, e.g. 'debug' or 'palaver=trace'\n\n\
Controls:\n\
  Enter             Send the message\n\
  Ctrl+C            Interrupt the reply; at the prompt, quit\n\
  Ctrl+D            Quit\n\n\
Commands:\n\
  /help             List chat commands\n\
  /rewind [N]       Go back to an earlier turn\n\
  /models           Pick a model from every provider\n\
  /log <filename>   Enable logging to specified file"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Provider to use, or list available providers if no provider specified
    #[arg(short = 'p', long, global = true, value_name = "PROVIDER", num_args = 0..=1, default_missing_value = "")]
    pub provider: Option<String>,

    /// Model to use for chat, or list available models if no model specified
    #[arg(short = 'm', long, global = true, value_name = "MODEL", num_args = 0..=1, default_missing_value = "")]
    pub model: Option<String>,

    /// Pick the model from the catalogs of every provider
    #[arg(short = 'a', long)]
    pub all_models: bool,

    /// Resume the most recent saved session
    #[arg(short = 'c', long = "continue", conflicts_with = "search")]
    pub continue_last: bool,

    /// Pick a saved session whose transcript matches QUERY
    #[arg(short = 's', long, value_name = "QUERY")]
    pub search: Option<String>,

    /// Match --search case-sensitively and literally
    #[arg(long, requires = "search")]
    pub exact: bool,

    /// Delete every saved session and exit
    #[arg(long)]
    pub clear_sessions: bool,

    /// Enable logging to specified file
    #[arg(short = 'l', long, global = true)]
    pub log: Option<String>,

    /// Show debug diagnostics on stderr
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the interactive chat (default)
    Chat,
    /// Send a single prompt and print the reply
    Say {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },
    /// List the models of a provider
    Models {
        /// Query every provider that has credentials
        #[arg(long)]
        all: bool,
    },
    /// List known providers and whether their credentials are set
    Providers,
    /// Set configuration values
    Set {
        /// Configuration key to set
        key: Option<String>,
        /// Value to set for the key (can be multiple words)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Unset configuration values
    Unset {
        /// Configuration key to unset
        key: String,
        /// Value to unset for the key (optional)
        value: Option<String>,
    },
}

/// Provider, model and transcript log chosen on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatTargets {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub log_file: Option<String>,
}

impl Args {
    /// Values given to `-p`/`-m`, ignoring the bare-flag listing form.
    pub fn targets(&self) -> ChatTargets {
        ChatTargets {
            provider: self.provider.clone().filter(|p| !p.is_empty()),
            model: self.model.clone().filter(|m| !m.is_empty()),
            log_file: self.log.clone(),
        }
    }
}

/// Report a startup failure and exit. Provider problems get their hint and
/// exit code; anything else exits with 1.
pub fn exit_on_provider_error(err: Box<dyn Error>) -> ! {
    match err.downcast_ref::<ProviderError>() {
        Some(provider_err) => {
            eprintln!("{provider_err}");
            if let Some(hint) = provider_err.hint() {
                eprintln!();
                eprintln!("  {hint}");
            }
            std::process::exit(provider_err.exit_code());
        }
        None => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    }
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(Some(default_level(args.verbose)));

    let config = Config::load()?;
    let catalog: Arc<dyn CatalogSource> = Arc::new(HttpCatalogSource::default());
    let targets = args.targets();

    match args.command.unwrap_or(Commands::Chat) {
        Commands::Say { prompt } => run_say(prompt, config, targets).await,
        Commands::Models { all: true } => list_all_models(&config, &EnvCredentials, catalog).await,
        Commands::Models { all: false } => {
            list_models(&config, &EnvCredentials, catalog, targets.provider).await
        }
        Commands::Providers => list_providers(&config, &EnvCredentials),
        Commands::Set { key, value } => {
            let Some(key) = key else {
                config.print_all();
                return Ok(());
            };
            let mut config = config;
            match apply_set(&mut config, &key, &value) {
                Ok(message) => {
                    config.save()?;
                    println!("{message}");
                    Ok(())
                }
                Err(err) => {
                    eprintln!("{err}");
                    std::process::exit(1);
                }
            }
        }
        Commands::Unset { key, value } => {
            let mut config = config;
            match apply_unset(&mut config, &key, value.as_deref()) {
                Ok(message) => {
                    config.save()?;
                    println!("{message}");
                    Ok(())
                }
                Err(err) => {
                    eprintln!("{err}");
                    std::process::exit(1);
                }
            }
        }
        Commands::Chat => {
            if args.clear_sessions {
                return clear_sessions(&config.sessions);
            }
            // A bare -p or -m lists instead of chatting.
            if args.provider.as_deref() == Some("") {
                return list_providers(&config, &EnvCredentials);
            }
            if args.model.as_deref() == Some("") {
                return list_models(&config, &EnvCredentials, catalog, targets.provider).await;
            }
            run_chat(
                config,
                ChatOptions {
                    targets,
                    continue_last: args.continue_last,
                    search: args.search,
                    exact: args.exact,
                    all_models: args.all_models,
                },
            )
            .await
        }
    }
}

fn clear_sessions(settings: &SessionSettings) -> Result<(), Box<dyn Error>> {
    // Clearing works even with persistence switched off, so old files can
    // still be removed.
    let store = match SessionStore::from_settings(&SessionSettings {
        enabled: true,
        ..settings.clone()
    })? {
        Some(store) => store,
        None => return Ok(()),
    };
    let removed = store.clear_all()?;
    println!("Removed {removed} saved session(s).");
    Ok(())
}
