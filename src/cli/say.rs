//! One-shot `say` command: send a prompt, print the reply, exit.

use std::error::Error;
use std::sync::Arc;

use crate::cli::terminal::TerminalSink;
use crate::cli::{exit_on_provider_error, ChatTargets};
use crate::core::app::{http_transport_factory, ChatApp, ChatAppOptions, TurnOutcome};
use crate::core::config::Config;
use crate::core::dispatcher::{describe_dispatch_error, DispatchError, RequestState};
use crate::core::interrupt::spawn_interrupt_listener;
use crate::core::providers::EnvCredentials;

pub async fn run_say(
    prompt: Vec<String>,
    mut config: Config,
    targets: ChatTargets,
) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        eprintln!("Usage: palaver say <prompt>");
        std::process::exit(1);
    }

    // One-shot prompts are never persisted.
    config.sessions.enabled = false;

    let state = RequestState::new();
    let mut app = ChatApp::new(
        config,
        Arc::new(EnvCredentials),
        ChatAppOptions {
            provider: targets.provider,
            model: targets.model,
            log_file: targets.log_file,
        },
        state.clone(),
        http_transport_factory(),
    )
    .unwrap_or_else(|err| exit_on_provider_error(err));

    let listener = spawn_interrupt_listener(state, || std::process::exit(130));
    let mut sink = TerminalSink::stdout();
    let result = app.submit(&prompt, &mut sink).await;
    listener.abort();

    match result {
        Ok(TurnOutcome::Completed(_)) => Ok(()),
        Ok(TurnOutcome::Partial(_) | TurnOutcome::Discarded) | Err(DispatchError::Interrupted) => {
            eprintln!("Interrupted.");
            std::process::exit(130);
        }
        Err(err) => {
            eprintln!("Error: {}", describe_dispatch_error(&err));
            std::process::exit(1);
        }
    }
}
