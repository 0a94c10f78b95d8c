//! The interactive line loop.

use std::error::Error;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

use tokio::task::block_in_place;
use tracing::debug;

use crate::api::models::sort_models;
use crate::cli::terminal::{LineTerminal, TerminalSink};
use crate::cli::{exit_on_provider_error, ChatTargets};
use crate::commands::{process_input, rewind_message, CommandResult};
use crate::core::app::{http_transport_factory, ChatApp, ChatAppOptions, TurnOutcome};
use crate::core::catalog::{fetch_catalog, CatalogSource, HttpCatalogSource};
use crate::core::chooser::Chooser;
use crate::core::config::Config;
use crate::core::dispatcher::{describe_dispatch_error, DispatchError, ReplySink, RequestState};
use crate::core::interrupt::spawn_interrupt_listener;
use crate::core::providers::{EnvCredentials, ProviderError};
use crate::core::session::SessionError;

#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub targets: ChatTargets,
    pub continue_last: bool,
    pub search: Option<String>,
    pub exact: bool,
    pub all_models: bool,
}

pub async fn run_chat(config: Config, options: ChatOptions) -> Result<(), Box<dyn Error>> {
    let state = RequestState::new();
    let mut app = ChatApp::new(
        config,
        Arc::new(EnvCredentials),
        ChatAppOptions {
            provider: options.targets.provider.clone(),
            model: options.targets.model.clone(),
            log_file: options.targets.log_file.clone(),
        },
        state.clone(),
        http_transport_factory(),
    )
    .unwrap_or_else(|err| exit_on_provider_error(err));

    let terminal = LineTerminal::stdio();
    let catalog: Arc<dyn CatalogSource> = Arc::new(HttpCatalogSource::default());

    if !prepare_session(&mut app, &terminal, Arc::clone(&catalog), &options).await? {
        return Ok(());
    }

    let _listener = spawn_interrupt_listener(state, || {
        eprintln!();
        std::process::exit(130);
    });

    terminal.say(&format!(
        "Chatting with {} using {}. /help for commands, Ctrl-C interrupts a reply or exits.",
        app.connection().display_name,
        app.model()
    ))?;
    if app.logging().is_active() {
        terminal.say(&format!("Transcript log: {}", app.logging().get_status_string()))?;
    }
    let mut sink = TerminalSink::stdout();
    run_loop(&mut app, &terminal, catalog, &mut sink).await?;
    Ok(())
}

/// Apply `-c`, `-s` and `-a`. Returns `false` when the user backed out of
/// a startup picker and there is nothing to chat about.
async fn prepare_session<R: BufRead, W: Write>(
    app: &mut ChatApp,
    terminal: &LineTerminal<R, W>,
    catalog: Arc<dyn CatalogSource>,
    options: &ChatOptions,
) -> Result<bool, Box<dyn Error>> {
    if options.continue_last || options.search.is_some() {
        let Some(store) = app.sessions().cloned() else {
            terminal.say("Sessions are disabled. Enable them with: palaver set sessions on")?;
            return Ok(false);
        };
        let loaded = if options.continue_last {
            store.load_latest().map(Some)
        } else {
            block_in_place(|| store.choose(terminal, options.search.as_deref(), options.exact))
        };
        match loaded {
            Ok(Some(session)) => {
                let turns = session.turn_count();
                app.restore(session)?;
                terminal.say(&format!("Resumed a session with {turns} turn(s)."))?;
            }
            Ok(None) => return Ok(false),
            Err(SessionError::NotFound) => {
                terminal.say("No saved sessions found; starting a new one.")?;
            }
            Err(err) => return Err(err.into()),
        }
    }

    if options.all_models {
        let message = pick_from_catalog(app, terminal, catalog).await?;
        terminal.say(&message)?;
    }
    Ok(true)
}

pub async fn run_loop<R: BufRead, W: Write>(
    app: &mut ChatApp,
    terminal: &LineTerminal<R, W>,
    catalog: Arc<dyn CatalogSource>,
    sink: &mut dyn ReplySink,
) -> io::Result<()> {
    loop {
        let prompt = format!("{}/{}> ", app.connection().provider_id, app.model());
        let Some(line) = block_in_place(|| terminal.read_line(&prompt))? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let message = match process_input(app, &line) {
            CommandResult::Continue(message) => message,
            CommandResult::ProcessAsMessage(text) => match send_turn(app, &text, sink).await {
                Some(message) => message,
                None => continue,
            },
            CommandResult::OpenModelPicker => pick_model(app, terminal, catalog.as_ref()).await?,
            CommandResult::OpenProviderPicker => {
                pick_provider(app, terminal, catalog.as_ref()).await?
            }
            CommandResult::OpenCatalogPicker => {
                pick_from_catalog(app, terminal, Arc::clone(&catalog)).await?
            }
            CommandResult::OpenRewindPicker => pick_rewind(app, terminal)?,
            CommandResult::Quit => break,
        };
        terminal.say(&message)?;
    }
    Ok(())
}

/// Submit one turn. Returns a note to show, if any.
async fn send_turn(app: &mut ChatApp, text: &str, sink: &mut dyn ReplySink) -> Option<String> {
    match app.submit(text, sink).await {
        Ok(TurnOutcome::Completed(reply)) => {
            debug!(mode = %reply.mode, chars = reply.text.len(), "turn completed");
            None
        }
        Ok(TurnOutcome::Partial(_)) => Some("[interrupted; partial reply kept]".to_string()),
        Ok(TurnOutcome::Discarded) | Err(DispatchError::Interrupted) => {
            Some("[interrupted]".to_string())
        }
        Err(err) => Some(format!("Error: {}", describe_dispatch_error(&err))),
    }
}

async fn pick_model<R: BufRead, W: Write>(
    app: &mut ChatApp,
    terminal: &LineTerminal<R, W>,
    catalog: &dyn CatalogSource,
) -> io::Result<String> {
    let provider = app.connection().provider_id.clone();
    let Some(model) = choose_model(app, terminal, catalog, &provider).await? else {
        return Ok("Model unchanged.".to_string());
    };
    app.switch_model(&model);
    Ok(format!("Model set to {model}"))
}

async fn choose_model<R: BufRead, W: Write>(
    app: &ChatApp,
    terminal: &LineTerminal<R, W>,
    catalog: &dyn CatalogSource,
    provider: &str,
) -> io::Result<Option<String>> {
    let mut models =
        match fetch_catalog(app.registry(), app.credentials(), catalog, provider).await {
            Ok(models) => models,
            Err(err) => {
                terminal.say(&format!("Could not list models: {err}"))?;
                return Ok(None);
            }
        };
    sort_models(&mut models);
    let picked = block_in_place(|| terminal.select("Select a model", &models))?;
    Ok(picked.and_then(|index| models.get(index).cloned()))
}

async fn pick_provider<R: BufRead, W: Write>(
    app: &mut ChatApp,
    terminal: &LineTerminal<R, W>,
    catalog: &dyn CatalogSource,
) -> io::Result<String> {
    let statuses = app.registry().statuses(app.credentials());
    let labels: Vec<String> = statuses
        .iter()
        .map(|status| {
            let note = if status.has_credential {
                ""
            } else {
                "  (no key)"
            };
            format!("{}  {}{note}", status.id, status.display_name)
        })
        .collect();
    let Some(index) = block_in_place(|| terminal.select("Select a provider", &labels))? else {
        return Ok("Provider unchanged.".to_string());
    };
    let id = statuses[index].id.clone();

    let candidates = match app.registry().candidates(&id) {
        Ok(candidates) => candidates.to_vec(),
        Err(err) => return Ok(format!("Provider error: {err}")),
    };
    let multi_region = app
        .registry()
        .get(&id)
        .is_ok_and(|provider| provider.is_multi_region());
    if multi_region {
        let Some(region) = block_in_place(|| terminal.select("Select a region", &candidates))?
        else {
            return Ok("Provider unchanged.".to_string());
        };
        if let Err(err) = app.pin_base_url(&id, &candidates[region]) {
            return Ok(format!("Provider error: {err}"));
        }
    }

    let model = if app.registry().default_model(&id, app.config()).is_some() {
        None
    } else {
        match choose_model(app, terminal, catalog, &id).await? {
            Some(model) => Some(model),
            None => return Ok("Provider unchanged.".to_string()),
        }
    };

    Ok(match app.switch_provider(&id, model.as_deref()) {
        Ok(()) => format!(
            "Switched to {} using {}",
            app.connection().display_name,
            app.model()
        ),
        Err(err) => describe_provider_error(&err),
    })
}

async fn pick_from_catalog<R: BufRead, W: Write>(
    app: &mut ChatApp,
    terminal: &LineTerminal<R, W>,
    catalog: Arc<dyn CatalogSource>,
) -> io::Result<String> {
    let mut entries = match app.all_models(catalog).await {
        Ok(entries) => entries,
        Err(err) => return Ok(format!("Could not list models: {err}")),
    };
    entries.sort();
    let labels: Vec<String> = entries.iter().map(|entry| entry.tag()).collect();
    let Some(index) = block_in_place(|| terminal.select("Select provider|model", &labels))? else {
        return Ok("Model unchanged.".to_string());
    };

    let selection = match app.selection_for(&entries[index]) {
        Ok(selection) => selection,
        Err(err) => return Ok(describe_provider_error(&err)),
    };
    Ok(match app.apply_selection(&selection) {
        Ok(()) => format!("Switched to {} using {}", selection.provider, selection.model),
        Err(err) => describe_provider_error(&err),
    })
}

fn pick_rewind<R: BufRead, W: Write>(
    app: &mut ChatApp,
    terminal: &LineTerminal<R, W>,
) -> io::Result<String> {
    let labels: Vec<String> = app
        .conversation()
        .history()
        .iter()
        .enumerate()
        .skip(1)
        .map(|(index, entry)| entry.label(index))
        .collect();
    if labels.is_empty() {
        return Ok("No turns to rewind to.".to_string());
    }
    let Some(position) = block_in_place(|| terminal.select("Rewind to turn", &labels))? else {
        return Ok("Rewind cancelled.".to_string());
    };
    // History index 0 is the sentinel, so list position N is turn N + 1.
    Ok(rewind_message(app, position + 1))
}

fn describe_provider_error(err: &ProviderError) -> String {
    match err.hint() {
        Some(hint) => format!("Provider error: {err}\n  {hint}"),
        None => format!("Provider error: {err}"),
    }
}
