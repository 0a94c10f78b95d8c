mod registry;

pub use registry::{all_commands, matching_commands, CommandInvocation};

use crate::core::app::ChatApp;
use crate::core::config::path_display;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Handled; show the message.
    Continue(String),
    ProcessAsMessage(String),
    OpenModelPicker,
    OpenProviderPicker,
    OpenCatalogPicker,
    OpenRewindPicker,
    Quit,
}

pub fn process_input(app: &mut ChatApp, input: &str) -> CommandResult {
    let trimmed = input.trim();

    let Some(rest) = trimmed.strip_prefix('/') else {
        return CommandResult::ProcessAsMessage(input.to_string());
    };

    let mut parts = rest.splitn(2, char::is_whitespace);
    let command_name = match parts.next() {
        Some(name) if !name.is_empty() => name,
        _ => return CommandResult::ProcessAsMessage(input.to_string()),
    };
    let args = parts.next().unwrap_or("").trim();

    match registry::find_command(command_name) {
        Some(command) => {
            let invocation = CommandInvocation { args };
            (command.handler)(app, invocation)
        }
        None => CommandResult::ProcessAsMessage(input.to_string()),
    }
}

pub(super) fn handle_help(_app: &mut ChatApp, invocation: CommandInvocation<'_>) -> CommandResult {
    let commands = matching_commands(invocation.args);
    if commands.is_empty() {
        return CommandResult::Continue(format!("No command starts with '{}'.", invocation.args));
    }
    let width = commands
        .iter()
        .map(|command| command.usage.len())
        .max()
        .unwrap_or(0);
    let lines: Vec<String> = commands
        .iter()
        .map(|command| format!("  {:width$}  {}", command.usage, command.help))
        .collect();
    CommandResult::Continue(format!(
        "Commands:\n{}\nCtrl-C interrupts a reply; at the prompt it exits.",
        lines.join("\n")
    ))
}

pub(super) fn handle_clear(app: &mut ChatApp, _invocation: CommandInvocation<'_>) -> CommandResult {
    app.clear();
    CommandResult::Continue("Conversation cleared.".to_string())
}

pub(super) fn handle_history(
    app: &mut ChatApp,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    let history = app.conversation().history();
    if history.len() <= 1 {
        return CommandResult::Continue("No turns yet.".to_string());
    }
    let lines: Vec<String> = history
        .iter()
        .enumerate()
        .skip(1)
        .map(|(index, entry)| entry.label(index))
        .collect();
    CommandResult::Continue(lines.join("\n"))
}

pub(super) fn handle_rewind(app: &mut ChatApp, invocation: CommandInvocation<'_>) -> CommandResult {
    if invocation.args.is_empty() {
        return CommandResult::OpenRewindPicker;
    }
    let Ok(index) = invocation.args.parse::<usize>() else {
        return CommandResult::Continue("Usage: /rewind [N]".to_string());
    };
    CommandResult::Continue(rewind_message(app, index))
}

/// Apply a rewind and describe the result.
pub fn rewind_message(app: &mut ChatApp, index: usize) -> String {
    match app.rewind_to(index) {
        Ok(()) => format!(
            "Rewound to turn {index}; {} turn(s) kept.",
            app.conversation().turn_count()
        ),
        Err(err) => format!("Rewind error: {err}"),
    }
}

pub(super) fn handle_model(app: &mut ChatApp, invocation: CommandInvocation<'_>) -> CommandResult {
    if invocation.args.is_empty() {
        return CommandResult::OpenModelPicker;
    }
    app.switch_model(invocation.args);
    CommandResult::Continue(format!("Model set to {}", app.model()))
}

pub(super) fn handle_provider(
    app: &mut ChatApp,
    invocation: CommandInvocation<'_>,
) -> CommandResult {
    if invocation.args.is_empty() {
        return CommandResult::OpenProviderPicker;
    }
    let mut words = invocation.args.split_whitespace();
    let provider = words.next().unwrap_or_default();
    let model = words.next();
    match app.switch_provider(provider, model) {
        Ok(()) => CommandResult::Continue(format!(
            "Switched to {} ({}) using {}",
            app.connection().display_name,
            app.connection().base_url,
            app.model()
        )),
        Err(err) => {
            let mut message = format!("Provider error: {err}");
            if let Some(hint) = err.hint() {
                message.push_str(&format!("\n  {hint}"));
            }
            CommandResult::Continue(message)
        }
    }
}

pub(super) fn handle_models(
    _app: &mut ChatApp,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    CommandResult::OpenCatalogPicker
}

pub(super) fn handle_save(app: &mut ChatApp, _invocation: CommandInvocation<'_>) -> CommandResult {
    let message = match app.save_session() {
        Ok(Some(path)) => format!("Session saved to {}", path_display(path)),
        Ok(None) => {
            "Sessions are disabled. Enable them with: palaver set sessions on".to_string()
        }
        Err(err) => format!("Save error: {err}"),
    };
    CommandResult::Continue(message)
}

pub(super) fn handle_log(app: &mut ChatApp, invocation: CommandInvocation<'_>) -> CommandResult {
    let message = if invocation.args.is_empty() {
        match app.logging_mut().toggle_logging() {
            Ok(message) => message,
            Err(e) => format!("Log error: {e}"),
        }
    } else {
        match app.logging_mut().set_log_file(invocation.args.to_string()) {
            Ok(message) => message,
            Err(e) => format!("Logfile error: {e}"),
        }
    };
    CommandResult::Continue(message)
}

pub(super) fn handle_quit(_app: &mut ChatApp, _invocation: CommandInvocation<'_>) -> CommandResult {
    CommandResult::Quit
}

#[cfg(test)]
mod tests;
