use super::CommandResult;
use crate::core::app::ChatApp;

pub type CommandHandler = fn(&mut ChatApp, CommandInvocation<'_>) -> CommandResult;

pub struct Command {
    pub name: &'static str,
    pub usage: &'static str,
    pub help: &'static str,
    pub handler: CommandHandler,
}

#[derive(Clone, Copy)]
pub struct CommandInvocation<'a> {
    /// Everything after the command name, trimmed.
    pub args: &'a str,
}

pub fn all_commands() -> &'static [Command] {
    COMMANDS
}

pub fn find_command(name: &str) -> Option<&'static Command> {
    all_commands().iter().find(|command| {
        command.name.eq_ignore_ascii_case(name)
            || (command.name == "quit" && name.eq_ignore_ascii_case("exit"))
    })
}

/// Commands whose name starts with `prefix`, for completion hints.
pub fn matching_commands(prefix: &str) -> Vec<&'static Command> {
    let prefix = prefix.trim_start_matches('/').to_ascii_lowercase();
    all_commands()
        .iter()
        .filter(|command| command.name.starts_with(&prefix))
        .collect()
}

const COMMANDS: &[Command] = &[
    Command {
        name: "help",
        usage: "/help [PREFIX]",
        help: "Show available commands, or those starting with PREFIX.",
        handler: super::handle_help,
    },
    Command {
        name: "clear",
        usage: "/clear",
        help: "Start a new conversation with the same provider and model.",
        handler: super::handle_clear,
    },
    Command {
        name: "history",
        usage: "/history",
        help: "List the turns of this conversation.",
        handler: super::handle_history,
    },
    Command {
        name: "rewind",
        usage: "/rewind [N]",
        help: "Keep turns 1..=N and drop the rest; without N, pick a turn.",
        handler: super::handle_rewind,
    },
    Command {
        name: "model",
        usage: "/model [NAME]",
        help: "Switch model, or pick one from the provider's catalog.",
        handler: super::handle_model,
    },
    Command {
        name: "provider",
        usage: "/provider [ID]",
        help: "Switch provider, or pick one from the list.",
        handler: super::handle_provider,
    },
    Command {
        name: "models",
        usage: "/models",
        help: "Pick any model from every configured provider.",
        handler: super::handle_models,
    },
    Command {
        name: "save",
        usage: "/save",
        help: "Save the conversation as a session.",
        handler: super::handle_save,
    },
    Command {
        name: "log",
        usage: "/log [FILE]",
        help: "Toggle the transcript log or set its file.",
        handler: super::handle_log,
    },
    Command {
        name: "quit",
        usage: "/quit",
        help: "Leave the chat (also /exit).",
        handler: super::handle_quit,
    },
];
