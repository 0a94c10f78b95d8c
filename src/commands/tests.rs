use super::*;
use crate::core::dispatcher::BufferSink;
use crate::utils::test_utils::create_test_app;
use std::fs;
use tempfile::tempdir;

async fn app_with_turns(dir: &std::path::Path, turns: usize) -> ChatApp {
    let mut app = create_test_app(dir);
    for i in 1..=turns {
        app.submit(&format!("question {i}"), &mut BufferSink::default())
            .await
            .unwrap();
    }
    app
}

fn message(result: CommandResult) -> String {
    match result {
        CommandResult::Continue(message) => message,
        other => panic!("expected a message, got {other:?}"),
    }
}

#[test]
fn plain_text_is_a_message() {
    let dir = tempdir().unwrap();
    let mut app = create_test_app(dir.path());

    assert_eq!(
        process_input(&mut app, "hello /help"),
        CommandResult::ProcessAsMessage("hello /help".to_string())
    );
    assert_eq!(
        process_input(&mut app, "/unknown thing"),
        CommandResult::ProcessAsMessage("/unknown thing".to_string())
    );
    assert_eq!(
        process_input(&mut app, "/"),
        CommandResult::ProcessAsMessage("/".to_string())
    );
}

#[test]
fn help_lists_every_command() {
    let dir = tempdir().unwrap();
    let mut app = create_test_app(dir.path());
    let help = message(process_input(&mut app, "/HELP"));

    for command in all_commands() {
        assert!(help.contains(command.usage), "missing {}", command.usage);
    }
}

#[test]
fn commands_without_arguments_open_pickers() {
    let dir = tempdir().unwrap();
    let mut app = create_test_app(dir.path());

    assert_eq!(process_input(&mut app, "/model"), CommandResult::OpenModelPicker);
    assert_eq!(
        process_input(&mut app, "/provider"),
        CommandResult::OpenProviderPicker
    );
    assert_eq!(process_input(&mut app, "/models"), CommandResult::OpenCatalogPicker);
    assert_eq!(process_input(&mut app, "/rewind"), CommandResult::OpenRewindPicker);
    assert_eq!(process_input(&mut app, "/quit"), CommandResult::Quit);
    assert_eq!(process_input(&mut app, "/exit"), CommandResult::Quit);
}

#[tokio::test]
async fn rewind_with_index_truncates_history() {
    let dir = tempdir().unwrap();
    let mut app = app_with_turns(dir.path(), 3).await;

    let text = message(process_input(&mut app, "/rewind 2"));
    assert!(text.contains("2 turn(s) kept"), "{text}");
    assert_eq!(app.conversation().turn_count(), 2);
    assert_eq!(app.conversation().messages().len(), 5);

    let text = message(process_input(&mut app, "/rewind 9"));
    assert!(text.starts_with("Rewind error"), "{text}");
    assert_eq!(app.conversation().turn_count(), 2);

    let text = message(process_input(&mut app, "/rewind two"));
    assert_eq!(text, "Usage: /rewind [N]");
}

#[tokio::test]
async fn history_and_clear() {
    let dir = tempdir().unwrap();
    let mut app = app_with_turns(dir.path(), 2).await;

    let history = message(process_input(&mut app, "/history"));
    assert_eq!(history.lines().count(), 2);
    assert!(history.lines().next().unwrap().starts_with("1."));
    assert!(history.contains("question 2"));

    assert_eq!(
        message(process_input(&mut app, "/clear")),
        "Conversation cleared."
    );
    assert_eq!(message(process_input(&mut app, "/history")), "No turns yet.");
}

#[test]
fn model_and_provider_switching() {
    let dir = tempdir().unwrap();
    let mut app = create_test_app(dir.path());

    let text = message(process_input(&mut app, "/model gpt-4.1"));
    assert_eq!(text, "Model set to gpt-4.1");
    assert_eq!(app.model(), "gpt-4.1");

    let text = message(process_input(&mut app, "/provider mistral"));
    assert!(text.contains("MISTRAL_API_KEY"), "{text}");
    assert_eq!(app.connection().provider_id, "openai");

    let text = message(process_input(&mut app, "/provider groq llama-3.1-8b-instant"));
    assert!(text.starts_with("Switched to"), "{text}");
    assert_eq!(app.connection().provider_id, "groq");
    assert_eq!(app.model(), "llama-3.1-8b-instant");
}

#[tokio::test]
async fn save_writes_a_session_file() {
    let dir = tempdir().unwrap();
    let mut app = app_with_turns(dir.path(), 1).await;

    let text = message(process_input(&mut app, "/save"));
    assert!(text.starts_with("Session saved to"), "{text}");

    let saved = app.sessions().unwrap().load_latest().unwrap();
    assert_eq!(saved.messages.len(), 3);
    assert_eq!(saved.messages[2].content, "echo: question 1");
}

#[tokio::test]
async fn log_command_sets_file_and_toggles() {
    let dir = tempdir().unwrap();
    let mut app = create_test_app(dir.path());
    let log_path = dir.path().join("chat.log");

    let text = message(process_input(&mut app, "/log"));
    assert!(text.starts_with("Log error"), "{text}");

    let text = message(process_input(
        &mut app,
        &format!("/log {}", log_path.display()),
    ));
    assert!(text.starts_with("Logging enabled"), "{text}");

    app.submit("logged", &mut BufferSink::default()).await.unwrap();
    let text = message(process_input(&mut app, "/log"));
    assert!(text.starts_with("Logging paused"), "{text}");

    let contents = fs::read_to_string(&log_path).unwrap();
    assert!(contents.starts_with("You: logged\n\necho: logged\n\n"));

}

#[tokio::test]
async fn log_file_name_may_contain_spaces() {
    let dir = tempdir().unwrap();
    let mut app = create_test_app(dir.path());
    let log_path = dir.path().join("my chat.txt");

    let text = message(process_input(
        &mut app,
        &format!("/log {}", log_path.display()),
    ));
    assert!(text.starts_with("Logging enabled"), "{text}");

    app.submit("spaced", &mut BufferSink::default()).await.unwrap();
    let contents = fs::read_to_string(&log_path).unwrap();
    assert!(contents.starts_with("You: spaced\n\necho: spaced\n\n"));
}

#[test]
fn matching_commands_complete_prefixes() {
    let names: Vec<_> = matching_commands("/mo").iter().map(|c| c.name).collect();
    assert_eq!(names, vec!["model", "models"]);
    assert!(matching_commands("zz").is_empty());
}

#[test]
fn help_with_prefix_narrows_the_list() {
    let dir = tempdir().unwrap();
    let mut app = create_test_app(dir.path());

    let help = message(process_input(&mut app, "/help re"));
    assert!(help.contains("/rewind [N]"));
    assert!(!help.contains("/save"));

    let help = message(process_input(&mut app, "/help zz"));
    assert_eq!(help, "No command starts with 'zz'.");
}
