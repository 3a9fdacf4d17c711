use anyhow::{Context, Result};
use chloe_core::{
    AppEvent, Assistant, CommandInvoker, Config, ConversationSession, EchoInvoker, EventBus, OpenRouterSession,
    RejectReason, ScriptedSession, SelectedMatch, ToolInvoker, TurnOutcome,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Canned prompts offered as `/1`..`/5`
const SUGGESTIONS: [&str; 5] = [
    "Review current column cards",
    "Match unmatched columns",
    "Auto-apply all AI suggestions",
    "Auto-Process & Match",
    "Fully-Auto: Review, Apply, Match, Repeat, and Download SQL",
];

#[derive(Debug, PartialEq)]
enum Command {
    Prompt(String),
    Select(SelectedMatch),
    ClearSelection,
    Clear,
    Help,
    Quit,
    Unknown(String),
}

fn parse_command(line: &str) -> Command {
    // Prompts go through as typed; only commands are trimmed
    let Some(rest) = line.trim().strip_prefix('/') else {
        return Command::Prompt(line.to_string());
    };
    let line = line.trim();

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    match name {
        "quit" | "exit" => Command::Quit,
        "clear" => Command::Clear,
        "clear-selection" => Command::ClearSelection,
        "help" => Command::Help,
        "select" => match parse_selection(arg) {
            Some(selected) => Command::Select(selected),
            None => Command::Unknown(line.to_string()),
        },
        _ => match name.parse::<usize>() {
            Ok(n) if (1..=SUGGESTIONS.len()).contains(&n) => Command::Prompt(SUGGESTIONS[n - 1].to_string()),
            _ => Command::Unknown(line.to_string()),
        },
    }
}

/// `final_name:col_a,col_b`
fn parse_selection(arg: &str) -> Option<SelectedMatch> {
    let (name, columns) = arg.split_once(':')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let columns = columns.split(',').map(str::trim).filter(|c| !c.is_empty());
    Some(SelectedMatch::new(name, columns))
}

fn print_help() {
    println!("Type a question for Chloe, or one of:");
    for (i, suggestion) in SUGGESTIONS.iter().enumerate() {
        println!("  /{}  {}", i + 1, suggestion);
    }
    println!("  /select name:col1,col2  highlight a match");
    println!("  /clear-selection        drop highlighted matches");
    println!("  /clear                  clear the conversation");
    println!("  /quit                   exit");
}

fn build_session(config: &Config) -> Result<Box<dyn ConversationSession>> {
    if config.has_provider() {
        let session = OpenRouterSession::from_config(config).context("Failed to create model session")?;
        Ok(Box::new(session))
    } else {
        println!("No OPENROUTER_API_KEY set, running with the offline demo session.");
        Ok(Box::new(ScriptedSession::new()))
    }
}

fn build_invoker(config: &Config) -> Result<Arc<dyn ToolInvoker>> {
    match &config.tool_command {
        Some(command) => {
            let invoker = CommandInvoker::new(command.clone())
                .context("Invalid CHLOE_TOOL_COMMAND")?
                .with_timeout(config.tool_timeout);
            Ok(Arc::new(invoker))
        }
        None => Ok(Arc::new(EchoInvoker)),
    }
}

fn render(event: AppEvent) {
    match event {
        AppEvent::MessageAppended(message) => println!("{}", message.formatted_content()),
        AppEvent::BusyChanged(true) => println!("Chloe is thinking..."),
        AppEvent::BusyChanged(false) | AppEvent::ToolUsed(_) => {}
        AppEvent::Cleared => println!("(conversation cleared)"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr so they never interleave with the transcript
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();
    info!("Starting Chloe CLI");

    let config = Config::from_env().context("Failed to read configuration")?;
    let session = build_session(&config)?;
    let invoker = build_invoker(&config)?;

    let event_bus = EventBus::new();
    let assistant = Arc::new(Assistant::new(session, invoker).with_events(event_bus.sender()));
    if let Some(info) = assistant.session_info() {
        info!(session = %info.name, model = ?info.model, "session ready");
    }

    let mut events = event_bus.into_receiver();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            render(event);
        }
    });

    print_help();

    let mut selection: Vec<SelectedMatch> = Vec::new();
    let mut turns: Vec<JoinHandle<()>> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut quit = false;

    while let Some(line) = lines.next_line().await? {
        turns.retain(|t| !t.is_finished());

        match parse_command(&line) {
            Command::Prompt(prompt) => {
                let assistant = assistant.clone();
                let selection = selection.clone();
                turns.push(tokio::spawn(async move {
                    match assistant.submit_prompt(&prompt, &selection).await {
                        TurnOutcome::Rejected(RejectReason::Busy) => {
                            println!("Chloe is still working on the previous request.")
                        }
                        TurnOutcome::Rejected(RejectReason::NoSession) => println!("No session is available."),
                        _ => {}
                    }
                }));
            }
            Command::Select(selected) => {
                println!("Highlighted {} ({} columns)", selected.final_name, selected.columns.len());
                selection.push(selected);
            }
            Command::ClearSelection => {
                selection.clear();
                println!("Selection cleared");
            }
            Command::Clear => {
                if !assistant.clear() {
                    println!("Can't clear while Chloe is working.");
                }
            }
            Command::Help => print_help(),
            Command::Quit => {
                quit = true;
                break;
            }
            Command::Unknown(input) => println!("Unknown command: {} (try /help)", input),
        }
    }

    // On end of input let running turns finish; on /quit abandon them
    for turn in turns {
        if quit {
            turn.abort();
        }
        let _ = turn.await;
    }
    drop(assistant);
    let _ = printer.await;

    info!("Chloe CLI shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suggestion_shortcuts() {
        assert_eq!(parse_command("/1"), Command::Prompt("Review current column cards".to_string()));
        assert_eq!(parse_command(" /5 "), Command::Prompt(SUGGESTIONS[4].to_string()));
        assert_eq!(parse_command("/6"), Command::Unknown("/6".to_string()));
    }

    #[test]
    fn test_plain_text_is_a_prompt() {
        assert_eq!(
            parse_command("  which columns are dates?  "),
            Command::Prompt("  which columns are dates?  ".to_string())
        );
        assert_eq!(parse_command("   "), Command::Prompt("   ".to_string()));
    }

    #[test]
    fn test_select_parses_columns() {
        assert_eq!(
            parse_command("/select email: email, e_mail ,"),
            Command::Select(SelectedMatch::new("email", ["email", "e_mail"]))
        );
        assert_eq!(parse_command("/select nocolon"), Command::Unknown("/select nocolon".to_string()));
        assert_eq!(parse_command("/select :a"), Command::Unknown("/select :a".to_string()));
    }

    #[test]
    fn test_control_commands() {
        assert_eq!(parse_command("/quit"), Command::Quit);
        assert_eq!(parse_command("/clear"), Command::Clear);
        assert_eq!(parse_command("/clear-selection"), Command::ClearSelection);
        assert_eq!(parse_command("/help"), Command::Help);
    }
}
