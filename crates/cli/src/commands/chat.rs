//! `mnemos chat`: interactive or single-message roleplay.

use mnemos_agent::{ConversationEngine, TurnOutcome};
use mnemos_memory::CompressionOutcome;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use super::{CommandResult, build_engine, load_config};

/// In-chat commands that manage memory instead of talking.
#[derive(Debug, PartialEq)]
enum ChatCommand<'a> {
    Exit,
    Help,
    Deep(Option<&'a str>),
    ClearShortTerm,
    ClearLongTerm,
    Compress,
    Say(&'a str),
}

fn parse_line(line: &str) -> ChatCommand<'_> {
    let line = line.trim();
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };
    match head {
        "exit" | "quit" | "/exit" | "/quit" => ChatCommand::Exit,
        "/help" => ChatCommand::Help,
        "/deep" => ChatCommand::Deep((!rest.is_empty()).then_some(rest)),
        "/clear" => ChatCommand::ClearShortTerm,
        "/forget" => ChatCommand::ClearLongTerm,
        "/compress" => ChatCommand::Compress,
        _ => ChatCommand::Say(line),
    }
}

pub async fn run(session_id: &str, message: Option<String>) -> CommandResult {
    let config = load_config()?;
    let engine = build_engine(&config)?;

    if let Some(msg) = message {
        eprint!("  Thinking...");
        let outcome = engine.send_message(session_id, &msg).await;
        eprint!("\r              \r");
        print_turn(&outcome?);
        return Ok(());
    }

    println!();
    println!("  Mnemos, interactive mode");
    println!();
    println!("  Session:   {session_id}");
    println!("  Model:     {}", config.default_model);
    println!("  Storage:   {} ({})", config.persistence.backend, config.sessions_dir().display());
    println!();
    println!("  Type your message and press Enter. /help lists memory commands.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;
    while let Some(line) = lines.next_line().await? {
        match parse_line(&line) {
            ChatCommand::Exit => break,
            ChatCommand::Say("") => {}
            ChatCommand::Say(text) => {
                eprint!("  ...");
                let outcome = engine.send_message(session_id, text).await;
                eprint!("\r     \r");
                match outcome {
                    Ok(outcome) => print_turn(&outcome),
                    Err(e) => {
                        warn!(session_id, error = %e, "Turn failed");
                        eprintln!("  [Error] {e}");
                    }
                }
            }
            command => {
                if let Err(e) = run_command(&engine, session_id, command).await {
                    eprintln!("  [Error] {e}");
                }
            }
        }
        prompt()?;
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

async fn run_command(engine: &ConversationEngine, session_id: &str, command: ChatCommand<'_>) -> CommandResult {
    match command {
        ChatCommand::Help => {
            println!("  /deep            show deep memory");
            println!("  /deep <text>     replace deep memory");
            println!("  /clear           clear short-term memory");
            println!("  /forget          clear long-term memory");
            println!("  /compress        compress long-term memory now");
        }
        ChatCommand::Deep(None) => {
            let deep = engine.deep_memory(session_id).await?;
            if deep.is_empty() {
                println!("  (deep memory is empty)");
            } else {
                println!("  {deep}");
            }
        }
        ChatCommand::Deep(Some(text)) => {
            engine.set_deep_memory(session_id, text).await?;
            println!("  Deep memory updated.");
        }
        ChatCommand::ClearShortTerm => {
            engine.clear_short_term(session_id).await?;
            println!("  Short-term memory cleared.");
        }
        ChatCommand::ClearLongTerm => {
            let dropped = engine.clear_long_term(session_id).await?;
            println!("  Forgot {dropped} long-term memories.");
        }
        ChatCommand::Compress => {
            let outcome = engine.compress_now(session_id).await?;
            println!("  {}", describe_compression(&outcome));
        }
        ChatCommand::Exit | ChatCommand::Say(_) => {}
    }
    Ok(())
}

fn prompt() -> std::io::Result<()> {
    use std::io::Write;
    print!("  You > ");
    std::io::stdout().flush()
}

fn print_turn(outcome: &TurnOutcome) {
    println!();
    for line in outcome.reply.lines() {
        println!("  {line}");
    }
    println!();
    if let Some(compression) = &outcome.compression {
        eprintln!("  [memory] {}", describe_compression(compression));
    }
    if !outcome.persisted {
        eprintln!("  [memory] session not written to disk, kept in cache");
    }
}

pub fn describe_compression(outcome: &CompressionOutcome) -> String {
    match outcome {
        CompressionOutcome::Compressed {
            memories_before,
            memories_after,
            restored_tokens,
            shrunk_profiles,
        } => format!(
            "compressed {memories_before} memories into {memories_after} (restored {restored_tokens} tokens, shrunk {shrunk_profiles} profiles)"
        ),
        CompressionOutcome::Skipped { reason } => format!("compression skipped: {reason}"),
        CompressionOutcome::InProgress => "compression already running".into(),
        CompressionOutcome::Failed { error } => format!("compression failed, memory unchanged: {error}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_messages() {
        assert_eq!(parse_line("  hello there "), ChatCommand::Say("hello there"));
        assert_eq!(parse_line(""), ChatCommand::Say(""));
    }

    #[test]
    fn memory_commands_parse() {
        assert_eq!(parse_line("/deep"), ChatCommand::Deep(None));
        assert_eq!(
            parse_line("/deep  allergic to {peanuts}"),
            ChatCommand::Deep(Some("allergic to {peanuts}"))
        );
        assert_eq!(parse_line("/clear"), ChatCommand::ClearShortTerm);
        assert_eq!(parse_line("/forget"), ChatCommand::ClearLongTerm);
        assert_eq!(parse_line("/compress"), ChatCommand::Compress);
        assert_eq!(parse_line("quit"), ChatCommand::Exit);
    }

    #[test]
    fn compression_outcomes_read_well() {
        let text = describe_compression(&CompressionOutcome::Compressed {
            memories_before: 12,
            memories_after: 2,
            restored_tokens: 1,
            shrunk_profiles: 0,
        });
        assert!(text.starts_with("compressed 12 memories into 2"));
        assert!(
            describe_compression(&CompressionOutcome::Failed { error: "boom".into() }).contains("unchanged")
        );
    }
}
