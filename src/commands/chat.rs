//! Interactive chat mode handler
//!
//! Instantiates the assistant and runs a readline-based loop that
//! submits user input to `handle_turn`. Local slash commands (`/reset`,
//! `/quit`, `/help`) are handled before the assistant sees the input.

use crate::commands::build_assistant;
use crate::config::Config;
use crate::error::Result;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

/// Start interactive chat mode
///
/// # Arguments
///
/// * `config` - Loaded application configuration
/// * `user` - User id the session is keyed on
/// * `platform` - Platform label recorded on the session
///
/// # Errors
///
/// Returns error if the assistant stack or the line editor cannot be
/// built
pub async fn run_chat(config: Config, user: String, platform: String) -> Result<()> {
    let assistant = build_assistant(&config)?;
    let mut editor = DefaultEditor::new()?;

    println!("{}", "Bazaarly marketplace assistant".bold());
    println!(
        "Chatting as {}. Type {} for commands, {} to leave.\n",
        user.cyan(),
        "/help".yellow(),
        "/quit".yellow()
    );

    loop {
        match editor.readline(&format!("{} ", ">".green())) {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                editor.add_history_entry(input)?;

                match input {
                    "/quit" | "/exit" => break,
                    "/reset" => {
                        assistant.reset_user(&user);
                        println!("{}", "Session cleared.".yellow());
                        continue;
                    }
                    "/help" => {
                        print_help();
                        continue;
                    }
                    _ => {}
                }

                match assistant.handle_turn(&user, input, &platform, None).await {
                    Ok(turn) => {
                        println!("{}\n", turn.reply_text.cyan());
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Turn failed");
                        println!("{}", "Something went wrong, please try again.".red());
                    }
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                tracing::error!(error = %e, "Readline error");
                break;
            }
        }
    }

    println!("{}", "Bye!".bold());
    Ok(())
}

fn print_help() {
    println!("Commands:");
    println!("  /reset  start a fresh session");
    println!("  /quit   leave the chat");
    println!("Anything else goes to the assistant: try");
    println!("  'az kullanılmış iphone 13 satmak istiyorum'");
    println!("  'looking for a mountain bike'");
}
