//! Line commands for the interactive session.
//!
//! Lines starting with `/` are commands; any other text becomes the prompt
//! and asks for suggestions.

use std::path::PathBuf;

pub const HELP: &str = "\
/add <file>...   upload images with the current prompt
/remove <n>      drop asset n from the session
/clear           drop every asset and suggestion
/prompt <text>   set the prompt without sending it
/show            print the session
/help            show this list
/quit            leave
<text>           set the prompt and ask for suggestions";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Add(Vec<PathBuf>),
    /// 1-based position as listed by `/show`.
    Remove(usize),
    Clear,
    SetPrompt(String),
    Ask(String),
    Show,
    Help,
    Quit,
    Noop,
}

/// Parse one input line. Errors are user-facing usage messages.
pub fn parse_command(line: &str) -> Result<ShellCommand, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(ShellCommand::Noop);
    }
    let Some(command) = line.strip_prefix('/') else {
        return Ok(ShellCommand::Ask(line.to_string()));
    };

    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };

    match name.to_ascii_lowercase().as_str() {
        "add" => {
            let files: Vec<PathBuf> = rest.split_whitespace().map(PathBuf::from).collect();
            if files.is_empty() {
                return Err("usage: /add <file>...".to_string());
            }
            Ok(ShellCommand::Add(files))
        }
        "remove" | "rm" => match rest.parse::<usize>() {
            Ok(n) if n > 0 => Ok(ShellCommand::Remove(n)),
            _ => Err("usage: /remove <n> (see /show for numbers)".to_string()),
        },
        "clear" => Ok(ShellCommand::Clear),
        "prompt" => Ok(ShellCommand::SetPrompt(rest.to_string())),
        "show" | "ls" => Ok(ShellCommand::Show),
        "help" | "?" => Ok(ShellCommand::Help),
        "quit" | "exit" | "q" => Ok(ShellCommand::Quit),
        other => Err(format!("unknown command /{}; try /help", other)),
    }
}
