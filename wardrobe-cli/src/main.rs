//! wardrobe-cli: terminal client for the outfit suggestion relay
//!
//! # Subcommands
//! - `upload <files...> [--prompt <text>] [--json]`: upload images, show suggestions
//! - `suggest <prompt> [--json]`                   : prompt-only suggestions
//! - `status`                                      : show server health
//! - `session [--prompt <text>]`                   : interactive session (`/help`)

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, EnvFilter};

use wardrobe_cli::client::{ClientError, WardrobeClient};
use wardrobe_cli::session::{AssetStatus, WardrobeSession};
use wardrobe_cli::shell::{parse_command, ShellCommand, HELP};
use wardrobe_core::api::UploadResponse;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8000";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "wardrobe-cli",
    version,
    about = "Upload wardrobe photos and get outfit suggestions"
)]
struct Cli {
    /// Wardrobe server URL (overrides WARDROBE_URL env var)
    #[arg(long, env = "WARDROBE_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Upload images and ask for outfit suggestions
    Upload {
        /// Image files (JPEG, PNG or WebP)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Occasion or style preferences
        #[arg(short, long, default_value = "")]
        prompt: String,

        /// Print the raw server response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Ask for suggestions from a prompt alone
    Suggest {
        /// Occasion or style preferences
        prompt: String,

        /// Print the raw server response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show server status
    Status,

    /// Interactive session: add and remove images, refine the prompt
    Session {
        /// Initial occasion or style preferences
        #[arg(short, long, default_value = "")]
        prompt: String,
    },
}

// ============================================================================
// Commands
// ============================================================================

async fn do_upload(
    client: &WardrobeClient,
    files: Vec<PathBuf>,
    prompt: String,
    json_output: bool,
) -> anyhow::Result<()> {
    let mut session = WardrobeSession::new();
    session.set_prompt(prompt);
    session.stage(files);

    if !json_output {
        for asset in session.assets() {
            println!("⏳ {}", asset.display_name());
        }
    }

    match upload_pending(client, &mut session).await {
        Ok(resp) => {
            if json_output {
                println!("{}", serde_json::to_string_pretty(&resp)?);
            } else {
                println!("{}", resp.message);
                print!("{}", render_session(&session));
            }
            Ok(())
        }
        Err(e) => {
            if !json_output {
                print!("{}", render_assets(&session));
            }
            if let ClientError::Server {
                details: Some(details),
                ..
            } = &e
            {
                eprintln!("{}", details);
            }
            Err(e.into())
        }
    }
}

/// Send every pending asset and reconcile the session with the answer.
async fn upload_pending(
    client: &WardrobeClient,
    session: &mut WardrobeSession,
) -> Result<UploadResponse, ClientError> {
    session.begin_request();
    let paths = session.pending_paths();
    match client.upload(&paths, session.prompt()).await {
        Ok(resp) => {
            session.apply_upload(&resp);
            Ok(resp)
        }
        Err(e) => {
            session.apply_failure(&e.to_string());
            Err(e)
        }
    }
}

async fn do_suggest(client: &WardrobeClient, prompt: String, json_output: bool) -> anyhow::Result<()> {
    let mut session = WardrobeSession::new();
    session.set_prompt(prompt);
    session.begin_request();

    let resp = client.suggestions(session.prompt()).await?;
    session.apply_suggestions(&resp);

    if json_output {
        println!("{}", serde_json::to_string_pretty(&resp)?);
    } else {
        print!("{}", render_session(&session));
    }
    Ok(())
}

async fn do_status(client: &WardrobeClient) -> anyhow::Result<()> {
    let health = client.health().await?;
    println!("Wardrobe server: {}", health.status);
    println!("Version:         {}", health.version.as_deref().unwrap_or("?"));
    println!("URL:             {}", client.base_url());
    Ok(())
}

async fn do_session(client: &WardrobeClient, prompt: String) -> anyhow::Result<()> {
    let mut session = WardrobeSession::new();
    session.set_prompt(prompt);

    println!("Wardrobe session on {}. Type /help for commands.", client.base_url());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(usage) => {
                println!("{}", usage);
                continue;
            }
        };
        match run_command(client, &mut session, command).await {
            Some(output) => print!("{}", output),
            None => break,
        }
    }

    session.clear();
    Ok(())
}

/// Apply one shell command to the session. `None` ends the session.
async fn run_command(
    client: &WardrobeClient,
    session: &mut WardrobeSession,
    command: ShellCommand,
) -> Option<String> {
    let output = match command {
        ShellCommand::Noop => String::new(),
        ShellCommand::Quit => return None,
        ShellCommand::Help => format!("{}\n", HELP),
        ShellCommand::Show => render_session(session),
        ShellCommand::SetPrompt(prompt) => {
            session.set_prompt(prompt);
            format!("Prompt: {}\n", session.prompt())
        }
        ShellCommand::Add(files) => {
            session.stage(files);
            match upload_pending(client, session).await {
                Ok(resp) => format!("{}\n{}", resp.message, render_session(session)),
                Err(e) => format!("{}Error: {}\n", render_assets(session), e),
            }
        }
        ShellCommand::Ask(prompt) => {
            session.set_prompt(prompt);
            session.begin_request();
            match client.suggestions(session.prompt()).await {
                Ok(resp) => {
                    session.apply_suggestions(&resp);
                    render_session(session)
                }
                Err(e) => {
                    session.apply_failure(&e.to_string());
                    format!("Error: {}\n", e)
                }
            }
        }
        ShellCommand::Remove(position) => {
            let target = position
                .checked_sub(1)
                .and_then(|i| session.assets().get(i))
                .map(|a| (a.id, a.display_name()));
            match target {
                Some((id, name)) => {
                    session.remove(id);
                    format!("Removed {}\n", name)
                }
                None => format!("No asset {}; the session has {}\n", position, session.assets().len()),
            }
        }
        ShellCommand::Clear => {
            let count = session.assets().len();
            session.clear();
            format!("Cleared {} assets\n", count)
        }
    };
    Some(output)
}

// ============================================================================
// Rendering
// ============================================================================

fn render_assets(session: &WardrobeSession) -> String {
    let mut out = String::new();
    for (n, asset) in session.assets().iter().enumerate() {
        let line = match &asset.status {
            AssetStatus::Pending => format!("⏳ {}", asset.display_name()),
            AssetStatus::Confirmed(url) => format!("✅ {} → {}", asset.display_name(), url),
            AssetStatus::Rejected(reason) => format!("❌ {}: {}", asset.display_name(), reason),
        };
        out.push_str(&format!("{:>3}. {}\n", n + 1, line));
    }
    out
}

fn render_list(out: &mut String, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    out.push_str(&format!("  {}:\n", heading));
    for item in items {
        out.push_str(&format!("    • {}\n", item));
    }
}

fn render_session(session: &WardrobeSession) -> String {
    let mut out = render_assets(session);

    if !session.categories().is_empty() {
        out.push_str("\nYour wardrobe:\n");
        for (category, items) in session.categories() {
            out.push_str(&format!("  {}:\n", category.replace('_', " ")));
            for item in items {
                out.push_str(&format!("    {}\n", item));
            }
        }
    }

    if !session.suggestions().is_empty() {
        out.push_str("\nOutfit suggestions:\n");
        for card in session.suggestions() {
            if let Some(title) = &card.title {
                out.push_str(&format!("\n  {}\n", title));
            }
            if let Some(description) = &card.outfit_description {
                out.push_str(&format!("  {}\n", description));
            }
            if let Some(preview) = &card.outfit_preview {
                out.push_str(&format!("  Preview: {}\n", preview));
            }
            render_list(&mut out, "Items", &card.items);
            render_list(&mut out, "Color palette", &card.colors);
            render_list(&mut out, "Accessories", &card.accessories);
            render_list(&mut out, "Style tips", &card.style_tips);
            render_list(&mut out, "Avoid", &card.avoid);
        }
    } else if session.categories().is_empty() {
        match session.last_result() {
            Some(result) if !result.is_null() && result != &serde_json::json!([]) => {
                out.push_str("\nAgent result:\n");
                out.push_str(&serde_json::to_string_pretty(result).unwrap_or_default());
                out.push('\n');
            }
            _ => out.push_str("\nNo suggestions returned.\n"),
        }
    }

    out
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let client = match WardrobeClient::new(&cli.server) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("wardrobe-cli: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Upload {
            files,
            prompt,
            json,
        } => do_upload(&client, files, prompt, json).await,
        Commands::Suggest { prompt, json } => do_suggest(&client, prompt, json).await,
        Commands::Status => do_status(&client).await,
        Commands::Session { prompt } => do_session(&client, prompt).await,
    };

    if let Err(e) = result {
        eprintln!("wardrobe-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
