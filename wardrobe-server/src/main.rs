use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};
use wardrobe_core::{FileIntake, SubprocessAgent, WardrobeConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "wardrobe.toml")]
    config: String,

    /// Verify the upload directory and agent script, then exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match WardrobeConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging: RUST_LOG wins, otherwise the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    if args.check {
        run_checks(&config);
        return Ok(());
    }

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(e) => tracing::error!("Failed to listen for Ctrl+C: {}", e),
        }
        let _ = shutdown_tx.send(());
    });

    wardrobe_server::http::start_http_server(config, tx.subscribe()).await
}

fn run_checks(config: &WardrobeConfig) {
    let intake = FileIntake::from_config(&config.storage);
    match intake.ensure_dirs() {
        Ok(()) => println!("✅ Upload directory ready: {}", intake.root().display()),
        Err(e) => {
            println!(
                "❌ Upload directory {} unavailable: {}",
                intake.root().display(),
                e
            );
            std::process::exit(1);
        }
    }

    if config.agent.backend == "subprocess" {
        let agent = SubprocessAgent::from_config(&config.agent);
        match agent.script() {
            Some(script) if script.exists() => {
                println!("✅ Agent script found: {}", script.display())
            }
            Some(script) => {
                println!("❌ Agent script not found at: {}", script.display());
                std::process::exit(1);
            }
            None => println!("✅ Agent program: {}", config.agent.program),
        }
    } else {
        println!("✅ Agent backend: {}", config.agent.backend);
    }

    println!("✅ Wardrobe relay check passed");
}
