// Signal Martingale Bot - CLI
// Single entry point for running the bot and inspecting signals

use clap::{Parser, Subcommand};
use std::path::Path;
use tracing::{error, info, warn};

use signal_martingale_bot::logging::init_logging;
use signal_martingale_bot::{BotError, Config, ConfigError, LoggingConfig};

// Load command modules from cli directory
#[path = "../cli/inspect_commands.rs"]
mod inspect_commands;
#[path = "../cli/run_commands.rs"]
mod run_commands;

#[derive(Parser)]
#[command(name = "signal-bot")]
#[command(version = "0.2.0")]
#[command(about = "Telegram signal follower with martingale recovery", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot: channel listener, scheduler, result feedback, health endpoint
    Run {
        /// Paper trading, never invoke the trade command
        #[arg(short, long)]
        dry_run: bool,

        /// Start with trading active instead of waiting for /start
        #[arg(short, long)]
        active: bool,

        /// Read messages from stdin instead of Telegram
        #[arg(long)]
        stdin: bool,
    },

    /// Initialize configuration and workspace
    Init,

    /// Parse a message and print the extracted signal
    Parse {
        /// Raw message text
        text: String,
    },

    /// Show the attempts a message would schedule right now
    Plan {
        /// Raw message text
        text: String,
    },

    /// Run pre-flight checks
    Check {
        /// Validate as if --dry-run was given
        #[arg(short, long)]
        dry_run: bool,

        /// Skip the Telegram check
        #[arg(long)]
        stdin: bool,
    },

    /// Show recently journaled attempts
    History {
        /// Number of attempts to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    // Init runs before any config exists
    if let Commands::Init = cli.command {
        init_logging(&LoggingConfig { log_to_file: false, ..LoggingConfig::default() }, cli.verbose).ok();
        if let Err(e) = init_workspace(&cli.config) {
            error!("❌ {}", e.user_message());
            std::process::exit(1);
        }
        return;
    }

    let config = load_config_or_exit(&cli.config);
    if let Err(e) = init_logging(&config.logging, cli.verbose) {
        eprintln!("{}", e.user_message());
    }

    info!("🚀 Signal Bot v0.2.0");
    info!("📁 Config: {}", cli.config);

    let result = match cli.command {
        Commands::Init => Ok(()),
        Commands::Run { dry_run, active, stdin } => {
            run_commands::run_bot(config, dry_run, active, stdin).await
        }
        Commands::Parse { text } => inspect_commands::parse_text(&config, &text),
        Commands::Plan { text } => inspect_commands::plan_text(&config, &text),
        Commands::Check { dry_run, stdin } => inspect_commands::check(&config, dry_run, stdin),
        Commands::History { limit } => inspect_commands::history(&config, limit),
    };

    if let Err(e) = result {
        error!("❌ [{}] {}", e.category(), e.user_message());
        std::process::exit(1);
    }
}

/// Load config (or defaults when the file is missing), apply environment
/// overrides, or exit with a helpful error message
fn load_config_or_exit(path: &str) -> Config {
    let loaded = match Config::from_file(path) {
        Ok(config) => Ok(config),
        Err(ConfigError::NotFound(_)) => {
            eprintln!("⚠️  {} not found, using defaults (run: signal-bot init)", path);
            Ok(Config::default())
        }
        Err(e) => Err(e),
    };

    let config = loaded.and_then(|mut config| {
        config.apply_env_overrides()?;
        Ok(config)
    });

    match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Configuration Error");
            eprintln!("{}", e);
            eprintln!();
            eprintln!("💡 Quick fix:");
            eprintln!("   1. Run: signal-bot init");
            eprintln!("   2. Edit config.toml or set the variables in .env");
            eprintln!("   3. Try again");
            std::process::exit(1);
        }
    }
}

fn init_workspace(config_path: &str) -> Result<(), BotError> {
    use std::fs;

    info!("🔧 Initializing workspace...");

    fs::create_dir_all("logs")?;
    fs::create_dir_all("data")?;

    if !Path::new(config_path).exists() {
        let default_config = include_str!("../../config.toml.example");
        fs::write(config_path, default_config)?;
        info!("📝 Created {}", config_path);
    } else {
        warn!("⚠️  {} already exists, skipping", config_path);
    }

    info!("✅ Workspace initialized successfully!");
    info!("💡 Next steps:");
    info!("   1. Set TELEGRAM_BOT_TOKEN and TELEGRAM_CHANNEL (config.toml or .env)");
    info!("   2. Run: signal-bot check");
    info!("   3. Run: signal-bot run --dry-run");

    Ok(())
}
