//! Loreloom CLI — the main entry point.
//!
//! Commands:
//! - `onboard` — Initialize config & data directory
//! - `route`   — Run the prompt pipeline for a conversation
//! - `scan`    — List asset files of a given kind
//! - `status`  — Show configuration status

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "loreloom",
    about = "Loreloom — prompt assembly pipeline for branching conversations",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration and the data directory
    Onboard,

    /// Run the pipeline for a conversation file and print the result
    Route {
        /// Conversation file name under <data_dir>/conversations
        file: String,

        /// Rendering view: user_view or assistant_view
        #[arg(long)]
        view: Option<String>,

        /// Output mode: full, history, or delta
        #[arg(short, long, default_value = "full")]
        output: String,

        /// Preset file name
        #[arg(long)]
        preset: Option<String>,

        /// Character file name
        #[arg(long)]
        character: Option<String>,

        /// Persona file name
        #[arg(long)]
        persona: Option<String>,

        /// World book file name
        #[arg(long)]
        world_book: Option<String>,

        /// Regex rules file name
        #[arg(long)]
        regex_rules: Option<String>,
    },

    /// List asset files of a kind
    Scan {
        /// Asset kind: preset, character, persona, world_book, regex_rules
        kind: String,
    },

    /// Show configuration status
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Route {
            file,
            view,
            output,
            preset,
            character,
            persona,
            world_book,
            regex_rules,
        } => {
            commands::route::run(commands::route::RouteArgs {
                file,
                view,
                output,
                preset,
                character,
                persona,
                world_book,
                regex_rules,
            })
            .await?
        }
        Commands::Scan { kind } => commands::scan::run(&kind).await?,
        Commands::Status => commands::status::run().await?,
    }

    Ok(())
}
