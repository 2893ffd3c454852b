pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "casebook")]
#[command(about = "Casebook CLI - schema, tokens and maintenance for the Casebook API")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Apply the bundled schema to DATABASE_URL")]
    Migrate,

    #[command(about = "Issue a signed API token for a user")]
    Token(commands::token::TokenArgs),

    #[command(about = "Check a running server's /health endpoint")]
    Health {
        #[arg(long, help = "Server base URL (defaults to http://localhost:<configured port>)")]
        url: Option<String>,
    },

    #[command(about = "Print the postponement chain an event belongs to")]
    Chain {
        #[arg(help = "Any event id in the chain")]
        event_id: uuid::Uuid,
    },

    #[command(about = "Reminder dispatch support")]
    Notifications {
        #[command(subcommand)]
        cmd: commands::notifications::NotificationCommands,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Migrate => commands::migrate::handle(output_format).await,
        Commands::Token(args) => commands::token::handle(args, output_format),
        Commands::Health { url } => commands::health::handle(url, output_format).await,
        Commands::Chain { event_id } => commands::chain::handle(event_id, output_format).await,
        Commands::Notifications { cmd } => commands::notifications::handle(cmd, output_format).await,
    }
}
