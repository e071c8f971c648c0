//! Agenda CLI - composition root for the agenda tool handlers.
//!
//! Builds the rate limiter / cache / auth / client stack once from the
//! environment and dispatches a single tool call against it. The same
//! construction is what an embedding MCP host performs at startup.

use std::sync::Arc;

use agenda_core::{CalendarConfig, NotionConfig, TokenManager};
use agenda_gcal::CalendarClient;
use agenda_mcp::{CalendarToolHandler, NotionToolHandler, ToolOutput};
use agenda_notion::NotionClient;
use agenda_storage::{EnvFileStore, TokenPersistence};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "agenda")]
#[command(author, version, about = "Calendar and Notion tools for LLM agent hosts", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the tools a server exposes
    Tools {
        #[arg(value_enum)]
        server: Server,
    },

    /// Call one tool with JSON arguments
    Call {
        #[arg(value_enum)]
        server: Server,

        /// Tool name, e.g. get_events or get_tasks
        tool: String,

        /// JSON object with the tool arguments
        #[arg(long, default_value = "{}")]
        args: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Server {
    Calendar,
    Notion,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    // Diagnostics go to stderr; stdout carries only tool output.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Tools { server } => {
            let definitions = match server {
                Server::Calendar => build_calendar_handler()?.definitions(),
                Server::Notion => build_notion_handler()?.definitions(),
            };
            for definition in definitions {
                println!("{} - {}", definition.name, definition.description);
            }
        }
        Commands::Call { server, tool, args } => {
            let arguments: serde_json::Value = serde_json::from_str(&args)
                .map_err(|e| anyhow::anyhow!("--args must be a JSON object: {e}"))?;

            let output = match server {
                Server::Calendar => {
                    build_calendar_handler()?
                        .execute(&tool, Some(arguments))
                        .await
                }
                Server::Notion => build_notion_handler()?.execute(&tool, Some(arguments)).await,
            };

            print_output(output);
        }
    }

    Ok(())
}

/// Wire the Google Calendar stack: config from the environment, token
/// manager with rotated-credential persistence, client, handler.
fn build_calendar_handler() -> anyhow::Result<CalendarToolHandler> {
    let config = CalendarConfig::from_env()?;

    let store = Arc::new(EnvFileStore::default_location()?);
    let sink = Arc::new(TokenPersistence::new(
        store,
        "GOOGLE_ACCESS_TOKEN",
        "GOOGLE_REFRESH_TOKEN",
    ));

    let auth = Arc::new(
        TokenManager::new(
            &config.token_uri,
            &config.client_id,
            &config.client_secret,
            &config.refresh_token,
        )
        .with_seed_token(config.access_token.clone())
        .with_sink(sink),
    );

    let client = Arc::new(CalendarClient::with_token_provider(&config, auth));
    Ok(CalendarToolHandler::new(client))
}

/// Wire the Notion stack: config from the environment, client with its
/// integration token and task cache, handler.
fn build_notion_handler() -> anyhow::Result<NotionToolHandler> {
    let config = NotionConfig::from_env()?;
    let client = Arc::new(NotionClient::new(config));
    Ok(NotionToolHandler::new(client))
}

fn print_output(output: ToolOutput) {
    println!("{}", output.text);
    if output.is_error() {
        std::process::exit(1);
    }
}
