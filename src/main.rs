use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::sync::Arc;
use tracing::{info, warn};

use event_feed::apis::{EventSearch, SearchCriteria, TicketmasterClient};
use event_feed::config::Config;
use event_feed::logging;
use event_feed::pipeline::loader::EventLoader;
use event_feed::server::{start_server, AppState};
use event_feed::storage::{EventStore, SqliteEventStore};

#[derive(Parser)]
#[command(name = "event_feed")]
#[command(about = "Ticketing event feed: batch loader and filtered listing API")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the event listing API
    Serve {
        /// Overrides the configured port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Fetch events around the configured location and upsert them
    Load {
        #[arg(long)]
        max_pages: Option<u32>,
        #[arg(long)]
        days_ahead: Option<i64>,
    },
    /// Drop one of the application tables
    DropTable {
        #[arg(long)]
        name: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

fn open_store(config: &Config) -> anyhow::Result<Arc<SqliteEventStore>> {
    let store = SqliteEventStore::open(&config.database.path)
        .with_context(|| format!("opening database at {}", config.database.path))?;
    Ok(Arc::new(store))
}

fn build_client(config: &Config) -> anyhow::Result<Arc<TicketmasterClient>> {
    let api_key = config.api_key()?;
    Ok(Arc::new(TicketmasterClient::from_config(
        &config.ticketmaster,
        api_key,
    )?))
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(matches!(input.trim(), "y" | "Y" | "yes"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let _guard = logging::init_logging();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Serve { port } => {
            let store: Arc<dyn EventStore> = open_store(&config)?;
            let search: Arc<dyn EventSearch> = build_client(&config)?;
            let port = port.unwrap_or(config.server.port);
            start_server(AppState::new(store, search), port, &config.server.cors_origins).await?;
        }
        Commands::Load {
            max_pages,
            days_ahead,
        } => {
            let store: Arc<dyn EventStore> = open_store(&config)?;
            let search: Arc<dyn EventSearch> = build_client(&config)?;
            let criteria = SearchCriteria::from_config(
                &config.ticketmaster,
                Utc::now(),
                days_ahead.unwrap_or(config.ticketmaster.days_ahead),
            );
            let max_pages = max_pages.unwrap_or(config.ticketmaster.max_pages);

            let report = EventLoader::new(search, store)
                .load(&criteria, max_pages)
                .await?;
            println!(
                "Loaded {} events over {} pages: {} inserted, {} updated, {} failed, {} skipped",
                report.fetched,
                report.pages,
                report.summary.inserted,
                report.summary.updated,
                report.summary.failed,
                report.skipped
            );
        }
        Commands::DropTable { name, yes } => {
            if !yes && !confirm(&format!("This will delete table '{name}' and all its rows. Continue?"))? {
                println!("Aborted");
                return Ok(());
            }
            let store = open_store(&config)?;
            if store.drop_table(&name).await? {
                info!(table = %name, "Table dropped");
                println!("Dropped table {name}");
            } else {
                warn!(table = %name, "Table not dropped");
                println!("Table {name} is unknown or does not exist");
            }
        }
    }

    Ok(())
}
