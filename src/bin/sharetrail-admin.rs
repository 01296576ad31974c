use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use sharetrail::analytics::models::EventDto;
use sharetrail::analytics::HmacVisitorIdentity;
use sharetrail::clock::SystemClock;
use sharetrail::config::{Config, DatabaseBackend};
use sharetrail::storage::{DocumentStore, SqliteStore, StoreShareDirectory};
use sharetrail::AccessTracker;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sharetrail-admin")]
#[command(about = "Sharetrail analytics maintenance CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recount a link's views and downloads from its events
    Reconcile {
        /// Share link ID
        link_id: String,
    },
    /// Daily views and downloads of a link
    Timeseries {
        link_id: String,
        #[arg(long)]
        days: Option<u32>,
    },
    /// Merged event feed of an owner
    Feed {
        owner_id: String,
        #[arg(long)]
        days: Option<u32>,
    },
    /// Visitors who opened an owner's links in the last minutes
    Live {
        owner_id: String,
        #[arg(long)]
        minutes: Option<u32>,
    },
    /// Totals of an owner's feed
    Summary {
        owner_id: String,
        #[arg(long)]
        days: Option<u32>,
    },
}

fn print_events(events: &[EventDto]) {
    if events.is_empty() {
        println!("No events found.");
        return;
    }
    println!(
        "{:<25} {:<20} {:<22} {:<24} {}",
        "Timestamp", "Link", "Event", "Visitor", "Country"
    );
    println!("{}", "-".repeat(100));
    for event in events {
        println!(
            "{:<25} {:<20} {:<22} {:<24} {}",
            event.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            event.link_id,
            event.event_type,
            event.visitor_id,
            event.country.as_deref().unwrap_or("-")
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let store: Arc<dyn DocumentStore> = match config.database.backend {
        DatabaseBackend::Sqlite => Arc::new(
            SqliteStore::new(&config.database.url, config.database.max_connections).await?,
        ),
        DatabaseBackend::Memory => {
            bail!("the admin CLI needs a persistent database; set DATABASE_BACKEND=sqlite")
        }
    };

    // Ensure database is initialized
    store.init().await?;

    let tracker = AccessTracker::new(
        Arc::clone(&store),
        Arc::new(StoreShareDirectory::new(Arc::clone(&store))),
        Arc::new(HmacVisitorIdentity::new(
            config.identity.visitor_id_secret.as_deref(),
            config.identity.app_host.clone(),
        )?),
        Arc::new(SystemClock),
    )
    .with_live_fallback_limit(config.analytics.live_fallback_limit);

    match cli.command {
        Commands::Reconcile { link_id } => {
            let totals = tracker.reconcile_counters(&link_id).await?;
            println!(
                "✓ Link '{}' reconciled: {} views, {} downloads",
                link_id, totals.views, totals.downloads
            );
        }
        Commands::Timeseries { link_id, days } => {
            let series = tracker.time_series(&link_id, days).await;
            if series.is_empty() {
                println!("No activity found for link '{}'.", link_id);
            } else {
                println!("{:<12} {:>8} {:>10}", "Date", "Views", "Downloads");
                println!("{}", "-".repeat(32));
                for point in series {
                    println!("{:<12} {:>8} {:>10}", point.date, point.views, point.downloads);
                }
            }
        }
        Commands::Feed { owner_id, days } => {
            print_events(&tracker.owner_feed(&owner_id, days).await);
        }
        Commands::Live { owner_id, minutes } => {
            print_events(&tracker.live_visitors(&owner_id, minutes).await);
        }
        Commands::Summary { owner_id, days } => {
            let summary = tracker.owner_summary(&owner_id, days).await;
            println!("Owner '{}':", owner_id);
            println!("  events:          {}", summary.events);
            println!("  views:           {}", summary.views);
            println!("  downloads:       {}", summary.downloads);
            println!("  active links:    {}", summary.links);
            println!("  unique visitors: {}", summary.unique_visitors);
        }
    }

    Ok(())
}
