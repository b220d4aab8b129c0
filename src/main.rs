mod auth;
mod client;
mod config;
mod error;
mod export;
mod extract;
mod filters;
mod limit;
mod listing;
mod retry;
mod scraper;
mod session;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Local;
use clap::Parser;
use tracing::warn;

#[derive(Parser)]
#[command(
    name = "points_scraper",
    about = "Concurrent homework scraper for api.100points.ru"
)]
struct Cli {
    /// Path to the JSON config file (missing values are prompted)
    #[arg(short, long, default_value = "scraper.json")]
    config: PathBuf,

    /// Global cap on concurrent connections
    #[arg(long, default_value_t = limit::DEFAULT_CONNECTIONS)]
    connections: usize,

    /// Directory for the CSV artifact
    #[arg(long, default_value = "data/output")]
    out_dir: PathBuf,

    /// Directory for per-account session files
    #[arg(long, default_value = ".")]
    session_dir: PathBuf,

    /// Print the collected records as a table
    #[arg(long)]
    show_table: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let config = config::load_or_prompt(&cli.config)?;
    let backend = Arc::new(client::Backend::new(cli.connections)?);
    let store = session::SessionStore::new(cli.session_dir.clone());
    let mut picker = filters::TerminalPicker;

    let outcome = match scraper::run(backend, &store, &config, &mut picker).await {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::error!("scrape failed: {err:#}");
            return Err(err);
        }
    };

    if outcome.records.is_empty() {
        warn!("no records collected, nothing to export");
    } else {
        let name = export::artifact_name(outcome.module_id, outcome.lesson_id, Local::now());
        let path = export::write_csv(&outcome.records, &cli.out_dir, &name)?;
        println!("Saved {} record(s) to {}", outcome.records.len(), path.display());
    }

    if config.show_table || cli.show_table {
        export::print_table(&outcome.records);
    }

    println!(
        "Pages: {} fetched, {} skipped. Records: {} of {} extracted, {} skipped.",
        outcome.pages_total - outcome.pages_skipped,
        outcome.pages_skipped,
        outcome.records.len(),
        outcome.links_total,
        outcome.records_skipped,
    );

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
