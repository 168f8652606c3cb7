use anyhow::Context;
use clap::{Parser, Subcommand};
use planzy_scraper::apis::{self, FetchPorts};
use planzy_scraper::config::{Config, StorageBackend};
use planzy_scraper::error::ScraperError;
use planzy_scraper::infra::http_client::ReqwestHttp;
use planzy_scraper::infra::page_capture::HttpPageCapture;
use planzy_scraper::ingest::IngestReport;
use planzy_scraper::logging;
use planzy_scraper::orchestrator::SourceOutcome;
use planzy_scraper::pipeline::{self, Pipeline};
use planzy_scraper::storage::{InMemoryStorage, SqliteStorage, Storage};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "planzy_scraper")]
#[command(about = "Scrapes event listings from every source and ingests them into one store")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the configuration file (defaults to ./config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape every source and ingest the merged records
    Run {
        /// Specific sources to run (comma-separated). Available: ebilet, goingapp
        #[arg(long, value_delimiter = ',')]
        sources: Option<Vec<String>>,
        /// Also write the merged records to this JSON file
        #[arg(long)]
        dump: Option<PathBuf>,
    },
    /// Scrape and merge only, writing the records to a JSON file
    Scrape {
        #[arg(long, value_delimiter = ',')]
        sources: Option<Vec<String>>,
        #[arg(long, default_value = "output/merged_data.json")]
        output: PathBuf,
    },
    /// Ingest records from a JSON file written by `scrape` or `run --dump`
    Ingest {
        #[arg(long)]
        input: PathBuf,
    },
}

fn open_storage(config: &Config) -> anyhow::Result<Arc<dyn Storage>> {
    let storage: Arc<dyn Storage> = match config.storage.backend {
        StorageBackend::Sqlite => Arc::new(
            SqliteStorage::open(&config.storage.database_path)
                .with_context(|| format!("opening {}", config.storage.database_path))?,
        ),
        StorageBackend::Memory => Arc::new(InMemoryStorage::new()),
    };
    info!("Using {:?} storage", config.storage.backend);
    Ok(storage)
}

fn fetch_ports() -> anyhow::Result<FetchPorts> {
    Ok(FetchPorts {
        http: Arc::new(ReqwestHttp::new()?),
        pages: Arc::new(HttpPageCapture::new()?),
    })
}

fn print_sources(sources: &[SourceOutcome]) {
    for outcome in sources {
        match &outcome.error {
            None => println!(
                "   ✅ {}: {} records in {:.2}s",
                outcome.source, outcome.records, outcome.duration_secs
            ),
            Some(e) => println!("   ❌ {}: {}", outcome.source, e),
        }
    }
}

/// Partial counts of an aborted ingestion, when the error carries them
fn print_aborted(error: &ScraperError) {
    if let ScraperError::IngestAborted { report, .. } = error {
        println!("\n❌ Ingestion aborted, counts before the failure:");
        print_ingest(report);
    }
}

fn print_ingest(report: &IngestReport) {
    println!("\n📊 Ingestion summary:");
    println!("   Processed: {}", report.processed);
    println!("   Created:   {}", report.succeeded);
    println!(
        "   Skipped:   {} ({} without URL, {} duplicates)",
        report.skipped(),
        report.skipped_missing_url,
        report.skipped_duplicate
    );
    println!("   Errors:    {}", report.errors);
    println!("   Flushes:   {}", report.flushes);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let _log_guard = logging::init_logging();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Run { sources, dump } => {
            println!("🚀 Running full pipeline (scrape + ingest)...");
            let adapters = apis::build_adapters(&config, sources.as_deref(), &fetch_ports()?);
            let pipeline = Pipeline::new(&config, open_storage(&config)?);

            match pipeline.run(adapters, dump.as_deref()).await {
                Ok(report) => {
                    print_sources(&report.sources);
                    print_ingest(&report.ingest);
                    println!("✅ Done in {:.2}s", report.duration_secs);
                }
                Err(e) => {
                    error!("Pipeline run aborted: {}", e);
                    print_aborted(&e);
                    return Err(e.into());
                }
            }
        }
        Commands::Scrape { sources, output } => {
            println!("📡 Scraping sources...");
            let adapters = apis::build_adapters(&config, sources.as_deref(), &fetch_ports()?);
            let pipeline = Pipeline::new(&config, Arc::new(InMemoryStorage::new()));

            let report = pipeline.scrape(adapters).await;
            print_sources(&report.sources);
            pipeline::write_records(&output, &report.records)?;
            println!("💾 Saved {} records to {}", report.records.len(), output.display());
        }
        Commands::Ingest { input } => {
            println!("📥 Ingesting {}...", input.display());
            let records = pipeline::read_records(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let pipeline = Pipeline::new(&config, open_storage(&config)?);

            let report = pipeline.ingest(&records).await.map_err(|e| {
                error!("Ingestion aborted: {}", e);
                print_aborted(&e);
                e
            })?;
            print_ingest(&report);
        }
    }
    Ok(())
}
