use anyhow::Context;
use cache::build_cache;
use chrono::{Days, Local};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use configuration::{Settings, SourceKind};
use core_types::{DateRange, TradingDate};
use database::{connect, run_migrations, DbRepository};
use exporter::ExportBundle;
use index_engine::{
    CompositionDiffer, CompositionReader, IndexBuilder, IndexError, PerformanceReader,
};
use indicatif::{ProgressBar, ProgressStyle};
use ingest::{build_source, resolve_universe, run_ingest, IngestOptions};
use std::path::PathBuf;
use std::sync::Arc;

/// The main entry point for the equal-weighted index application.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file, if there is one.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut settings = match &cli.config {
        Some(path) => configuration::load_config_from(path)?,
        None => configuration::load_config()?,
    };
    let _log_guard = configuration::init_tracing(&settings.logging)?;

    // Execute the appropriate command
    match cli.command {
        Commands::Serve => web_server::run_server(settings).await,
        Commands::Ingest(args) => {
            if let Some(csv) = &args.symbols_csv {
                settings.ingest.symbols_csv = Some(csv.display().to_string());
            }
            if !args.source.is_empty() {
                settings.ingest.sources = args.source.clone();
            }
            let repo = open_repository(&settings).await?;
            handle_ingest(args, &settings, repo).await
        }
        Commands::Build(args) => {
            let repo = open_repository(&settings).await?;
            handle_build(args, &settings, repo).await
        }
        Commands::Performance(args) => {
            let repo = open_repository(&settings).await?;
            let rows = PerformanceReader::new(repo).get(args.range()?).await?;
            let mut table = new_table(["Date", "Daily Return", "Cumulative Return", "Index Level"]);
            for row in rows {
                table.add_row(vec![
                    row.date.to_string(),
                    format!("{:.6}", row.daily_return),
                    format!("{:.6}", row.cumulative_return),
                    format!("{:.4}", row.index_level),
                ]);
            }
            println!("{table}");
            Ok(())
        }
        Commands::Composition(args) => {
            let repo = open_repository(&settings).await?;
            let date = TradingDate::parse(&args.date)?;
            let rows = CompositionReader::new(repo).get(date).await?;
            if rows.is_empty() {
                println!("No composition stored for {date}.");
                return Ok(());
            }
            let mut table = new_table(["Symbol", "Weight"]);
            for row in &rows {
                table.add_row(vec![row.symbol.clone(), format!("{:.6}", row.weight)]);
            }
            println!("{table}");
            println!("{} constituents on {date}", rows.len());
            Ok(())
        }
        Commands::Changes(args) => {
            let repo = open_repository(&settings).await?;
            let changes = CompositionDiffer::new(repo).diff(args.range()?).await?;
            let mut table = new_table(["Date", "Entered", "Exited"]);
            for change in changes {
                table.add_row(vec![
                    change.date.to_string(),
                    change.entered.join(", "),
                    change.exited.join(", "),
                ]);
            }
            println!("{table}");
            Ok(())
        }
        Commands::Export(args) => {
            let repo = open_repository(&settings).await?;
            let range = DateRange::from_inputs(&args.start, args.end.as_deref())?;
            let bundle = ExportBundle::gather(repo, range).await?;
            for path in bundle.write_all(&args.out)? {
                println!("Wrote {}", path.display());
            }
            Ok(())
        }
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Builds and queries an equal-weighted index of the largest US stocks.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a TOML config file (defaults to ./config.toml if present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download daily prices and derive market caps.
    Ingest(IngestArgs),
    /// Build and store the index over a date range.
    Build(RangeArgs),
    /// Print stored index performance.
    Performance(RangeArgs),
    /// Print the constituents on one date.
    Composition(DateArgs),
    /// Print composition entries and exits over a date range.
    Changes(RangeArgs),
    /// Write performance, composition and changes CSVs to a directory.
    Export(ExportArgs),
    /// Run the HTTP API.
    Serve,
}

#[derive(Parser)]
struct RangeArgs {
    /// First date of the range (format: YYYY-MM-DD).
    #[arg(long)]
    start: String,

    /// Last date of the range (format: YYYY-MM-DD). Defaults to the start date.
    #[arg(long)]
    end: Option<String>,
}

impl RangeArgs {
    fn range(&self) -> anyhow::Result<DateRange> {
        Ok(DateRange::from_inputs(&self.start, self.end.as_deref())?)
    }
}

#[derive(Parser)]
struct DateArgs {
    /// The date to inspect (format: YYYY-MM-DD).
    #[arg(long)]
    date: String,
}

#[derive(Parser)]
struct IngestArgs {
    /// First date to fetch (format: YYYY-MM-DD). Defaults to `ingest.lookback_days` before the end.
    #[arg(long)]
    start: Option<String>,

    /// Last date to fetch (format: YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    end: Option<String>,

    /// A `symbol[,name,sector]` CSV to use instead of downloading the universe.
    #[arg(long)]
    symbols_csv: Option<PathBuf>,

    /// Price sources to try, in order. Overrides `ingest.sources`.
    #[arg(long, value_enum)]
    source: Vec<SourceKind>,
}

#[derive(Parser)]
struct ExportArgs {
    /// First date of the range (format: YYYY-MM-DD).
    #[arg(long)]
    start: String,

    /// Last date of the range (format: YYYY-MM-DD). Defaults to the start date.
    #[arg(long)]
    end: Option<String>,

    /// Directory the CSV files are written to.
    #[arg(long, default_value = "export")]
    out: PathBuf,
}

// ==============================================================================
// Command Logic
// ==============================================================================

async fn open_repository(settings: &Settings) -> anyhow::Result<Arc<DbRepository>> {
    let db_pool = connect(&settings.database)
        .await
        .context("Failed to connect to the database")?;
    run_migrations(&db_pool)
        .await
        .context("Failed to run database migrations")?;
    Ok(Arc::new(DbRepository::new(db_pool)))
}

/// Handles the orchestration of the ingest process.
async fn handle_ingest(
    args: IngestArgs,
    settings: &Settings,
    repo: Arc<DbRepository>,
) -> anyhow::Result<()> {
    let range = ingest_range(&args, settings.ingest.lookback_days)?;
    let stocks = resolve_universe(&settings.ingest).await?;
    let source = build_source(&settings.ingest)?;

    println!(
        "Ingesting {} symbols from {} to {} (sources: {})",
        stocks.len(),
        range.start,
        range.end,
        source.source_names().join(" -> ")
    );

    // Set up the progress bar
    let progress_bar = ProgressBar::new(stocks.len() as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
            .progress_chars("#>-"),
    );
    let options = IngestOptions::from_settings(&settings.ingest).with_progress(progress_bar);

    let report = run_ingest(repo.as_ref(), &source, &stocks, range, &options).await?;

    println!(
        "Ingest complete. {} price rows over {} trading days ({} of {} symbols loaded).",
        report.price_rows, report.trading_days, report.symbols_loaded, report.symbols_requested
    );
    if report.profiles_updated > 0 {
        println!("Filled in company names for {} symbols.", report.profiles_updated);
    }
    if !report.symbols_failed.is_empty() {
        println!("No data for: {}", report.symbols_failed.join(", "));
    }
    Ok(())
}

async fn handle_build(
    args: RangeArgs,
    settings: &Settings,
    repo: Arc<DbRepository>,
) -> anyhow::Result<()> {
    let range = args.range()?;
    let builder = IndexBuilder::new(repo, settings.index.clone());

    match builder.build(range).await {
        Ok(summary) => {
            // A running server may share this cache; drop its stale answers.
            let cache = build_cache(&settings.cache).await;
            if let Err(e) = cache.invalidate_all().await {
                tracing::warn!(error = %e, "Failed to invalidate response cache");
            }
            println!(
                "{} ({} trading days, {} to {})",
                summary.message, summary.days_processed, summary.start, summary.end
            );
            Ok(())
        }
        Err(IndexError::NoTradingDays { start, end }) => {
            println!("No trading days in range {start} to {end}. Run `ingest` first?");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// The explicit range, or `lookback_days` of history ending today.
fn ingest_range(args: &IngestArgs, lookback_days: i64) -> anyhow::Result<DateRange> {
    let end = match &args.end {
        Some(raw) => TradingDate::parse(raw)?,
        None => TradingDate::new(Local::now().date_naive()),
    };
    let start = match &args.start {
        Some(raw) => TradingDate::parse(raw)?,
        None => {
            let days = u64::try_from(lookback_days).context("ingest.lookback_days must not be negative")?;
            end.naive()
                .checked_sub_days(Days::new(days))
                .map(TradingDate::new)
                .context("lookback reaches before the supported date range")?
        }
    };
    Ok(DateRange::new(start, end))
}

fn new_table<const N: usize>(header: [&str; N]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}
