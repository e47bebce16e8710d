use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{error, info};

use industry_screener::analysis::screen::{known_industries, resolve_industry, CutoffIndex};
use industry_screener::analysis::{aggregate_with_direction, screen, MetricSelection, ScreenCriteria};
use industry_screener::api::{CachedProvider, YahooClient};
use industry_screener::data_collector::{unique_tickers, DataCollector, RunSummary};
use industry_screener::database::DatabaseManager;
use industry_screener::models::{
    parse_metrics, parse_percentiles, Config, ConfigError, CutoffDirection, CutoffRecord, Metric,
    MetricRecord,
};
use industry_screener::tables::{self, CutoffsMeta};
use industry_screener::universe::{self, Qualification};
use industry_screener::utils::{current_year, format_market_cap, format_ratio, init_logging};

#[derive(Parser)]
#[command(name = "industry-screener", version, about = "Industry-relative percentile screening of NSE/BSE equities")]
struct Cli {
    /// Directory holding input lists and output tables
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Minimum number of annual reports a ratio needs
    #[arg(long, global = true)]
    min_years: Option<usize>,

    /// Comma-separated percentiles, e.g. 1,5,10
    #[arg(long, global = true)]
    percentiles: Option<String>,

    /// Comma-separated metric columns to compute cutoffs for
    #[arg(long, global = true)]
    metrics: Option<String>,

    /// Which tail the percentile cutoffs select: top or bottom
    #[arg(long, global = true)]
    direction: Option<CutoffDirection>,

    #[arg(long, global = true)]
    max_retries: Option<u32>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Keep tickers whose annual reports cover every required year
    Qualify(QualifyArgs),
    /// Fetch statements and write the metrics table
    Ingest(IngestArgs),
    /// Aggregate per-industry percentile cutoffs from the metrics table
    Cutoffs(CutoffsArgs),
    /// Filter the metrics table against industry cutoffs
    Screen(ScreenArgs),
    /// Ingest then aggregate in one pass
    Run(RunArgs),
}

#[derive(Args)]
struct UniverseArgs {
    /// NSE equity list with a `Ticker` column
    #[arg(long)]
    nse_list: Option<PathBuf>,

    /// BSE equity list with a `TckrSymb` column
    #[arg(long)]
    bse_list: Option<PathBuf>,

    /// Explicit provider tickers (repeatable), bypasses the exchange lists
    #[arg(long = "ticker")]
    tickers: Vec<String>,

    /// Reference year for the required-year window (defaults to the current year)
    #[arg(long)]
    year: Option<i32>,
}

#[derive(Args)]
struct QualifyArgs {
    #[command(flatten)]
    universe: UniverseArgs,

    #[arg(long)]
    qualified_out: Option<PathBuf>,

    #[arg(long)]
    excluded_out: Option<PathBuf>,
}

#[derive(Args)]
struct IngestArgs {
    /// CSV with a `YF_Ticker` column (defaults to the qualified tickers file)
    #[arg(long)]
    tickers_file: Option<PathBuf>,

    /// Explicit provider tickers (repeatable), overrides --tickers-file
    #[arg(long = "ticker")]
    tickers: Vec<String>,

    #[arg(long)]
    output: Option<PathBuf>,

    /// Also store the metrics table in this SQLite database
    #[arg(long)]
    sqlite: Option<PathBuf>,
}

#[derive(Args)]
struct CutoffsArgs {
    #[arg(long)]
    input: Option<PathBuf>,

    #[arg(long)]
    output: Option<PathBuf>,

    #[arg(long)]
    sqlite: Option<PathBuf>,
}

#[derive(Args)]
struct ScreenArgs {
    #[arg(long)]
    metrics_file: Option<PathBuf>,

    #[arg(long)]
    cutoffs_file: Option<PathBuf>,

    /// `metric=percentile` pairs (repeatable), e.g. revenue_cagr=5
    #[arg(long = "select")]
    selections: Vec<String>,

    /// Percentile used for every cutoff-table metric when no --select is given
    #[arg(long)]
    percentile: Option<u8>,

    /// Industry name; fuzzy matched against the metrics table
    #[arg(long)]
    industry: Option<String>,

    #[arg(long)]
    min_market_cap: Option<f64>,

    #[arg(long)]
    max_market_cap: Option<f64>,

    /// Write the passing rows as CSV
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    universe: UniverseArgs,

    /// Ingest the given tickers as-is instead of qualifying them first
    #[arg(long)]
    skip_qualify: bool,

    #[arg(long)]
    sqlite: Option<PathBuf>,
}

impl Cli {
    /// Environment configuration with command-line overrides applied
    fn config(&self) -> Result<Config, ConfigError> {
        let mut config = Config::from_env()?;
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(min_years) = self.min_years {
            config.min_years = min_years;
        }
        if let Some(raw) = &self.percentiles {
            config.percentiles = parse_percentiles(raw)?;
        }
        if let Some(raw) = &self.metrics {
            config.screen_metrics = parse_metrics(raw)?;
        }
        if let Some(direction) = self.direction {
            config.cutoff_direction = direction;
        }
        if let Some(attempts) = self.max_retries {
            config.retry.max_attempts = attempts;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let config = match cli.config() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            eprintln!("❌ Configuration Error: {}", e);
            std::process::exit(2);
        }
    };
    info!("📋 Configuration loaded (data dir: {})", config.data_dir.display());

    match &cli.command {
        Command::Qualify(args) => run_qualify(&config, args).await.map(|_| ()),
        Command::Ingest(args) => run_ingest(&config, args).await,
        Command::Cutoffs(args) => run_cutoffs(&config, args).await,
        Command::Screen(args) => run_screen(&config, args),
        Command::Run(args) => run_pipeline(&config, args).await,
    }
}

fn build_provider(config: &Config) -> Result<CachedProvider<YahooClient>> {
    let client = YahooClient::new(config)?;
    Ok(CachedProvider::new(
        client,
        config.cache_capacity,
        config.cache_ttl,
    ))
}

fn universe_tickers(config: &Config, args: &UniverseArgs) -> Result<Vec<String>> {
    if !args.tickers.is_empty() {
        return Ok(unique_tickers(&args.tickers));
    }

    let nse = args.nse_list.clone().unwrap_or_else(|| config.nse_list_path());
    let bse = args.bse_list.clone().unwrap_or_else(|| config.bse_list_path());
    let existing = |path: PathBuf| path.exists().then_some(path);
    let (nse, bse) = (existing(nse), existing(bse));
    if nse.is_none() && bse.is_none() {
        bail!(
            "no tickers given and no exchange lists found under {}",
            config.data_dir.display()
        );
    }
    universe::load_exchange_tickers(nse.as_deref(), bse.as_deref())
}

fn require_tickers(tickers: Vec<String>) -> Result<Vec<String>> {
    if tickers.is_empty() {
        return Err(ConfigError::NoTickers.into());
    }
    Ok(tickers)
}

async fn qualify_universe(
    config: &Config,
    provider: &CachedProvider<YahooClient>,
    args: &UniverseArgs,
) -> Result<Qualification> {
    let tickers = require_tickers(universe_tickers(config, args)?)?;
    let year = args.year.unwrap_or_else(current_year);
    let required = universe::required_years(year, config.min_years);
    Ok(universe::qualify(provider, &tickers, &required, &config.retry).await)
}

async fn run_qualify(config: &Config, args: &QualifyArgs) -> Result<Qualification> {
    let provider = build_provider(config)?;
    let result = qualify_universe(config, &provider, &args.universe).await?;

    let qualified_out = args.qualified_out.clone().unwrap_or_else(|| config.qualified_path());
    let excluded_out = args.excluded_out.clone().unwrap_or_else(|| config.excluded_path());
    tables::write_coverage(&qualified_out, &result.qualified)?;
    tables::write_coverage(&excluded_out, &result.excluded)?;

    println!("✅ Qualified tickers: {} → {}", result.qualified.len(), qualified_out.display());
    println!("🚫 Excluded tickers:  {} → {}", result.excluded.len(), excluded_out.display());
    Ok(result)
}

async fn collect_metrics(
    config: &Config,
    provider: CachedProvider<YahooClient>,
    tickers: &[String],
) -> Result<(Vec<MetricRecord>, RunSummary)> {
    let tickers = require_tickers(unique_tickers(tickers))?;
    let collector = DataCollector::new(provider, config);
    let result = collector.collect(&tickers).await;
    Ok((result.records, result.summary))
}

async fn run_ingest(config: &Config, args: &IngestArgs) -> Result<()> {
    let tickers = if args.tickers.is_empty() {
        let path = args.tickers_file.clone().unwrap_or_else(|| config.qualified_path());
        tables::read_ticker_column(&path, "YF_Ticker")
            .with_context(|| format!("reading tickers from {}", path.display()))?
    } else {
        args.tickers.clone()
    };

    let provider = build_provider(config)?;
    let (records, summary) = collect_metrics(config, provider, &tickers).await?;

    let output = args.output.clone().unwrap_or_else(|| config.metrics_path());
    tables::write_metrics(&output, &records)?;
    println!("💾 Metrics table written to {}", output.display());

    if let Some(path) = &args.sqlite {
        let db = DatabaseManager::new(path).await?;
        db.replace_metrics(&records).await?;
        db.set_last_run(Utc::now()).await?;
        db.close().await;
    }

    print_summary(&summary, records.len(), None);
    Ok(())
}

fn compute_cutoffs(config: &Config, records: &[MetricRecord]) -> Vec<CutoffRecord> {
    aggregate_with_direction(
        records,
        &config.percentiles,
        &config.screen_metrics,
        config.cutoff_direction,
    )
}

async fn run_cutoffs(config: &Config, args: &CutoffsArgs) -> Result<()> {
    let input = args.input.clone().unwrap_or_else(|| config.metrics_path());
    let records = tables::read_metrics(&input)?;
    info!("📊 Loaded {} metric rows from {}", records.len(), input.display());

    let cutoffs = compute_cutoffs(config, &records);
    let output = args.output.clone().unwrap_or_else(|| config.cutoffs_path());
    write_cutoffs_table(config, &output, &cutoffs)?;
    println!("💾 Cutoffs table written to {} ({} rows)", output.display(), cutoffs.len());

    if let Some(path) = &args.sqlite {
        let db = DatabaseManager::new(path).await?;
        db.replace_cutoffs(&cutoffs, &config.screen_metrics).await?;
        db.set_cutoff_direction(config.cutoff_direction).await?;
        db.close().await;
    }
    Ok(())
}

/// Cutoffs Table plus the sidecar recording which tail it was aggregated for
fn write_cutoffs_table(config: &Config, path: &Path, cutoffs: &[CutoffRecord]) -> Result<()> {
    tables::write_cutoffs(path, cutoffs, &config.screen_metrics)?;
    tables::write_cutoffs_meta(
        path,
        &CutoffsMeta {
            direction: config.cutoff_direction,
        },
    )
}

async fn run_pipeline(config: &Config, args: &RunArgs) -> Result<()> {
    let provider = build_provider(config)?;

    let tickers: Vec<String> = if args.skip_qualify {
        universe_tickers(config, &args.universe)?
    } else {
        let result = qualify_universe(config, &provider, &args.universe).await?;
        tables::write_coverage(&config.qualified_path(), &result.qualified)?;
        tables::write_coverage(&config.excluded_path(), &result.excluded)?;
        println!(
            "✅ Qualified {} of {} tickers",
            result.qualified.len(),
            result.qualified.len() + result.excluded.len()
        );
        result.qualified.into_iter().map(|c| c.ticker).collect()
    };

    let (records, summary) = collect_metrics(config, provider, &tickers).await?;
    let cutoffs = compute_cutoffs(config, &records);

    tables::write_metrics(&config.metrics_path(), &records)?;
    write_cutoffs_table(config, &config.cutoffs_path(), &cutoffs)?;
    println!("💾 Tables written under {}", config.data_dir.display());

    if let Some(path) = &args.sqlite {
        let db = DatabaseManager::new(path).await?;
        db.replace_metrics(&records).await?;
        db.replace_cutoffs(&cutoffs, &config.screen_metrics).await?;
        db.set_cutoff_direction(config.cutoff_direction).await?;
        db.set_last_run(Utc::now()).await?;
        let (metric_rows, cutoff_rows, _) = db.get_stats().await?;
        info!("SQLite {}: {} metric rows, {} cutoff rows", path.display(), metric_rows, cutoff_rows);
        db.close().await;
    }

    print_summary(&summary, records.len(), Some(cutoffs.len()));
    Ok(())
}

fn print_summary(summary: &RunSummary, metric_rows: usize, cutoff_rows: Option<usize>) {
    println!("\n📊 Run Summary");
    println!("==============");
    println!("   Tickers processed: {}", summary.processed);
    println!("   Without data:      {}", summary.no_data);
    println!("   Tickers failed:    {}", summary.failed);
    println!("   Metrics rows:      {}", metric_rows);
    if let Some(rows) = cutoff_rows {
        println!("   Cutoff rows:       {}", rows);
    }
    if !summary.no_data_tickers.is_empty() {
        println!("   No data: {}", summary.no_data_tickers.join(", "));
    }
    if !summary.failed_tickers.is_empty() {
        println!("   Failed: {}", summary.failed_tickers.join(", "));
    }
}

fn parse_selection(raw: &str) -> Result<MetricSelection> {
    let (metric, percentile) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("selection '{}' must look like metric=percentile", raw))?;
    Ok(MetricSelection {
        metric: metric.trim().parse()?,
        percentile: percentile
            .trim()
            .parse()
            .with_context(|| format!("invalid percentile in '{}'", raw))?,
    })
}

fn screen_selections(
    config: &Config,
    args: &ScreenArgs,
    cutoff_metrics: &[Metric],
    cutoffs: &[CutoffRecord],
) -> Result<Vec<MetricSelection>> {
    let selections = if args.selections.is_empty() {
        let percentile = match args.percentile {
            Some(p) => p,
            None => *config.percentiles.first().ok_or(ConfigError::NoPercentiles)?,
        };
        cutoff_metrics
            .iter()
            .map(|&metric| MetricSelection { metric, percentile })
            .collect()
    } else {
        args.selections
            .iter()
            .map(|raw| parse_selection(raw))
            .collect::<Result<Vec<_>>>()?
    };

    for selection in &selections {
        if !cutoff_metrics.contains(&selection.metric) {
            bail!("cutoffs table has no column for {}", selection.metric);
        }
        if !cutoffs.iter().any(|c| c.percentile == selection.percentile) {
            bail!("cutoffs table has no rows for percentile {}", selection.percentile);
        }
    }
    Ok(selections)
}

fn run_screen(config: &Config, args: &ScreenArgs) -> Result<()> {
    let metrics_path = args.metrics_file.clone().unwrap_or_else(|| config.metrics_path());
    let cutoffs_path = args.cutoffs_file.clone().unwrap_or_else(|| config.cutoffs_path());
    let records = tables::read_metrics(&metrics_path)?;
    let (cutoff_metrics, cutoffs) = tables::read_cutoffs(&cutoffs_path)?;
    tables::ensure_cutoffs_direction(&cutoffs_path, config.cutoff_direction)?;

    let selections = screen_selections(config, args, &cutoff_metrics, &cutoffs)?;

    let industry = match &args.industry {
        Some(query) => {
            let known = known_industries(&records);
            let resolved = resolve_industry(query, &known)
                .ok_or_else(|| anyhow!("no industry matches '{}'", query))?;
            if !resolved.eq_ignore_ascii_case(query.trim()) {
                println!("🔎 Using industry '{}' for '{}'", resolved, query);
            }
            Some(resolved)
        }
        None => None,
    };

    let market_cap_range = match (args.min_market_cap, args.max_market_cap) {
        (None, None) => None,
        (low, high) => Some((low.unwrap_or(f64::MIN), high.unwrap_or(f64::MAX))),
    };

    let criteria = ScreenCriteria {
        selections,
        industry,
        market_cap_range,
        direction: config.cutoff_direction,
    };
    let passing = screen(&records, &cutoffs, &criteria);

    print_cutoffs_used(&cutoffs, &criteria);
    print_screen_table(&passing, &criteria);

    if let Some(output) = &args.output {
        write_screen_output(output, &passing)?;
    }
    Ok(())
}

fn print_cutoffs_used(cutoffs: &[CutoffRecord], criteria: &ScreenCriteria) {
    let index = CutoffIndex::new(cutoffs);
    let mut industries: Vec<&str> = cutoffs.iter().map(|c| c.industry.as_str()).collect();
    industries.dedup();
    if let Some(industry) = &criteria.industry {
        industries.retain(|i| *i == industry.as_str());
    }

    println!("\n📐 Cutoffs ({:?} percentiles)", criteria.direction);
    for industry in industries {
        let cells: Vec<String> = criteria
            .selections
            .iter()
            .map(|s| {
                format!(
                    "{}@{} = {}",
                    s.metric,
                    s.percentile,
                    format_ratio(index.cutoff(industry, s.metric, s.percentile))
                )
            })
            .collect();
        println!("   {:<40} {}", industry, cells.join("  "));
    }
}

fn print_screen_table(passing: &[MetricRecord], criteria: &ScreenCriteria) {
    println!("\n🏆 {} tickers passed", passing.len());
    if passing.is_empty() {
        return;
    }

    let mut header = format!("{:<16} {:<40} {:>16}", "Ticker", "Industry", "Market Cap");
    for selection in &criteria.selections {
        header.push_str(&format!(" {:>24}", selection.metric.column()));
    }
    println!("{}", header);
    println!("{}", "-".repeat(header.chars().count()));

    for record in passing {
        let mut line = format!(
            "{:<16} {:<40} {:>16}",
            record.ticker,
            record.industry.as_deref().unwrap_or("N/A"),
            format_market_cap(record.market_cap)
        );
        for selection in &criteria.selections {
            line.push_str(&format!(" {:>24}", format_ratio(record.value(selection.metric))));
        }
        println!("{}", line);
    }
}

fn write_screen_output(path: &Path, passing: &[MetricRecord]) -> Result<()> {
    tables::write_metrics(path, passing)?;
    println!("💾 Screen results written to {}", path.display());
    Ok(())
}
