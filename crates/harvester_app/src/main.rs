#[cfg(feature = "browser")]
mod browser;
mod config;
mod progress;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use harvest_logging::{harvest_error, harvest_info, LogDestination};
use harvester_engine::{
    harvest, write_records, write_report, DocumentSettings, DocumentSource, ExportFormat,
    ExportOptions, FetchSettings, HarvestReport, HarvestSettings, HttpPageLoader, ProgressSink,
    ReportContext, SnapshotLoader,
};
use log::LevelFilter;
use url::Url;

use crate::config::HarvestProfile;
use crate::progress::ConsoleProgress;

#[derive(Debug, Parser)]
#[command(name = "harvester", version, about = "Harvest records from a \"load more\" listing")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Paginate a listing to the end and export one record per item.
    Run(RunArgs),
    /// Print the built-in profile as RON, as a starting point for your own.
    PrintProfile,
}

#[derive(Debug, Args)]
struct RunArgs {
    /// RON profile; the built-in trade-show profile when omitted.
    #[arg(long)]
    profile: Option<PathBuf>,
    #[arg(long, value_enum)]
    source: Option<SourceKind>,
    /// Directory of recorded renders for the snapshots source.
    #[arg(long)]
    snapshots: Option<PathBuf>,
    #[arg(long)]
    url: Option<String>,
    #[arg(long)]
    max_clicks: Option<u32>,
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long, value_enum)]
    format: Option<FormatArg>,
    /// Where to write the JSON run report; next to the output by default.
    #[arg(long)]
    report: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = LogArg::File)]
    log: LogArg,
    #[arg(long, default_value = "harvest.log")]
    log_file: PathBuf,
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SourceKind {
    Snapshots,
    Http,
    Browser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Csv,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogArg {
    Terminal,
    File,
    Both,
}

impl From<FormatArg> for ExportFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Csv => ExportFormat::Csv,
            FormatArg::Json => ExportFormat::Json,
        }
    }
}

impl From<LogArg> for LogDestination {
    fn from(log: LogArg) -> Self {
        match log {
            LogArg::Terminal => LogDestination::Terminal,
            LogArg::File => LogDestination::File,
            LogArg::Both => LogDestination::Both,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::PrintProfile => print_profile(),
        Command::Run(args) => run(args).await,
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            harvest_error!("{:#}", err);
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn print_profile() -> Result<()> {
    println!("{}", HarvestProfile::default().to_ron()?);
    Ok(())
}

async fn run(args: RunArgs) -> Result<()> {
    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    harvest_logging::initialize(args.log.into(), level, &args.log_file);

    let mut profile = match &args.profile {
        Some(path) => HarvestProfile::load(path)?,
        None => HarvestProfile::default(),
    };
    if let Some(url) = &args.url {
        profile.listing_url = url.clone();
    }
    if let Some(max_clicks) = args.max_clicks {
        profile.max_attempts = max_clicks;
    }
    let format = args.format.map(ExportFormat::from).unwrap_or(profile.format);
    let out = match &args.out {
        Some(path) => path.clone(),
        None => PathBuf::from(&profile.output).with_extension(format.extension()),
    };
    let report_path = args
        .report
        .clone()
        .unwrap_or_else(|| out.with_extension("report.json"));

    let source = args.source.unwrap_or(if cfg!(feature = "browser") {
        SourceKind::Browser
    } else {
        SourceKind::Http
    });
    harvest_info!("Harvesting {} via {:?}", profile.listing_url, source);

    let started_utc = Utc::now().to_rfc3339();
    let settings = profile.harvest_settings();
    let sink = ConsoleProgress::default();
    let report = match source {
        SourceKind::Snapshots => {
            let dir = args
                .snapshots
                .as_deref()
                .context("--snapshots <DIR> is required for the snapshots source")?;
            harvest_snapshots(dir, &profile, &settings, &sink).await?
        }
        SourceKind::Http => harvest_http(&profile, &settings, &sink).await?,
        SourceKind::Browser => harvest_browser(&profile, &settings, &sink).await?,
    };
    let finished_utc = Utc::now().to_rfc3339();

    let options = ExportOptions {
        format,
        list_delimiter: profile.list_delimiter.clone(),
        ..ExportOptions::default()
    };
    let summary = write_records(&out, &profile.schema, &report.records, &options)
        .with_context(|| format!("writing {}", out.display()))?;
    let context = ReportContext {
        listing: profile.listing_url.clone(),
        started_utc,
        finished_utc,
    };
    write_report(&report_path, &report, &context)
        .with_context(|| format!("writing {}", report_path.display()))?;

    print_summary(&report, &summary.output_path, &report_path);
    Ok(())
}

fn document_settings(profile: &HarvestProfile) -> DocumentSettings {
    DocumentSettings {
        item: profile.item.clone(),
        trigger: profile.trigger.clone(),
        mode: profile.load_mode,
    }
}

async fn harvest_snapshots(
    dir: &Path,
    profile: &HarvestProfile,
    settings: &HarvestSettings,
    sink: &dyn ProgressSink,
) -> Result<HarvestReport> {
    let mut loader = SnapshotLoader::from_dir(dir)?;
    if let Ok(base) = Url::parse(&profile.listing_url) {
        loader = loader.with_base_url(base);
    }
    let source = DocumentSource::open(loader, document_settings(profile))
        .await
        .with_context(|| format!("opening snapshots in {}", dir.display()))?;
    Ok(harvest(source, &profile.schema, settings, sink).await)
}

async fn harvest_http(
    profile: &HarvestProfile,
    settings: &HarvestSettings,
    sink: &dyn ProgressSink,
) -> Result<HarvestReport> {
    let start = Url::parse(&profile.listing_url)
        .with_context(|| format!("invalid listing url {:?}", profile.listing_url))?;
    let loader = HttpPageLoader::new(start, FetchSettings::default())?;
    let source = DocumentSource::open(loader, document_settings(profile))
        .await
        .with_context(|| format!("loading {}", profile.listing_url))?;
    Ok(harvest(source, &profile.schema, settings, sink).await)
}

#[cfg(feature = "browser")]
async fn harvest_browser(
    profile: &HarvestProfile,
    settings: &HarvestSettings,
    sink: &dyn ProgressSink,
) -> Result<HarvestReport> {
    let source = browser::ChromiumSource::open(
        &profile.listing_url,
        profile.item.clone(),
        profile.trigger.clone(),
    )
    .await
    .with_context(|| format!("opening {} in Chromium", profile.listing_url))?;
    Ok(harvest(source, &profile.schema, settings, sink).await)
}

#[cfg(not(feature = "browser"))]
async fn harvest_browser(
    _profile: &HarvestProfile,
    _settings: &HarvestSettings,
    _sink: &dyn ProgressSink,
) -> Result<HarvestReport> {
    anyhow::bail!("this build has no browser support; rebuild with `--features browser`")
}

fn print_summary(report: &HarvestReport, output: &Path, report_path: &Path) {
    let reason = report
        .terminal_reason()
        .map(|reason| reason.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    println!(
        "Scraped {} records from {} items ({} failed); pagination stopped: {}",
        report.extracted(),
        report.items_found,
        report.errors.len(),
        reason
    );
    if let Some(err) = &report.collection_error {
        println!("Could not read the item list: {err}");
    }
    println!("Saved records to {}", output.display());
    println!("Saved run report to {}", report_path.display());
}
