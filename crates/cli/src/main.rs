// ABOUTME: CLI for collecting product listings with the listings-scout crawler.
// ABOUTME: Runs one crawl job, streams progress as JSON lines on stderr, and writes CSV or JSON results.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use listings_scout::formats::{self, default_filename};
use listings_scout::{
    Crawler, ExportFormat, JobRegistry, JobStatus, Options, ProgressEvent, ProgressHub,
    SiteProfile,
};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Format {
    Csv,
    Json,
}

impl From<Format> for ExportFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Csv => ExportFormat::Csv,
            Format::Json => ExportFormat::Json,
        }
    }
}

/// Collect product listings for a keyword and export them.
#[derive(Parser, Debug)]
#[command(name = "listings")]
#[command(about = "Collect product listings from Danawa search results")]
struct Args {
    /// Search keyword
    keyword: String,

    /// Number of result pages to crawl
    #[arg(short = 'p', long = "pages", default_value_t = 3)]
    pages: u32,

    /// Output format
    #[arg(short = 'f', long = "format", value_enum, default_value_t = Format::Csv)]
    format: Format,

    /// Output file path, "-" for stdout (default: danawa_results_<id>.<ext>)
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Search endpoint URL
    #[arg(long = "endpoint")]
    endpoint: Option<String>,

    /// Origin used to resolve root-relative product links
    #[arg(long = "base-origin")]
    base_origin: Option<String>,

    /// Site profile JSON file replacing the built-in selectors
    #[arg(long = "profile")]
    profile: Option<PathBuf>,

    /// Minimum pause between pages in milliseconds
    #[arg(long = "delay-min-ms")]
    delay_min_ms: Option<u64>,

    /// Maximum pause between pages in milliseconds
    #[arg(long = "delay-max-ms")]
    delay_max_ms: Option<u64>,

    /// Per-request timeout in seconds
    #[arg(long = "timeout-secs")]
    timeout_secs: Option<u64>,

    /// Do not print progress events
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose {
        "listings_scout=debug,listings=debug"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn build_crawler(args: &Args) -> Result<Crawler> {
    let defaults = Options::default();
    let delay_min = args
        .delay_min_ms
        .map(Duration::from_millis)
        .unwrap_or(defaults.delay_min);
    let delay_max = args
        .delay_max_ms
        .map(Duration::from_millis)
        .unwrap_or(defaults.delay_max);

    let mut builder = Crawler::builder().delay(delay_min, delay_max);
    if let Some(endpoint) = &args.endpoint {
        builder = builder.endpoint(endpoint);
    }
    if let Some(origin) = &args.base_origin {
        builder = builder.base_origin(origin);
    }
    if let Some(secs) = args.timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    if let Some(path) = &args.profile {
        let json = fs::read_to_string(path)
            .with_context(|| format!("failed to read profile {}", path.display()))?;
        builder = builder.profile(SiteProfile::from_json(&json)?);
    }

    Ok(builder.build()?)
}

async fn print_progress(mut receiver: mpsc::Receiver<ProgressEvent>, quiet: bool) {
    while let Some(event) = receiver.recv().await {
        if quiet {
            continue;
        }
        match serde_json::to_string(&event) {
            Ok(line) => eprintln!("{}", line),
            Err(e) => warn!(error = %e, "failed to encode progress event"),
        }
    }
}

fn write_output(target: Option<&str>, default_name: String, bytes: &[u8]) -> Result<String> {
    match target {
        Some("-") => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(bytes)?;
            stdout.flush()?;
            Ok("stdout".to_string())
        }
        Some(path) => {
            fs::write(path, bytes).with_context(|| format!("failed to write {}", path))?;
            Ok(path.to_string())
        }
        None => {
            fs::write(&default_name, bytes)
                .with_context(|| format!("failed to write {}", default_name))?;
            Ok(default_name)
        }
    }
}

async fn run(args: Args) -> Result<JobStatus> {
    let format = ExportFormat::from(args.format);
    let keyword = args.keyword.trim().to_string();
    if keyword.is_empty() {
        bail!("keyword must not be empty");
    }
    if args.pages == 0 {
        bail!("--pages must be at least 1");
    }

    let crawler = build_crawler(&args)?;

    let hub = ProgressHub::new();
    let subscription = hub.subscribe();
    let registry = JobRegistry::new(Arc::new(hub.clone()));
    let id = registry.create(keyword, args.pages);
    debug!(job_id = %id, "job created");

    let printer = tokio::spawn(print_progress(subscription.receiver, args.quiet));
    let status = registry
        .run(&id, crawler)
        .await
        .context("job did not start")?;
    hub.unsubscribe(subscription.id);
    printer.await?;

    let snapshot = registry.snapshot(&id).context("job disappeared")?;
    if status != JobStatus::Completed {
        eprintln!("{}: {}", status, snapshot.message);
        return Ok(status);
    }

    let records = registry.results(&id).unwrap_or_default();
    let bytes = formats::export(&records, format)?;
    let written_to = write_output(
        args.output.as_deref(),
        default_filename(&id, format),
        &bytes,
    )?;
    if !args.quiet {
        eprintln!("wrote {} records to {}", records.len(), written_to);
    }

    Ok(status)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args).await {
        Ok(JobStatus::Completed) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(1),
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(1)
        }
    }
}
