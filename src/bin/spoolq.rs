//! CLI binary for edgequake-spool.
//!
//! A thin shim over the library crate that takes ownership of raw spool
//! files, queues them and prints the pending jobs in processing order.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_spool::{
    ingest_all, IngestProgressCallback, Intake, JobDescriptor, JsonDescriptorStore,
    PendingJobQueue, ProgressCallback, RawInputFile, SourceFormat, SpoolConfig,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the batch plus a log line per
/// file. Files may finish out of order when intake runs concurrently.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Spooling");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }
}

impl IngestProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        self.bar.set_length(total_files as u64);
        self.bar.reset_eta();
    }

    fn on_file_complete(&self, raw: &Path, descriptor: &Path, queued: bool) {
        let mark = if queued { green("✓") } else { cyan("=") };
        self.bar.println(format!(
            "  {} {}  {}",
            mark,
            raw.display(),
            dim(&descriptor.display().to_string()),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, raw: &Path, error: &str) {
        // Truncate very long error messages to keep output tidy.
        let msg = if error.chars().count() > 80 {
            let head: String = error.chars().take(79).collect();
            format!("{head}\u{2026}")
        } else {
            error.to_string()
        };

        self.bar
            .println(format!("  {} {}  {}", red("✗"), raw.display(), red(&msg)));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        let failed = total_files.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} files spooled",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} files spooled  ({} failed)",
                if failed == total_files {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_files,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Take ownership of one PostScript job
  spoolq job.ps

  # Several files into a custom spool folder, printed as JSON
  spoolq --spool-dir /var/spool/edgequake --json a.ps b.pdf

  # Driver output without a useful extension
  spoolq --format ps --printer "HP LaserJet" output.tmp

  # Queue, list, then remove every job and its files
  spoolq --drain job.ps

ENVIRONMENT VARIABLES:
  SPOOLQ_SPOOL_DIR        Spool folder (default: <tmp>/edgequake-spool)
  SPOOLQ_PRINTER          Printer name recorded for every file
  SPOOLQ_DEFAULT_PRINTER  Printer used when no name is given
  RUST_LOG                Tracing filter, overrides -v / -q
"#;

/// Take ownership of raw print-spooler files and queue them for conversion.
#[derive(Parser, Debug)]
#[command(
    name = "spoolq",
    version,
    about = "Take ownership of raw print-spooler files and queue them for conversion",
    long_about = "Copies each raw spool file (PostScript or PDF) into its own workspace \
under the spool folder, writes a job descriptor next to it and lists the pending jobs \
in the order a converter would process them.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Raw spool files to take ownership of.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Spool folder that receives one workspace per job.
    #[arg(long, env = "SPOOLQ_SPOOL_DIR")]
    spool_dir: Option<PathBuf>,

    /// Printer name recorded for every file.
    #[arg(short, long, env = "SPOOLQ_PRINTER")]
    printer: Option<String>,

    /// Printer used when --printer is not given.
    #[arg(long, env = "SPOOLQ_DEFAULT_PRINTER")]
    default_printer: Option<String>,

    /// Treat every file as this format: ps or pdf.
    #[arg(long, env = "SPOOLQ_FORMAT")]
    format: Option<SourceFormat>,

    /// Number of files taken over concurrently.
    #[arg(short, long, env = "SPOOLQ_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Workspace names tried per file before giving up.
    #[arg(long, env = "SPOOLQ_MAX_ATTEMPTS", default_value_t = 1000)]
    max_attempts: u32,

    /// Print pending job descriptors as JSON.
    #[arg(long, env = "SPOOLQ_JSON")]
    json: bool,

    /// Remove every queued job and its files after listing.
    #[arg(long)]
    drain: bool,

    /// Disable progress bar.
    #[arg(long, env = "SPOOLQ_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SPOOLQ_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SPOOLQ_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && cli.files.len() > 1;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli)?;
    let intake = Intake::new(&config);
    let queue = PendingJobQueue::new(Arc::new(JsonDescriptorStore), config.notification_capacity);

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn IngestProgressCallback>)
    } else {
        None
    };

    // ── Intake ───────────────────────────────────────────────────────────
    let files: Vec<RawInputFile> = cli
        .files
        .iter()
        .map(|path| match cli.printer {
            Some(ref printer) => RawInputFile::new(path).with_printer(printer),
            None => RawInputFile::new(path),
        })
        .collect();
    let total = files.len();

    let outcomes = ingest_all(
        &intake,
        &queue,
        files,
        &config.spool_folder,
        config.concurrency,
        progress,
    )
    .await;

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    if !show_progress && !cli.quiet {
        for outcome in &outcomes {
            if let Err(ref e) = outcome.result {
                eprintln!("{} {}: {}", red("✗"), outcome.raw.path.display(), e);
            }
        }
    }

    // ── Report ───────────────────────────────────────────────────────────
    let pending = queue.snapshot();
    if cli.json {
        let json = serde_json::to_string_pretty(&pending_as_json(&pending))
            .context("Failed to serialise pending jobs")?;
        println!("{json}");
    } else {
        for job in &pending {
            println!("{}", job.descriptor_path.display());
        }
    }

    if cli.drain {
        while let Some(job) = queue.peek() {
            queue.remove_and_delete(&job);
        }
        if !cli.quiet {
            eprintln!("Drained {} jobs", pending.len());
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed}/{total} files could not be spooled");
    }
    Ok(())
}

/// Map CLI args to `SpoolConfig`.
fn build_config(cli: &Cli) -> Result<SpoolConfig> {
    let mut builder = SpoolConfig::builder()
        .concurrency(cli.concurrency)
        .max_allocation_attempts(cli.max_attempts);

    if let Some(ref dir) = cli.spool_dir {
        builder = builder.spool_folder(dir);
    }
    if let Some(ref printer) = cli.default_printer {
        builder = builder.default_printer(printer);
    }
    if let Some(format) = cli.format {
        builder = builder.format(format);
    }

    builder.build().context("Invalid configuration")
}

/// Descriptors skip their on-disk location when serialised; put it back for
/// the listing.
fn pending_as_json(jobs: &[JobDescriptor]) -> Vec<serde_json::Value> {
    jobs.iter()
        .map(|job| {
            serde_json::json!({
                "descriptor": job.descriptor_path,
                "workspace": job.workspace,
                "source_files": job.source_files,
            })
        })
        .collect()
}
