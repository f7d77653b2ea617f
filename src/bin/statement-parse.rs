//! CLI binary for statement-parser.
//!
//! A thin shim over the library crate: maps CLI flags to `ParserConfig` and
//! `QueueConfig`, queues every input as a job, follows the jobs and prints
//! their final status documents.

use anyhow::{Context, Result};
use clap::Parser;
use futures::future::join_all;
use futures::StreamExt;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use statement_parser::{
    load_upload, watch_job, JobLifecycleAdapter, JobOptions, JobQueue, JobState, JobStatus,
    ParserConfig, QueueConfig, StatementError, StatementParser, SubmittedJob,
};
use std::io::{self, Write};
use std::path::PathBuf;
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── Per-job progress bars ────────────────────────────────────────────────────

/// One bar per job, stacked in a [`MultiProgress`]. Position is the job's
/// progress percentage; the message is its queue state.
fn job_bar(multi: &MultiProgress, file_name: &str, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let bar = multi.add(ProgressBar::new(100));
    let style = ProgressStyle::with_template(
        "{spinner:.cyan} {prefix:.bold}  [{bar:32.green/238}] {pos:>3}%  {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▉▊▋▌▍▎▏  ")
    .tick_strings(TICKS);

    bar.set_style(style);
    bar.set_prefix(file_name.to_string());
    bar.set_message("queued");
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

/// Drive `bar` from the job's status stream until the job is terminal.
async fn follow(
    queue: JobQueue,
    job: SubmittedJob,
    bar: ProgressBar,
    poll: Duration,
) -> Result<JobStatus, StatementError> {
    let mut updates = watch_job(queue, job.job_id.clone(), poll);
    let mut last = None;

    while let Some(update) = updates.next().await {
        let status = update?;
        bar.set_position(u64::from(status.progress));
        bar.set_message(status.status.to_string());
        if status.status == JobState::Delayed {
            bar.println(format!(
                "  {} {}  attempt {} failed, retrying",
                cyan("↻"),
                job.file_name,
                status.attempts_made
            ));
        }
        last = Some(status);
    }

    let status = last.ok_or_else(|| StatementError::JobNotFound {
        job_id: job.job_id.clone(),
    })?;

    match status.status {
        JobState::Completed => {
            let summary = status
                .result
                .as_ref()
                .map(|r| {
                    format!(
                        "{} transactions, reconciled: {}",
                        r.transaction_count(),
                        r.is_reconciled
                    )
                })
                .unwrap_or_default();
            bar.finish_with_message(format!("{} {}", green("✓"), dim(&summary)));
        }
        _ => {
            let reason = status
                .error
                .as_ref()
                .map(|e| truncate(&e.message, 80))
                .unwrap_or_default();
            bar.abandon_with_message(format!("{} {}", red("✗"), red(&reason)));
        }
    }

    Ok(status)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max - 1).collect();
        format!("{head}\u{2026}")
    } else {
        s.to_string()
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Parse one statement (status JSON on stdout)
  statement-parse january.pdf

  # Several statements, two at a time, results to a file
  statement-parse --workers 2 jan.pdf feb.pdf mar.pdf -o statements.json

  # Download from a URL
  statement-parse https://example.com/statements/2024-01.pdf

  # Use a specific model
  statement-parse --provider anthropic --model claude-sonnet-4-20250514 jan.pdf

  # No retries, fail fast
  statement-parse --attempts 1 jan.pdf

OUTPUT:
  One status document per input (an array when more than one input is given):
    jobId, status, progress, createdAt, fileName, jobType, attemptsMade,
    processedAt, completedAt, processingTime, and either result or error.
  Exit status is 1 when any job failed.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY            OpenAI API key
  ANTHROPIC_API_KEY         Anthropic API key
  GEMINI_API_KEY            Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER    Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL           Override model ID
  STATEMENT_PARSER_*        Fallback for every flag below (e.g. STATEMENT_PARSER_WORKERS)
  RUST_LOG                  Log filter; overrides --verbose / --quiet

SETUP:
  1. Set API key:     export OPENAI_API_KEY=sk-...
  2. Parse:           statement-parse statement.pdf
"#;

/// Extract structured, reconciled data from PDF bank statements.
#[derive(Parser, Debug)]
#[command(
    name = "statement-parse",
    version,
    about = "Extract structured, reconciled data from PDF bank statements using an LLM",
    long_about = "Queue one or more PDF bank statements (local files or URLs) as parsing jobs. \
Each job extracts the PDF text, asks an LLM for the account holder, dates, balances and \
transactions, validates the reply and checks that the balances reconcile.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file paths or HTTP/HTTPS URLs.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Write the status JSON to this file instead of stdout.
    #[arg(short, long, env = "STATEMENT_PARSER_OUTPUT")]
    output: Option<PathBuf>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(
        long,
        env = "EDGEQUAKE_LLM_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: openai, anthropic, gemini, azure, ollama."
    )]
    provider: Option<String>,

    /// LLM model ID (default: gpt-4o).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "STATEMENT_PARSER_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Max LLM output tokens.
    #[arg(long, env = "STATEMENT_PARSER_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM call timeout in seconds.
    #[arg(long, env = "STATEMENT_PARSER_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "STATEMENT_PARSER_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Jobs processed in parallel.
    #[arg(short, long, env = "STATEMENT_PARSER_WORKERS", default_value_t = 1)]
    workers: usize,

    /// Attempts per job, including the first.
    #[arg(long, env = "STATEMENT_PARSER_ATTEMPTS", default_value_t = 3)]
    attempts: u32,

    /// Delay before the first retry in milliseconds; doubles per retry.
    #[arg(long, env = "STATEMENT_PARSER_BACKOFF_MS", default_value_t = 2000)]
    backoff_ms: u64,

    /// Status poll interval in milliseconds.
    #[arg(long, env = "STATEMENT_PARSER_POLL_MS", default_value_t = 200, hide = true)]
    poll_ms: u64,

    /// Disable progress bars.
    #[arg(long, env = "STATEMENT_PARSER_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "STATEMENT_PARSER_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the JSON result.
    #[arg(short, long, env = "STATEMENT_PARSER_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO-level job logs would tear through the progress bars; the bars
    // carry the same information.
    let show_progress = !cli.quiet && !cli.no_progress;
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

    // ── Build config ─────────────────────────────────────────────────────
    let (parser_config, queue_config) = build_config(&cli)?;

    // ── Load every input before queueing anything ────────────────────────
    let mut uploads = Vec::with_capacity(cli.inputs.len());
    for input in &cli.inputs {
        let upload = load_upload(input, &parser_config)
            .await
            .with_context(|| format!("Failed to load {input}"))?;
        uploads.push(upload);
    }

    let parser = StatementParser::from_config(&parser_config)
        .context("Failed to configure LLM provider")?;
    if !cli.quiet {
        eprintln!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "Parsing {} statement(s) with {} ({})",
                uploads.len(),
                parser.client_name(),
                parser_config.model_or_default()
            ))
        );
    }

    let queue = JobQueue::start(JobLifecycleAdapter::new(Arc::new(parser)), queue_config);

    // ── Submit and follow ────────────────────────────────────────────────
    let multi = MultiProgress::new();
    let poll = Duration::from_millis(cli.poll_ms.max(10));
    let mut followers = Vec::with_capacity(uploads.len());
    for upload in uploads {
        let job = queue
            .submit(upload, JobOptions::default())
            .await
            .context("Failed to queue job")?;
        let bar = job_bar(&multi, &job.file_name, show_progress);
        followers.push(follow(queue.clone(), job, bar, poll));
    }

    let statuses = join_all(followers)
        .await
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .context("Lost track of a job")?;

    queue.shutdown().await;

    // ── Emit results ─────────────────────────────────────────────────────
    let json = if statuses.len() == 1 {
        serde_json::to_string_pretty(&statuses[0])
    } else {
        serde_json::to_string_pretty(&statuses)
    }
    .context("Failed to serialise status")?;

    if let Some(ref path) = cli.output {
        tokio::fs::write(path, format!("{json}\n"))
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        writeln!(handle, "{json}").context("Failed to write to stdout")?;
    }

    let failed = statuses
        .iter()
        .filter(|s| s.status == JobState::Failed)
        .count();

    if !cli.quiet {
        if failed == 0 {
            eprintln!(
                "{} {} statement(s) parsed successfully",
                green("✔"),
                bold(&statuses.len().to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} statement(s) parsed  ({} failed)",
                if failed == statuses.len() { red("✘") } else { cyan("⚠") },
                bold(&(statuses.len() - failed).to_string()),
                statuses.len(),
                red(&failed.to_string()),
            );
        }
        if let Some(ref path) = cli.output {
            eprintln!("   {}", dim(&format!("→ {}", path.display())));
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} job(s) failed");
    }
    Ok(())
}

/// Map CLI args to the parser and queue configs.
fn build_config(cli: &Cli) -> Result<(ParserConfig, QueueConfig)> {
    let mut builder = ParserConfig::builder()
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout);
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    let parser = builder.build().context("Invalid configuration")?;

    let queue = QueueConfig::builder()
        .workers(cli.workers)
        .attempts(cli.attempts)
        .backoff_delay_ms(cli.backoff_ms)
        .build()
        .context("Invalid queue configuration")?;

    Ok((parser, queue))
}
