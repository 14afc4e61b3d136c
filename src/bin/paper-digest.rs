//! CLI binary for paper-digest.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `DigestConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use paper_digest::{DigestConfig, DigestProgressCallback, Pipeline, ProgressCallback};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one bar per paper (pages), then a spinner for the review.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl DigestProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_papers: usize) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Digesting {total_papers} papers…"))
        ));
    }

    fn on_paper_start(&self, pdf: &Path, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_style(style);
        self.bar.set_length(total_pages as u64);
        self.bar.set_position(0);
        self.bar.set_prefix("Extracting");
        self.bar.set_message(
            pdf.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        self.bar.reset_eta();
    }

    fn on_page_complete(&self, _pdf: &Path, _page: usize, _total: usize, _content_len: usize) {
        self.bar.inc(1);
    }

    fn on_paper_complete(&self, pdf: &Path, title: &str) {
        self.bar.println(format!(
            "  {} {}  {}",
            green("✓"),
            pdf.display(),
            dim(title)
        ));
    }

    fn on_review_start(&self, paper_count: usize) {
        self.bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        self.bar.set_prefix("Reviewing");
        self.bar
            .set_message(format!("synthesising review of {paper_count} papers"));
    }

    fn on_review_complete(&self, content_len: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} review written ({} chars)",
            green("✔"),
            bold(&content_len.to_string())
        );
    }
}

/// Digest PDF research papers and synthesise a review with Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "paper-digest",
    version,
    about = "Digest PDF research papers into Markdown and synthesise a cross-paper review",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto
)]
struct Cli {
    /// PDF files, processed in the given order.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Directory for per-paper Markdown and the final review.
    #[arg(short, long, env = "PAPER_DIGEST_OUTPUT", default_value = "output")]
    output_dir: PathBuf,

    /// OpenAI API key.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// OpenAI-compatible API base URL.
    #[arg(long, env = "PAPER_DIGEST_API_BASE", default_value = "https://api.openai.com/v1")]
    api_base: String,

    /// Model for page extraction.
    #[arg(long, env = "PAPER_DIGEST_MODEL", default_value = "gpt-4o")]
    model: String,

    /// Model for review synthesis (defaults to --model).
    #[arg(long, env = "PAPER_DIGEST_REVIEW_MODEL")]
    review_model: Option<String>,

    /// Use an edgequake-llm provider instead of OpenAI: anthropic, gemini, ollama, …
    #[arg(long, env = "PAPER_DIGEST_PROVIDER")]
    provider: Option<String>,

    /// Path to the pdftoppm executable.
    #[arg(long, env = "PAPER_DIGEST_PDFTOPPM", default_value = "pdftoppm")]
    pdftoppm: PathBuf,

    /// Directory for transient page images.
    #[arg(long, env = "PAPER_DIGEST_WORK_DIR", default_value = "./tmp")]
    work_dir: PathBuf,

    /// File name of the final review inside the output directory.
    #[arg(long, env = "PAPER_DIGEST_REVIEW_FILE", default_value = "review.md")]
    review_file: String,

    /// Max output tokens per page.
    #[arg(long, env = "PAPER_DIGEST_PAGE_MAX_TOKENS", default_value_t = 4096)]
    page_max_tokens: usize,

    /// Max output tokens for the review (longer reviews are truncated).
    #[arg(long, env = "PAPER_DIGEST_REVIEW_MAX_TOKENS", default_value_t = 16_384)]
    review_max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PAPER_DIGEST_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Retries per inference call (0 = fail on first error).
    #[arg(long, env = "PAPER_DIGEST_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Path to a text file with a custom extraction prompt.
    #[arg(long)]
    extraction_prompt: Option<PathBuf>,

    /// Path to a text file with a custom review prompt.
    #[arg(long)]
    review_prompt: Option<PathBuf>,

    /// Per-page extraction timeout in seconds.
    #[arg(long, env = "PAPER_DIGEST_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Review synthesis timeout in seconds.
    #[arg(long, env = "PAPER_DIGEST_REVIEW_TIMEOUT", default_value_t = 600)]
    review_timeout: u64,

    /// Rasterisation timeout per PDF in seconds.
    #[arg(long, env = "PAPER_DIGEST_RASTERIZE_TIMEOUT", default_value_t = 300)]
    rasterize_timeout: u64,

    /// Assemble the papers only; skip review synthesis.
    #[arg(long)]
    extract_only: bool,

    /// Print the run output as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PAPER_DIGEST_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    // ── Build pipeline ───────────────────────────────────────────────────
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as ProgressCallback)
    } else {
        None
    };
    let config = build_config(&cli, progress).await?;
    let pipeline = Pipeline::new(config).context("Failed to set up pipeline")?;

    // ── Run ──────────────────────────────────────────────────────────────
    if cli.extract_only {
        let papers = pipeline
            .assemble_all(&cli.inputs, &cli.output_dir)
            .await
            .context("Digest failed")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&papers).context("Failed to serialise papers")?
            );
        } else if !cli.quiet {
            for p in &papers {
                eprintln!("{}  {} pages  →  {}", green("✔"), p.pages, bold(&p.path.display().to_string()));
            }
        }
        return Ok(());
    }

    let output = pipeline
        .run(&cli.inputs, &cli.output_dir)
        .await
        .context("Digest failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialise output")?
        );
    } else if !cli.quiet {
        eprintln!(
            "{}  {} papers  {} pages  {}ms  →  {}",
            green("✔"),
            output.stats.papers,
            output.stats.pages,
            output.stats.duration_ms,
            bold(&output.review_path.display().to_string()),
        );
        if output.stats.review_truncated {
            eprintln!(
                "   {}",
                cyan("review hit --review-max-tokens and was truncated")
            );
        }
    }

    Ok(())
}

/// Map CLI args to `DigestConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<DigestConfig> {
    let mut builder = DigestConfig::builder()
        .model(&cli.model)
        .api_base_url(&cli.api_base)
        .pdftoppm_path(&cli.pdftoppm)
        .work_dir(&cli.work_dir)
        .review_file_name(&cli.review_file)
        .page_max_tokens(cli.page_max_tokens)
        .review_max_tokens(cli.review_max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .review_timeout_secs(cli.review_timeout)
        .rasterize_timeout_secs(cli.rasterize_timeout);

    if let Some(key) = &cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(model) = &cli.review_model {
        builder = builder.review_model(model);
    }
    if let Some(provider) = &cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(path) = &cli.extraction_prompt {
        builder = builder.extraction_prompt(read_prompt(path).await?);
    }
    if let Some(path) = &cli.review_prompt {
        builder = builder.review_prompt(read_prompt(path).await?);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn read_prompt(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read prompt from {:?}", path))
}
