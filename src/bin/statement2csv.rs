//! CLI binary for edgequake-statement.
//!
//! A thin shim over the library crate that maps CLI flags and environment
//! variables to `ExtractionConfig`, runs one statement and prints the records.

use anyhow::{bail, Context, Result};
use clap::Parser;
use edgequake_statement::{
    is_known_bank, known_banks, suggested_columns, write_output, ColumnSchema, ExtractionConfig,
    ExtractionProgressCallback, ProcessingResult, ProgressCallback, RowArity, StatementProcessor,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
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

/// Terminal progress: a spinner while OCR and rendering run, then a page bar
/// with one log line per page.
struct CliProgressCallback {
    bar: ProgressBar,
    page_started: Mutex<Option<Instant>>,
    skipped: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("OCR and page rendering…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            page_started: Mutex::new(None),
            skipped: AtomicUsize::new(0),
        })
    }

    fn page_elapsed(&self) -> f64 {
        self.page_started
            .lock()
            .ok()
            .and_then(|mut s| s.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_start(&self, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");

        self.bar.set_length(total_pages as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Extracting");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Statement has {total_pages} pages"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut started) = self.page_started.lock() {
            *started = Some(Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, records: usize) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<12}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{records:>4} records")),
            dim(&format!("{:.1}s", self.page_elapsed())),
        ));
        self.bar.inc(1);
    }

    fn on_page_skipped(&self, page_num: usize, total: usize) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            dim("·"),
            page_num,
            total,
            dim("no table"),
        ));
        self.bar.inc(1);
    }

    fn on_complete(&self, total_records: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} transactions extracted ({} pages without tables)",
            green("✔"),
            bold(&total_records.to_string()),
            self.skipped.load(Ordering::SeqCst)
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Generic column layout, CSV to stdout
  statement2csv statement.pdf

  # Explicit columns, CSV to a file
  statement2csv statement.pdf --columns "Date,Narration,Withdrawal,Deposit,Balance" -o may.csv

  # Bank preset
  statement2csv --bank HDFC_BANK statement.pdf --format json

  # Columns with caller ids, numbered JSON
  statement2csv statement.pdf --format numbered \
    --columns-json '[{"name":"Date","id":1},{"name":"Amount","id":2}]'

  # List the bank presets
  statement2csv --list-banks

ENVIRONMENT VARIABLES:
  MISTRAL_API_KEY         Mistral key, used for OCR and the default chat provider
  MISTRAL_API_BASE        Override the Mistral API base URL
  MISTRAL_OCR_MODEL       OCR model (default mistral-ocr-latest)
  MISTRAL_CHAT_MODEL      Extraction model (default pixtral-12b-latest)
  API_RATE_LIMIT_DELAY    Seconds between extraction calls (default 1.0)
  MAX_FILE_SIZE           Upper bound on document size in bytes (default 50 MiB)
  PDFIUM_LIB_PATH         Path to libpdfium when not installed system-wide
  RUST_LOG                Log filter, overrides --verbose / --quiet
"#;

/// Extract bank-statement transactions to CSV or JSON.
#[derive(Parser, Debug)]
#[command(
    name = "statement2csv",
    version,
    about = "Extract bank-statement transactions to CSV or JSON using OCR and a vision LLM",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    #[arg(required_unless_present = "list_banks")]
    input: Option<String>,

    /// Comma-separated target columns, in output order.
    #[arg(long, conflicts_with_all = ["columns_json", "bank"])]
    columns: Option<String>,

    /// Target columns as JSON: ["Date", ...] or [{"name": "Date", "id": 1}, ...].
    #[arg(long, conflicts_with = "bank")]
    columns_json: Option<String>,

    /// Use the column preset of a known bank (see --list-banks).
    #[arg(long)]
    bank: Option<String>,

    /// Print the known bank presets and exit.
    #[arg(long)]
    list_banks: bool,

    /// Output format.
    #[arg(long, value_enum, default_value = "csv")]
    format: OutputFormat,

    /// Write output to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Extraction model ID.
    #[arg(long, env = "MISTRAL_CHAT_MODEL", default_value = edgequake_statement::config::DEFAULT_CHAT_MODEL)]
    model: String,

    /// OCR model ID.
    #[arg(long, env = "MISTRAL_OCR_MODEL", default_value = edgequake_statement::config::DEFAULT_OCR_MODEL)]
    ocr_model: String,

    /// LLM provider for extraction (mistral, openai, anthropic, gemini, ollama).
    #[arg(long, env = "EDGEQUAKE_PROVIDER", default_value = edgequake_statement::config::DEFAULT_PROVIDER)]
    provider: String,

    /// Seconds to wait between extraction calls.
    #[arg(long, env = "API_RATE_LIMIT_DELAY", default_value_t = 1.0)]
    delay: f64,

    /// Reject documents larger than this many bytes.
    #[arg(long, env = "MAX_FILE_SIZE", default_value_t = 50 * 1024 * 1024)]
    max_file_size: usize,

    /// Rendering DPI (72–400).
    #[arg(long, default_value_t = 150, value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// PDF user password for encrypted statements.
    #[arg(long)]
    password: Option<String>,

    /// What to do with table rows whose cell count differs from the header.
    #[arg(long, value_enum, default_value = "keep")]
    row_arity: RowArityArg,

    /// Max extraction output tokens per page.
    #[arg(long, default_value_t = 4096)]
    max_tokens: usize,

    /// HTTP download timeout in seconds (URL inputs).
    #[arg(long, default_value_t = 120)]
    download_timeout: u64,

    /// OCR request timeout in seconds.
    #[arg(long, default_value_t = 120)]
    api_timeout: u64,

    /// Disable progress bar.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Csv,
    Json,
    Numbered,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum RowArityArg {
    Keep,
    Normalize,
    Drop,
}

impl From<RowArityArg> for RowArity {
    fn from(v: RowArityArg) -> Self {
        match v {
            RowArityArg::Keep => RowArity::Keep,
            RowArityArg::Normalize => RowArity::Normalize,
            RowArityArg::Drop => RowArity::Drop,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.list_banks {
        for bank in known_banks() {
            println!("{:<14} {}", bank, dim(&suggested_columns(Some(bank)).join(", ")));
        }
        return Ok(());
    }

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.verbose;
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

    let Some(input) = cli.input.as_deref() else {
        bail!("An input PDF path or URL is required");
    };
    let columns = resolve_columns(&cli)?;

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;
    let processor =
        StatementProcessor::from_config(config).context("Failed to set up OCR and model providers")?;

    // ── Run extraction ───────────────────────────────────────────────────
    let result = processor
        .process_file(input, &columns)
        .await
        .context("Extraction failed")?;

    let rendered = render_output(&result, cli.format)?;
    match cli.output {
        Some(ref path) => write_output(path, &rendered)?,
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(rendered.as_bytes())
                .context("Failed to write to stdout")?;
            if !rendered.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
        }
    }

    if !cli.quiet {
        let s = &result.stats;
        let mark = if s.degraded_pages == 0 { green("✔") } else { yellow("⚠") };
        eprintln!(
            "{}  {} records  {}/{} pages extracted  {} skipped  {} degraded  {}ms{}",
            mark,
            s.total_records,
            s.extracted_pages,
            s.total_pages,
            s.skipped_pages,
            s.degraded_pages,
            s.total_duration_ms,
            cli.output
                .as_ref()
                .map(|p| format!("  →  {}", bold(&p.display().to_string())))
                .unwrap_or_default(),
        );
        eprintln!(
            "   {} tokens in  /  {} tokens out",
            dim(&s.total_input_tokens.to_string()),
            dim(&s.total_output_tokens.to_string()),
        );
    }

    Ok(())
}

/// Pick the column schema from `--columns`, `--columns-json` or `--bank`,
/// falling back to the generic preset. An unknown `--bank` key is an error.
fn resolve_columns(cli: &Cli) -> Result<ColumnSchema> {
    if let Some(ref list) = cli.columns {
        let names: Vec<&str> = list.split(',').map(str::trim).filter(|c| !c.is_empty()).collect();
        return Ok(ColumnSchema::new(names)?);
    }
    if let Some(ref raw) = cli.columns_json {
        return Ok(ColumnSchema::from_json(raw)?);
    }
    if let Some(ref bank) = cli.bank {
        if !is_known_bank(bank) {
            bail!(
                "Unknown bank '{}'. Known banks: {}",
                bank,
                known_banks().join(", ")
            );
        }
    }
    Ok(ColumnSchema::new(suggested_columns(cli.bank.as_deref()))?)
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    if !cli.delay.is_finite() || cli.delay < 0.0 {
        bail!("--delay must be a non-negative number of seconds (got {})", cli.delay);
    }

    let mut builder = ExtractionConfig::builder()
        .chat_model(cli.model.clone())
        .ocr_model(cli.ocr_model.clone())
        .provider_name(cli.provider.clone())
        .rate_limit_delay_ms((cli.delay * 1000.0).round() as u64)
        .max_file_size(cli.max_file_size)
        .dpi(cli.dpi)
        .row_arity(cli.row_arity.into())
        .max_tokens(cli.max_tokens)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn render_output(result: &ProcessingResult, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Csv => result.to_csv()?,
        OutputFormat::Json => serde_json::to_string_pretty(&result.to_json())
            .context("Failed to serialise output")?,
        OutputFormat::Numbered => serde_json::to_string_pretty(&result.with_sequential_ids())
            .context("Failed to serialise output")?,
    })
}
