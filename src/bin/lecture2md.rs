//! CLI binary for lecture2md.
//!
//! A thin shim over the library crate: flags and environment variables are
//! mapped onto the config structs, one subcommand per tool plus the full
//! pipeline.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use lecture2md::llm::{BackendError, GenerationRequest, RawResponse};
use lecture2md::pipeline::input::{detect_mime_type, encode_file_data, load_input};
use lecture2md::tools::{FilterContentTool, PdfToTextTool, TextToMarkdownTool};
use lecture2md::{
    AiClient, Chunker, ChunkingConfig, ClientConfig, DocumentPipeline, FileLimits,
    GenerationBackend, OutputError, PdfiumExtractor, PipelineConfig, PipelineProgressCallback,
    PipelineStep, ProcessRequest, ProgressCallback, PromptSet, ProviderBackend, StepStatus,
    TokenCounter, ToolRegistry,
};
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per chunk.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-chunk wall-clock start times for elapsed reporting.
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    /// Spinner until `on_pipeline_start` reports the chunk count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Extracting text…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} chunks  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Converting");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, chunk_index: usize) -> f64 {
        self.start_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&chunk_index)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_pipeline_start(&self, total_chunks: usize) {
        self.activate_bar(total_chunks);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_chunks} chunks…"))
        ));
    }

    fn on_chunk_start(&self, chunk_index: usize, _total: usize) {
        self.start_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(chunk_index, Instant::now());
        self.bar.set_message(format!("chunk {}", chunk_index + 1));
    }

    fn on_chunk_complete(&self, chunk_index: usize, total: usize, markdown_len: usize) {
        let secs = self.elapsed_secs(chunk_index);
        self.bar.println(format!(
            "  {} Chunk {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            chunk_index + 1,
            total,
            dim(&format!("{markdown_len:>6} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_pipeline_complete(&self, total_chunks: usize, markdown_len: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} chunks converted  {}",
            green("✔"),
            bold(&total_chunks.to_string()),
            dim(&format!("{markdown_len} chars")),
        );
    }
}

/// Backend for commands that never call the model (`chunk`, `tools`).
struct OfflineBackend;

#[async_trait]
impl GenerationBackend for OfflineBackend {
    fn name(&self) -> &str {
        "offline"
    }

    async fn generate(&self, _request: &GenerationRequest) -> Result<RawResponse, BackendError> {
        Err(BackendError::with_status(401, "no generation backend configured"))
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Full pipeline to stdout
  lecture2md process lecture01.pdf

  # Full pipeline to a file, skipping the filter pass
  lecture2md process --skip-filter lecture01.pdf -o lecture01.md

  # Convert from URL, JSON output with the step trace
  lecture2md process --json https://example.org/slides.pdf > out.json

  # Inspect chunking only (no API key needed)
  lecture2md chunk --target-tokens 3000 lecture01.pdf

  # Run a single model pass over a text file (or '-' for stdin)
  lecture2md filter notes.txt
  lecture2md markdown notes.txt

  # Use another provider through edgequake-llm
  lecture2md --provider openai --model gpt-4.1-mini process lecture01.pdf

  # List tool schemas / check the model answers
  lecture2md tools
  lecture2md check

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY                  Google Gemini API key
  GEMINI_MODEL                    Model ID (default gemini-1.5-pro)
  GEMINI_TEMPERATURE              Default sampling temperature
  GEMINI_MAX_TOKENS               Default max output tokens
  GEMINI_MAX_REQUESTS_PER_MINUTE  Client-side rate limit
  MAX_FILE_SIZE                   Max decoded PDF size in bytes
  LECTURE2MD_PROVIDER             gemini (default), openai, anthropic, ollama, ...
  LECTURE2MD_PROMPTS_DIR          Directory with filter_content.md / text_to_markdown.md
  PDFIUM_LIB_PATH                 Path to an existing libpdfium, skips auto-download
  PDFIUM_AUTO_CACHE_DIR           Override the default pdfium cache directory
"#;

/// Turn lecture PDFs into clean Markdown with a text-generation model.
#[derive(Parser, Debug)]
#[command(
    name = "lecture2md",
    version,
    about = "Turn lecture PDFs into clean Markdown with a text-generation model",
    long_about = "Extract the text layer of a lecture PDF, split it into token-bounded \
overlapping chunks, strip slide noise with one model pass and rewrite the rest as Markdown \
with LaTeX in a second pass. Gemini is used by default; any edgequake-llm provider works.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    model: ModelArgs,

    #[command(flatten)]
    chunking: ChunkingArgs,

    /// Maximum decoded PDF size in bytes.
    #[arg(long, global = true, env = "MAX_FILE_SIZE", default_value_t = 10 * 1024 * 1024)]
    max_file_size: usize,

    /// Directory holding prompt overrides (filter_content.md, text_to_markdown.md).
    #[arg(long, global = true, env = "LECTURE2MD_PROMPTS_DIR")]
    prompts_dir: Option<PathBuf>,

    /// HTTP download timeout in seconds (URL inputs).
    #[arg(long, global = true, env = "LECTURE2MD_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Disable progress bar.
    #[arg(long, global = true, env = "LECTURE2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "LECTURE2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "LECTURE2MD_QUIET")]
    quiet: bool,
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// Gemini API key.
    #[arg(long, global = true, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Model ID.
    #[arg(long, global = true, env = "GEMINI_MODEL")]
    model: Option<String>,

    /// Generation provider: gemini, or any edgequake-llm provider name.
    #[arg(long, global = true, env = "LECTURE2MD_PROVIDER", default_value = "gemini")]
    provider: String,

    /// Default sampling temperature (0.0–2.0).
    #[arg(long, global = true, env = "GEMINI_TEMPERATURE", default_value_t = 0.7)]
    temperature: f32,

    /// Default max output tokens per call.
    #[arg(long, global = true, env = "GEMINI_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: u32,

    /// Client-side admission limit per 60-second window.
    #[arg(long, global = true, env = "GEMINI_MAX_REQUESTS_PER_MINUTE", default_value_t = 60)]
    max_requests_per_minute: usize,

    /// Attempts per model call.
    #[arg(long, global = true, env = "LECTURE2MD_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-call model timeout in seconds.
    #[arg(long, global = true, env = "LECTURE2MD_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,
}

#[derive(Args, Debug)]
struct ChunkingArgs {
    /// Pages above this many tokens are split on paragraphs.
    #[arg(long, global = true, env = "LECTURE2MD_MAX_CHUNK_TOKENS", default_value_t = 8000)]
    max_chunk_tokens: usize,

    /// Chunks are flushed before they grow past this size.
    #[arg(long, global = true, env = "LECTURE2MD_TARGET_TOKENS", default_value_t = 6000)]
    target_tokens: usize,

    /// Trailing tokens carried into the next chunk.
    #[arg(long, global = true, env = "LECTURE2MD_OVERLAP_TOKENS", default_value_t = 200)]
    overlap_tokens: usize,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full pipeline: extract, filter, convert to Markdown.
    Process {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,

        /// Write Markdown to this file instead of stdout.
        #[arg(short, long, env = "LECTURE2MD_OUTPUT")]
        output: Option<PathBuf>,

        /// Send raw chunk text straight to the Markdown pass.
        #[arg(long, env = "LECTURE2MD_SKIP_FILTER")]
        skip_filter: bool,

        /// Do not read or write the step cache.
        #[arg(long)]
        no_cache: bool,

        /// Output the full result (Markdown + step trace) as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Extract and chunk a PDF without calling the model.
    Chunk {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,

        /// Output chunks as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Remove slide noise from a text file ('-' reads stdin).
    Filter { input: String },

    /// Convert a text file to Markdown ('-' reads stdin).
    Markdown { input: String },

    /// List the registered tools and their parameter schemas.
    Tools,

    /// Send a minimal prompt and report whether the model answered.
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar already reports per-chunk status; keep the library
    // quiet underneath it unless asked otherwise.
    let show_progress = !cli.quiet && !cli.no_progress && cli.command.wants_progress();
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

    let chunking = cli.chunking_config()?;
    let limits = FileLimits {
        max_file_size: cli.max_file_size,
    };
    let prompts = match &cli.prompts_dir {
        Some(dir) => PromptSet::load_dir(dir)
            .with_context(|| format!("Failed to read prompts from {}", dir.display()))?,
        None => PromptSet::default(),
    };

    match &cli.command {
        Command::Process {
            input,
            output,
            skip_filter,
            no_cache,
            json,
        } => {
            ensure_pdf_engine(cli.quiet)?;
            let client = Arc::new(build_client(&cli.model)?);
            let registry = ToolRegistry::standard(
                Arc::new(PdfiumExtractor::new()),
                Chunker::new(chunking, Arc::new(TokenCounter::new())),
                client,
                limits,
                prompts,
            );

            let mut pipeline = DocumentPipeline::new(Arc::new(registry), PipelineConfig::default());
            if show_progress {
                let cb = CliProgressCallback::new_dynamic();
                pipeline = pipeline.with_progress(cb as ProgressCallback);
            }

            let pdf = load_input(input, Duration::from_secs(cli.download_timeout))
                .await
                .context("Failed to load input")?;
            let request = ProcessRequest::from_bytes(&pdf)
                .skip_filter(*skip_filter)
                .cache_intermediate(!*no_cache);

            run_process(&pipeline, &request, output.as_deref(), *json, cli.quiet).await?;
        }

        Command::Chunk { input, json } => {
            ensure_pdf_engine(cli.quiet)?;
            let tool = PdfToTextTool::new(
                Arc::new(PdfiumExtractor::new()),
                Chunker::new(chunking, Arc::new(TokenCounter::new())),
                limits,
            );
            let pdf = load_input(input, Duration::from_secs(cli.download_timeout))
                .await
                .context("Failed to load input")?;
            let output = tool
                .run(&encode_file_data(&pdf))
                .await
                .context("Extraction failed")?;

            if *json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&output).context("Failed to serialise chunks")?
                );
            } else {
                let meta = &output.metadata;
                println!("File:    {}", input);
                println!("Type:    {} ({} bytes)", detect_mime_type(&pdf), pdf.len());
                if let Some(ref t) = meta.title {
                    println!("Title:   {}", t);
                }
                if let Some(ref a) = meta.author {
                    println!("Author:  {}", a);
                }
                println!("Pages:   {}", meta.page_count);
                println!("Chunks:  {}", output.total_chunks);
                for chunk in &output.chunks {
                    println!(
                        "  #{:<3} pages {:<8} {:>6} tokens  {:>7} chars{}",
                        chunk.chunk_index,
                        chunk.page_range,
                        chunk.token_count,
                        chunk.char_count,
                        if chunk.has_overlap { dim("  +overlap") } else { String::new() },
                    );
                }
            }
        }

        Command::Filter { input } => {
            let client = Arc::new(build_client(&cli.model)?);
            let text = read_text(input)?;
            let output = FilterContentTool::new(client, prompts.filter_content)
                .run(&text)
                .await
                .context("Filtering failed")?;
            write_stdout(&output.filtered_content)?;
            if !cli.quiet {
                eprintln!(
                    "{} {} → {} chars",
                    green("✔"),
                    output.original_length,
                    output.filtered_length
                );
            }
        }

        Command::Markdown { input } => {
            let client = Arc::new(build_client(&cli.model)?);
            let text = read_text(input)?;
            let output = TextToMarkdownTool::new(client, prompts.text_to_markdown)
                .run(&text)
                .await
                .context("Markdown conversion failed")?;
            write_stdout(&output.markdown)?;
        }

        Command::Tools => {
            let client = Arc::new(AiClient::new(
                ClientConfig::default(),
                Arc::new(OfflineBackend),
            ));
            let registry = ToolRegistry::standard(
                Arc::new(PdfiumExtractor::new()),
                Chunker::new(chunking, Arc::new(TokenCounter::new())),
                client,
                limits,
                prompts,
            );
            println!(
                "{}",
                serde_json::to_string_pretty(&registry.list_tools())
                    .context("Failed to serialise tool schemas")?
            );
        }

        Command::Check => {
            let client = build_client(&cli.model)?;
            if client.test_connection().await {
                let limiter = client.rate_limiter();
                eprintln!("{} {} answered", green("✔"), bold(client.model()));
                eprintln!(
                    "   {}/{} requests used in the current minute",
                    limiter.in_window().await,
                    limiter.max_requests()
                );
            } else {
                anyhow::bail!("Model '{}' did not answer (run with -v for details)", client.model());
            }
        }
    }

    Ok(())
}

impl Command {
    fn wants_progress(&self) -> bool {
        matches!(self, Command::Process { json: false, .. })
    }
}

impl Cli {
    fn chunking_config(&self) -> Result<ChunkingConfig> {
        let config = ChunkingConfig {
            max_tokens: self.chunking.max_chunk_tokens,
            target_tokens: self.chunking.target_tokens,
            overlap_tokens: self.chunking.overlap_tokens,
            ..Default::default()
        };
        config.validate().context("Invalid chunking configuration")?;
        Ok(config)
    }
}

/// Map model flags to an [`AiClient`] over the selected provider.
fn build_client(args: &ModelArgs) -> Result<AiClient> {
    let mut builder = ClientConfig::builder()
        .temperature(args.temperature)
        .max_output_tokens(args.max_tokens)
        .max_requests_per_minute(args.max_requests_per_minute)
        .max_retries(args.max_retries)
        .request_timeout(Duration::from_secs(args.api_timeout));
    if let Some(ref key) = args.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref model) = args.model {
        builder = builder.model(model);
    }
    let config = builder.build().context("Invalid configuration")?;

    if args.provider.eq_ignore_ascii_case("gemini") {
        return AiClient::gemini(config).context("Set GEMINI_API_KEY or pass --api-key");
    }

    let backend = ProviderBackend::from_name(&args.provider, &config.model, config.request_timeout)
        .with_context(|| format!("Failed to initialise provider '{}'", args.provider))?;
    Ok(AiClient::new(config, Arc::new(backend)))
}

async fn run_process(
    pipeline: &DocumentPipeline,
    request: &ProcessRequest,
    output_path: Option<&Path>,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let result = match output_path {
        Some(path) => pipeline.process_to_file(request, path).await,
        None => pipeline.process(request).await.map_err(OutputError::from),
    };

    let output = match result {
        Ok(output) => output,
        Err(OutputError::Pipeline(e)) => {
            if !quiet {
                print_trace(&e.steps);
            }
            return Err(e).context("Conversion failed");
        }
        Err(e) => return Err(e).context("Conversion failed"),
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialise output")?
        );
    } else if output_path.is_none() {
        write_stdout(&output.markdown)?;
    }

    if !quiet {
        let count = |status| output.steps_with_status(status).count();
        eprintln!(
            "   {} steps run  /  {} cached  /  {} skipped  /  {}ms total",
            count(StepStatus::Completed),
            dim(&count(StepStatus::Cached).to_string()),
            dim(&count(StepStatus::Skipped).to_string()),
            output.total_duration_ms,
        );
        if let Some(path) = output_path {
            eprintln!("{}  →  {}", green("✔"), bold(&path.display().to_string()));
        }
    }
    Ok(())
}

fn print_trace(steps: &[PipelineStep]) {
    for step in steps {
        let chunk = step
            .chunk_index
            .map(|i| format!("[{i}]"))
            .unwrap_or_default();
        let mark = match step.status {
            StepStatus::Failed => red("✗"),
            StepStatus::Completed | StepStatus::Cached => green("✓"),
            _ => dim("·"),
        };
        eprintln!(
            "  {} {}{}  {}",
            mark,
            step.tool_name,
            chunk,
            dim(&step.status.to_string())
        );
    }
}

/// Text from a file, or stdin for `-`.
fn read_text(input: &str) -> Result<String> {
    if input == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(input).with_context(|| format!("Failed to read {input}"))
    }
}

fn write_stdout(text: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(text.as_bytes())
        .context("Failed to write to stdout")?;
    if !text.ends_with('\n') {
        handle.write_all(b"\n").ok();
    }
    Ok(())
}

/// Make sure a pdfium shared library is available, downloading it on the
/// first run (~30 MB, cached afterwards).
fn ensure_pdf_engine(quiet: bool) -> Result<()> {
    if pdfium_auto::is_pdfium_cached() {
        return Ok(());
    }

    if quiet {
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to download PDFium engine")?;
        return Ok(());
    }

    let dl_bar = ProgressBar::new(0);
    dl_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS),
    );
    dl_bar.set_prefix("PDF engine");
    dl_bar.set_message("Connecting…");
    dl_bar.enable_steady_tick(Duration::from_millis(80));

    let bar = dl_bar.clone();
    tokio::task::block_in_place(|| {
        pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
            if let Some(t) = total {
                if bar.length().unwrap_or(0) != t {
                    bar.set_length(t);
                }
            }
            bar.set_position(downloaded);
        }))
    })
    .context("Failed to download PDFium engine")?;

    dl_bar.finish_with_message("ready ✓");
    Ok(())
}
