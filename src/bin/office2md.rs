//! CLI binary for edgequake-office2md.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_office2md::{
    convert, convert_batch, convert_to_file, inspect, ConversionConfig,
    ConversionProgressCallback, ConversionStats, DocumentMetadata, ImageHandling,
    ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
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

/// Terminal progress for batch runs: one bar for the whole batch and a log
/// line per finished document. Documents finish out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<String, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, input: &str) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(input))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_documents: usize) {
        self.bar.set_length(total_documents as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total_documents} documents…"))
        ));
    }

    fn on_document_start(&self, input: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(input.to_string(), Instant::now());
        }
        self.bar.set_message(short_name(input));
    }

    fn on_document_complete(&self, input: &str, stats: &ConversionStats) {
        let secs = self.elapsed_secs(input);
        self.bar.println(format!(
            "  {} {:<40}  {}  {}",
            green("✓"),
            short_name(input),
            dim(&format!(
                "{} images, {} equations",
                stats.images_total,
                stats.equations_inline + stats.equations_display
            )),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, input: &str, error: &str) {
        let secs = self.elapsed_secs(input);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let first_line = error.lines().next().unwrap_or(error);
        let msg = truncate(first_line, 80);

        self.bar.println(format!(
            "  {} {:<40}  {}  {}",
            red("✗"),
            short_name(input),
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_documents: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = total_documents.saturating_sub(success_count);
        if failed == 0 {
            eprintln!(
                "{} {} documents converted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} documents converted  ({} failed)",
                if failed == total_documents {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_documents,
                red(&failed.to_string()),
            );
        }
    }
}

fn short_name(input: &str) -> String {
    let name = input.rsplit(['/', '\\']).next().unwrap_or(input);
    truncate(name, 40)
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
  # Basic conversion (stdout, images in report_images/ next to the input)
  office2md report.docx

  # Convert to file; images land beside the output
  office2md lecture.pptx -o notes/lecture.md

  # Several documents at once, four at a time
  office2md -c 4 *.docx *.pptx

  # Put images somewhere else
  office2md thesis.docx -o thesis.md -d figures

  # Self-contained Markdown with data URIs
  office2md --data-uri slides.pptx -o slides.md

  # Captions and formula recognition with a vision model
  office2md --caption --ocr-formulas --model gpt-4.1-mini paper.docx -o paper.md

  # Convert from URL
  office2md https://example.com/files/deck.pptx -o deck.md

  # Inspect document metadata (no API key needed)
  office2md --inspect-only report.docx

  # JSON output with metadata
  office2md --json --metadata report.docx > report.json

EQUATIONS:
  Word equations become $inline$ and $$display$$ LaTeX.
  Legacy Equation Editor / MathType objects use their embedded OMML or
  TeX annotation when present, otherwise their preview picture.
  --no-omml keeps equations as plain text (and pictures for legacy objects).

IMAGES:
  WMF and EMF pictures are converted to PNG with ImageMagick (`magick`
  or `convert` on PATH). When it is missing or fails, the original file
  is kept and a warning is printed. --no-metafile skips conversion.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  RUST_LOG                Override log filter (e.g. edgequake_office2md=debug)

No API key is needed unless --caption or --ocr-formulas is given.
"#;

/// Convert Word and PowerPoint documents to Markdown.
#[derive(Parser, Debug)]
#[command(
    name = "office2md",
    version,
    about = "Convert Word and PowerPoint documents to Markdown",
    long_about = "Convert .docx and .pptx documents (local files or URLs) to clean Markdown. \
Equations become LaTeX, WMF/EMF pictures become PNG, and slides become headed sections \
with speaker notes. Optional image captions use a Vision LLM (OpenAI, Anthropic, Gemini, \
Ollama, or any OpenAI-compatible endpoint).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local .docx/.pptx paths or HTTP/HTTPS URLs.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Write Markdown to this file instead of stdout (single input only).
    #[arg(short, long, env = "OFFICE2MD_OUTPUT")]
    output: Option<PathBuf>,

    /// Directory for the Markdown files of a multi-input run.
    #[arg(long, env = "OFFICE2MD_OUTPUT_DIR", conflicts_with = "output")]
    output_dir: Option<PathBuf>,

    /// Directory for extracted images (single input only).
    #[arg(short = 'd', long, env = "OFFICE2MD_IMAGES_DIR")]
    images_dir: Option<PathBuf>,

    /// Keep equations as plain text instead of LaTeX.
    #[arg(long, env = "OFFICE2MD_NO_OMML")]
    no_omml: bool,

    /// Do not convert WMF/EMF pictures to PNG.
    #[arg(long, env = "OFFICE2MD_NO_METAFILE")]
    no_metafile: bool,

    /// Caption every picture with a Vision LLM.
    #[arg(long, env = "OFFICE2MD_CAPTION")]
    caption: bool,

    /// Read equation pictures as LaTeX with a Vision LLM.
    #[arg(long, env = "OFFICE2MD_OCR_FORMULAS")]
    ocr_formulas: bool,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(
        long,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: openai, anthropic, gemini, azure, ollama, or any OpenAI-compatible URL."
    )]
    provider: Option<String>,

    /// Path to a text file containing a custom caption prompt.
    #[arg(long, env = "OFFICE2MD_CAPTION_PROMPT")]
    caption_prompt: Option<PathBuf>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "OFFICE2MD_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Max LLM output tokens per caption.
    #[arg(long, env = "OFFICE2MD_CAPTION_MAX_TOKENS", default_value_t = 300)]
    caption_max_tokens: usize,

    /// Omit speaker notes from slides.
    #[arg(long, env = "OFFICE2MD_NO_NOTES")]
    no_notes: bool,

    /// Prepend YAML front-matter with document metadata.
    #[arg(long, env = "OFFICE2MD_METADATA")]
    metadata: bool,

    /// Embed images as data: URIs instead of writing files.
    #[arg(long, env = "OFFICE2MD_DATA_URI")]
    data_uri: bool,

    /// Output structured JSON (ConversionOutput) instead of Markdown.
    #[arg(long, env = "OFFICE2MD_JSON")]
    json: bool,

    /// Print document metadata only, no conversion.
    #[arg(long)]
    inspect_only: bool,

    /// Documents converted at once.
    #[arg(short, long, env = "OFFICE2MD_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Disable progress bar.
    #[arg(long, env = "OFFICE2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "OFFICE2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "OFFICE2MD_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "OFFICE2MD_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-request vision LLM timeout in seconds.
    #[arg(long, env = "OFFICE2MD_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// ImageMagick time limit per picture in seconds.
    #[arg(long, env = "OFFICE2MD_RASTER_TIMEOUT", default_value_t = 30)]
    raster_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let batch = cli.inputs.len() > 1;

    if batch && cli.output.is_some() {
        anyhow::bail!("-o/--output needs a single input; use --output-dir for several");
    }
    if batch && cli.images_dir.is_some() {
        anyhow::bail!("-d/--images-dir needs a single input");
    }

    // ── Logging setup ────────────────────────────────────────────────────
    // Only batch runs draw a progress bar; single runs log at INFO.
    let show_progress = batch && !cli.quiet && !cli.no_progress && !cli.json;
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

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let mut failed = 0usize;
        for input in &cli.inputs {
            match inspect(input).await {
                Ok(meta) if cli.json => println!(
                    "{}",
                    serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
                ),
                Ok(meta) => print_metadata(input, &meta),
                Err(e) => {
                    failed += 1;
                    eprintln!("{} {}: {}", red("✗"), input, e);
                }
            }
        }
        if failed > 0 {
            std::process::exit(1);
        }
        return Ok(());
    }

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── Batch mode ───────────────────────────────────────────────────────
    if batch {
        let items = convert_batch(&cli.inputs, cli.output_dir.as_deref(), &config).await;
        let failed = items.iter().filter(|i| i.result.is_err()).count();

        if cli.json {
            let summary: Vec<serde_json::Value> = items
                .iter()
                .map(|item| match &item.result {
                    Ok(stats) => serde_json::json!({
                        "input": item.input,
                        "output": item.output,
                        "stats": stats,
                    }),
                    Err(e) => serde_json::json!({
                        "input": item.input,
                        "error": e.to_string(),
                    }),
                })
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
            );
        } else if !cli.quiet && !show_progress {
            for item in &items {
                match &item.result {
                    Ok(stats) => eprintln!(
                        "{} {}  →  {}  {}",
                        green("✓"),
                        item.input,
                        bold(&item.output.display().to_string()),
                        dim(&format!("{}ms", stats.total_duration_ms)),
                    ),
                    Err(e) => eprintln!("{} {}  {}", red("✗"), item.input, red(&e.to_string())),
                }
            }
        }

        if failed > 0 {
            std::process::exit(1);
        }
        return Ok(());
    }

    // ── Single input ─────────────────────────────────────────────────────
    let input = &cli.inputs[0];
    if let Some(ref output_path) = cli.output {
        let stats = convert_to_file(input, output_path, &config)
            .await
            .context("Conversion failed")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&stats).context("Failed to serialise stats")?
            );
        } else if !cli.quiet {
            print_summary(&stats, &output_path.display().to_string());
        }
    } else {
        let output = convert(input, &config).await.context("Conversion failed")?;

        if cli.json {
            let json =
                serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
            println!("{json}");
        } else {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(output.markdown.as_bytes())
                .context("Failed to write to stdout")?;
            if !output.markdown.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
        }

        if !cli.quiet {
            for w in &output.warnings {
                eprintln!("  {} {}", cyan("⚠"), w);
            }
            if !cli.json {
                print_summary(&output.stats, "stdout");
            }
        }
    }

    Ok(())
}

fn print_summary(stats: &ConversionStats, target: &str) {
    eprintln!(
        "{}  {} images  {} equations  {}ms  →  {}",
        if stats.warnings == 0 {
            green("✔")
        } else {
            cyan("⚠")
        },
        stats.images_total,
        stats.equations_inline + stats.equations_display,
        stats.total_duration_ms,
        bold(target),
    );
    if stats.images_converted + stats.images_failed + stats.captions_generated > 0 {
        eprintln!(
            "   {} converted  /  {} kept as-is  /  {} captioned",
            dim(&stats.images_converted.to_string()),
            dim(&stats.images_failed.to_string()),
            dim(&stats.captions_generated.to_string()),
        );
    }
    if stats.warnings > 0 {
        eprintln!("   {} warnings", stats.warnings);
    }
}

fn print_metadata(input: &str, meta: &DocumentMetadata) {
    println!("File:         {}", input);
    println!("Kind:         {}", meta.kind);
    if let Some(ref t) = meta.title {
        println!("Title:        {}", t);
    }
    if let Some(ref a) = meta.author {
        println!("Author:       {}", a);
    }
    if let Some(ref s) = meta.subject {
        println!("Subject:      {}", s);
    }
    if let Some(ref m) = meta.modified {
        println!("Modified:     {}", m);
    }
    if let Some(n) = meta.slide_count {
        println!("Slides:       {}", n);
    }
    println!("Paragraphs:   {}", meta.paragraph_count);
    println!("Tables:       {}", meta.table_count);
    println!("Images:       {}", meta.image_count);
    println!("Equations:    {}", meta.equation_count);
}

/// Map CLI args to `ConversionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .extract_equations(!cli.no_omml)
        .convert_metafiles(!cli.no_metafile)
        .caption_images(cli.caption)
        .recognize_formulas(cli.ocr_formulas)
        .temperature(cli.temperature)
        .caption_max_tokens(cli.caption_max_tokens)
        .include_notes(!cli.no_notes)
        .include_metadata(cli.metadata)
        .concurrency(cli.concurrency)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout)
        .raster_timeout_secs(cli.raster_timeout);

    if cli.data_uri {
        builder = builder.image_handling(ImageHandling::DataUri);
    }
    if let Some(ref dir) = cli.images_dir {
        builder = builder.images_dir(dir);
    }
    if let Some(ref path) = cli.caption_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read caption prompt from {:?}", path))?;
        builder = builder.caption_prompt(prompt);
    }
    if let Some(ref name) = cli.provider {
        builder = builder.provider_name(name);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_batch_flags() {
        let cli = Cli::try_parse_from([
            "office2md",
            "--no-omml",
            "-c",
            "2",
            "a.docx",
            "b.pptx",
        ])
        .unwrap();
        assert_eq!(cli.inputs, vec!["a.docx", "b.pptx"]);
        assert!(cli.no_omml);
        assert_eq!(cli.concurrency, 2);
    }

    #[test]
    fn output_conflicts_with_output_dir() {
        let res = Cli::try_parse_from(["office2md", "-o", "x.md", "--output-dir", "out", "a.docx"]);
        assert!(res.is_err());
    }

    #[test]
    fn truncates_long_names() {
        assert_eq!(truncate("short", 10), "short");
        let t = truncate("a-very-long-document-name.docx", 10);
        assert_eq!(t.chars().count(), 10);
        assert!(t.ends_with('\u{2026}'));
        assert_eq!(short_name("/data/in/report.docx"), "report.docx");
    }
}
