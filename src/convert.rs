//! Conversion entry points.
//!
//! One document flows through the stages in [`crate::pipeline`]:
//!
//! ```text
//! resolve ─▶ parse + extract images ─▶ captions ─▶ HTML ─▶ Markdown ─▶ decode
//!            (spawn_blocking)           (async)
//! ```
//!
//! Everything that touches the ZIP, the file system or ImageMagick runs on
//! the blocking pool; only vision requests are awaited on the runtime.
//! [`convert_batch`] runs whole documents concurrently, each one failing on
//! its own.

use crate::config::{ConversionConfig, ImageHandling};
use crate::error::{AssetWarning, Office2MdError};
use crate::output::{
    BatchItem, ConversionOutput, ConversionStats, DocumentKind, DocumentMetadata, ImageRecord,
    SlideOutline,
};
use crate::package::model::{Block, Document};
use crate::package::OfficePackage;
use crate::pipeline::caption::{self, AnnotateOptions, CaptionService, LlmCaptionService};
use crate::pipeline::html::HtmlEmitter;
use crate::pipeline::media::{self, ExtractOptions, ImageAsset, ImageMagickConverter, RasterConverter};
use crate::pipeline::slides::{self, SlideRecord};
use crate::pipeline::{input, placeholder, postprocess, render};
use crate::prompts::DEFAULT_CAPTION_PROMPT;
use edgequake_llm::{LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Convert a `.docx` / `.pptx` file or URL to Markdown.
///
/// Images go to `<stem>_images/` next to the input (or in the current
/// directory for URL inputs) unless [`ConversionConfig::images_dir`] says
/// otherwise.
///
/// # Errors
/// Returns `Err(Office2MdError)` only for fatal errors:
/// - File not found / permission denied / download failure
/// - Not an Office package, or a corrupt one
/// - Image directory not writable
/// - Captions requested but no LLM provider available
///
/// Per-image problems are reported in [`ConversionOutput::warnings`].
pub async fn convert(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Office2MdError> {
    let input_str = input_str.as_ref();
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let markdown_path = default_markdown_path(&resolved);
    run(resolved.path(), &markdown_path, config).await
}

/// Convert a document and write the Markdown to `output_path`.
///
/// Images are placed beside the output file. Uses atomic write (temp file +
/// rename) to prevent partial files.
pub async fn convert_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionStats, Office2MdError> {
    let path = output_path.as_ref();
    let resolved = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    let output = run(resolved.path(), path, config).await?;
    write_markdown(path, &output.markdown).await?;
    info!("Wrote {}", path.display());
    Ok(output.stats)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Office2MdError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Office2MdError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input_str, config))
}

/// Convert an in-memory package.
///
/// `name_hint` (e.g. `"report.docx"`) names the document; its extension is
/// used for kind detection when the package is ambiguous. Without an
/// explicit [`ConversionConfig::images_dir`] the images are embedded as
/// data URIs, since there is no file to put them next to.
pub async fn convert_from_bytes(
    bytes: &[u8],
    name_hint: &str,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Office2MdError> {
    let file_name = Path::new(name_hint)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "document.docx".to_string());

    let dir = tempfile::tempdir().map_err(|e| Office2MdError::Internal(format!("tempfile: {e}")))?;
    let path = dir.path().join(&file_name);
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| Office2MdError::Internal(format!("tempfile write: {e}")))?;

    let mut config = config.clone();
    if config.images_dir.is_none() {
        config.image_handling = ImageHandling::DataUri;
    }
    let path_str = path.to_string_lossy().into_owned();
    let resolved = input::resolve_input(&path_str, config.download_timeout_secs).await?;
    // `dir` is dropped (and the file deleted) when this function returns
    run(resolved.path(), Path::new(&file_name).with_extension("md").as_path(), &config).await
}

/// Convert many documents, up to `config.concurrency` at a time.
///
/// Each input writes `<stem>.md` (and `<stem>_images/`) into `output_dir`,
/// or next to the input when `output_dir` is `None`. A failing input is
/// reported in its [`BatchItem`] and never stops the others. Results come
/// back in input order. [`ConversionConfig::images_dir`] is ignored here:
/// every document gets its own image directory.
pub async fn convert_batch(
    inputs: &[String],
    output_dir: Option<&Path>,
    config: &ConversionConfig,
) -> Vec<BatchItem> {
    let mut config = config.clone();
    config.images_dir = None;
    let config = &config;
    let progress = config.progress_callback.clone();

    if let Some(cb) = &progress {
        cb.on_batch_start(inputs.len());
    }

    let mut items: Vec<(usize, BatchItem)> = stream::iter(inputs.iter().enumerate().map(
        |(i, input_str)| {
            let progress = progress.clone();
            async move {
                if let Some(cb) = &progress {
                    cb.on_document_start(input_str);
                }
                let output = batch_output_path(input_str, output_dir);
                let result = convert_to_file(input_str, &output, config).await;
                match &result {
                    Ok(stats) => {
                        if let Some(cb) = &progress {
                            cb.on_document_complete(input_str, stats);
                        }
                    }
                    Err(e) => {
                        warn!("{}: {}", input_str, e);
                        if let Some(cb) = &progress {
                            cb.on_document_error(input_str, &e.to_string());
                        }
                    }
                }
                (
                    i,
                    BatchItem {
                        input: input_str.clone(),
                        output,
                        result,
                    },
                )
            }
        },
    ))
    .buffer_unordered(config.concurrency.max(1))
    .collect()
    .await;

    items.sort_by_key(|(i, _)| *i);
    let ok = items.iter().filter(|(_, item)| item.result.is_ok()).count();
    info!("Batch complete: {}/{} documents converted", ok, items.len());
    if let Some(cb) = &progress {
        cb.on_batch_complete(items.len(), ok);
    }
    items.into_iter().map(|(_, item)| item).collect()
}

/// Read kind, core properties and content counts without converting.
///
/// Does not require an LLM provider and writes nothing.
pub async fn inspect(input_str: impl AsRef<str>) -> Result<DocumentMetadata, Office2MdError> {
    let resolved = input::resolve_input(input_str.as_ref(), 120).await?;
    let path = resolved.path().to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<DocumentMetadata, Office2MdError> {
        let mut pkg = OfficePackage::open(&path)?;
        let (kind, document) = pkg.parse()?;
        let props = pkg.core_properties();
        Ok(DocumentMetadata::new(kind, props, &document))
    })
    .await
    .map_err(|e| Office2MdError::Internal(format!("Inspect task panicked: {}", e)))?
}

// ── Pipeline ─────────────────────────────────────────────────────────────

enum Body {
    Word(Vec<Block>),
    Slides(Vec<SlideRecord>),
}

/// Output of the blocking stage.
struct Prepared {
    kind: DocumentKind,
    metadata: DocumentMetadata,
    body: Body,
    assets: Vec<ImageAsset>,
    warnings: Vec<AssetWarning>,
}

struct PrepareOptions {
    include_notes: bool,
    extract_equations: bool,
    handling: ImageHandling,
    images_dir: PathBuf,
    link_prefix: String,
    converter: Option<Arc<dyn RasterConverter>>,
}

async fn run(
    doc_path: &Path,
    markdown_path: &Path,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Office2MdError> {
    let total_start = Instant::now();
    info!("Starting conversion: {}", doc_path.display());

    // ── Step 1: Caption service (fatal when requested but unavailable) ───
    let service = if config.needs_vision() {
        Some(resolve_caption_service(config)?)
    } else {
        None
    };

    // ── Step 2: Parse, extract and normalise images ──────────────────────
    let (images_dir, link_prefix) = image_layout(markdown_path, config.images_dir.as_deref());
    let converter: Option<Arc<dyn RasterConverter>> = if config.convert_metafiles {
        Some(config.raster_converter.clone().unwrap_or_else(|| {
            Arc::new(ImageMagickConverter::new(config.raster_timeout_secs))
        }))
    } else {
        None
    };
    let opts = PrepareOptions {
        include_notes: config.include_notes,
        extract_equations: config.extract_equations,
        handling: config.image_handling,
        images_dir,
        link_prefix,
        converter,
    };
    let path = doc_path.to_path_buf();
    let Prepared {
        kind,
        metadata,
        body,
        mut assets,
        mut warnings,
    } = tokio::task::spawn_blocking(move || prepare(&path, &opts))
        .await
        .map_err(|e| Office2MdError::Internal(format!("Extraction task panicked: {}", e)))??;

    // ── Step 3: Captions and formula recognition ─────────────────────────
    if let Some(service) = &service {
        let prompt = config
            .caption_prompt
            .as_deref()
            .unwrap_or(DEFAULT_CAPTION_PROMPT);
        let annotate = AnnotateOptions {
            caption_images: config.caption_images,
            recognize_formulas: config.recognize_formulas && config.extract_equations,
            caption_prompt: prompt,
        };
        warnings.extend(caption::annotate_images(&mut assets, service.as_ref(), &annotate).await);
    }

    // ── Step 4: HTML with formula placeholders ───────────────────────────
    let mut emitter = HtmlEmitter::new(&assets, config.extract_equations);
    let (html, slides) = match &body {
        Body::Word(blocks) => (emitter.render_document(blocks), Vec::new()),
        Body::Slides(records) => (
            emitter.render_slides(records),
            records.iter().map(SlideOutline::from).collect::<Vec<_>>(),
        ),
    };
    let (eq_stats, eq_warnings) = emitter.finish();
    warnings.extend(eq_warnings);

    // ── Step 5: Markdown, decode, formula spacing ────────────────────────
    let markdown = render::html_to_markdown(&html)?;
    let cleaned = postprocess::clean_markdown(&markdown);
    let decoded = placeholder::decode(&cleaned);
    for token in decoded.malformed {
        warn!("Malformed formula placeholder left in output: {}", token);
        warnings.push(AssetWarning::MalformedPlaceholder { token });
    }
    let (body_md, _) = postprocess::normalize_formula_spacing(&decoded.text, &decoded.display_spans);

    let markdown = if config.include_metadata {
        format!("{}{}", metadata.to_front_matter(), body_md)
    } else {
        body_md
    };

    // ── Step 6: Stats ────────────────────────────────────────────────────
    let stats = ConversionStats {
        images_total: assets.len(),
        images_converted: assets.iter().filter(|a| a.converted).count(),
        images_failed: warnings
            .iter()
            .filter(|w| matches!(w, AssetWarning::ConversionFailed { .. }))
            .count(),
        captions_generated: assets.iter().filter(|a| a.caption.is_some()).count(),
        equations_inline: eq_stats.inline,
        equations_display: eq_stats.display,
        equations_fallback: eq_stats.fallback,
        slides: slides.len(),
        warnings: warnings.len(),
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Conversion complete: {} images, {} equations, {} warnings, {}ms total",
        stats.images_total,
        stats.equations_inline + stats.equations_display,
        stats.warnings,
        stats.total_duration_ms
    );

    Ok(ConversionOutput {
        markdown,
        kind,
        metadata,
        images: assets.iter().map(ImageRecord::from).collect(),
        slides,
        warnings,
        stats,
    })
}

/// Blocking stage: open, parse, plan and extract images.
fn prepare(path: &Path, opts: &PrepareOptions) -> Result<Prepared, Office2MdError> {
    let mut pkg = OfficePackage::open(path)?;
    let (kind, document) = pkg.parse()?;
    let metadata = DocumentMetadata::new(kind, pkg.core_properties(), &document);
    debug!(
        "{}: {} paragraphs, {} images, {} equations",
        kind, metadata.paragraph_count, metadata.image_count, metadata.equation_count
    );

    let (body, plan) = match document {
        Document::Word(blocks) => {
            let plan = media::plan_word_images(&blocks, opts.extract_equations);
            (Body::Word(blocks), plan)
        }
        Document::Presentation(sources) => {
            let records = slides::reconstruct(&sources, opts.include_notes);
            let plan = media::plan_slide_images(&records, opts.extract_equations);
            (Body::Slides(records), plan)
        }
    };

    let extract = ExtractOptions {
        handling: opts.handling,
        images_dir: opts.images_dir.clone(),
        link_prefix: opts.link_prefix.clone(),
        converter: opts.converter.as_deref(),
    };
    let (assets, warnings) = media::extract_images(&mut pkg, &plan, &extract)?;

    Ok(Prepared {
        kind,
        metadata,
        body,
        assets,
        warnings,
    })
}

// ── Paths ────────────────────────────────────────────────────────────────

/// `<stem>.md` next to a local input; in the working directory for a
/// downloaded one.
fn default_markdown_path(resolved: &input::ResolvedInput) -> PathBuf {
    let path = resolved.path();
    if resolved.is_downloaded() {
        PathBuf::from(path.file_name().unwrap_or_default()).with_extension("md")
    } else {
        path.with_extension("md")
    }
}

fn batch_output_path(input_str: &str, output_dir: Option<&Path>) -> PathBuf {
    let name = if input::is_url(input_str) {
        input_str
            .split(['?', '#'])
            .next()
            .and_then(|s| s.rsplit('/').next())
            .filter(|s| !s.is_empty())
            .unwrap_or("downloaded")
    } else {
        Path::new(input_str)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document")
    };
    let file = Path::new(name).with_extension("md");
    match output_dir {
        Some(dir) => dir.join(file),
        None if input::is_url(input_str) => file,
        None => Path::new(input_str).with_extension("md"),
    }
}

/// Image directory on disk and the relative link prefix used in Markdown.
///
/// Links are always relative to the Markdown file; an override outside the
/// Markdown directory is linked by its directory name.
fn image_layout(markdown_path: &Path, images_dir: Option<&Path>) -> (PathBuf, String) {
    let parent = markdown_path.parent().unwrap_or_else(|| Path::new(""));
    let Some(dir) = images_dir else {
        let stem = markdown_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let name = format!("{stem}_images");
        return (parent.join(&name), name);
    };

    let relative = if parent.as_os_str().is_empty() && dir.is_relative() {
        dir.to_path_buf()
    } else if let Ok(rel) = dir.strip_prefix(parent) {
        rel.to_path_buf()
    } else {
        dir.file_name().map(PathBuf::from).unwrap_or_default()
    };
    let prefix = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");
    (dir.to_path_buf(), prefix)
}

async fn write_markdown(path: &Path, markdown: &str) -> Result<(), Office2MdError> {
    let write_err = |source| Office2MdError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    // Atomic write: write to temp, then rename
    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, markdown).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}

// ── Provider resolution ──────────────────────────────────────────────────

fn resolve_caption_service(
    config: &ConversionConfig,
) -> Result<Arc<dyn CaptionService>, Office2MdError> {
    if let Some(ref service) = config.caption_service {
        return Ok(Arc::clone(service));
    }
    let provider = resolve_provider(config)?;
    Ok(Arc::new(LlmCaptionService::new(
        provider,
        config.temperature,
        config.caption_max_tokens,
        config.api_timeout_secs,
    )))
}

/// Instantiate a named provider with the given model.
fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, Office2MdError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Office2MdError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`); the factory reads
///    the matching API key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`),
///    honoured even when several API keys are present.
/// 4. **OpenAI** when `OPENAI_API_KEY` is set.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
fn resolve_provider(config: &ConversionConfig) -> Result<Arc<dyn LLMProvider>, Office2MdError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or("gpt-4.1-nano");
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or("gpt-4.1-nano");
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Office2MdError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "Image captions need a vision model, but none could be auto-detected.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
