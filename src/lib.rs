//! # edgequake-office2md
//!
//! Convert Word (`.docx`) and PowerPoint (`.pptx`) documents to Markdown.
//!
//! ## Why this crate?
//!
//! Generic document converters flatten Office equations to unreadable text
//! and emit WMF/EMF pictures that no Markdown viewer can show. This crate
//! translates Office Math to LaTeX, rasterises metafiles to PNG, puts slide
//! shapes back in reading order, and can ask a vision model to caption the
//! pictures.
//!
//! ## Pipeline Overview
//!
//! ```text
//! .docx / .pptx
//!  │
//!  ├─ 1. Input     resolve local file or download from URL
//!  ├─ 2. Package   parse the ZIP + XML into a document tree (spawn_blocking)
//!  ├─ 3. Media     extract images, WMF/EMF → PNG via ImageMagick
//!  ├─ 4. Caption   optional vision-model captions and formula recognition
//!  ├─ 5. HTML      structure + equations as placeholder tokens
//!  ├─ 6. Markdown  htmd conversion, cleanup
//!  └─ 7. Formulas  tokens decoded to $…$ / $$…$$, spacing normalised
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_office2md::{convert, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // No API key needed unless captions are enabled.
//!     let config = ConversionConfig::default();
//!     let output = convert("lecture.pptx", &config).await?;
//!     println!("{}", output.markdown);
//!     eprintln!("{} slides, {} images, {} warnings",
//!         output.stats.slides,
//!         output.stats.images_total,
//!         output.warnings.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `office2md` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-office2md = { version = "0.1", default-features = false }
//! ```
//!
//! ## External tools
//!
//! Metafile conversion shells out to ImageMagick (`magick`, or `convert` on
//! older installs). Without it, WMF/EMF files are kept unchanged and a
//! warning is reported; nothing else depends on it.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod math;
pub mod output;
pub mod package;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, ImageHandling};
pub use convert::{
    convert, convert_batch, convert_from_bytes, convert_sync, convert_to_file, inspect,
};
pub use error::{
    AssetWarning, CaptionError, ConversionError, Office2MdError, UnsupportedEquationFormat,
};
pub use output::{
    BatchItem, ConversionOutput, ConversionStats, DocumentKind, DocumentMetadata, ImageRecord,
    SlideOutline,
};
pub use pipeline::caption::{CaptionService, LlmCaptionService};
pub use pipeline::media::{ImageFormatTag, ImageMagickConverter, RasterConverter};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
