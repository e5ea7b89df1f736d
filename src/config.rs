//! Configuration types for Office-to-Markdown conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. Keeping every knob in one struct makes
//! it trivial to share configs across batch workers and to diff two runs to
//! understand why their outputs differ.
//!
//! The pluggable collaborators (raster converter, caption service, LLM
//! provider) are held as `Arc<dyn Trait>` so tests can inject fakes.

use crate::error::Office2MdError;
use crate::pipeline::caption::CaptionService;
use crate::pipeline::media::RasterConverter;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for an Office-to-Markdown conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_office2md::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .caption_images(true)
///     .model("gpt-4.1-nano")
///     .include_notes(false)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Directory for extracted images. Default: `<markdown-stem>_images`
    /// next to the Markdown file (or next to the input for stdout output).
    pub images_dir: Option<PathBuf>,

    /// Write images to files or inline them as `data:` URIs. Default: files.
    pub image_handling: ImageHandling,

    /// Translate equations to LaTeX. Default: true.
    ///
    /// When off, native equations render as their literal text and legacy
    /// equation objects as their preview picture.
    pub extract_equations: bool,

    /// Rasterise WMF/EMF pictures to PNG. Default: true.
    pub convert_metafiles: bool,

    /// Raster converter override. Default: ImageMagick.
    pub raster_converter: Option<Arc<dyn RasterConverter>>,

    /// ImageMagick `-limit time` in seconds. Default: 30.
    pub raster_timeout_secs: u64,

    /// Ask a vision model for a caption of every picture. Default: false.
    pub caption_images: bool,

    /// Ask a vision model to read untranslatable equation previews as
    /// LaTeX. Default: false.
    pub recognize_formulas: bool,

    /// Caption service override. Takes precedence over `provider`.
    pub caption_service: Option<Arc<dyn CaptionService>>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, uses `ProviderFactory::from_env()`.
    pub provider_name: Option<String>,

    /// LLM model identifier, e.g. "gpt-4.1-nano".
    /// If None, uses provider default.
    pub model: Option<String>,

    /// Caption prompt override. If None, uses the built-in default.
    pub caption_prompt: Option<String>,

    /// Sampling temperature for caption requests. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens per caption. Default: 300.
    pub caption_max_tokens: usize,

    /// Per-request timeout for the vision model in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Render speaker notes under each slide. Default: true.
    pub include_notes: bool,

    /// Include YAML front-matter with document metadata. Default: false.
    pub include_metadata: bool,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Documents converted at once by [`crate::convert_batch`]. Default: 4.
    pub concurrency: usize,

    /// Receives batch events from [`crate::convert_batch`]. Default: none.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            images_dir: None,
            image_handling: ImageHandling::default(),
            extract_equations: true,
            convert_metafiles: true,
            raster_converter: None,
            raster_timeout_secs: 30,
            caption_images: false,
            recognize_formulas: false,
            caption_service: None,
            provider: None,
            provider_name: None,
            model: None,
            caption_prompt: None,
            temperature: 0.1,
            caption_max_tokens: 300,
            api_timeout_secs: 60,
            include_notes: true,
            include_metadata: false,
            download_timeout_secs: 120,
            concurrency: 4,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("images_dir", &self.images_dir)
            .field("image_handling", &self.image_handling)
            .field("extract_equations", &self.extract_equations)
            .field("convert_metafiles", &self.convert_metafiles)
            .field(
                "raster_converter",
                &self.raster_converter.as_ref().map(|_| "<dyn RasterConverter>"),
            )
            .field("caption_images", &self.caption_images)
            .field("recognize_formulas", &self.recognize_formulas)
            .field(
                "caption_service",
                &self.caption_service.as_ref().map(|_| "<dyn CaptionService>"),
            )
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("caption_max_tokens", &self.caption_max_tokens)
            .field("include_notes", &self.include_notes)
            .field("include_metadata", &self.include_metadata)
            .field("concurrency", &self.concurrency)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// True when any step needs a vision model.
    pub fn needs_vision(&self) -> bool {
        self.caption_images || self.recognize_formulas
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn images_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.images_dir = Some(dir.into());
        self
    }

    pub fn image_handling(mut self, handling: ImageHandling) -> Self {
        self.config.image_handling = handling;
        self
    }

    pub fn extract_equations(mut self, v: bool) -> Self {
        self.config.extract_equations = v;
        self
    }

    pub fn convert_metafiles(mut self, v: bool) -> Self {
        self.config.convert_metafiles = v;
        self
    }

    pub fn raster_converter(mut self, converter: Arc<dyn RasterConverter>) -> Self {
        self.config.raster_converter = Some(converter);
        self
    }

    pub fn raster_timeout_secs(mut self, secs: u64) -> Self {
        self.config.raster_timeout_secs = secs.max(1);
        self
    }

    pub fn caption_images(mut self, v: bool) -> Self {
        self.config.caption_images = v;
        self
    }

    pub fn recognize_formulas(mut self, v: bool) -> Self {
        self.config.recognize_formulas = v;
        self
    }

    pub fn caption_service(mut self, service: Arc<dyn CaptionService>) -> Self {
        self.config.caption_service = Some(service);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn caption_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.caption_prompt = Some(prompt.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn caption_max_tokens(mut self, n: usize) -> Self {
        self.config.caption_max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn include_notes(mut self, v: bool) -> Self {
        self.config.include_notes = v;
        self
    }

    pub fn include_metadata(mut self, v: bool) -> Self {
        self.config.include_metadata = v;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.config.progress_callback = Some(callback);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Office2MdError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(Office2MdError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.needs_vision() && c.caption_max_tokens == 0 {
            return Err(Office2MdError::InvalidConfig(
                "caption_max_tokens must be ≥ 1 when captions are enabled".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(Office2MdError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Where extracted images go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImageHandling {
    /// Write files into the image directory and link them relatively. (default)
    #[default]
    Extract,
    /// Embed every image as a `data:` URI; nothing is written to disk.
    DataUri,
}
