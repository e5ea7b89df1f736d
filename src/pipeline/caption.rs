//! Vision-model captions and formula recognition for extracted images.
//!
//! Both features are off by default. When enabled, every eligible asset is
//! sent to a [`CaptionService`] once, sequentially, with no retry: a failed
//! request leaves the caption empty (or keeps the equation preview image) and
//! records an [`AssetWarning`]. Nothing a vision model says can fail the
//! document.

use super::encode::encode_asset;
use super::media::{ImageAsset, ImageOrigin};
use crate::error::{AssetWarning, CaptionError};
use crate::prompts::{self, FORMULA_MAX_TOKENS, FORMULA_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A service that can look at an image and answer a prompt about it.
#[async_trait]
pub trait CaptionService: Send + Sync {
    /// Describe the image as instructed by `prompt`.
    async fn describe(&self, image: ImageData, prompt: &str) -> Result<String, CaptionError>;

    /// Read a formula picture as LaTeX.
    async fn recognize_formula(&self, image: ImageData) -> Result<String, CaptionError> {
        self.describe(image, FORMULA_PROMPT).await
    }
}

/// [`CaptionService`] backed by an `edgequake-llm` vision provider.
pub struct LlmCaptionService {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
    timeout_secs: u64,
}

impl LlmCaptionService {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        temperature: f32,
        max_tokens: usize,
        timeout_secs: u64,
    ) -> Self {
        Self {
            provider,
            temperature,
            max_tokens,
            timeout_secs,
        }
    }

    async fn ask(
        &self,
        image: ImageData,
        prompt: &str,
        max_tokens: usize,
    ) -> Result<String, CaptionError> {
        let messages = vec![ChatMessage::user_with_images(prompt, vec![image])];
        let options = CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(max_tokens),
            ..Default::default()
        };

        let request = self.provider.chat(&messages, Some(&options));
        let response = tokio::time::timeout(Duration::from_secs(self.timeout_secs), request)
            .await
            .map_err(|_| CaptionError::Timeout(self.timeout_secs))?
            .map_err(|e| CaptionError::Provider(e.to_string()))?;

        debug!(
            "Vision response: {} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        let text = response.content.trim();
        if text.is_empty() {
            return Err(CaptionError::EmptyResponse);
        }
        Ok(text.to_string())
    }
}

impl std::fmt::Debug for LlmCaptionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmCaptionService")
            .field("provider", &"<dyn LLMProvider>")
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[async_trait]
impl CaptionService for LlmCaptionService {
    async fn describe(&self, image: ImageData, prompt: &str) -> Result<String, CaptionError> {
        self.ask(image, prompt, self.max_tokens).await
    }

    async fn recognize_formula(&self, image: ImageData) -> Result<String, CaptionError> {
        self.ask(image, FORMULA_PROMPT, FORMULA_MAX_TOKENS).await
    }
}

// ── Annotation pass ──────────────────────────────────────────────────────

/// Which requests [`annotate_images`] makes.
#[derive(Debug, Clone)]
pub struct AnnotateOptions<'a> {
    pub caption_images: bool,
    pub recognize_formulas: bool,
    pub caption_prompt: &'a str,
}

/// Fill in `caption` / `recognized_latex` on every eligible asset.
///
/// Equation previews go to formula recognition when it is enabled and are
/// captioned like any picture otherwise.
pub async fn annotate_images(
    assets: &mut [ImageAsset],
    service: &dyn CaptionService,
    opts: &AnnotateOptions<'_>,
) -> Vec<AssetWarning> {
    let mut warnings = Vec::new();
    if !opts.caption_images && !opts.recognize_formulas {
        return warnings;
    }

    for asset in assets.iter_mut() {
        let is_preview = matches!(asset.origin, ImageOrigin::EquationPreview { .. });
        if is_preview && opts.recognize_formulas {
            if let Err(detail) = recognize(asset, service).await {
                warn!("Formula recognition for {} failed: {}", asset.file_name, detail);
                warnings.push(AssetWarning::FormulaRecognitionFailed {
                    file: asset.file_name.clone(),
                    detail,
                });
            }
        } else if opts.caption_images {
            if let Err(detail) = caption(asset, service, opts.caption_prompt).await {
                warn!("Caption for {} failed: {}", asset.file_name, detail);
                warnings.push(AssetWarning::CaptionFailed {
                    file: asset.file_name.clone(),
                    detail,
                });
            }
        }
    }

    let captioned = assets.iter().filter(|a| a.caption.is_some()).count();
    let recognized = assets.iter().filter(|a| a.recognized_latex.is_some()).count();
    if captioned + recognized > 0 {
        info!("Vision model: {} captions, {} formulas", captioned, recognized);
    }
    warnings
}

async fn caption(
    asset: &mut ImageAsset,
    service: &dyn CaptionService,
    base_prompt: &str,
) -> Result<(), String> {
    let encoded = encode_asset(asset)
        .ok_or_else(|| format!("{:?} images cannot be sent to a vision model", asset.format))?;
    let prompt = prompts::caption_prompt(base_prompt, encoded.animated_strip);
    let text = service
        .describe(encoded.data, &prompt)
        .await
        .map_err(|e| e.to_string())?;
    asset.caption = Some(text);
    Ok(())
}

async fn recognize(asset: &mut ImageAsset, service: &dyn CaptionService) -> Result<(), String> {
    let encoded = encode_asset(asset)
        .ok_or_else(|| format!("{:?} images cannot be sent to a vision model", asset.format))?;
    let response = service
        .recognize_formula(encoded.data)
        .await
        .map_err(|e| e.to_string())?;
    let latex = strip_formula_response(&response);
    if latex.is_empty() {
        return Err("response contained no formula".into());
    }
    asset.recognized_latex = Some(latex);
    Ok(())
}

static RE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\s*\n?(.*?)\n?\s*```$").unwrap());

/// Bare LaTeX from a model answer: code fences and math delimiters removed.
pub fn strip_formula_response(response: &str) -> String {
    let mut s = response.trim();
    if let Some(caps) = RE_FENCE.captures(s) {
        if let Some(inner) = caps.get(1) {
            s = inner.as_str().trim();
        }
    }
    for (open, close) in [("$$", "$$"), ("\\[", "\\]"), ("\\(", "\\)"), ("$", "$")] {
        if s.len() > open.len() + close.len() && s.starts_with(open) && s.ends_with(close) {
            s = s[open.len()..s.len() - close.len()].trim();
            break;
        }
    }
    s.to_string()
}

// ── Alt text ─────────────────────────────────────────────────────────────

static RE_ALT_BREAKERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\r\n\[\]]").unwrap());
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Alt text for an image: caption and author description, or the shape name
/// when both are empty. Brackets and line breaks would break the Markdown
/// image syntax and become spaces.
pub fn compose_alt_text(
    caption: Option<&str>,
    description: Option<&str>,
    name: Option<&str>,
) -> String {
    let joined = [caption, description]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join("\n");
    let alt = sanitize_alt(&joined);
    if alt.is_empty() {
        name.map(sanitize_alt).unwrap_or_default()
    } else {
        alt
    }
}

fn sanitize_alt(s: &str) -> String {
    let replaced = RE_ALT_BREAKERS.replace_all(s, " ");
    RE_WS.replace_all(&replaced, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::media::ImageFormatTag;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeService {
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
        reply: Result<String, ()>,
    }

    impl FakeService {
        fn answering(reply: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
                reply: Ok(reply.to_string()),
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
                reply: Err(()),
            }
        }
    }

    #[async_trait]
    impl CaptionService for FakeService {
        async fn describe(&self, _image: ImageData, prompt: &str) -> Result<String, CaptionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply
                .clone()
                .map_err(|_| CaptionError::Provider("503 Service Unavailable".into()))
        }
    }

    fn asset(format: ImageFormatTag, origin: ImageOrigin) -> ImageAsset {
        ImageAsset {
            id: 0,
            bytes: vec![0x89, b'P', b'N', b'G'],
            format,
            original_format: format,
            file_name: format!("slide1_image1.{}", format.extension()),
            display_path: String::new(),
            disk_path: None,
            origin,
            description: None,
            name: None,
            caption: None,
            recognized_latex: None,
            converted: false,
        }
    }

    fn opts(caption_images: bool, recognize_formulas: bool) -> AnnotateOptions<'static> {
        AnnotateOptions {
            caption_images,
            recognize_formulas,
            caption_prompt: prompts::DEFAULT_CAPTION_PROMPT,
        }
    }

    #[tokio::test]
    async fn disabled_never_calls_service() {
        let service = FakeService::answering("A cat.");
        let mut assets = vec![asset(ImageFormatTag::Png, ImageOrigin::Picture)];
        let warnings = annotate_images(&mut assets, &service, &opts(false, false)).await;
        assert!(warnings.is_empty());
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
        assert!(assets[0].caption.is_none());
    }

    #[tokio::test]
    async fn caption_is_stored() {
        let service = FakeService::answering("A bar chart of revenue.");
        let mut assets = vec![asset(ImageFormatTag::Png, ImageOrigin::Picture)];
        let warnings = annotate_images(&mut assets, &service, &opts(true, false)).await;
        assert!(warnings.is_empty());
        assert_eq!(assets[0].caption.as_deref(), Some("A bar chart of revenue."));
        assert_eq!(
            service.prompts.lock().unwrap()[0],
            prompts::DEFAULT_CAPTION_PROMPT
        );
    }

    #[tokio::test]
    async fn failure_becomes_warning() {
        let service = FakeService::failing();
        let mut assets = vec![asset(ImageFormatTag::Jpeg, ImageOrigin::Picture)];
        let warnings = annotate_images(&mut assets, &service, &opts(true, false)).await;
        assert_eq!(warnings.len(), 1);
        assert!(matches!(&warnings[0], AssetWarning::CaptionFailed { detail, .. } if detail.contains("503")));
        assert!(assets[0].caption.is_none());
    }

    #[tokio::test]
    async fn unconverted_metafile_is_not_sent() {
        let service = FakeService::answering("x");
        let mut assets = vec![asset(ImageFormatTag::Wmf, ImageOrigin::Picture)];
        let warnings = annotate_images(&mut assets, &service, &opts(true, false)).await;
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
        assert_eq!(warnings.len(), 1);
    }

    #[tokio::test]
    async fn equation_preview_goes_to_formula_recognition() {
        let service = FakeService::answering("$$E = mc^2$$");
        let mut assets = vec![
            asset(ImageFormatTag::Png, ImageOrigin::EquationPreview { display: true }),
            asset(ImageFormatTag::Png, ImageOrigin::Picture),
        ];
        let warnings = annotate_images(&mut assets, &service, &opts(false, true)).await;
        assert!(warnings.is_empty());
        assert_eq!(assets[0].recognized_latex.as_deref(), Some("E = mc^2"));
        // Captions are off, so the ordinary picture is left alone.
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
        assert!(assets[1].caption.is_none());
    }

    #[test]
    fn strip_formula_response_variants() {
        assert_eq!(strip_formula_response("  $x^2$ "), "x^2");
        assert_eq!(strip_formula_response(r"\[ \frac{a}{b} \]"), r"\frac{a}{b}");
        assert_eq!(
            strip_formula_response("```latex\n$$\\sum_i x_i$$\n```"),
            r"\sum_i x_i"
        );
        assert_eq!(strip_formula_response("a+b"), "a+b");
        assert_eq!(strip_formula_response("$$"), "$$");
    }

    #[test]
    fn alt_text_combines_and_sanitizes() {
        assert_eq!(
            compose_alt_text(Some("A plot [fig]"), Some("Line\r\nchart"), Some("Picture 2")),
            "A plot fig Line chart"
        );
        assert_eq!(compose_alt_text(None, Some("  "), Some("Picture 2")), "Picture 2");
        assert_eq!(compose_alt_text(None, None, None), "");
    }
}
