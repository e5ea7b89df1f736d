//! Prompts for the vision model.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth**: changing what captions look like requires
//!    editing exactly one place.
//!
//! 2. **Testability**: unit tests can inspect prompts directly without a
//!    real provider.
//!
//! Callers can override the caption prompt via
//! [`crate::config::ConversionConfig::caption_prompt`]; the formula prompt is
//! fixed because its output is parsed.

/// Default prompt for describing an embedded picture.
pub const DEFAULT_CAPTION_PROMPT: &str = "Write a detailed caption for this image.";

/// Appended to the caption prompt when an animated GIF is sent as a strip of
/// three frames.
pub const GIF_STRIP_NOTE: &str = "The image is a horizontal strip of three frames (first, middle, last) taken from an animated GIF. Describe the animation as a whole.";

/// Prompt for reading a formula out of an equation preview picture.
///
/// The response is expected to be bare LaTeX; delimiters and code fences are
/// stripped by the caller anyway.
pub const FORMULA_PROMPT: &str = "Convert the formula image to LaTeX. Rule: Use $...$ if the resulting formula is under 10 characters; otherwise, use $$...$$. Only output the LaTeX code without any explanation.";

/// Token budget for formula recognition responses.
pub const FORMULA_MAX_TOKENS: usize = 500;

/// Build the caption prompt for one image.
pub fn caption_prompt(base: &str, animated_strip: bool) -> String {
    if animated_strip {
        format!("{base}\n\n{GIF_STRIP_NOTE}")
    } else {
        base.to_string()
    }
}
