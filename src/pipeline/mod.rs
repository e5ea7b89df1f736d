//! Pipeline stages for Office-to-Markdown conversion.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets the
//! external collaborators (ImageMagick, vision model, HTML converter) be
//! swapped or faked without touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ media ──▶ caption ──▶ slides/html ──▶ render ──▶ postprocess
//! (path/URL) (images)  (VLM)      (HTML+tokens)   (htmd)     (decode, spacing)
//! ```
//!
//! 1. [`input`]  — canonicalise the user-supplied path or URL to a local file
//! 2. [`media`]  — extract, classify and rasterise images; blocking, so it
//!    runs in `spawn_blocking`
//! 3. [`caption`] / [`encode`] — optional vision-model captions and formula
//!    recognition; the only stage with network I/O
//! 4. [`slides`] — reading order and titles for presentations
//! 5. [`html`]   — intermediate HTML with formula [`placeholder`]s
//! 6. [`render`] — HTML → Markdown
//! 7. [`postprocess`] — cleanup, placeholder decoding, formula spacing

pub mod caption;
pub mod encode;
pub mod html;
pub mod input;
pub mod media;
pub mod placeholder;
pub mod postprocess;
pub mod render;
pub mod slides;
