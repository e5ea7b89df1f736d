//! Error types for the edgequake-office2md library.
//!
//! Fatal and non-fatal failures are kept apart:
//!
//! * [`Office2MdError`] — **Fatal** for one document: the package cannot be
//!   read, the output cannot be written, or captioning was requested without
//!   a usable provider. Returned as `Err(Office2MdError)` from the top-level
//!   `convert*` functions.
//!
//! * [`AssetWarning`] — **Non-fatal**: one image failed to rasterise, one
//!   caption request failed, one placeholder was corrupted. Collected in
//!   [`crate::output::ConversionOutput::warnings`]; the document still
//!   converts.
//!
//! The narrower [`ConversionError`], [`CaptionError`] and
//! [`UnsupportedEquationFormat`] are returned by the pluggable collaborators
//! and folded into warnings by the orchestrator.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-office2md library.
#[derive(Debug, Error)]
pub enum Office2MdError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a ZIP package at all.
    #[error("File is not an Office Open XML package: '{path}'\nFirst bytes: {magic:?}")]
    NotAnOfficeDocument { path: PathBuf, magic: [u8; 4] },

    // ── Package errors ────────────────────────────────────────────────────
    /// A valid ZIP, but neither a Word document nor a PowerPoint deck.
    #[error("Unsupported document '{path}': {detail}\nOnly .docx and .pptx packages are supported.")]
    UnsupportedDocument { path: PathBuf, detail: String },

    /// The ZIP container is damaged.
    #[error("Package '{path}' is corrupt: {detail}")]
    CorruptPackage { path: PathBuf, detail: String },

    /// A part every document of this kind must have is absent.
    #[error("Package is missing required part '{part}'")]
    MissingPart { part: String },

    /// A required XML part could not be parsed.
    #[error("Malformed XML in part '{part}': {detail}")]
    MalformedXml { part: String, detail: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// Captioning was requested but no provider could be initialised.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create the image directory or write an extracted image.
    #[error("Failed to write image '{path}': {source}")]
    ImageWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write the output Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A recoverable problem with one asset or one formula.
///
/// The document is still produced; the affected element degrades to its
/// fallback (original image kept, empty caption, placeholder left verbatim).
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum AssetWarning {
    /// A relationship pointed at a media part that is not in the package.
    #[error("Image part '{target}' is referenced but missing from the package")]
    MissingImagePart { target: String },

    /// A legacy metafile could not be rasterised; the original was kept.
    #[error("Could not convert '{file}' to PNG, keeping original: {detail}")]
    ConversionFailed { file: String, detail: String },

    /// The vision service did not produce a caption.
    #[error("Caption request for '{file}' failed: {detail}")]
    CaptionFailed { file: String, detail: String },

    /// Formula recognition on an equation preview image failed.
    #[error("Formula recognition for '{file}' failed: {detail}")]
    FormulaRecognitionFailed { file: String, detail: String },

    /// An equation had neither a translation nor a preview image.
    #[error("Equation dropped: {detail}")]
    UnsupportedEquation { detail: String },

    /// A formula placeholder survived rendering but could not be decoded.
    #[error("Malformed formula placeholder left in output: {token}")]
    MalformedPlaceholder { token: String },
}

/// Failure of the external raster-conversion service.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// No ImageMagick binary on `PATH`.
    #[error("raster tool not found: {0}")]
    ToolNotFound(String),

    /// The tool ran and exited with a non-zero status.
    #[error("raster tool exited with {status}: {stderr}")]
    ToolFailed { status: String, stderr: String },

    /// The tool exited cleanly but produced nothing usable.
    #[error("raster tool produced no output")]
    EmptyOutput,

    /// Scratch-file I/O around the tool invocation failed.
    #[error("raster conversion I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of the vision/caption service.
#[derive(Debug, Error)]
pub enum CaptionError {
    /// Provider returned an error.
    #[error("provider error: {0}")]
    Provider(String),

    /// Request exceeded `api_timeout_secs`.
    #[error("timed out after {0}s")]
    Timeout(u64),

    /// Provider answered with nothing.
    #[error("empty response")]
    EmptyResponse,
}

/// The equation object cannot be translated into LaTeX; the caller falls
/// back to the object's preview image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported equation format: {0}")]
pub struct UnsupportedEquationFormat(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_an_office_document_display_shows_magic() {
        let e = Office2MdError::NotAnOfficeDocument {
            path: PathBuf::from("notes.txt"),
            magic: *b"%PDF",
        };
        let msg = e.to_string();
        assert!(msg.contains("notes.txt"), "got: {msg}");
        assert!(msg.contains("37"), "got: {msg}");
    }

    #[test]
    fn unsupported_document_mentions_supported_kinds() {
        let e = Office2MdError::UnsupportedDocument {
            path: PathBuf::from("book.xlsx"),
            detail: "spreadsheet".into(),
        };
        assert!(e.to_string().contains(".docx and .pptx"));
    }

    #[test]
    fn conversion_warning_names_file() {
        let w = AssetWarning::ConversionFailed {
            file: "slide1_image1.wmf".into(),
            detail: "raster tool not found: magick".into(),
        };
        let msg = w.to_string();
        assert!(msg.contains("slide1_image1.wmf"));
        assert!(msg.contains("keeping original"));
    }

    #[test]
    fn warnings_round_trip_through_json() {
        let w = AssetWarning::MalformedPlaceholder {
            token: "⟨OMML:$:!!!⟩".into(),
        };
        let json = serde_json::to_string(&w).unwrap();
        let back: AssetWarning = serde_json::from_str(&json).unwrap();
        assert_eq!(back, w);
    }

    #[test]
    fn tool_failed_display() {
        let e = ConversionError::ToolFailed {
            status: "exit status: 1".into(),
            stderr: "no decode delegate".into(),
        };
        assert!(e.to_string().contains("no decode delegate"));
    }
}
