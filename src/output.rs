//! Output types returned by the conversion entry points.
//!
//! Everything here is `Serialize` so the CLI can print a run as JSON
//! (`--json`) and library callers can persist it.

use crate::error::{AssetWarning, Office2MdError};
use crate::package::model::{ContentCounts, Document};
use crate::package::CoreProperties;
use crate::pipeline::media::{ImageAsset, ImageFormatTag, ImageOrigin};
use crate::pipeline::slides::SlideRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Which Office application produced the package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Word,
    PowerPoint,
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::Word => write!(f, "Word document"),
            DocumentKind::PowerPoint => write!(f, "PowerPoint presentation"),
        }
    }
}

/// The complete result of converting one document.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionOutput {
    /// The final Markdown text.
    pub markdown: String,
    pub kind: DocumentKind,
    pub metadata: DocumentMetadata,
    /// Every image that made it into the output, in document order.
    pub images: Vec<ImageRecord>,
    /// Slide titles; empty for Word documents.
    pub slides: Vec<SlideOutline>,
    /// Recoverable problems; the Markdown is still complete.
    pub warnings: Vec<AssetWarning>,
    pub stats: ConversionStats,
}

/// Counters for one conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    pub images_total: usize,
    /// Metafiles rasterised to PNG.
    pub images_converted: usize,
    /// Metafiles whose conversion failed; the original was kept.
    pub images_failed: usize,
    pub captions_generated: usize,
    pub equations_inline: usize,
    pub equations_display: usize,
    /// Equations shown as their preview picture.
    pub equations_fallback: usize,
    pub slides: usize,
    pub warnings: usize,
    pub total_duration_ms: u64,
}

/// Core properties plus content counts, as returned by [`crate::inspect`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub kind: DocumentKind,
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
    pub last_modified_by: Option<String>,
    pub created: Option<String>,
    pub modified: Option<String>,
    /// `None` for Word documents.
    pub slide_count: Option<usize>,
    pub paragraph_count: usize,
    pub table_count: usize,
    pub image_count: usize,
    pub equation_count: usize,
}

impl DocumentMetadata {
    pub fn new(kind: DocumentKind, props: CoreProperties, document: &Document) -> Self {
        let ContentCounts {
            paragraphs,
            tables,
            images,
            equations,
        } = document.counts();
        let slide_count = match document {
            Document::Presentation(slides) => Some(slides.len()),
            Document::Word(_) => None,
        };
        Self {
            kind,
            title: props.title,
            author: props.author,
            subject: props.subject,
            keywords: props.keywords,
            last_modified_by: props.last_modified_by,
            created: props.created,
            modified: props.modified,
            slide_count,
            paragraph_count: paragraphs,
            table_count: tables,
            image_count: images,
            equation_count: equations,
        }
    }

    /// YAML front matter block, terminated by a blank line.
    pub fn to_front_matter(&self) -> String {
        let mut yaml = String::from("---\n");
        let fields = [
            ("title", &self.title),
            ("author", &self.author),
            ("subject", &self.subject),
            ("keywords", &self.keywords),
            ("created", &self.created),
            ("modified", &self.modified),
        ];
        for (key, value) in fields {
            if let Some(v) = value {
                yaml.push_str(&format!("{key}: \"{}\"\n", yaml_escape(v)));
            }
        }
        let kind = match self.kind {
            DocumentKind::Word => "docx",
            DocumentKind::PowerPoint => "pptx",
        };
        yaml.push_str(&format!("source_format: {kind}\n"));
        if let Some(n) = self.slide_count {
            yaml.push_str(&format!("slides: {n}\n"));
        }
        yaml.push_str("---\n\n");
        yaml
    }
}

fn yaml_escape(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', " ")
}

/// One image as it ended up in the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub file_name: String,
    /// Where the file was written; `None` when embedded as a data URI.
    pub path: Option<PathBuf>,
    pub format: ImageFormatTag,
    pub original_format: ImageFormatTag,
    pub converted: bool,
    /// Preview picture of an equation.
    pub equation_preview: bool,
    pub caption: Option<String>,
    pub recognized_latex: Option<String>,
}

impl From<&ImageAsset> for ImageRecord {
    fn from(a: &ImageAsset) -> Self {
        Self {
            file_name: a.file_name.clone(),
            path: a.disk_path.clone(),
            format: a.format,
            original_format: a.original_format,
            converted: a.converted,
            equation_preview: matches!(a.origin, ImageOrigin::EquationPreview { .. }),
            caption: a.caption.clone(),
            recognized_latex: a.recognized_latex.clone(),
        }
    }
}

/// Index and title of a slide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideOutline {
    pub index: usize,
    pub title: String,
}

impl From<&SlideRecord> for SlideOutline {
    fn from(r: &SlideRecord) -> Self {
        Self {
            index: r.index,
            title: r.title.clone(),
        }
    }
}

/// Outcome for one input of [`crate::convert_batch`].
#[derive(Debug)]
pub struct BatchItem {
    pub input: String,
    pub output: PathBuf,
    pub result: Result<ConversionStats, Office2MdError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(kind: DocumentKind) -> DocumentMetadata {
        DocumentMetadata {
            kind,
            title: Some("Q3 \"Review\"".into()),
            author: Some("Finance".into()),
            subject: None,
            keywords: None,
            last_modified_by: None,
            created: Some("2024-01-02T03:04:05Z".into()),
            modified: None,
            slide_count: if kind == DocumentKind::PowerPoint { Some(12) } else { None },
            paragraph_count: 0,
            table_count: 0,
            image_count: 0,
            equation_count: 0,
        }
    }

    #[test]
    fn front_matter_escapes_quotes() {
        let yaml = meta(DocumentKind::PowerPoint).to_front_matter();
        assert!(yaml.starts_with("---\n"));
        assert!(yaml.contains("title: \"Q3 \\\"Review\\\"\"\n"));
        assert!(yaml.contains("source_format: pptx\n"));
        assert!(yaml.contains("slides: 12\n"));
        assert!(yaml.ends_with("---\n\n"));
        assert!(!yaml.contains("subject"));
    }

    #[test]
    fn word_front_matter_has_no_slide_count() {
        let yaml = meta(DocumentKind::Word).to_front_matter();
        assert!(yaml.contains("source_format: docx\n"));
        assert!(!yaml.contains("slides:"));
    }

    #[test]
    fn kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&DocumentKind::PowerPoint).unwrap(), "\"powerpoint\"");
        assert_eq!(DocumentKind::Word.to_string(), "Word document");
    }
}
