//! Office Open XML package access.
//!
//! ```text
//! bytes ──▶ OfficePackage (ZIP) ──▶ detect_kind ──┬─▶ docx::parse  ─▶ Document::Word
//!                                                 └─▶ pptx::parse  ─▶ Document::Presentation
//! ```
//!
//! [`OfficePackage`] owns the ZIP archive and answers part, relationship and
//! metadata lookups. The walkers build the typed [`model`] from those parts.

pub mod docx;
pub mod model;
pub mod pptx;
pub mod xml;

use crate::error::Office2MdError;
use crate::output::DocumentKind;
use model::Document;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use tracing::debug;
use xml::XmlElement;
use zip::result::ZipError;
use zip::ZipArchive;

/// One entry of a `.rels` part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    /// Last path segment of the relationship type URI (`image`, `slide`, ...).
    pub kind: String,
    /// Absolute part name for internal targets, the raw URI for external ones.
    pub target: String,
    pub external: bool,
}

/// Relationship id → relationship, for one source part.
pub type Relationships = HashMap<String, Relationship>;

/// Dublin Core properties from `docProps/core.xml`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoreProperties {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
    pub last_modified_by: Option<String>,
    pub created: Option<String>,
    pub modified: Option<String>,
}

/// An opened `.docx` / `.pptx` container.
pub struct OfficePackage {
    path: PathBuf,
    archive: ZipArchive<Cursor<Vec<u8>>>,
}

impl std::fmt::Debug for OfficePackage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfficePackage")
            .field("path", &self.path)
            .field("parts", &self.archive.len())
            .finish()
    }
}

impl OfficePackage {
    /// Read and open the package at `path`.
    pub fn open(path: &Path) -> Result<Self, Office2MdError> {
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Office2MdError::FileNotFound {
                path: path.to_path_buf(),
            },
            std::io::ErrorKind::PermissionDenied => Office2MdError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => Office2MdError::CorruptPackage {
                path: path.to_path_buf(),
                detail: e.to_string(),
            },
        })?;
        Self::from_bytes(path, bytes)
    }

    /// Open a package already held in memory; `path` is used for messages.
    pub fn from_bytes(path: &Path, bytes: Vec<u8>) -> Result<Self, Office2MdError> {
        if bytes.len() < 4 || &bytes[..4] != b"PK\x03\x04" {
            let mut magic = [0u8; 4];
            for (dst, src) in magic.iter_mut().zip(bytes.iter()) {
                *dst = *src;
            }
            return Err(Office2MdError::NotAnOfficeDocument {
                path: path.to_path_buf(),
                magic,
            });
        }
        let archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| {
            Office2MdError::CorruptPackage {
                path: path.to_path_buf(),
                detail: e.to_string(),
            }
        })?;
        debug!("Opened package {} ({} parts)", path.display(), archive.len());
        Ok(Self {
            path: path.to_path_buf(),
            archive,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw bytes of a part, `None` when the part does not exist.
    pub fn read_part(&mut self, name: &str) -> Result<Option<Vec<u8>>, Office2MdError> {
        let name = name.trim_start_matches('/');
        let mut file = match self.archive.by_name(name) {
            Ok(f) => f,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => {
                return Err(Office2MdError::CorruptPackage {
                    path: self.path.clone(),
                    detail: format!("{name}: {e}"),
                })
            }
        };
        let mut buf = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buf)
            .map_err(|e| Office2MdError::CorruptPackage {
                path: self.path.clone(),
                detail: format!("{name}: {e}"),
            })?;
        Ok(Some(buf))
    }

    /// Parse an XML part, `None` when the part does not exist.
    pub fn read_xml(&mut self, name: &str) -> Result<Option<XmlElement>, Office2MdError> {
        let Some(bytes) = self.read_part(name)? else {
            return Ok(None);
        };
        let text = String::from_utf8_lossy(&bytes);
        let text = text.trim_start_matches('\u{feff}');
        xml::parse(text)
            .map(Some)
            .map_err(|detail| Office2MdError::MalformedXml {
                part: name.to_string(),
                detail,
            })
    }

    /// Parse a part that must exist.
    pub fn require_xml(&mut self, name: &str) -> Result<XmlElement, Office2MdError> {
        self.read_xml(name)?
            .ok_or_else(|| Office2MdError::MissingPart {
                part: name.to_string(),
            })
    }

    /// Relationships of `part` (from `<dir>/_rels/<file>.rels`).
    ///
    /// A missing `.rels` part simply means no relationships.
    pub fn relationships(&mut self, part: &str) -> Result<Relationships, Office2MdError> {
        let rels_name = rels_part_name(part);
        let Some(root) = self.read_xml(&rels_name)? else {
            return Ok(Relationships::new());
        };
        let base = part_dir(part);
        let mut out = Relationships::new();
        for rel in root.elements().filter(|e| e.local_name() == "Relationship") {
            let (Some(id), Some(target)) = (rel.attr("Id"), rel.attr("Target")) else {
                continue;
            };
            let external = rel.attr("TargetMode") == Some("External");
            let kind = rel
                .attr("Type")
                .and_then(|t| t.rsplit('/').next())
                .unwrap_or_default()
                .to_string();
            let target = if external {
                target.to_string()
            } else {
                resolve_target(base, target)
            };
            out.insert(
                id.to_string(),
                Relationship {
                    id: id.to_string(),
                    kind,
                    target,
                    external,
                },
            );
        }
        Ok(out)
    }

    /// Decide whether this is a Word document or a PowerPoint deck.
    pub fn detect_kind(&mut self) -> Result<DocumentKind, Office2MdError> {
        if let Some(types) = self.read_xml("[Content_Types].xml")? {
            for ov in types.elements().filter(|e| e.local_name() == "Override") {
                let ct = ov.attr("ContentType").unwrap_or_default();
                if ct.contains("wordprocessingml.document.main")
                    || ct.contains("ms-word.document.macroEnabled.main")
                    || ct.contains("wordprocessingml.template.main")
                {
                    return Ok(DocumentKind::Word);
                }
                if ct.contains("presentationml.presentation.main")
                    || ct.contains("presentationml.slideshow.main")
                    || ct.contains("ms-powerpoint.presentation.macroEnabled.main")
                {
                    return Ok(DocumentKind::PowerPoint);
                }
                if ct.contains("spreadsheetml") {
                    return Err(Office2MdError::UnsupportedDocument {
                        path: self.path.clone(),
                        detail: "spreadsheet packages are not converted".into(),
                    });
                }
            }
        }

        // Fall back to well-known part names.
        if self.archive.index_for_name("word/document.xml").is_some() {
            return Ok(DocumentKind::Word);
        }
        if self.archive.index_for_name("ppt/presentation.xml").is_some() {
            return Ok(DocumentKind::PowerPoint);
        }
        Err(Office2MdError::UnsupportedDocument {
            path: self.path.clone(),
            detail: "no Word or PowerPoint main part found".into(),
        })
    }

    /// Document properties; absent or unreadable metadata yields defaults.
    pub fn core_properties(&mut self) -> CoreProperties {
        let root = match self.read_xml("docProps/core.xml") {
            Ok(Some(root)) => root,
            _ => return CoreProperties::default(),
        };
        let get = |name: &str| {
            root.child(name)
                .map(|e| e.text().trim().to_string())
                .filter(|s| !s.is_empty())
        };
        CoreProperties {
            title: get("dc:title"),
            author: get("dc:creator"),
            subject: get("dc:subject"),
            keywords: get("cp:keywords"),
            last_modified_by: get("cp:lastModifiedBy"),
            created: get("dcterms:created"),
            modified: get("dcterms:modified"),
        }
    }

    /// Detect the kind and walk the main part into the document model.
    pub fn parse(&mut self) -> Result<(DocumentKind, Document), Office2MdError> {
        let kind = self.detect_kind()?;
        let doc = match kind {
            DocumentKind::Word => Document::Word(docx::parse(self)?),
            DocumentKind::PowerPoint => Document::Presentation(pptx::parse(self)?),
        };
        Ok((kind, doc))
    }
}

/// `ppt/slides/slide1.xml` → `ppt/slides/_rels/slide1.xml.rels`.
fn rels_part_name(part: &str) -> String {
    let part = part.trim_start_matches('/');
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

fn part_dir(part: &str) -> &str {
    part.trim_start_matches('/')
        .rsplit_once('/')
        .map(|(dir, _)| dir)
        .unwrap_or("")
}

/// Resolve a relationship target against the source part's directory,
/// collapsing `.` and `..` segments. Leading `/` means package-absolute.
pub fn resolve_target(base_dir: &str, target: &str) -> String {
    let joined = if let Some(abs) = target.strip_prefix('/') {
        abs.to_string()
    } else if base_dir.is_empty() {
        target.to_string()
    } else {
        format!("{base_dir}/{target}")
    };
    let mut segments: Vec<&str> = Vec::new();
    for seg in joined.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn package(parts: &[(&str, &str)]) -> OfficePackage {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut zip = ZipWriter::new(&mut buf);
            for (name, body) in parts {
                zip.start_file(*name, SimpleFileOptions::default()).unwrap();
                zip.write_all(body.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        OfficePackage::from_bytes(Path::new("test.docx"), buf.into_inner()).unwrap()
    }

    #[test]
    fn resolves_relative_targets() {
        assert_eq!(resolve_target("word", "media/image1.png"), "word/media/image1.png");
        assert_eq!(
            resolve_target("ppt/slides", "../media/image2.emf"),
            "ppt/media/image2.emf"
        );
        assert_eq!(resolve_target("ppt/slides", "/ppt/media/x.png"), "ppt/media/x.png");
        assert_eq!(resolve_target("", "word/document.xml"), "word/document.xml");
    }

    #[test]
    fn rels_names() {
        assert_eq!(rels_part_name("word/document.xml"), "word/_rels/document.xml.rels");
        assert_eq!(rels_part_name("/ppt/slides/slide3.xml"), "ppt/slides/_rels/slide3.xml.rels");
    }

    #[test]
    fn rejects_non_zip_bytes() {
        let err = OfficePackage::from_bytes(Path::new("a.pdf"), b"%PDF-1.7".to_vec()).unwrap_err();
        match err {
            Office2MdError::NotAnOfficeDocument { magic, .. } => assert_eq!(&magic, b"%PDF"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn reads_relationships_and_external_targets() {
        let mut pkg = package(&[(
            "word/_rels/document.xml.rels",
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/image1.png"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.org" TargetMode="External"/>
</Relationships>"#,
        )]);
        let rels = pkg.relationships("word/document.xml").unwrap();
        assert_eq!(rels["rId1"].target, "word/media/image1.png");
        assert_eq!(rels["rId1"].kind, "image");
        assert!(rels["rId2"].external);
        assert_eq!(rels["rId2"].target, "https://example.org");
        assert!(pkg.relationships("word/missing.xml").unwrap().is_empty());
    }

    #[test]
    fn detects_kind_from_content_types_and_parts() {
        let mut word = package(&[(
            "[Content_Types].xml",
            r#"<Types><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#,
        )]);
        assert_eq!(word.detect_kind().unwrap(), DocumentKind::Word);

        let mut deck = package(&[("ppt/presentation.xml", "<p:presentation/>")]);
        assert_eq!(deck.detect_kind().unwrap(), DocumentKind::PowerPoint);

        let mut sheet = package(&[(
            "[Content_Types].xml",
            r#"<Types><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/></Types>"#,
        )]);
        assert!(matches!(
            sheet.detect_kind(),
            Err(Office2MdError::UnsupportedDocument { .. })
        ));
    }

    #[test]
    fn core_properties_are_optional() {
        let mut pkg = package(&[(
            "docProps/core.xml",
            r#"<cp:coreProperties><dc:title>Quarterly</dc:title><dc:creator>Ada</dc:creator><cp:keywords></cp:keywords></cp:coreProperties>"#,
        )]);
        let props = pkg.core_properties();
        assert_eq!(props.title.as_deref(), Some("Quarterly"));
        assert_eq!(props.author.as_deref(), Some("Ada"));
        assert_eq!(props.keywords, None);

        let mut empty = package(&[("word/document.xml", "<w:document/>")]);
        assert_eq!(empty.core_properties(), CoreProperties::default());
    }

    #[test]
    fn malformed_part_is_reported() {
        let mut pkg = package(&[("word/document.xml", "<w:document><w:body></w:document>")]);
        assert!(matches!(
            pkg.read_xml("word/document.xml"),
            Err(Office2MdError::MalformedXml { .. })
        ));
    }
}
