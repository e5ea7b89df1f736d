//! Typed document model shared by the Word and PowerPoint walkers.
//!
//! The walkers in [`super::docx`] and [`super::pptx`] turn XML parts into
//! these types; everything downstream (image planning, HTML emission, slide
//! reconstruction) works on the model and never touches raw XML again,
//! except for equation markup which is carried verbatim for the translator.

use crate::math::EquationNode;

/// Where an image's bytes live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageTarget {
    /// A part inside the package, e.g. `word/media/image1.png`.
    Part(String),
    /// A linked picture outside the package (`TargetMode="External"`).
    External(String),
    /// The relationship id did not resolve.
    Unresolved(String),
}

/// A reference to an embedded picture.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRef {
    /// Unique within one document; keys the extracted asset.
    pub id: usize,
    pub target: ImageTarget,
    /// Author-supplied description (`descr`, `alt`, `o:title`).
    pub description: Option<String>,
    /// Shape or picture name (`Picture 3`).
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inline {
    Text(TextRun),
    LineBreak,
    Link { target: String, children: Vec<Inline> },
    Image(ImageRef),
    Equation(EquationNode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParagraphRole {
    #[default]
    Body,
    /// Heading level 1–6.
    Heading(u8),
    /// List item, `level` is 0-based nesting depth.
    ListItem { level: u8, ordered: bool },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Paragraph {
    pub role: ParagraphRole,
    pub inlines: Vec<Inline>,
}

impl Paragraph {
    /// Visible text of the paragraph, equations and images excluded.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        collect_plain(&self.inlines, &mut out);
        out
    }

    /// No text, no image, no equation.
    pub fn is_empty(&self) -> bool {
        self.inlines.iter().all(|i| match i {
            Inline::Text(run) => run.text.trim().is_empty(),
            Inline::LineBreak => true,
            Inline::Link { children, .. } => children.is_empty(),
            Inline::Image(_) | Inline::Equation(_) => false,
        })
    }
}

fn collect_plain(inlines: &[Inline], out: &mut String) {
    for inline in inlines {
        match inline {
            Inline::Text(run) => out.push_str(&run.text),
            Inline::LineBreak => out.push(' '),
            Inline::Link { children, .. } => collect_plain(children, out),
            Inline::Image(_) | Inline::Equation(_) => {}
        }
    }
}

/// Rows of cells; each cell holds its own blocks.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub rows: Vec<Vec<Vec<Block>>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Paragraph(Paragraph),
    Table(Table),
    /// A free-standing picture (PowerPoint picture shapes).
    Figure(ImageRef),
}

/// A positioned shape on a slide.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub name: String,
    /// Placeholder type (`title`, `ctrTitle`, `body`, ...), when the shape is one.
    pub placeholder: Option<String>,
    /// `(top, left)` offset in EMU.
    pub offset: Option<(i64, i64)>,
    pub content: ShapeContent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ShapeContent {
    Text(Vec<Paragraph>),
    Table(Table),
    Picture(ImageRef),
    Group(Vec<Shape>),
}

/// One slide as read from the package, in source order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SlideSource {
    /// 1-based position in the presentation.
    pub index: usize,
    pub shapes: Vec<Shape>,
    pub notes: Vec<Paragraph>,
}

/// The parsed body of a package.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Word(Vec<Block>),
    Presentation(Vec<SlideSource>),
}

/// Element counts used by `inspect`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentCounts {
    pub paragraphs: usize,
    pub tables: usize,
    pub images: usize,
    pub equations: usize,
}

impl Document {
    pub fn counts(&self) -> ContentCounts {
        let mut counts = ContentCounts::default();
        match self {
            Document::Word(blocks) => count_blocks(blocks, &mut counts),
            Document::Presentation(slides) => {
                for slide in slides {
                    count_shapes(&slide.shapes, &mut counts);
                }
            }
        }
        counts
    }
}

fn count_blocks(blocks: &[Block], counts: &mut ContentCounts) {
    for block in blocks {
        match block {
            Block::Paragraph(p) => count_paragraph(p, counts),
            Block::Table(t) => count_table(t, counts),
            Block::Figure(_) => counts.images += 1,
        }
    }
}

fn count_table(table: &Table, counts: &mut ContentCounts) {
    counts.tables += 1;
    for cell in table.rows.iter().flatten() {
        count_blocks(cell, counts);
    }
}

fn count_paragraph(p: &Paragraph, counts: &mut ContentCounts) {
    counts.paragraphs += 1;
    count_inlines(&p.inlines, counts);
}

fn count_inlines(inlines: &[Inline], counts: &mut ContentCounts) {
    for inline in inlines {
        match inline {
            Inline::Image(_) => counts.images += 1,
            Inline::Equation(_) => counts.equations += 1,
            Inline::Link { children, .. } => count_inlines(children, counts),
            Inline::Text(_) | Inline::LineBreak => {}
        }
    }
}

fn count_shapes(shapes: &[Shape], counts: &mut ContentCounts) {
    for shape in shapes {
        match &shape.content {
            ShapeContent::Text(paragraphs) => {
                for p in paragraphs {
                    count_paragraph(p, counts);
                }
            }
            ShapeContent::Table(t) => count_table(t, counts),
            ShapeContent::Picture(_) => counts.images += 1,
            ShapeContent::Group(children) => count_shapes(children, counts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Inline {
        Inline::Text(TextRun {
            text: s.into(),
            bold: false,
            italic: false,
        })
    }

    #[test]
    fn plain_text_descends_into_links() {
        let p = Paragraph {
            role: ParagraphRole::Body,
            inlines: vec![
                text("see "),
                Inline::Link {
                    target: "https://example.org".into(),
                    children: vec![text("here")],
                },
            ],
        };
        assert_eq!(p.plain_text(), "see here");
        assert!(!p.is_empty());
    }

    #[test]
    fn whitespace_paragraph_is_empty() {
        let p = Paragraph {
            role: ParagraphRole::Body,
            inlines: vec![text("  "), Inline::LineBreak],
        };
        assert!(p.is_empty());
    }

    #[test]
    fn counts_walk_tables_and_groups() {
        let image = ImageRef {
            id: 0,
            target: ImageTarget::Part("ppt/media/image1.png".into()),
            description: None,
            name: None,
        };
        let doc = Document::Presentation(vec![SlideSource {
            index: 1,
            shapes: vec![Shape {
                name: "Group 1".into(),
                placeholder: None,
                offset: None,
                content: ShapeContent::Group(vec![
                    Shape {
                        name: "Picture 2".into(),
                        placeholder: None,
                        offset: None,
                        content: ShapeContent::Picture(image),
                    },
                    Shape {
                        name: "Table 3".into(),
                        placeholder: None,
                        offset: None,
                        content: ShapeContent::Table(Table {
                            rows: vec![vec![vec![Block::Paragraph(Paragraph {
                                role: ParagraphRole::Body,
                                inlines: vec![text("cell")],
                            })]]],
                        }),
                    },
                ]),
            }],
            notes: vec![],
        }]);
        let counts = doc.counts();
        assert_eq!(counts.images, 1);
        assert_eq!(counts.tables, 1);
        assert_eq!(counts.paragraphs, 1);
    }
}
