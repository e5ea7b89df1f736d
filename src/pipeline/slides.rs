//! Slide reconstruction: positioned shapes in, ordered slide records out.
//!
//! PowerPoint stores shapes in z-order, which has little to do with reading
//! order. Each slide is flattened into blocks sorted top-to-bottom then
//! left-to-right; the title placeholder is lifted out into the record's
//! `title` so the renderer can put it in the slide heading.

use crate::package::model::{Block, Paragraph, Shape, ShapeContent, SlideSource};

/// One slide ready for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct SlideRecord {
    /// 1-based, equal to the slide's position in the deck.
    pub index: usize,
    /// Empty when the slide has no titled placeholder.
    pub title: String,
    pub blocks: Vec<Block>,
    pub notes: Vec<Block>,
}

/// Build one record per slide, in source order.
pub fn reconstruct(slides: &[SlideSource], include_notes: bool) -> Vec<SlideRecord> {
    slides
        .iter()
        .enumerate()
        .map(|(i, slide)| {
            let title_shape = find_title(&slide.shapes);
            let title = title_shape.map(shape_text).unwrap_or_default();

            let mut blocks = Vec::new();
            flatten(&slide.shapes, title_shape, &mut blocks);

            let notes = if include_notes {
                slide
                    .notes
                    .iter()
                    .filter(|p| !p.is_empty())
                    .cloned()
                    .map(Block::Paragraph)
                    .collect()
            } else {
                Vec::new()
            };

            SlideRecord {
                index: i + 1,
                title,
                blocks,
                notes,
            }
        })
        .collect()
}

fn is_title_placeholder(shape: &Shape) -> bool {
    matches!(shape.placeholder.as_deref(), Some("title") | Some("ctrTitle"))
}

/// First title placeholder with visible text, groups searched depth-first.
fn find_title(shapes: &[Shape]) -> Option<&Shape> {
    for shape in shapes {
        if is_title_placeholder(shape) && !shape_text(shape).is_empty() {
            return Some(shape);
        }
        if let ShapeContent::Group(children) = &shape.content {
            if let Some(found) = find_title(children) {
                return Some(found);
            }
        }
    }
    None
}

/// Single-line text of a text shape. Soft returns and vertical tabs that
/// PowerPoint puts in long titles become spaces.
fn shape_text(shape: &Shape) -> String {
    let ShapeContent::Text(paragraphs) = &shape.content else {
        return String::new();
    };
    let joined = paragraphs
        .iter()
        .map(Paragraph::plain_text)
        .collect::<Vec<_>>()
        .join(" ");
    joined
        .replace('\u{b}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn flatten(shapes: &[Shape], skip: Option<&Shape>, out: &mut Vec<Block>) {
    let mut ordered: Vec<&Shape> = shapes.iter().collect();
    // `None < Some`, so shapes without an offset lead; the sort is stable.
    ordered.sort_by_key(|s| s.offset);

    for shape in ordered {
        if skip.is_some_and(|t| std::ptr::eq(t, shape)) {
            continue;
        }
        match &shape.content {
            ShapeContent::Text(paragraphs) => out.extend(
                paragraphs
                    .iter()
                    .filter(|p| !p.is_empty())
                    .cloned()
                    .map(Block::Paragraph),
            ),
            ShapeContent::Table(table) => out.push(Block::Table(table.clone())),
            ShapeContent::Picture(image) => out.push(Block::Figure(image.clone())),
            ShapeContent::Group(children) => flatten(children, skip, out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::model::{ImageRef, ImageTarget, Inline, ParagraphRole, TextRun};

    fn para(text: &str) -> Paragraph {
        Paragraph {
            role: ParagraphRole::Body,
            inlines: vec![Inline::Text(TextRun {
                text: text.into(),
                bold: false,
                italic: false,
            })],
        }
    }

    fn text_shape(name: &str, ph: Option<&str>, offset: Option<(i64, i64)>, text: &str) -> Shape {
        Shape {
            name: name.into(),
            placeholder: ph.map(String::from),
            offset,
            content: ShapeContent::Text(vec![para(text)]),
        }
    }

    fn texts(blocks: &[Block]) -> Vec<String> {
        blocks
            .iter()
            .map(|b| match b {
                Block::Paragraph(p) => p.plain_text(),
                Block::Table(_) => "<table>".into(),
                Block::Figure(_) => "<figure>".into(),
            })
            .collect()
    }

    #[test]
    fn title_lifted_and_body_sorted() {
        let slide = SlideSource {
            index: 1,
            shapes: vec![
                text_shape("Bottom", None, Some((5000, 0)), "third"),
                text_shape("Title 1", Some("title"), Some((0, 0)), "Quarterly\u{b}Results"),
                text_shape("Right", None, Some((1000, 9000)), "second"),
                text_shape("Left", None, Some((1000, 10)), "first"),
            ],
            notes: vec![],
        };
        let records = reconstruct(&[slide], true);
        assert_eq!(records[0].index, 1);
        assert_eq!(records[0].title, "Quarterly Results");
        assert_eq!(texts(&records[0].blocks), vec!["first", "second", "third"]);
    }

    #[test]
    fn missing_offsets_sort_first_and_keep_order() {
        let slide = SlideSource {
            index: 1,
            shapes: vec![
                text_shape("A", None, Some((10, 10)), "placed"),
                text_shape("B", None, None, "floating 1"),
                text_shape("C", None, None, "floating 2"),
            ],
            notes: vec![],
        };
        let records = reconstruct(&[slide], true);
        assert_eq!(records[0].title, "");
        assert_eq!(
            texts(&records[0].blocks),
            vec!["floating 1", "floating 2", "placed"]
        );
    }

    #[test]
    fn empty_title_placeholder_is_not_a_title() {
        let slide = SlideSource {
            index: 1,
            shapes: vec![
                text_shape("Title 1", Some("ctrTitle"), Some((0, 0)), "   "),
                text_shape("Body", Some("body"), Some((10, 0)), "content"),
            ],
            notes: vec![],
        };
        let records = reconstruct(&[slide], true);
        assert_eq!(records[0].title, "");
        assert_eq!(texts(&records[0].blocks), vec!["content"]);
    }

    #[test]
    fn groups_recurse_with_their_own_ordering() {
        let picture = Shape {
            name: "Picture 4".into(),
            placeholder: None,
            offset: Some((0, 0)),
            content: ShapeContent::Picture(ImageRef {
                id: 0,
                target: ImageTarget::Part("ppt/media/image1.png".into()),
                description: None,
                name: None,
            }),
        };
        let group = Shape {
            name: "Group 2".into(),
            placeholder: None,
            offset: Some((100, 0)),
            content: ShapeContent::Group(vec![
                text_shape("Inner late", None, Some((900, 0)), "inner b"),
                text_shape("Inner early", None, Some((200, 0)), "inner a"),
            ]),
        };
        let slide = SlideSource {
            index: 1,
            shapes: vec![group, picture, text_shape("Last", None, Some((5000, 0)), "end")],
            notes: vec![],
        };
        let records = reconstruct(&[slide], true);
        assert_eq!(
            texts(&records[0].blocks),
            vec!["<figure>", "inner a", "inner b", "end"]
        );
    }

    #[test]
    fn notes_respect_flag_and_indices_follow_source_order() {
        let slides = vec![
            SlideSource {
                index: 1,
                shapes: vec![],
                notes: vec![para("Say hello"), para(" ")],
            },
            SlideSource {
                index: 2,
                shapes: vec![],
                notes: vec![],
            },
        ];
        let with = reconstruct(&slides, true);
        assert_eq!(with.len(), 2);
        assert_eq!(with[1].index, 2);
        assert_eq!(texts(&with[0].notes), vec!["Say hello"]);
        assert!(reconstruct(&slides, false)[0].notes.is_empty());
    }

    #[test]
    fn zero_slides_is_empty() {
        assert!(reconstruct(&[], true).is_empty());
    }
}
