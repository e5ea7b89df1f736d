//! PresentationML (`.pptx`) walker.
//!
//! Slides are read in presentation order (`p:sldIdLst`), each into a flat
//! list of positioned [`Shape`]s plus the speaker notes. Ordering shapes for
//! reading and picking the slide title happen later, in
//! [`crate::pipeline::slides`].

use super::docx::alternate_branch;
use super::model::{
    Block, ImageRef, ImageTarget, Inline, Paragraph, ParagraphRole, Shape, ShapeContent,
    SlideSource, Table, TextRun,
};
use super::xml::XmlElement;
use super::{OfficePackage, Relationships};
use crate::error::Office2MdError;
use crate::math::{legacy, EquationKind, EquationNode};
use tracing::{debug, warn};

const DEFAULT_MAIN_PART: &str = "ppt/presentation.xml";

/// Walk every slide of the deck.
pub fn parse(pkg: &mut OfficePackage) -> Result<Vec<SlideSource>, Office2MdError> {
    let root_rels = pkg.relationships("")?;
    let main = root_rels
        .values()
        .find(|r| r.kind == "officeDocument" && !r.external)
        .map(|r| r.target.clone())
        .unwrap_or_else(|| DEFAULT_MAIN_PART.to_string());
    let presentation = pkg.require_xml(&main)?;
    let rels = pkg.relationships(&main)?;

    let slide_parts = slide_order(&presentation, &rels);
    debug!("Presentation has {} slides", slide_parts.len());

    let mut next_image = 0usize;
    let mut slides = Vec::with_capacity(slide_parts.len());
    for (i, part) in slide_parts.iter().enumerate() {
        let Some(xml) = pkg.read_xml(part)? else {
            warn!("Slide part '{}' is listed but missing, skipping", part);
            continue;
        };
        let slide_rels = pkg.relationships(part)?;

        let mut walker = SlideWalker {
            rels: &slide_rels,
            next_image,
        };
        let shapes = xml
            .path(&["p:cSld", "p:spTree"])
            .map(|tree| walker.shapes(tree))
            .unwrap_or_default();
        next_image = walker.next_image;

        let notes = match slide_rels.values().find(|r| r.kind == "notesSlide" && !r.external) {
            Some(rel) => {
                let target = rel.target.clone();
                let notes_rels = pkg.relationships(&target)?;
                match pkg.read_xml(&target)? {
                    Some(notes_xml) => {
                        let mut walker = SlideWalker {
                            rels: &notes_rels,
                            next_image,
                        };
                        let paragraphs = notes_paragraphs(&notes_xml, &mut walker);
                        next_image = walker.next_image;
                        paragraphs
                    }
                    None => Vec::new(),
                }
            }
            None => Vec::new(),
        };

        slides.push(SlideSource {
            index: i + 1,
            shapes,
            notes,
        });
    }
    Ok(slides)
}

/// Slide part names in presentation order.
fn slide_order(presentation: &XmlElement, rels: &Relationships) -> Vec<String> {
    let listed: Vec<String> = presentation
        .child("p:sldIdLst")
        .map(|list| {
            list.children_named("p:sldId")
                .filter_map(|s| s.attr("r:id"))
                .filter_map(|id| rels.get(id))
                .map(|r| r.target.clone())
                .collect()
        })
        .unwrap_or_default();
    if !listed.is_empty() {
        return listed;
    }

    // No slide list: order slide relationships by the number in the name.
    let mut parts: Vec<String> = rels
        .values()
        .filter(|r| r.kind == "slide")
        .map(|r| r.target.clone())
        .collect();
    parts.sort_by_key(|p| {
        let digits: String = p
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .chars()
            .filter(char::is_ascii_digit)
            .collect();
        (digits.parse::<u64>().unwrap_or(u64::MAX), p.clone())
    });
    parts
}

fn notes_paragraphs(notes: &XmlElement, walker: &mut SlideWalker<'_>) -> Vec<Paragraph> {
    let Some(tree) = notes.path(&["p:cSld", "p:spTree"]) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for shape in walker.shapes(tree) {
        if shape.placeholder.as_deref() != Some("body") {
            continue;
        }
        if let ShapeContent::Text(paragraphs) = shape.content {
            out.extend(paragraphs.into_iter().map(|mut p| {
                p.role = ParagraphRole::Body;
                p
            }));
        }
    }
    out
}

struct SlideWalker<'a> {
    rels: &'a Relationships,
    next_image: usize,
}

impl SlideWalker<'_> {
    fn shapes(&mut self, tree: &XmlElement) -> Vec<Shape> {
        let mut out = Vec::new();
        for el in tree.elements() {
            self.shape(el, &mut out);
        }
        out
    }

    fn shape(&mut self, el: &XmlElement, out: &mut Vec<Shape>) {
        match el.name.as_str() {
            "p:sp" => {
                let nv = el.child("p:nvSpPr");
                let placeholder = placeholder_type(nv);
                let paragraphs = el
                    .child("p:txBody")
                    .map(|body| self.text_body(body, placeholder.as_deref()))
                    .unwrap_or_default();
                out.push(Shape {
                    name: shape_name(nv),
                    placeholder,
                    offset: offset(el.path(&["p:spPr", "a:xfrm", "a:off"])),
                    content: ShapeContent::Text(paragraphs),
                });
            }
            "p:pic" => {
                let nv = el.child("p:nvPicPr");
                if let Some(image) = self.picture(el, nv) {
                    out.push(Shape {
                        name: shape_name(nv),
                        placeholder: placeholder_type(nv),
                        offset: offset(el.path(&["p:spPr", "a:xfrm", "a:off"])),
                        content: ShapeContent::Picture(image),
                    });
                }
            }
            "p:graphicFrame" => {
                let nv = el.child("p:nvGraphicFramePr");
                let Some(data) = el.path(&["a:graphic", "a:graphicData"]) else {
                    return;
                };
                let content = if let Some(tbl) = data.child("a:tbl") {
                    ShapeContent::Table(self.table(tbl))
                } else if let Some(ole) = data.find("p:oleObj") {
                    match self.ole_object(ole) {
                        Some(content) => content,
                        None => return,
                    }
                } else {
                    debug!("Skipping graphic frame '{}' (chart or diagram)", shape_name(nv));
                    return;
                };
                out.push(Shape {
                    name: shape_name(nv),
                    placeholder: placeholder_type(nv),
                    offset: offset(el.path(&["p:xfrm", "a:off"])),
                    content,
                });
            }
            "p:grpSp" => {
                let nv = el.child("p:nvGrpSpPr");
                let mut children = Vec::new();
                for child in el.elements() {
                    self.shape(child, &mut children);
                }
                out.push(Shape {
                    name: shape_name(nv),
                    placeholder: None,
                    offset: offset(el.path(&["p:grpSpPr", "a:xfrm", "a:off"])),
                    content: ShapeContent::Group(children),
                });
            }
            "mc:AlternateContent" => {
                if let Some(branch) = alternate_branch(el) {
                    for child in branch.elements() {
                        self.shape(child, out);
                    }
                }
            }
            _ => {}
        }
    }

    fn picture(&mut self, pic: &XmlElement, nv: Option<&XmlElement>) -> Option<ImageRef> {
        let blip = pic.path(&["p:blipFill", "a:blip"])?;
        let rid = blip.attr("r:embed").or_else(|| blip.attr("r:link"))?;
        let c_nv_pr = nv.and_then(|n| n.child("p:cNvPr"));
        let description = c_nv_pr
            .and_then(|c| c.attr("descr"))
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        let name = c_nv_pr.and_then(|c| c.attr("name")).map(str::to_string);
        Some(self.image(rid, description, name))
    }

    /// Embedded OLE object: equations become a display equation with the
    /// preview picture as fallback, anything else shows the preview.
    fn ole_object(&mut self, ole: &XmlElement) -> Option<ShapeContent> {
        let preview = ole
            .find("p:pic")
            .and_then(|pic| self.picture(pic, pic.child("p:nvPicPr")));
        let prog_id = ole.attr("progId").unwrap_or_default();
        if legacy::is_equation_prog_id(prog_id) {
            let equation = EquationNode {
                kind: EquationKind::LegacyObject,
                display: true,
                markup: ole.clone(),
                fallback: preview,
            };
            return Some(ShapeContent::Text(vec![Paragraph {
                role: ParagraphRole::Body,
                inlines: vec![Inline::Equation(equation)],
            }]));
        }
        preview.map(ShapeContent::Picture)
    }

    fn table(&mut self, tbl: &XmlElement) -> Table {
        let rows = tbl
            .children_named("a:tr")
            .map(|tr| {
                tr.children_named("a:tc")
                    .filter(|tc| tc.attr("hMerge").is_none() && tc.attr("vMerge").is_none())
                    .map(|tc| {
                        tc.child("a:txBody")
                            .map(|body| self.text_body(body, None))
                            .unwrap_or_default()
                            .into_iter()
                            .map(|mut p| {
                                p.role = ParagraphRole::Body;
                                Block::Paragraph(p)
                            })
                            .collect()
                    })
                    .collect()
            })
            .collect();
        Table { rows }
    }

    fn text_body(&mut self, body: &XmlElement, placeholder: Option<&str>) -> Vec<Paragraph> {
        let bulleted_by_default = matches!(placeholder, Some("body") | Some("obj"));
        body.children_named("a:p")
            .map(|p| self.paragraph(p, bulleted_by_default))
            .collect()
    }

    fn paragraph(&mut self, p: &XmlElement, bulleted_by_default: bool) -> Paragraph {
        let ppr = p.child("a:pPr");
        let level = ppr
            .and_then(|pr| pr.attr("lvl"))
            .and_then(|l| l.parse::<u8>().ok())
            .unwrap_or(0);
        let role = match ppr {
            Some(pr) if pr.child("a:buNone").is_some() => ParagraphRole::Body,
            Some(pr) if pr.child("a:buAutoNum").is_some() => ParagraphRole::ListItem {
                level,
                ordered: true,
            },
            Some(pr) if pr.child("a:buChar").is_some() => ParagraphRole::ListItem {
                level,
                ordered: false,
            },
            _ if bulleted_by_default => ParagraphRole::ListItem {
                level,
                ordered: false,
            },
            _ => ParagraphRole::Body,
        };

        let mut inlines = Vec::new();
        self.inlines(p, &mut inlines);
        if inlines.iter().all(|i| matches!(i, Inline::Equation(_) | Inline::LineBreak))
            && inlines.iter().filter(|i| matches!(i, Inline::Equation(_))).count() == 1
        {
            for inline in inlines.iter_mut() {
                if let Inline::Equation(eq) = inline {
                    eq.display = true;
                }
            }
        }
        Paragraph { role, inlines }
    }

    fn inlines(&mut self, container: &XmlElement, out: &mut Vec<Inline>) {
        for el in container.elements() {
            match el.name.as_str() {
                "a:r" | "a:fld" => {
                    let text = el.child("a:t").map(|t| t.text()).unwrap_or_default();
                    if text.is_empty() {
                        continue;
                    }
                    let rpr = el.child("a:rPr");
                    let run = Inline::Text(TextRun {
                        text,
                        bold: rpr.and_then(|r| r.attr("b")) == Some("1"),
                        italic: rpr.and_then(|r| r.attr("i")) == Some("1"),
                    });
                    let link = rpr
                        .and_then(|r| r.child("a:hlinkClick"))
                        .and_then(|h| h.attr("r:id"))
                        .and_then(|id| self.rels.get(id))
                        .filter(|rel| rel.external)
                        .map(|rel| rel.target.clone());
                    match link {
                        Some(target) => out.push(Inline::Link {
                            target,
                            children: vec![run],
                        }),
                        None => out.push(run),
                    }
                }
                "a:br" => out.push(Inline::LineBreak),
                "a14:m" => {
                    for math in el.elements() {
                        match math.name.as_str() {
                            "m:oMathPara" => {
                                for m in math.children_named("m:oMath") {
                                    out.push(Inline::Equation(native(m, true)));
                                }
                            }
                            "m:oMath" => out.push(Inline::Equation(native(math, false))),
                            _ => {}
                        }
                    }
                }
                "mc:AlternateContent" => {
                    if let Some(branch) = alternate_branch(el) {
                        self.inlines(branch, out);
                    }
                }
                _ => {}
            }
        }
    }

    fn image(&mut self, rid: &str, description: Option<String>, name: Option<String>) -> ImageRef {
        let target = match self.rels.get(rid) {
            Some(rel) if rel.external => ImageTarget::External(rel.target.clone()),
            Some(rel) => ImageTarget::Part(rel.target.clone()),
            None => ImageTarget::Unresolved(rid.to_string()),
        };
        let id = self.next_image;
        self.next_image += 1;
        ImageRef {
            id,
            target,
            description,
            name,
        }
    }
}

fn native(math: &XmlElement, display: bool) -> EquationNode {
    EquationNode {
        kind: EquationKind::Native,
        display,
        markup: math.clone(),
        fallback: None,
    }
}

fn shape_name(nv: Option<&XmlElement>) -> String {
    nv.and_then(|n| n.child("p:cNvPr"))
        .and_then(|c| c.attr("name"))
        .unwrap_or_default()
        .to_string()
}

/// Placeholder type; a `p:ph` without a type is a body placeholder.
fn placeholder_type(nv: Option<&XmlElement>) -> Option<String> {
    let ph = nv.and_then(|n| n.path(&["p:nvPr", "p:ph"]))?;
    Some(ph.attr("type").unwrap_or("body").to_string())
}

/// `(top, left)` from an `a:off` element.
fn offset(off: Option<&XmlElement>) -> Option<(i64, i64)> {
    let off = off?;
    let x = off.attr("x")?.parse().ok()?;
    let y = off.attr("y")?.parse().ok()?;
    Some((y, x))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::xml::parse;
    use crate::package::Relationship;

    fn walk(xml: &str) -> Vec<Shape> {
        let rels = Relationships::new();
        let mut walker = SlideWalker {
            rels: &rels,
            next_image: 0,
        };
        walker.shapes(&parse(xml).unwrap())
    }

    #[test]
    fn text_shape_with_title_placeholder() {
        let shapes = walk(
            r#"<p:spTree><p:sp><p:nvSpPr><p:cNvPr id="2" name="Title 1"/><p:cNvSpPr/><p:nvPr><p:ph type="title"/></p:nvPr></p:nvSpPr><p:spPr><a:xfrm><a:off x="100" y="200"/></a:xfrm></p:spPr><p:txBody><a:p><a:r><a:rPr b="1"/><a:t>Hello</a:t></a:r></a:p></p:txBody></p:sp></p:spTree>"#,
        );
        assert_eq!(shapes.len(), 1);
        assert_eq!(shapes[0].name, "Title 1");
        assert_eq!(shapes[0].placeholder.as_deref(), Some("title"));
        assert_eq!(shapes[0].offset, Some((200, 100)));
        match &shapes[0].content {
            ShapeContent::Text(ps) => {
                assert_eq!(ps[0].plain_text(), "Hello");
                assert_eq!(ps[0].role, ParagraphRole::Body);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn body_placeholder_paragraphs_are_bullets_unless_bu_none() {
        let shapes = walk(
            r#"<p:spTree><p:sp><p:nvSpPr><p:cNvPr id="3" name="Content"/><p:cNvSpPr/><p:nvPr><p:ph idx="1"/></p:nvPr></p:nvSpPr><p:txBody><a:p><a:r><a:t>one</a:t></a:r></a:p><a:p><a:pPr lvl="1"/><a:r><a:t>two</a:t></a:r></a:p><a:p><a:pPr><a:buNone/></a:pPr><a:r><a:t>plain</a:t></a:r></a:p></p:txBody></p:sp></p:spTree>"#,
        );
        let ShapeContent::Text(ps) = &shapes[0].content else {
            panic!("expected text");
        };
        assert_eq!(ps[0].role, ParagraphRole::ListItem { level: 0, ordered: false });
        assert_eq!(ps[1].role, ParagraphRole::ListItem { level: 1, ordered: false });
        assert_eq!(ps[2].role, ParagraphRole::Body);
    }

    #[test]
    fn pictures_groups_and_tables() {
        let shapes = walk(
            r#"<p:spTree>
<p:grpSp><p:nvGrpSpPr><p:cNvPr id="4" name="Group"/></p:nvGrpSpPr><p:grpSpPr/>
  <p:pic><p:nvPicPr><p:cNvPr id="5" name="Picture 4" descr="Logo"/></p:nvPicPr><p:blipFill><a:blip r:embed="rId2"/></p:blipFill><p:spPr/></p:pic>
</p:grpSp>
<p:graphicFrame><p:nvGraphicFramePr><p:cNvPr id="6" name="Table 5"/></p:nvGraphicFramePr><p:xfrm><a:off x="0" y="10"/></p:xfrm><a:graphic><a:graphicData><a:tbl><a:tr><a:tc><a:txBody><a:p><a:r><a:t>x</a:t></a:r></a:p></a:txBody></a:tc></a:tr></a:tbl></a:graphicData></a:graphic></p:graphicFrame>
<p:graphicFrame><p:nvGraphicFramePr><p:cNvPr id="7" name="Chart 6"/></p:nvGraphicFramePr><a:graphic><a:graphicData><c:chart r:id="rId9"/></a:graphicData></a:graphic></p:graphicFrame>
</p:spTree>"#,
        );
        assert_eq!(shapes.len(), 2);
        match &shapes[0].content {
            ShapeContent::Group(children) => match &children[0].content {
                ShapeContent::Picture(img) => {
                    assert_eq!(img.description.as_deref(), Some("Logo"));
                    assert_eq!(img.target, ImageTarget::Unresolved("rId2".into()));
                }
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(shapes[1].content, ShapeContent::Table(_)));
        assert_eq!(shapes[1].offset, Some((10, 0)));
    }

    #[test]
    fn math_in_alternate_content_is_read() {
        let shapes = walk(
            r#"<p:spTree><p:sp><p:nvSpPr><p:cNvPr id="2" name="TextBox"/></p:nvSpPr><p:txBody><a:p><mc:AlternateContent><mc:Choice Requires="a14"><a14:m><m:oMathPara><m:oMath><m:r><m:t>E=mc</m:t></m:r></m:oMath></m:oMathPara></a14:m></mc:Choice><mc:Fallback><a:r><a:t>fallback</a:t></a:r></mc:Fallback></mc:AlternateContent></a:p></p:txBody></p:sp></p:spTree>"#,
        );
        let ShapeContent::Text(ps) = &shapes[0].content else {
            panic!("expected text");
        };
        assert_eq!(ps[0].inlines.len(), 1);
        assert!(matches!(&ps[0].inlines[0], Inline::Equation(eq) if eq.display));
    }

    #[test]
    fn external_hyperlinks_wrap_runs() {
        let mut rels = Relationships::new();
        rels.insert(
            "rId3".into(),
            Relationship {
                id: "rId3".into(),
                kind: "hyperlink".into(),
                target: "https://example.org".into(),
                external: true,
            },
        );
        let mut walker = SlideWalker {
            rels: &rels,
            next_image: 0,
        };
        let p = parse(
            r#"<a:p><a:r><a:rPr><a:hlinkClick r:id="rId3"/></a:rPr><a:t>site</a:t></a:r></a:p>"#,
        )
        .unwrap();
        let para = walker.paragraph(&p, false);
        assert!(matches!(&para.inlines[0], Inline::Link { target, .. } if target == "https://example.org"));
    }

    #[test]
    fn slide_order_follows_slide_id_list() {
        let mut rels = Relationships::new();
        for (id, target) in [("rId2", "ppt/slides/slide2.xml"), ("rId3", "ppt/slides/slide1.xml")] {
            rels.insert(
                id.into(),
                Relationship {
                    id: id.into(),
                    kind: "slide".into(),
                    target: target.into(),
                    external: false,
                },
            );
        }
        let pres = parse(
            r#"<p:presentation><p:sldIdLst><p:sldId id="256" r:id="rId2"/><p:sldId id="257" r:id="rId3"/></p:sldIdLst></p:presentation>"#,
        )
        .unwrap();
        assert_eq!(
            slide_order(&pres, &rels),
            vec!["ppt/slides/slide2.xml", "ppt/slides/slide1.xml"]
        );

        let bare = parse("<p:presentation/>").unwrap();
        assert_eq!(
            slide_order(&bare, &rels),
            vec!["ppt/slides/slide1.xml", "ppt/slides/slide2.xml"]
        );
    }
}
