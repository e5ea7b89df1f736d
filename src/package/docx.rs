//! WordprocessingML (`.docx`) walker.
//!
//! Reads `word/document.xml` together with its styles, numbering and
//! relationships, and produces the block list of the document model.
//! Headings come from paragraph styles, list items from numbering
//! definitions, equations from `m:oMath` / `m:oMathPara` and legacy
//! equation-editor objects.

use super::model::{Block, ImageRef, ImageTarget, Inline, Paragraph, ParagraphRole, Table, TextRun};
use super::xml::{is_on, XmlElement};
use super::{OfficePackage, Relationships};
use crate::error::Office2MdError;
use crate::math::{legacy, EquationKind, EquationNode};
use std::collections::HashMap;
use tracing::debug;

const DEFAULT_MAIN_PART: &str = "word/document.xml";

/// Walk the main document part into blocks.
pub fn parse(pkg: &mut OfficePackage) -> Result<Vec<Block>, Office2MdError> {
    let main = main_part(pkg)?;
    let root = pkg.require_xml(&main)?;
    let rels = pkg.relationships(&main)?;
    let styles = match pkg.read_xml("word/styles.xml")? {
        Some(xml) => StyleMap::from_xml(&xml),
        None => StyleMap::default(),
    };
    let numbering = match pkg.read_xml("word/numbering.xml")? {
        Some(xml) => Numbering::from_xml(&xml),
        None => Numbering::default(),
    };

    let body = root
        .child("w:body")
        .ok_or_else(|| Office2MdError::MalformedXml {
            part: main.clone(),
            detail: "document has no w:body".into(),
        })?;

    let mut walker = WordWalker {
        rels,
        styles,
        numbering,
        next_image: 0,
    };
    let blocks = walker.blocks(body);
    debug!("Word body: {} top-level blocks", blocks.len());
    Ok(blocks)
}

/// The officeDocument target from `_rels/.rels`, or the conventional name.
fn main_part(pkg: &mut OfficePackage) -> Result<String, Office2MdError> {
    let root_rels = pkg.relationships("")?;
    Ok(root_rels
        .values()
        .find(|r| r.kind == "officeDocument" && !r.external)
        .map(|r| r.target.clone())
        .unwrap_or_else(|| DEFAULT_MAIN_PART.to_string()))
}

// ── Styles ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct StyleDef {
    name: String,
    based_on: Option<String>,
}

#[derive(Debug, Default)]
struct StyleMap {
    styles: HashMap<String, StyleDef>,
}

impl StyleMap {
    fn from_xml(root: &XmlElement) -> Self {
        let mut styles = HashMap::new();
        for style in root.children_named("w:style") {
            if style.attr("w:type") != Some("paragraph") {
                continue;
            }
            let Some(id) = style.attr("w:styleId") else {
                continue;
            };
            let name = style
                .child("w:name")
                .and_then(|n| n.attr("w:val"))
                .unwrap_or(id)
                .to_string();
            let based_on = style
                .child("w:basedOn")
                .and_then(|b| b.attr("w:val"))
                .map(str::to_string);
            styles.insert(id.to_string(), StyleDef { name, based_on });
        }
        Self { styles }
    }

    /// Role implied by a style, following `w:basedOn` a few levels up.
    fn role(&self, style_id: &str) -> Option<ParagraphRole> {
        let mut current = style_id;
        for _ in 0..8 {
            let name = match self.styles.get(current) {
                Some(def) => def.name.as_str(),
                None => current,
            };
            if let Some(role) = role_from_style_name(name) {
                return Some(role);
            }
            current = self.styles.get(current)?.based_on.as_deref()?;
        }
        None
    }
}

fn role_from_style_name(name: &str) -> Option<ParagraphRole> {
    let lower = name.to_ascii_lowercase();
    if lower == "title" {
        return Some(ParagraphRole::Heading(1));
    }
    if let Some(rest) = lower.strip_prefix("heading") {
        let level: u8 = rest.trim().parse().ok()?;
        return Some(ParagraphRole::Heading(level.clamp(1, 6)));
    }
    for (prefix, ordered) in [("list bullet", false), ("list number", true)] {
        if let Some(rest) = lower.strip_prefix(prefix) {
            let level = rest.trim().parse::<u8>().unwrap_or(1).saturating_sub(1);
            return Some(ParagraphRole::ListItem { level, ordered });
        }
    }
    None
}

// ── Numbering ─────────────────────────────────────────────────────────────

/// numId → per-level "is ordered" flags.
#[derive(Debug, Default)]
struct Numbering {
    lists: HashMap<String, HashMap<u8, bool>>,
}

impl Numbering {
    fn from_xml(root: &XmlElement) -> Self {
        let mut abstracts: HashMap<String, HashMap<u8, bool>> = HashMap::new();
        for abs in root.children_named("w:abstractNum") {
            let Some(id) = abs.attr("w:abstractNumId") else {
                continue;
            };
            let levels = abs
                .children_named("w:lvl")
                .filter_map(|lvl| {
                    let ilvl = lvl.attr("w:ilvl")?.parse::<u8>().ok()?;
                    let fmt = lvl
                        .child("w:numFmt")
                        .and_then(|f| f.attr("w:val"))
                        .unwrap_or("bullet");
                    Some((ilvl, !matches!(fmt, "bullet" | "none")))
                })
                .collect();
            abstracts.insert(id.to_string(), levels);
        }

        let mut lists = HashMap::new();
        for num in root.children_named("w:num") {
            let Some(num_id) = num.attr("w:numId") else {
                continue;
            };
            let abs_id = num.child("w:abstractNumId").and_then(|a| a.attr("w:val"));
            if let Some(levels) = abs_id.and_then(|a| abstracts.get(a)) {
                lists.insert(num_id.to_string(), levels.clone());
            }
        }
        Self { lists }
    }

    fn ordered(&self, num_id: &str, level: u8) -> bool {
        self.lists
            .get(num_id)
            .and_then(|levels| levels.get(&level))
            .copied()
            .unwrap_or(false)
    }
}

// ── Body walker ───────────────────────────────────────────────────────────

struct WordWalker {
    rels: Relationships,
    styles: StyleMap,
    numbering: Numbering,
    next_image: usize,
}

impl WordWalker {
    fn blocks(&mut self, container: &XmlElement) -> Vec<Block> {
        let mut out = Vec::new();
        self.collect_blocks(container, &mut out);
        out
    }

    fn collect_blocks(&mut self, container: &XmlElement, out: &mut Vec<Block>) {
        for el in container.elements() {
            match el.name.as_str() {
                "w:p" => out.push(Block::Paragraph(self.paragraph(el))),
                "w:tbl" => out.push(Block::Table(self.table(el))),
                "w:sdt" => {
                    if let Some(content) = el.child("w:sdtContent") {
                        self.collect_blocks(content, out);
                    }
                }
                "w:customXml" | "w:ins" => self.collect_blocks(el, out),
                "mc:AlternateContent" => {
                    if let Some(branch) = alternate_branch(el) {
                        self.collect_blocks(branch, out);
                    }
                }
                _ => {}
            }
        }
    }

    fn table(&mut self, tbl: &XmlElement) -> Table {
        let rows = tbl
            .children_named("w:tr")
            .map(|tr| tr.children_named("w:tc").map(|tc| self.blocks(tc)).collect())
            .collect();
        Table { rows }
    }

    fn paragraph(&mut self, p: &XmlElement) -> Paragraph {
        let role = self.paragraph_role(p);
        let mut inlines = Vec::new();
        self.inlines(p, &mut inlines);
        promote_lone_equation(&mut inlines);
        Paragraph { role, inlines }
    }

    fn paragraph_role(&self, p: &XmlElement) -> ParagraphRole {
        let Some(ppr) = p.child("w:pPr") else {
            return ParagraphRole::Body;
        };
        let style_role = ppr
            .child("w:pStyle")
            .and_then(|s| s.attr("w:val"))
            .and_then(|id| self.styles.role(id));
        if let Some(ParagraphRole::Heading(level)) = style_role {
            return ParagraphRole::Heading(level);
        }
        if let Some(num_pr) = ppr.child("w:numPr") {
            let num_id = num_pr.child("w:numId").and_then(|n| n.attr("w:val"));
            let level = num_pr
                .child("w:ilvl")
                .and_then(|l| l.attr("w:val"))
                .and_then(|v| v.parse::<u8>().ok())
                .unwrap_or(0);
            if let Some(num_id) = num_id.filter(|id| *id != "0") {
                return ParagraphRole::ListItem {
                    level,
                    ordered: self.numbering.ordered(num_id, level),
                };
            }
        }
        style_role.unwrap_or_default()
    }

    fn inlines(&mut self, container: &XmlElement, out: &mut Vec<Inline>) {
        for el in container.elements() {
            match el.name.as_str() {
                "w:r" => self.run(el, out),
                "w:hyperlink" => {
                    let mut children = Vec::new();
                    self.inlines(el, &mut children);
                    let target = el
                        .attr("r:id")
                        .and_then(|id| self.rels.get(id))
                        .map(|r| r.target.clone())
                        .or_else(|| el.attr("w:anchor").map(|a| format!("#{a}")));
                    match target {
                        Some(target) => out.push(Inline::Link { target, children }),
                        None => out.extend(children),
                    }
                }
                "w:ins" | "w:smartTag" | "w:customXml" | "w:fldSimple" | "w:bdo" | "w:dir" => {
                    self.inlines(el, out)
                }
                "w:sdt" => {
                    if let Some(content) = el.child("w:sdtContent") {
                        self.inlines(content, out);
                    }
                }
                "m:oMath" => out.push(Inline::Equation(native_equation(el, false))),
                "m:oMathPara" => {
                    for math in el.children_named("m:oMath") {
                        out.push(Inline::Equation(native_equation(math, true)));
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

    fn run(&mut self, r: &XmlElement, out: &mut Vec<Inline>) {
        let rpr = r.child("w:rPr");
        let bold = is_on(rpr.and_then(|p| p.child("w:b")));
        let italic = is_on(rpr.and_then(|p| p.child("w:i")));
        let mut text = String::new();

        let flush = |text: &mut String, out: &mut Vec<Inline>| {
            if !text.is_empty() {
                out.push(Inline::Text(TextRun {
                    text: std::mem::take(text),
                    bold,
                    italic,
                }));
            }
        };

        for el in r.elements() {
            match el.name.as_str() {
                "w:t" => text.push_str(&el.text()),
                "w:tab" | "w:ptab" => text.push(' '),
                "w:noBreakHyphen" => text.push('-'),
                "w:br" if el.attr("w:type") == Some("page") => {}
                "w:br" | "w:cr" => {
                    flush(&mut text, out);
                    out.push(Inline::LineBreak);
                }
                "w:drawing" => {
                    flush(&mut text, out);
                    if let Some(image) = self.drawing(el) {
                        out.push(Inline::Image(image));
                    }
                }
                "w:pict" => {
                    flush(&mut text, out);
                    if let Some(image) = self.vml_image(el) {
                        out.push(Inline::Image(image));
                    }
                }
                "w:object" => {
                    flush(&mut text, out);
                    if let Some(inline) = self.object(el) {
                        out.push(inline);
                    }
                }
                "mc:AlternateContent" => {
                    flush(&mut text, out);
                    if let Some(branch) = alternate_branch(el) {
                        // The branch holds run content directly.
                        let mut wrapper = XmlElement::new("w:r");
                        wrapper.attrs = r.attrs.clone();
                        wrapper.children = branch.children.clone();
                        if let Some(rpr) = rpr {
                            wrapper
                                .children
                                .insert(0, super::xml::XmlNode::Element(rpr.clone()));
                        }
                        self.run(&wrapper, out);
                    }
                }
                _ => {}
            }
        }
        flush(&mut text, out);
    }

    /// DrawingML picture (`w:drawing/wp:inline|wp:anchor`).
    fn drawing(&mut self, drawing: &XmlElement) -> Option<ImageRef> {
        let blip = drawing.find("a:blip")?;
        let rid = blip.attr("r:embed").or_else(|| blip.attr("r:link"))?;
        let doc_pr = drawing.find("wp:docPr");
        let description = doc_pr.and_then(|d| d.attr("descr")).map(str::to_string);
        let name = doc_pr.and_then(|d| d.attr("name")).map(str::to_string);
        Some(self.image(rid, description, name))
    }

    /// VML picture (`w:pict/v:shape/v:imagedata`).
    fn vml_image(&mut self, container: &XmlElement) -> Option<ImageRef> {
        let data = container.find("v:imagedata")?;
        let rid = data.attr("r:id").or_else(|| data.attr("r:pict"))?;
        let shape = container.find("v:shape");
        let description = shape
            .and_then(|s| s.attr("alt"))
            .or_else(|| data.attr("o:title"))
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let name = shape.and_then(|s| s.attr("id")).map(str::to_string);
        Some(self.image(rid, description, name))
    }

    /// Embedded OLE object: legacy equations keep their markup for the
    /// translator, anything else shows its preview picture.
    fn object(&mut self, obj: &XmlElement) -> Option<Inline> {
        let prog_id = obj
            .find("o:OLEObject")
            .and_then(|o| o.attr("ProgID"))
            .unwrap_or_default();
        let preview = self.vml_image(obj);
        if legacy::is_equation_prog_id(prog_id) {
            return Some(Inline::Equation(EquationNode {
                kind: EquationKind::LegacyObject,
                display: false,
                markup: obj.clone(),
                fallback: preview,
            }));
        }
        preview.map(Inline::Image)
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

fn native_equation(math: &XmlElement, display: bool) -> EquationNode {
    EquationNode {
        kind: EquationKind::Native,
        display,
        markup: math.clone(),
        fallback: None,
    }
}

/// `mc:Choice` when present (we understand the newer markup), else `mc:Fallback`.
pub(crate) fn alternate_branch(alt: &XmlElement) -> Option<&XmlElement> {
    alt.child("mc:Choice").or_else(|| alt.child("mc:Fallback"))
}

/// An equation that is the only visible content of its paragraph is a
/// display equation.
fn promote_lone_equation(inlines: &mut [Inline]) {
    let mut equations = 0;
    for inline in inlines.iter() {
        match inline {
            Inline::Equation(_) => equations += 1,
            Inline::Text(run) if run.text.trim().is_empty() => {}
            Inline::LineBreak => {}
            _ => return,
        }
    }
    if equations != 1 {
        return;
    }
    for inline in inlines.iter_mut() {
        if let Inline::Equation(eq) = inline {
            eq.display = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::xml::parse;

    fn walker() -> WordWalker {
        WordWalker {
            rels: Relationships::new(),
            styles: StyleMap::default(),
            numbering: Numbering::default(),
            next_image: 0,
        }
    }

    fn para(xml: &str) -> Paragraph {
        walker().paragraph(&parse(xml).unwrap())
    }

    #[test]
    fn style_names_map_to_roles() {
        assert_eq!(role_from_style_name("heading 2"), Some(ParagraphRole::Heading(2)));
        assert_eq!(role_from_style_name("Title"), Some(ParagraphRole::Heading(1)));
        assert_eq!(role_from_style_name("Heading 9"), Some(ParagraphRole::Heading(6)));
        assert_eq!(
            role_from_style_name("List Number 2"),
            Some(ParagraphRole::ListItem { level: 1, ordered: true })
        );
        assert_eq!(role_from_style_name("Normal"), None);
    }

    #[test]
    fn styles_follow_based_on() {
        let styles = StyleMap::from_xml(
            &parse(
                r#"<w:styles>
<w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/></w:style>
<w:style w:type="paragraph" w:styleId="MyHead"><w:name w:val="My Head"/><w:basedOn w:val="Heading1"/></w:style>
</w:styles>"#,
            )
            .unwrap(),
        );
        assert_eq!(styles.role("MyHead"), Some(ParagraphRole::Heading(1)));
        assert_eq!(styles.role("Unknown"), None);
    }

    #[test]
    fn numbering_formats_decide_ordering() {
        let numbering = Numbering::from_xml(
            &parse(
                r#"<w:numbering>
<w:abstractNum w:abstractNumId="0"><w:lvl w:ilvl="0"><w:numFmt w:val="decimal"/></w:lvl><w:lvl w:ilvl="1"><w:numFmt w:val="bullet"/></w:lvl></w:abstractNum>
<w:num w:numId="3"><w:abstractNumId w:val="0"/></w:num>
</w:numbering>"#,
            )
            .unwrap(),
        );
        assert!(numbering.ordered("3", 0));
        assert!(!numbering.ordered("3", 1));
        assert!(!numbering.ordered("9", 0));
    }

    #[test]
    fn runs_keep_formatting_and_breaks() {
        let p = para(
            r#"<w:p><w:r><w:rPr><w:b/></w:rPr><w:t>Bold</w:t></w:r><w:r><w:t xml:space="preserve"> plain</w:t><w:br/><w:t>next</w:t></w:r></w:p>"#,
        );
        assert_eq!(p.inlines.len(), 4);
        match &p.inlines[0] {
            Inline::Text(run) => assert!(run.bold && run.text == "Bold"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(p.inlines[2], Inline::LineBreak);
        assert_eq!(p.plain_text(), "Bold plain next");
    }

    #[test]
    fn lone_equation_becomes_display() {
        let p = para(r#"<w:p><m:oMath><m:r><m:t>x</m:t></m:r></m:oMath></w:p>"#);
        match &p.inlines[0] {
            Inline::Equation(eq) => assert!(eq.display),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn equation_inside_text_stays_inline() {
        let p = para(
            r#"<w:p><w:r><w:t>where </w:t></w:r><m:oMath><m:r><m:t>x</m:t></m:r></m:oMath><w:r><w:t> is real</w:t></w:r></w:p>"#,
        );
        match &p.inlines[1] {
            Inline::Equation(eq) => assert!(!eq.display),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn math_paragraph_yields_display_equations() {
        let p = para(
            r#"<w:p><m:oMathPara><m:oMath><m:r><m:t>a</m:t></m:r></m:oMath><m:oMath><m:r><m:t>b</m:t></m:r></m:oMath></m:oMathPara></w:p>"#,
        );
        assert_eq!(p.inlines.len(), 2);
        assert!(p
            .inlines
            .iter()
            .all(|i| matches!(i, Inline::Equation(eq) if eq.display)));
    }

    #[test]
    fn drawing_images_get_sequential_ids() {
        let mut w = walker();
        w.rels.insert(
            "rId7".into(),
            super::super::Relationship {
                id: "rId7".into(),
                kind: "image".into(),
                target: "word/media/image1.png".into(),
                external: false,
            },
        );
        let p = w.paragraph(
            &parse(
                r#"<w:p><w:r><w:drawing><wp:inline><wp:docPr id="1" name="Picture 1" descr="A chart"/><a:graphic><a:graphicData><pic:pic><pic:blipFill><a:blip r:embed="rId7"/></pic:blipFill></pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing></w:r><w:r><w:drawing><a:blip r:embed="rId99"/></w:drawing></w:r></w:p>"#,
            )
            .unwrap(),
        );
        match (&p.inlines[0], &p.inlines[1]) {
            (Inline::Image(a), Inline::Image(b)) => {
                assert_eq!(a.id, 0);
                assert_eq!(a.target, ImageTarget::Part("word/media/image1.png".into()));
                assert_eq!(a.description.as_deref(), Some("A chart"));
                assert_eq!(b.id, 1);
                assert_eq!(b.target, ImageTarget::Unresolved("rId99".into()));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn legacy_equation_object_keeps_preview() {
        let p = para(
            r#"<w:p><w:r><w:object><v:shape id="_x0000_i1025"><v:imagedata r:id="rId8" o:title=""/></v:shape><o:OLEObject ProgID="Equation.3"/></w:object></w:r></w:p>"#,
        );
        match &p.inlines[0] {
            Inline::Equation(eq) => {
                assert_eq!(eq.kind, EquationKind::LegacyObject);
                assert!(eq.fallback.is_some());
                assert!(eq.display);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn hyperlinks_use_anchor_when_no_relationship() {
        let p = para(
            r#"<w:p><w:hyperlink w:anchor="intro"><w:r><w:t>Intro</w:t></w:r></w:hyperlink></w:p>"#,
        );
        match &p.inlines[0] {
            Inline::Link { target, children } => {
                assert_eq!(target, "#intro");
                assert_eq!(children.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn tables_nest_blocks() {
        let mut w = walker();
        let blocks = w.blocks(
            &parse(
                r#"<w:body><w:tbl><w:tr><w:tc><w:p><w:r><w:t>A</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>B</w:t></w:r></w:p></w:tc></w:tr></w:tbl><w:sectPr/></w:body>"#,
            )
            .unwrap(),
        );
        assert_eq!(blocks.len(), 1);
        match &blocks[0] {
            Block::Table(t) => {
                assert_eq!(t.rows.len(), 1);
                assert_eq!(t.rows[0].len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
