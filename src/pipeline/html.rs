//! Document model → intermediate HTML.
//!
//! The HTML is only an input for [`super::render`]; it never leaves the
//! process. Text is escaped, formulas are emitted as opaque placeholders
//! (see [`super::placeholder`]) and images point at their normalised assets.

use super::caption::compose_alt_text;
use super::media::ImageAsset;
use super::placeholder;
use super::slides::SlideRecord;
use crate::error::AssetWarning;
use crate::math::{self, EquationKind, EquationNode, FormulaKind, FormulaToken};
use crate::package::model::{Block, ImageRef, ImageTarget, Inline, Paragraph, ParagraphRole, Table};
use std::collections::HashMap;
use tracing::warn;

/// Formula counts gathered while emitting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EquationStats {
    pub inline: usize,
    pub display: usize,
    /// Rendered as their preview picture.
    pub fallback: usize,
}

/// Stateful emitter for one document.
pub struct HtmlEmitter<'a> {
    assets: HashMap<usize, &'a ImageAsset>,
    extract_equations: bool,
    /// Open lists, innermost last; `true` for `<ol>`.
    lists: Vec<bool>,
    stats: EquationStats,
    warnings: Vec<AssetWarning>,
}

impl<'a> HtmlEmitter<'a> {
    pub fn new(assets: &'a [ImageAsset], extract_equations: bool) -> Self {
        Self {
            assets: assets.iter().map(|a| (a.id, a)).collect(),
            extract_equations,
            lists: Vec::new(),
            stats: EquationStats::default(),
            warnings: Vec::new(),
        }
    }

    /// Render a Word body.
    pub fn render_document(&mut self, blocks: &[Block]) -> String {
        let mut out = String::new();
        self.blocks(blocks, &mut out);
        self.close_lists(&mut out);
        out
    }

    /// Render a deck: a `Slide N` heading per slide, its blocks, then notes.
    pub fn render_slides(&mut self, slides: &[SlideRecord]) -> String {
        let mut out = String::new();
        for slide in slides {
            let heading = if slide.title.is_empty() {
                format!("Slide {}", slide.index)
            } else {
                format!("Slide {}: {}", slide.index, slide.title)
            };
            out.push_str(&format!("<h2>{}</h2>\n", escape(&heading)));
            self.blocks(&slide.blocks, &mut out);
            self.close_lists(&mut out);
            if !slide.notes.is_empty() {
                out.push_str("<h3>Notes</h3>\n");
                self.blocks(&slide.notes, &mut out);
                self.close_lists(&mut out);
            }
        }
        out
    }

    pub fn finish(self) -> (EquationStats, Vec<AssetWarning>) {
        (self.stats, self.warnings)
    }

    // ── Blocks ───────────────────────────────────────────────────────────

    fn blocks(&mut self, blocks: &[Block], out: &mut String) {
        for block in blocks {
            match block {
                Block::Paragraph(p) => self.paragraph(p, out),
                Block::Table(t) => {
                    self.close_lists(out);
                    self.table(t, out);
                }
                Block::Figure(image) => {
                    self.close_lists(out);
                    let img = self.image(image);
                    if !img.is_empty() {
                        out.push_str(&format!("<p>{img}</p>\n"));
                    }
                }
            }
        }
    }

    fn paragraph(&mut self, p: &Paragraph, out: &mut String) {
        if p.is_empty() {
            return;
        }
        let body = self.inlines(&p.inlines);
        match p.role {
            ParagraphRole::ListItem { level, ordered } => {
                self.open_item(level, ordered, out);
                out.push_str(&body);
            }
            ParagraphRole::Heading(level) => {
                self.close_lists(out);
                let n = level.clamp(1, 6);
                out.push_str(&format!("<h{n}>{body}</h{n}>\n"));
            }
            ParagraphRole::Body => {
                self.close_lists(out);
                out.push_str(&format!("<p>{body}</p>\n"));
            }
        }
    }

    /// Position the list stack for an item at `level` and open its `<li>`.
    /// Every open list always holds one open `<li>`.
    fn open_item(&mut self, level: u8, ordered: bool, out: &mut String) {
        let depth = usize::from(level) + 1;
        while self.lists.len() > depth {
            self.pop_list(out);
        }
        if self.lists.len() == depth {
            out.push_str("</li>");
            if self.lists.last() != Some(&ordered) {
                let kind = self.lists.pop().unwrap_or(false);
                out.push_str(list_close(kind));
            }
        }
        while self.lists.len() < depth {
            out.push_str(list_open(ordered));
            self.lists.push(ordered);
            if self.lists.len() < depth {
                out.push_str("<li>");
            }
        }
        out.push_str("<li>");
    }

    fn pop_list(&mut self, out: &mut String) {
        if let Some(kind) = self.lists.pop() {
            out.push_str("</li>");
            out.push_str(list_close(kind));
        }
    }

    fn close_lists(&mut self, out: &mut String) {
        if self.lists.is_empty() {
            return;
        }
        while !self.lists.is_empty() {
            self.pop_list(out);
        }
        out.push('\n');
    }

    fn table(&mut self, table: &Table, out: &mut String) {
        if table.rows.is_empty() {
            return;
        }
        out.push_str("<table>\n");
        for (r, row) in table.rows.iter().enumerate() {
            if r == 0 {
                out.push_str("<thead>");
            } else if r == 1 {
                out.push_str("<tbody>");
            }
            out.push_str("<tr>");
            let tag = if r == 0 { "th" } else { "td" };
            for cell in row {
                out.push_str(&format!("<{tag}>{}</{tag}>", self.cell(cell)));
            }
            out.push_str("</tr>");
            if r == 0 {
                out.push_str("</thead>\n");
            } else {
                out.push('\n');
            }
        }
        if table.rows.len() > 1 {
            out.push_str("</tbody>");
        }
        out.push_str("</table>\n");
    }

    /// Cell content on one line, block boundaries as `<br>`.
    fn cell(&mut self, blocks: &[Block]) -> String {
        let mut parts = Vec::new();
        for block in blocks {
            match block {
                Block::Paragraph(p) if !p.is_empty() => parts.push(self.inlines(&p.inlines)),
                Block::Paragraph(_) => {}
                Block::Figure(image) => parts.push(self.image(image)),
                Block::Table(nested) => {
                    // Markdown tables cannot nest; keep the text row by row.
                    for row in &nested.rows {
                        let cells: Vec<String> = row.iter().map(|c| self.cell(c)).collect();
                        parts.push(cells.join(" | "));
                    }
                }
            }
        }
        parts.retain(|p| !p.is_empty());
        parts.join("<br>")
    }

    // ── Inlines ──────────────────────────────────────────────────────────

    fn inlines(&mut self, inlines: &[Inline]) -> String {
        let mut out = String::new();
        let mut pending: Option<(bool, bool, String)> = None;

        for inline in inlines {
            if let Inline::Text(run) = inline {
                if let Some((b, i, text)) = pending.as_mut() {
                    if *b == run.bold && *i == run.italic {
                        text.push_str(&run.text);
                        continue;
                    }
                }
                flush_run(pending.take(), &mut out);
                pending = Some((run.bold, run.italic, run.text.clone()));
                continue;
            }
            flush_run(pending.take(), &mut out);
            match inline {
                Inline::LineBreak => out.push_str("<br>"),
                Inline::Link { target, children } => {
                    let inner = self.inlines(children);
                    out.push_str(&format!("<a href=\"{}\">{}</a>", escape_attr(target), inner));
                }
                Inline::Image(image) => out.push_str(&self.image(image)),
                Inline::Equation(eq) => out.push_str(&self.equation(eq)),
                Inline::Text(_) => {}
            }
        }
        flush_run(pending, &mut out);
        out
    }

    fn image(&mut self, image: &ImageRef) -> String {
        if let ImageTarget::External(url) = &image.target {
            let alt = compose_alt_text(None, image.description.as_deref(), image.name.as_deref());
            return img_tag(url, &alt);
        }
        // Missing parts were reported during extraction.
        let Some(asset) = self.assets.get(&image.id) else {
            return String::new();
        };
        let alt = compose_alt_text(
            asset.caption.as_deref(),
            asset.description.as_deref(),
            asset.name.as_deref(),
        );
        img_tag(&asset.display_path, &alt)
    }

    fn equation(&mut self, eq: &EquationNode) -> String {
        let kind = FormulaKind::from_display(eq.display);

        if !self.extract_equations {
            return match eq.kind {
                EquationKind::Native => escape(&math::plain_text(eq)),
                _ => self.equation_fallback(eq, kind, "equation extraction is disabled"),
            };
        }

        match math::translate(eq) {
            Ok(latex) if latex.trim().is_empty() => String::new(),
            Ok(latex) => self.formula(kind, latex),
            Err(e) => self.equation_fallback(eq, kind, &e.to_string()),
        }
    }

    fn equation_fallback(&mut self, eq: &EquationNode, kind: FormulaKind, reason: &str) -> String {
        let asset = eq
            .fallback
            .as_ref()
            .and_then(|f| self.assets.get(&f.id).copied());
        let Some(asset) = asset else {
            warn!("Equation dropped: {}", reason);
            self.warnings.push(AssetWarning::UnsupportedEquation {
                detail: reason.to_string(),
            });
            return String::new();
        };
        if self.extract_equations {
            if let Some(latex) = asset.recognized_latex.clone() {
                return self.formula(kind, latex);
            }
        }
        self.stats.fallback += 1;
        let alt = compose_alt_text(
            asset.caption.as_deref(),
            asset.description.as_deref(),
            asset.name.as_deref(),
        );
        img_tag(&asset.display_path, &alt)
    }

    fn formula(&mut self, kind: FormulaKind, latex: String) -> String {
        match kind {
            FormulaKind::Inline => self.stats.inline += 1,
            FormulaKind::Display => self.stats.display += 1,
        }
        placeholder::encode(&FormulaToken { kind, latex })
    }
}

fn list_open(ordered: bool) -> &'static str {
    if ordered {
        "<ol>"
    } else {
        "<ul>"
    }
}

fn list_close(ordered: bool) -> &'static str {
    if ordered {
        "</ol>"
    } else {
        "</ul>"
    }
}

/// Emit a merged run. Surrounding whitespace stays outside the emphasis
/// tags so the Markdown markers hug the text.
fn flush_run(run: Option<(bool, bool, String)>, out: &mut String) {
    let Some((bold, italic, text)) = run else {
        return;
    };
    let trimmed = text.trim();
    if trimmed.is_empty() || (!bold && !italic) {
        out.push_str(&escape(&text));
        return;
    }
    let lead = &text[..text.len() - text.trim_start().len()];
    let trail = &text[text.trim_end().len()..];
    out.push_str(&escape(lead));
    let mut inner = escape(trimmed);
    if italic {
        inner = format!("<em>{inner}</em>");
    }
    if bold {
        inner = format!("<strong>{inner}</strong>");
    }
    out.push_str(&inner);
    out.push_str(&escape(trail));
}

fn img_tag(src: &str, alt: &str) -> String {
    format!("<img src=\"{}\" alt=\"{}\">", escape_attr(src), escape_attr(alt))
}

pub(crate) fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_attr(s: &str) -> String {
    escape(s).replace('"', "&quot;")
}
