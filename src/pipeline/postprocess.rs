//! Post-processing: deterministic cleanup of converter-generated Markdown.
//!
//! The HTML → Markdown step produces valid but untidy output: CRLF endings
//! copied from document text, runs of blank lines where empty paragraphs
//! were, and zero-width characters pasted in by authors. Table rows are
//! left exactly as the converter wrote them.
//!
//! Two passes live here:
//!
//! * [`clean_markdown`] runs before formula placeholders are decoded. Its
//!   rules are cheap, pure `&str → String` functions, each independently
//!   testable.
//! * [`normalize_formula_spacing`] runs after decoding and fixes the vertical
//!   spacing around display formulas.
//!
//! ## Rule Order
//!
//! Normalise line endings before trimming, and collapse blank lines before
//! heading spacing so headings see clean input.

use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;

/// Apply all cleanup rules to the rendered Markdown.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF → LF)
/// 2. Trim trailing whitespace per line
/// 3. Collapse 3+ consecutive blank lines down to 2
/// 4. Ensure heading lines have a blank line before them
/// 5. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, etc.)
/// 6. Ensure the file ends with exactly one newline
pub fn clean_markdown(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = normalise_heading_spacing(&s);
    let s = remove_invisible_chars(&s);
    ensure_final_newline(&s)
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 3: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

// ── Rule 4: Normalise heading spacing ────────────────────────────────────────

fn normalise_heading_spacing(input: &str) -> String {
    let mut result = String::with_capacity(input.len() + 64);
    for (i, line) in input.lines().enumerate() {
        if is_atx_heading(line) && i > 0 {
            let trimmed = result.trim_end_matches('\n');
            result.truncate(trimmed.len());
            result.push_str("\n\n");
        }
        result.push_str(line);
        result.push('\n');
    }
    result
}

fn is_atx_heading(line: &str) -> bool {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    (1..=6).contains(&hashes) && line[hashes..].starts_with(' ')
}

// ── Rule 5: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 6: Ensure file ends with single newline ─────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{}\n", trimmed)
    }
}

// ── Formula spacing ─────────────────────────────────────────────────────────

/// Put exactly two blank lines after every display formula.
///
/// `spans` are the byte ranges of decoded `$$…$$` formulas in `text`, in
/// ascending order. Only a formula that ends its line is touched; one
/// followed by more text on the same line (a table cell, say) is left
/// alone. Whitespace following a span is replaced by `\n\n\n`,
/// keeping any indentation of the next line; a formula at the end of the
/// document is followed by a single newline. Returns the new text and the
/// shifted spans, so running it twice is a no-op.
pub fn normalize_formula_spacing(text: &str, spans: &[Range<usize>]) -> (String, Vec<Range<usize>>) {
    let mut out = String::with_capacity(text.len() + spans.len() * 3);
    let mut new_spans = Vec::with_capacity(spans.len());
    let mut cursor = 0usize;

    for span in spans {
        if span.start < cursor || span.end > text.len() {
            continue;
        }
        out.push_str(&text[cursor..span.start]);
        let start = out.len();
        out.push_str(&text[span.clone()]);
        new_spans.push(start..out.len());

        let rest = &text[span.end..];
        let line_rest = rest.split('\n').next().unwrap_or("");
        if !line_rest.trim().is_empty() {
            cursor = span.end;
            continue;
        }
        let ws_len = rest.len() - rest.trim_start().len();
        let ws = &rest[..ws_len];
        if ws_len == rest.len() {
            out.push('\n');
        } else {
            let indent = match ws.rfind('\n') {
                Some(pos) => &ws[pos + 1..],
                None => "",
            };
            out.push_str("\n\n\n");
            out.push_str(indent);
        }
        cursor = span.end + ws_len;
    }
    out.push_str(&text[cursor.min(text.len())..]);
    (out, new_spans)
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_trim_trailing_whitespace() {
        assert_eq!(
            trim_trailing_whitespace("  hello   \nworld  "),
            "  hello\nworld"
        );
    }

    #[test]
    fn test_collapse_blank_lines() {
        let input = "a\n\n\n\n\n\nb";
        assert_eq!(collapse_blank_lines(input), "a\n\n\nb");
    }

    #[test]
    fn test_ensure_final_newline() {
        assert_eq!(ensure_final_newline("hello"), "hello\n");
        assert_eq!(ensure_final_newline("hello\n\n\n"), "hello\n");
        assert_eq!(ensure_final_newline(""), "\n");
    }

    #[test]
    fn test_heading_spacing() {
        let input = "some text\n# Heading\nmore text";
        let result = normalise_heading_spacing(input);
        assert!(result.contains("\n\n# Heading\n"));
    }

    #[test]
    fn test_hash_without_space_is_not_heading() {
        assert!(!is_atx_heading("#hashtag"));
        assert!(is_atx_heading("## Slide 2"));
        assert!(!is_atx_heading("####### seven"));
    }

    #[test]
    fn table_rows_pass_through_untouched() {
        let input = "| Item | Value |\n| --- | --- |\n| a | b |\n| -- | -- |\n| c | d |";
        let result = clean_markdown(input);
        assert_eq!(result, format!("{input}\n"));
    }

    #[test]
    fn test_remove_invisible() {
        let input = "hello\u{200B}world\u{FEFF}foo\u{00AD}bar";
        assert_eq!(remove_invisible_chars(input), "helloworldfoobar");
    }

    #[test]
    fn test_clean_markdown_full_pipeline() {
        let input = "# Title\r\n\r\nSome text   \n\n\n\n\n\n## Section\n\n| A | B |\n| --- | --- |\n| 1 | 2 |";
        let result = clean_markdown(input);
        assert!(result.starts_with("# Title"));
        assert!(result.ends_with("| 1 | 2 |\n"));
        assert!(!result.contains("\n\n\n\n"));
        assert!(result.contains("\n\n## Section\n"));
    }

    fn spans_of(text: &str) -> Vec<Range<usize>> {
        let mut out = Vec::new();
        let mut from = 0;
        while let Some(start) = text[from..].find("$$") {
            let start = from + start;
            let Some(len) = text[start + 2..].find("$$") else {
                break;
            };
            let end = start + 2 + len + 2;
            out.push(start..end);
            from = end;
        }
        out
    }

    #[test]
    fn spacing_inserts_two_blank_lines() {
        let text = "Intro\n\n$$x^2$$\nNext paragraph\n";
        let (out, spans) = normalize_formula_spacing(text, &spans_of(text));
        assert_eq!(out, "Intro\n\n$$x^2$$\n\n\nNext paragraph\n");
        assert_eq!(&out[spans[0].clone()], "$$x^2$$");
    }

    #[test]
    fn spacing_collapses_extra_blank_lines() {
        let text = "$$a$$\n\n\n\n\nb\n";
        let (out, _) = normalize_formula_spacing(text, &spans_of(text));
        assert_eq!(out, "$$a$$\n\n\nb\n");
    }

    #[test]
    fn spacing_at_end_of_document_is_single_newline() {
        let text = "text\n\n$$a$$\n\n";
        let (out, _) = normalize_formula_spacing(text, &spans_of(text));
        assert_eq!(out, "text\n\n$$a$$\n");
    }

    #[test]
    fn spacing_keeps_list_indentation() {
        let text = "- item\n\n  $$a$$\n  continued\n";
        let (out, _) = normalize_formula_spacing(text, &spans_of(text));
        assert_eq!(out, "- item\n\n  $$a$$\n\n\n  continued\n");
    }

    #[test]
    fn formula_inside_table_row_is_left_alone() {
        let text = "| Equation | No. |\n| --- | --- |\n| $$E=mc^{2}$$ | (1) |\n";
        let (out, spans) = normalize_formula_spacing(text, &spans_of(text));
        assert_eq!(out, text);
        assert_eq!(&out[spans[0].clone()], "$$E=mc^{2}$$");
    }

    #[test]
    fn formula_followed_by_text_on_same_line_is_left_alone() {
        let text = "A\n$$a$$ $$b$$\nB\n";
        let (out, _) = normalize_formula_spacing(text, &spans_of(text));
        assert_eq!(out, "A\n$$a$$ $$b$$\n\n\nB\n");
    }

    #[test]
    fn spacing_is_idempotent() {
        let text = "A\n$$a$$ $$b$$\nB\n\n$$c$$";
        let (once, spans) = normalize_formula_spacing(text, &spans_of(text));
        let (twice, _) = normalize_formula_spacing(&once, &spans);
        assert_eq!(once, twice);
        assert_eq!(spans, spans_of(&once));
    }
}
