//! Formula placeholders.
//!
//! LaTeX cannot go straight into the intermediate HTML: the HTML → Markdown
//! converter escapes `\`, `_`, `*` and friends and would mangle it. Each
//! formula is therefore carried through as an opaque token
//!
//! ```text
//! ⟨OMML:$:<base64>⟩     inline
//! ⟨OMML:$$:<base64>⟩    display
//! ```
//!
//! and decoded after conversion. The converter may still insert backslash
//! escapes inside a token (`\$`, `\+`, `\=`); decoding strips them before
//! reading the base64 payload.

use crate::math::{FormulaKind, FormulaToken};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::ops::Range;

static RE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"⟨OMML:((?:\\?\$){1,2}):((?:\\?[A-Za-z0-9+/=])*)⟩").unwrap()
});

/// Anything that still looks like a placeholder after decoding.
static RE_LEFTOVER: Lazy<Regex> = Lazy::new(|| Regex::new(r"⟨OMML:[^⟩\s]*⟩").unwrap());

/// Result of [`decode`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedText {
    pub text: String,
    /// Byte ranges of decoded `$$…$$` formulas, ascending.
    pub display_spans: Vec<Range<usize>>,
    /// Tokens that were left in the text because they could not be decoded.
    pub malformed: Vec<String>,
}

/// Encode a formula as a placeholder token.
pub fn encode(token: &FormulaToken) -> String {
    format!(
        "⟨OMML:{}:{}⟩",
        token.kind.delimiter(),
        STANDARD.encode(token.latex.as_bytes())
    )
}

/// Replace every well-formed placeholder with `$latex$` / `$$latex$$`.
///
/// A token whose payload is not valid base64 or UTF-8 stays verbatim and is
/// reported in [`DecodedText::malformed`]. Text without tokens is returned
/// unchanged.
pub fn decode(text: &str) -> DecodedText {
    let mut out = String::with_capacity(text.len());
    let mut display_spans = Vec::new();
    let mut malformed = Vec::new();
    let mut last = 0;

    for caps in RE_TOKEN.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&text[last..whole.start()]);
        last = whole.end();

        match decode_token(&caps) {
            Some(token) => {
                let delim = token.kind.delimiter();
                let start = out.len();
                out.push_str(delim);
                out.push_str(&token.latex);
                out.push_str(delim);
                if token.kind == FormulaKind::Display {
                    display_spans.push(start..out.len());
                }
            }
            None => {
                malformed.push(whole.as_str().to_string());
                out.push_str(whole.as_str());
            }
        }
    }
    out.push_str(&text[last..]);

    // Tokens the strict pattern did not match at all (bad delimiter, stray
    // characters in the payload).
    for m in RE_LEFTOVER.find_iter(&out) {
        if !malformed.iter().any(|t| t == m.as_str()) {
            malformed.push(m.as_str().to_string());
        }
    }

    DecodedText {
        text: out,
        display_spans,
        malformed,
    }
}

fn decode_token(caps: &Captures<'_>) -> Option<FormulaToken> {
    let dollars = caps[1].replace('\\', "");
    let kind = match dollars.as_str() {
        "$" => FormulaKind::Inline,
        "$$" => FormulaKind::Display,
        _ => return None,
    };
    let payload = caps[2].replace('\\', "");
    let bytes = STANDARD.decode(payload.as_bytes()).ok()?;
    let latex = String::from_utf8(bytes).ok()?;
    Some(FormulaToken { kind, latex })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(kind: FormulaKind, latex: &str) -> String {
        encode(&FormulaToken {
            kind,
            latex: latex.to_string(),
        })
    }

    #[test]
    fn decodes_inline_and_display() {
        let text = format!(
            "Let {} then\n\n{}\n",
            token(FormulaKind::Inline, "x_1"),
            token(FormulaKind::Display, r"\frac{a}{b}")
        );
        let decoded = decode(&text);
        assert_eq!(decoded.text, "Let $x_1$ then\n\n$$\\frac{a}{b}$$\n");
        assert_eq!(decoded.display_spans.len(), 1);
        assert_eq!(&decoded.text[decoded.display_spans[0].clone()], r"$$\frac{a}{b}$$");
        assert!(decoded.malformed.is_empty());
    }

    #[test]
    fn strips_markdown_escapes_inside_tokens() {
        let raw = token(FormulaKind::Display, "a+b=c>d");
        let escaped = raw.replace('$', r"\$").replace('+', r"\+").replace('=', r"\=");
        assert_ne!(raw, escaped);
        assert_eq!(decode(&escaped).text, "$$a+b=c>d$$");
    }

    #[test]
    fn text_without_tokens_is_unchanged() {
        let text = "Nothing to see, $5 and ⟨angle⟩ brackets.";
        let decoded = decode(text);
        assert_eq!(decoded.text, text);
        assert!(decoded.malformed.is_empty());
        assert!(decoded.display_spans.is_empty());
    }

    #[test]
    fn bad_base64_is_kept_and_reported() {
        let text = "see ⟨OMML:$:abc⟩ here";
        let decoded = decode(text);
        assert_eq!(decoded.text, text);
        assert_eq!(decoded.malformed, vec!["⟨OMML:$:abc⟩".to_string()]);
    }

    #[test]
    fn wrong_delimiter_is_reported() {
        let text = "⟨OMML:$$$:eA==⟩";
        let decoded = decode(text);
        assert_eq!(decoded.text, text);
        assert_eq!(decoded.malformed.len(), 1);
    }

    #[test]
    fn truncated_token_passes_through() {
        let text = "broken ⟨OMML:$:eA==";
        let decoded = decode(text);
        assert_eq!(decoded.text, text);
    }

    #[test]
    fn unicode_latex_survives() {
        let text = token(FormulaKind::Inline, "α→β");
        assert_eq!(decode(&text).text, "$α→β$");
    }
}
