//! HTML → Markdown via `htmd`.
//!
//! The converter escapes Markdown specials in text nodes, which is exactly
//! why formulas travel as placeholders: any backslashes it inserts inside a
//! token are removed again by [`super::placeholder::decode`].

use crate::error::Office2MdError;
use htmd::options::{BulletListMarker, CodeBlockStyle, HeadingStyle, Options};
use htmd::HtmlToMarkdown;
use tracing::debug;

fn converter() -> HtmlToMarkdown {
    HtmlToMarkdown::builder()
        .options(Options {
            heading_style: HeadingStyle::Atx,
            bullet_list_marker: BulletListMarker::Dash,
            code_block_style: CodeBlockStyle::Fenced,
            ..Default::default()
        })
        .build()
}

/// Convert the intermediate HTML of one document to Markdown.
pub fn html_to_markdown(html: &str) -> Result<String, Office2MdError> {
    let markdown = converter()
        .convert(html)
        .map_err(|e| Office2MdError::Internal(format!("HTML to Markdown conversion failed: {e}")))?;
    debug!("Rendered {} bytes of HTML → {} bytes of Markdown", html.len(), markdown.len());
    Ok(markdown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atx_headings_and_dash_bullets() {
        let md = html_to_markdown("<h2>Slide 1: Intro</h2><ul><li>one</li><li>two</li></ul>").unwrap();
        assert!(md.contains("## Slide 1: Intro"), "got: {md}");
        assert!(md.contains("- one"), "got: {md}");
    }

    #[test]
    fn images_keep_relative_paths() {
        let md = html_to_markdown(r#"<p><img src="deck_images/slide1_image1.png" alt="Logo"></p>"#).unwrap();
        assert!(md.contains("![Logo](deck_images/slide1_image1.png)"), "got: {md}");
    }

    #[test]
    fn placeholder_survives_possibly_escaped() {
        let token = "⟨OMML:$$:eF4yK3k=⟩";
        let md = html_to_markdown(&format!("<p>{token}</p>")).unwrap();
        let decoded = crate::pipeline::placeholder::decode(&md);
        assert_eq!(decoded.text.trim(), "$$x^2+y$$");
    }
}
