//! Formula handling: equation objects in, LaTeX out.
//!
//! ```text
//! EquationNode ──▶ translate ──┬─▶ omml::to_latex      (native m:oMath)
//!                              ├─▶ legacy::extract     (MathType / Equation 3.0)
//!                              └─▶ Unsupported         (caller shows the preview image)
//! ```
//!
//! All glyph-level mapping goes through [`symbols`].

pub mod legacy;
pub mod omml;
pub mod symbols;

use crate::error::UnsupportedEquationFormat;
use crate::package::model::ImageRef;
use crate::package::xml::XmlElement;
use serde::{Deserialize, Serialize};

/// How an equation is stored in the source package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EquationKind {
    /// Office Math Markup (`m:oMath`).
    Native,
    /// Third-party equation-editor OLE object.
    LegacyObject,
    /// Only a picture of the equation exists.
    ImageFallback,
}

/// An equation found in the document tree.
#[derive(Debug, Clone, PartialEq)]
pub struct EquationNode {
    pub kind: EquationKind,
    /// Display (own paragraph) vs inline, decided by the walker.
    pub display: bool,
    /// The `m:oMath` element, or the `w:object` for legacy objects.
    pub markup: XmlElement,
    /// Preview picture shown when translation is impossible.
    pub fallback: Option<ImageRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormulaKind {
    Inline,
    Display,
}

impl FormulaKind {
    pub fn from_display(display: bool) -> Self {
        if display {
            FormulaKind::Display
        } else {
            FormulaKind::Inline
        }
    }

    /// `$` or `$$`.
    pub fn delimiter(self) -> &'static str {
        match self {
            FormulaKind::Inline => "$",
            FormulaKind::Display => "$$",
        }
    }
}

/// A translated formula ready for placeholder encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormulaToken {
    pub kind: FormulaKind,
    pub latex: String,
}

/// Translate an equation node into LaTeX (without `$` delimiters).
pub fn translate(node: &EquationNode) -> Result<String, UnsupportedEquationFormat> {
    match node.kind {
        EquationKind::Native => Ok(omml::to_latex(&node.markup)),
        EquationKind::LegacyObject => legacy::extract(&node.markup),
        EquationKind::ImageFallback => Err(UnsupportedEquationFormat(
            "equation is only available as an image".into(),
        )),
    }
}

/// The literal characters of a native equation, used when formula extraction
/// is switched off.
pub fn plain_text(node: &EquationNode) -> String {
    node.markup
        .find_all("m:t")
        .iter()
        .map(|t| t.text())
        .collect::<String>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::xml::parse;

    fn native(xml: &str) -> EquationNode {
        EquationNode {
            kind: EquationKind::Native,
            display: false,
            markup: parse(xml).unwrap(),
            fallback: None,
        }
    }

    #[test]
    fn translate_dispatches_native() {
        let node = native(r#"<m:oMath><m:r><m:t>x</m:t></m:r></m:oMath>"#);
        assert_eq!(translate(&node).unwrap(), "x");
    }

    #[test]
    fn image_fallback_is_unsupported() {
        let mut node = native("<m:oMath/>");
        node.kind = EquationKind::ImageFallback;
        assert!(translate(&node).is_err());
    }

    #[test]
    fn plain_text_concatenates_runs() {
        let node = native(
            r#"<m:oMath><m:r><m:t>a</m:t></m:r><m:r><m:t>+b</m:t></m:r></m:oMath>"#,
        );
        assert_eq!(plain_text(&node), "a+b");
    }

    #[test]
    fn formula_kind_delimiters() {
        assert_eq!(FormulaKind::from_display(true).delimiter(), "$$");
        assert_eq!(FormulaKind::from_display(false).delimiter(), "$");
    }
}
