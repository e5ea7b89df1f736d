//! Legacy equation-editor objects (Equation 3.0, MathType).
//!
//! The native binary payload of these OLE objects is not decoded. Two
//! sources are tried instead: an OMML alternative that newer editors write
//! alongside the object, and a TeX annotation stored in the preview image's
//! alternative text (MathType's "TeX input language" option does this).

use super::omml;
use crate::error::UnsupportedEquationFormat;
use crate::package::xml::XmlElement;

/// True when an `o:OLEObject` ProgID names an equation editor.
pub fn is_equation_prog_id(prog_id: &str) -> bool {
    prog_id.starts_with("Equation.") || prog_id.contains("MathType")
}

/// Best-effort LaTeX for a legacy equation object (`w:object`).
pub fn extract(object: &XmlElement) -> Result<String, UnsupportedEquationFormat> {
    if let Some(math) = object.find("m:oMath") {
        return Ok(omml::to_latex(math));
    }

    for shape in object.find_all("v:shape").into_iter().chain(object.find_all("v:imagedata")) {
        for key in ["alt", "o:title", "descr"] {
            if let Some(tex) = shape.attr(key).and_then(tex_annotation) {
                return Ok(tex);
            }
        }
    }

    let prog_id = object
        .find("o:OLEObject")
        .and_then(|o| o.attr("ProgID"))
        .unwrap_or("unknown");
    Err(UnsupportedEquationFormat(format!(
        "{prog_id} object has no readable math representation"
    )))
}

/// Pull the TeX body out of `$..$`, `$$..$$`, `\(..\)` or `\[..\]`.
fn tex_annotation(text: &str) -> Option<String> {
    let t = text.trim();
    let pairs: [(&str, &str); 4] = [("$$", "$$"), ("$", "$"), (r"\[", r"\]"), (r"\(", r"\)")];
    for (open, close) in pairs {
        if t.len() > open.len() + close.len() && t.starts_with(open) && t.ends_with(close) {
            let inner = t[open.len()..t.len() - close.len()].trim();
            if !inner.is_empty() {
                return Some(inner.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::xml::parse;

    #[test]
    fn recognises_equation_prog_ids() {
        assert!(is_equation_prog_id("Equation.3"));
        assert!(is_equation_prog_id("Equation.DSMT4"));
        assert!(is_equation_prog_id("MathType.6"));
        assert!(!is_equation_prog_id("Excel.Sheet.12"));
    }

    #[test]
    fn prefers_embedded_omml() {
        let obj = parse(
            r#"<w:object><m:oMath><m:r><m:t>x</m:t></m:r></m:oMath><o:OLEObject ProgID="Equation.3"/></w:object>"#,
        )
        .unwrap();
        assert_eq!(extract(&obj).unwrap(), "x");
    }

    #[test]
    fn reads_tex_from_alt_text() {
        let obj = parse(
            r#"<w:object><v:shape alt="$$\frac{a}{b}$$"><v:imagedata r:id="rId5"/></v:shape><o:OLEObject ProgID="Equation.DSMT4"/></w:object>"#,
        )
        .unwrap();
        assert_eq!(extract(&obj).unwrap(), r"\frac{a}{b}");
    }

    #[test]
    fn unreadable_object_names_its_prog_id() {
        let obj = parse(
            r#"<w:object><v:shape><v:imagedata r:id="rId5" o:title=""/></v:shape><o:OLEObject ProgID="Equation.3"/></w:object>"#,
        )
        .unwrap();
        let err = extract(&obj).unwrap_err();
        assert!(err.0.contains("Equation.3"));
    }

    #[test]
    fn tex_annotation_delimiters() {
        assert_eq!(tex_annotation(r"\(x^2\)").as_deref(), Some("x^2"));
        assert_eq!(tex_annotation("$y$").as_deref(), Some("y"));
        assert_eq!(tex_annotation("plain words"), None);
        assert_eq!(tex_annotation("$$"), None);
    }
}
