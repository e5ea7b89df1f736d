//! Office Math Markup (OMML) → LaTeX.
//!
//! Translation is two-phase: [`MathNode::from_xml`] turns the `m:*` element
//! tree into a tagged variant tree, then [`MathNode::write`] emits LaTeX
//! recursively. Nesting depth is unbounded; a matrix of fractions inside a
//! delimiter inside a superscript is just recursion.
//!
//! Unknown elements are descended into, so content wrapped in constructs this
//! module does not model (bookmarks, revision marks) still comes through.

use super::symbols::{normalize_symbol, split_glyphs, LatexBuf};
use crate::package::xml::{is_on, XmlElement, XmlNode};

/// Function names that have a LaTeX macro of their own.
const KNOWN_FUNCTIONS: &[&str] = &[
    "sin", "cos", "tan", "cot", "sec", "csc", "arcsin", "arccos", "arctan", "sinh", "cosh",
    "tanh", "coth", "log", "ln", "lg", "exp", "lim", "liminf", "limsup", "max", "min", "sup",
    "inf", "det", "dim", "ker", "gcd", "deg", "arg", "hom", "Pr",
];

/// Operators whose limits go underneath with `_{}` rather than `\underset`.
const LIMIT_OPERATORS: &[&str] = &[
    r"\lim", r"\liminf", r"\limsup", r"\max", r"\min", r"\sup", r"\inf", r"\det", r"\gcd",
    r"\Pr", r"\sum", r"\prod", r"\bigcup", r"\bigcap",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FractionKind {
    Bar,
    Skewed,
    Linear,
    NoBar,
}

/// Tagged variant tree of one OMML expression.
#[derive(Debug, Clone, PartialEq)]
pub enum MathNode {
    Run { text: String, upright: bool },
    Row(Vec<MathNode>),
    Fraction { kind: FractionKind, num: Box<MathNode>, den: Box<MathNode> },
    Radical { degree: Option<Box<MathNode>>, body: Box<MathNode> },
    Sup { base: Box<MathNode>, sup: Box<MathNode> },
    Sub { base: Box<MathNode>, sub: Box<MathNode> },
    SubSup { base: Box<MathNode>, sub: Box<MathNode>, sup: Box<MathNode> },
    PreScript { sub: Box<MathNode>, sup: Box<MathNode>, base: Box<MathNode> },
    Nary {
        op: String,
        sub: Option<Box<MathNode>>,
        sup: Option<Box<MathNode>>,
        body: Box<MathNode>,
    },
    Delimiter { open: String, close: String, separator: String, items: Vec<MathNode> },
    Matrix(Vec<Vec<MathNode>>),
    Function { name: Box<MathNode>, arg: Box<MathNode> },
    Accent { chr: String, body: Box<MathNode> },
    Bar { top: bool, body: Box<MathNode> },
    GroupChr { chr: String, top: bool, body: Box<MathNode> },
    LowerLimit { base: Box<MathNode>, limit: Box<MathNode> },
    UpperLimit { base: Box<MathNode>, limit: Box<MathNode> },
    EqArray(Vec<MathNode>),
    BorderBox(Box<MathNode>),
    Phantom(Box<MathNode>),
}

/// Translate an `m:oMath` (or any OMML container) into LaTeX.
pub fn to_latex(el: &XmlElement) -> String {
    MathNode::from_xml(el).to_latex()
}

// ── Parsing ───────────────────────────────────────────────────────────────

fn prop<'a>(el: &'a XmlElement, pr: &str, name: &str) -> Option<&'a XmlElement> {
    el.child(pr).and_then(|p| p.child(name))
}

fn prop_val<'a>(el: &'a XmlElement, pr: &str, name: &str) -> Option<&'a str> {
    prop(el, pr, name).and_then(|e| e.attr_local("val"))
}

/// Children of an argument element (`m:e`, `m:num`, ...) as a row.
fn arg(el: &XmlElement, name: &str) -> Box<MathNode> {
    Box::new(match el.child(name) {
        Some(a) => MathNode::row_of(a),
        None => MathNode::Row(Vec::new()),
    })
}

fn optional_arg(el: &XmlElement, name: &str, hidden: bool) -> Option<Box<MathNode>> {
    if hidden {
        return None;
    }
    let node = arg(el, name);
    if node.is_empty() {
        None
    } else {
        Some(node)
    }
}

impl MathNode {
    /// Build the variant tree for an element, treating it as a container.
    pub fn from_xml(el: &XmlElement) -> MathNode {
        match MathNode::from_element(el) {
            Some(node @ MathNode::Row(_)) => node,
            Some(node) => MathNode::Row(vec![node]),
            None => MathNode::Row(Vec::new()),
        }
    }

    fn row_of(el: &XmlElement) -> MathNode {
        MathNode::Row(el.elements().filter_map(MathNode::from_element).collect())
    }

    fn from_element(el: &XmlElement) -> Option<MathNode> {
        let node = match el.name.as_str() {
            "m:r" => {
                let text: String = el.children_named("m:t").map(|t| t.text()).collect();
                let upright = is_on(prop(el, "m:rPr", "m:nor"))
                    || prop_val(el, "m:rPr", "m:sty") == Some("p");
                MathNode::Run { text, upright }
            }
            "m:f" => {
                let kind = match prop_val(el, "m:fPr", "m:type") {
                    Some("skw") => FractionKind::Skewed,
                    Some("lin") => FractionKind::Linear,
                    Some("noBar") => FractionKind::NoBar,
                    _ => FractionKind::Bar,
                };
                MathNode::Fraction {
                    kind,
                    num: arg(el, "m:num"),
                    den: arg(el, "m:den"),
                }
            }
            "m:rad" => {
                let hidden = is_on(prop(el, "m:radPr", "m:degHide"));
                MathNode::Radical {
                    degree: optional_arg(el, "m:deg", hidden),
                    body: arg(el, "m:e"),
                }
            }
            "m:sSup" => MathNode::Sup {
                base: arg(el, "m:e"),
                sup: arg(el, "m:sup"),
            },
            "m:sSub" => MathNode::Sub {
                base: arg(el, "m:e"),
                sub: arg(el, "m:sub"),
            },
            "m:sSubSup" => MathNode::SubSup {
                base: arg(el, "m:e"),
                sub: arg(el, "m:sub"),
                sup: arg(el, "m:sup"),
            },
            "m:sPre" => MathNode::PreScript {
                sub: arg(el, "m:sub"),
                sup: arg(el, "m:sup"),
                base: arg(el, "m:e"),
            },
            "m:nary" => {
                let op = prop_val(el, "m:naryPr", "m:chr").unwrap_or("∫").to_string();
                MathNode::Nary {
                    op,
                    sub: optional_arg(el, "m:sub", is_on(prop(el, "m:naryPr", "m:subHide"))),
                    sup: optional_arg(el, "m:sup", is_on(prop(el, "m:naryPr", "m:supHide"))),
                    body: arg(el, "m:e"),
                }
            }
            "m:d" => MathNode::Delimiter {
                open: prop_val(el, "m:dPr", "m:begChr").unwrap_or("(").to_string(),
                close: prop_val(el, "m:dPr", "m:endChr").unwrap_or(")").to_string(),
                separator: prop_val(el, "m:dPr", "m:sepChr").unwrap_or("|").to_string(),
                items: el.children_named("m:e").map(MathNode::row_of).collect(),
            },
            "m:m" => MathNode::Matrix(
                el.children_named("m:mr")
                    .map(|row| row.children_named("m:e").map(MathNode::row_of).collect())
                    .collect(),
            ),
            "m:func" => MathNode::Function {
                name: arg(el, "m:fName"),
                arg: arg(el, "m:e"),
            },
            "m:acc" => MathNode::Accent {
                chr: prop_val(el, "m:accPr", "m:chr")
                    .unwrap_or("\u{302}")
                    .to_string(),
                body: arg(el, "m:e"),
            },
            "m:bar" => MathNode::Bar {
                top: prop_val(el, "m:barPr", "m:pos") == Some("top"),
                body: arg(el, "m:e"),
            },
            "m:groupChr" => MathNode::GroupChr {
                chr: prop_val(el, "m:groupChrPr", "m:chr")
                    .unwrap_or("\u{23DF}")
                    .to_string(),
                top: prop_val(el, "m:groupChrPr", "m:pos") == Some("top"),
                body: arg(el, "m:e"),
            },
            "m:limLow" => MathNode::LowerLimit {
                base: arg(el, "m:e"),
                limit: arg(el, "m:lim"),
            },
            "m:limUpp" => MathNode::UpperLimit {
                base: arg(el, "m:e"),
                limit: arg(el, "m:lim"),
            },
            "m:eqArr" => MathNode::EqArray(el.children_named("m:e").map(MathNode::row_of).collect()),
            "m:box" => *arg(el, "m:e"),
            "m:borderBox" => MathNode::BorderBox(arg(el, "m:e")),
            "m:phant" => MathNode::Phantom(arg(el, "m:e")),
            name if name.ends_with("Pr") => return None,
            _ => {
                // Containers (m:oMath, m:e, ...) and unknown wrappers.
                let has_elements = el.children.iter().any(|n| matches!(n, XmlNode::Element(_)));
                if !has_elements {
                    return None;
                }
                MathNode::row_of(el)
            }
        };
        Some(node)
    }

    fn is_empty(&self) -> bool {
        match self {
            MathNode::Row(items) => items.iter().all(MathNode::is_empty),
            MathNode::Run { text, .. } => text.is_empty(),
            _ => false,
        }
    }

    // ── Emission ──────────────────────────────────────────────────────────

    pub fn to_latex(&self) -> String {
        let mut buf = LatexBuf::default();
        self.write(&mut buf, false);
        buf.into_string()
    }

    fn render(&self, in_array: bool) -> String {
        let mut buf = LatexBuf::default();
        self.write(&mut buf, in_array);
        buf.into_string()
    }

    fn write(&self, out: &mut LatexBuf, in_array: bool) {
        match self {
            MathNode::Run { text, upright } => write_run(text, *upright, out, in_array),
            MathNode::Row(items) => {
                for item in items {
                    item.write(out, in_array);
                }
            }
            MathNode::Fraction { kind, num, den } => {
                let (n, d) = (num.render(in_array), den.render(in_array));
                out.push(&match kind {
                    FractionKind::Bar => format!(r"\frac{{{n}}}{{{d}}}"),
                    FractionKind::Linear => format!("{}/{}", group_if_needed(&n), group_if_needed(&d)),
                    FractionKind::Skewed => format!("{{}}^{{{n}}}/{{}}_{{{d}}}"),
                    FractionKind::NoBar => format!(r"\genfrac{{}}{{}}{{0pt}}{{}}{{{n}}}{{{d}}}"),
                });
            }
            MathNode::Radical { degree, body } => {
                let b = body.render(in_array);
                match degree {
                    Some(deg) => out.push(&format!(r"\sqrt[{}]{{{b}}}", deg.render(in_array))),
                    None => out.push(&format!(r"\sqrt{{{b}}}")),
                }
            }
            MathNode::Sup { base, sup } => {
                write_base(base, out, in_array);
                out.push(&format!("^{{{}}}", sup.render(in_array)));
            }
            MathNode::Sub { base, sub } => {
                write_base(base, out, in_array);
                out.push(&format!("_{{{}}}", sub.render(in_array)));
            }
            MathNode::SubSup { base, sub, sup } => {
                write_base(base, out, in_array);
                out.push(&format!(
                    "_{{{}}}^{{{}}}",
                    sub.render(in_array),
                    sup.render(in_array)
                ));
            }
            MathNode::PreScript { sub, sup, base } => {
                out.push(&format!(
                    "{{}}_{{{}}}^{{{}}}",
                    sub.render(in_array),
                    sup.render(in_array)
                ));
                base.write(out, in_array);
            }
            MathNode::Nary { op, sub, sup, body } => {
                let mut head = normalize_symbol(op).into_owned();
                if let Some(sub) = sub {
                    head.push_str(&format!("_{{{}}}", sub.render(in_array)));
                }
                if let Some(sup) = sup {
                    head.push_str(&format!("^{{{}}}", sup.render(in_array)));
                }
                out.push(&head);
                body.write(out, in_array);
            }
            MathNode::Delimiter { open, close, separator, items } => {
                let sep = delimiter_symbol(separator);
                let inner: Vec<String> = items.iter().map(|i| i.render(in_array)).collect();
                out.push(&format!(r"\left{}", delimiter_symbol(open)));
                let joined = inner.join(&sep);
                out.push(&joined);
                out.push(&format!(r"\right{}", delimiter_symbol(close)));
            }
            MathNode::Matrix(rows) => {
                let body = rows
                    .iter()
                    .map(|row| {
                        row.iter()
                            .map(|cell| cell.render(in_array))
                            .collect::<Vec<_>>()
                            .join(" & ")
                    })
                    .collect::<Vec<_>>()
                    .join(r" \\ ");
                out.push(&format!(r"\begin{{matrix}}{body}\end{{matrix}}"));
            }
            MathNode::Function { name, arg } => {
                out.push(&function_name(name, in_array));
                arg.write(out, in_array);
            }
            MathNode::Accent { chr, body } => {
                out.push(&format!("{}{{{}}}", accent_macro(chr), body.render(in_array)));
            }
            MathNode::Bar { top, body } => {
                let cmd = if *top { r"\overline" } else { r"\underline" };
                out.push(&format!("{cmd}{{{}}}", body.render(in_array)));
            }
            MathNode::GroupChr { chr, top, body } => {
                let b = body.render(in_array);
                out.push(&match (chr.as_str(), top) {
                    ("\u{23DF}", _) => format!(r"\underbrace{{{b}}}"),
                    ("\u{23DE}", _) => format!(r"\overbrace{{{b}}}"),
                    (c, true) => format!(r"\overset{{{}}}{{{b}}}", normalize_symbol(c)),
                    (c, false) => format!(r"\underset{{{}}}{{{b}}}", normalize_symbol(c)),
                });
            }
            MathNode::LowerLimit { base, limit } => {
                let b = base.render(in_array);
                let l = limit.render(in_array);
                if LIMIT_OPERATORS.contains(&b.as_str()) {
                    out.push(&format!("{b}_{{{l}}}"));
                } else {
                    out.push(&format!(r"\underset{{{l}}}{{{b}}}"));
                }
            }
            MathNode::UpperLimit { base, limit } => {
                let b = base.render(in_array);
                let l = limit.render(in_array);
                if LIMIT_OPERATORS.contains(&b.as_str()) {
                    out.push(&format!("{b}^{{{l}}}"));
                } else {
                    out.push(&format!(r"\overset{{{l}}}{{{b}}}"));
                }
            }
            MathNode::EqArray(rows) => {
                let body = rows
                    .iter()
                    .map(|r| r.render(true))
                    .collect::<Vec<_>>()
                    .join(r" \\ ");
                out.push(&format!(r"\begin{{aligned}}{body}\end{{aligned}}"));
            }
            MathNode::BorderBox(body) => {
                out.push(&format!(r"\boxed{{{}}}", body.render(in_array)));
            }
            MathNode::Phantom(body) => {
                out.push(&format!(r"\phantom{{{}}}", body.render(in_array)));
            }
        }
    }
}

fn write_run(text: &str, upright: bool, out: &mut LatexBuf, in_array: bool) {
    if upright && text.chars().filter(|c| c.is_alphabetic()).count() >= 2 {
        if KNOWN_FUNCTIONS.contains(&text) {
            out.push(&format!(r"\{text}"));
        } else {
            out.push(&format!(r"\mathrm{{{}}}", escape_text(text, in_array)));
        }
        return;
    }
    for glyph in split_glyphs(text) {
        match escape_ascii(glyph, in_array) {
            Some(escaped) => out.push(escaped),
            None => out.push(&normalize_symbol(glyph)),
        }
    }
}

fn escape_ascii(glyph: &str, in_array: bool) -> Option<&'static str> {
    Some(match glyph {
        "{" => r"\{",
        "}" => r"\}",
        "%" => r"\%",
        "#" => r"\#",
        "_" => r"\_",
        "$" => r"\$",
        "\\" => r"\backslash",
        "&" if !in_array => r"\&",
        _ => return None,
    })
}

fn escape_text(text: &str, in_array: bool) -> String {
    split_glyphs(text)
        .into_iter()
        .map(|g| escape_ascii(g, in_array).unwrap_or(g))
        .collect()
}

/// Scripts bind to the last atom, so multi-atom bases are grouped.
fn write_base(base: &MathNode, out: &mut LatexBuf, in_array: bool) {
    let rendered = base.render(in_array);
    if rendered.is_empty() {
        out.push("{}");
    } else {
        out.push(&group_if_needed(&rendered));
    }
}

fn group_if_needed(s: &str) -> String {
    if is_atom(s) {
        s.to_string()
    } else {
        format!("{{{s}}}")
    }
}

/// A single character, a control word with its brace arguments, a
/// `\left..\right` group, or one brace group.
fn is_atom(s: &str) -> bool {
    if s.chars().count() <= 1 {
        return true;
    }
    if control_word_at(s, r"\left") {
        return left_right_len(s) == Some(s.len());
    }
    let bytes = s.as_bytes();
    let mut i = 0;
    if bytes[0] == b'\\' {
        i = 1;
        while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
            i += 1;
        }
        if i == 1 {
            // Control symbol such as `\{`.
            i = bytes.len().min(2);
        }
    }
    while i < bytes.len() {
        let (openc, closec) = match bytes[i] {
            b'{' => (b'{', b'}'),
            b'[' => (b'[', b']'),
            _ => return false,
        };
        let mut depth = 0usize;
        while i < bytes.len() {
            if bytes[i] == b'\\' {
                i += 2;
                continue;
            }
            if bytes[i] == openc {
                depth += 1;
            } else if bytes[i] == closec {
                depth -= 1;
                if depth == 0 {
                    i += 1;
                    break;
                }
            }
            i += 1;
        }
        if depth != 0 {
            return false;
        }
    }
    true
}

/// `s` starts with exactly the control word `word` (`\left`, not `\leftarrow`).
fn control_word_at(s: &str, word: &str) -> bool {
    s.starts_with(word)
        && !s
            .as_bytes()
            .get(word.len())
            .is_some_and(|b| b.is_ascii_alphabetic())
}

/// Byte length of the balanced `\left … \right<delim>` group opening `s`.
fn left_right_len(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = 0;
    while i < s.len() {
        let rest = &s[i..];
        if control_word_at(rest, r"\left") {
            depth += 1;
            i += 5;
        } else if control_word_at(rest, r"\right") {
            if depth == 0 {
                return None;
            }
            depth -= 1;
            i += 6;
            if depth == 0 {
                return Some(i + delimiter_len(&s[i..]));
            }
        } else if let Some(after) = rest.strip_prefix('\\') {
            i += 1 + after.chars().next().map_or(0, char::len_utf8);
        } else {
            i += rest.chars().next().map_or(1, char::len_utf8);
        }
    }
    None
}

/// Length of the delimiter after `\right`: `)`, `.`, `\}` or `\rangle`.
fn delimiter_len(s: &str) -> usize {
    match s.strip_prefix('\\') {
        Some(after) => {
            let word = after.bytes().take_while(u8::is_ascii_alphabetic).count();
            if word > 0 {
                1 + word
            } else {
                1 + after.chars().next().map_or(0, char::len_utf8)
            }
        }
        None => s.chars().next().map_or(0, char::len_utf8),
    }
}

fn function_name(name: &MathNode, in_array: bool) -> String {
    if let MathNode::Row(items) = name {
        if let [MathNode::Run { text, .. }] = items.as_slice() {
            if KNOWN_FUNCTIONS.contains(&text.as_str()) {
                return format!(r"\{text}");
            }
            if text.chars().count() > 1 && text.chars().all(|c| c.is_alphabetic()) {
                return format!(r"\operatorname{{{text}}}");
            }
        }
    }
    name.render(in_array)
}

fn delimiter_symbol(chr: &str) -> String {
    match chr {
        "" => ".".to_string(),
        "{" => r"\{".to_string(),
        "}" => r"\}".to_string(),
        "|" => "|".to_string(),
        other => normalize_symbol(other).into_owned(),
    }
}

fn accent_macro(chr: &str) -> &'static str {
    match chr {
        "\u{302}" | "^" | "ˆ" => r"\hat",
        "\u{303}" | "~" | "˜" => r"\tilde",
        "\u{304}" | "\u{305}" | "¯" => r"\bar",
        "\u{307}" | "˙" => r"\dot",
        "\u{308}" | "¨" => r"\ddot",
        "\u{20DB}" => r"\dddot",
        "\u{20D7}" | "\u{20D1}" | "→" => r"\vec",
        "\u{30C}" | "ˇ" => r"\check",
        "\u{306}" | "˘" => r"\breve",
        "\u{301}" | "´" => r"\acute",
        "\u{300}" | "`" => r"\grave",
        _ => r"\hat",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::xml::parse;

    fn latex(inner: &str) -> String {
        let xml = format!(r#"<m:oMath xmlns:m="m">{inner}</m:oMath>"#);
        to_latex(&parse(&xml).unwrap())
    }

    fn r(t: &str) -> String {
        format!("<m:r><m:t>{t}</m:t></m:r>")
    }

    #[test]
    fn empty_equation_is_empty_string() {
        assert_eq!(latex(""), "");
        assert_eq!(latex("<m:r><m:rPr/></m:r>"), "");
    }

    #[test]
    fn simple_runs_and_symbols() {
        assert_eq!(latex(&r("a+b=c")), "a+b=c");
        assert_eq!(latex(&r("α≤β")), r"\alpha \leq \beta");
        assert_eq!(latex(&r("x∈A")), r"x\in A");
    }

    #[test]
    fn escapes_latex_specials_in_text() {
        assert_eq!(latex(&r("50%")), r"50\%");
        assert_eq!(latex(&r("{a}")), r"\{a\}");
    }

    #[test]
    fn fraction_of_partials() {
        let xml = format!(
            "<m:f><m:num>{}</m:num><m:den>{}</m:den></m:f>",
            r("∂p"),
            r("∂θ")
        );
        assert_eq!(latex(&xml), r"\frac{\partial p}{\partial \theta}");
    }

    #[test]
    fn linear_and_nobar_fractions() {
        let lin = format!(
            r#"<m:f><m:fPr><m:type m:val="lin"/></m:fPr><m:num>{}</m:num><m:den>{}</m:den></m:f>"#,
            r("a"),
            r("b+c")
        );
        assert_eq!(latex(&lin), "a/{b+c}");
        let nobar = format!(
            r#"<m:f><m:fPr><m:type m:val="noBar"/></m:fPr><m:num>{}</m:num><m:den>{}</m:den></m:f>"#,
            r("n"),
            r("k")
        );
        assert_eq!(latex(&nobar), r"\genfrac{}{}{0pt}{}{n}{k}");
    }

    #[test]
    fn radicals_with_and_without_degree() {
        let sqrt = format!(
            r#"<m:rad><m:radPr><m:degHide m:val="1"/></m:radPr><m:deg/><m:e>{}</m:e></m:rad>"#,
            r("x")
        );
        assert_eq!(latex(&sqrt), r"\sqrt{x}");
        let cube = format!(
            "<m:rad><m:deg>{}</m:deg><m:e>{}</m:e></m:rad>",
            r("3"),
            r("y")
        );
        assert_eq!(latex(&cube), r"\sqrt[3]{y}");
    }

    #[test]
    fn scripts() {
        let sup = format!("<m:sSup><m:e>{}</m:e><m:sup>{}</m:sup></m:sSup>", r("x"), r("2"));
        assert_eq!(latex(&sup), "x^{2}");
        let sub_sup = format!(
            "<m:sSubSup><m:e>{}</m:e><m:sub>{}</m:sub><m:sup>{}</m:sup></m:sSubSup>",
            r("a"),
            r("i"),
            r("n")
        );
        assert_eq!(latex(&sub_sup), "a_{i}^{n}");
        let grouped = format!("<m:sSub><m:e>{}</m:e><m:sub>{}</m:sub></m:sSub>", r("ab"), r("0"));
        assert_eq!(latex(&grouped), "{ab}_{0}");
        let pre = format!(
            "<m:sPre><m:sub>{}</m:sub><m:sup>{}</m:sup><m:e>{}</m:e></m:sPre>",
            r("1"),
            r("2"),
            r("X")
        );
        assert_eq!(latex(&pre), "{}_{1}^{2}X");
    }

    #[test]
    fn nary_sum_with_limits() {
        let xml = format!(
            r#"<m:nary><m:naryPr><m:chr m:val="∑"/></m:naryPr><m:sub>{}</m:sub><m:sup>{}</m:sup><m:e>{}</m:e></m:nary>"#,
            r("i=1"),
            r("n"),
            r("i")
        );
        assert_eq!(latex(&xml), r"\sum_{i=1}^{n}i");
    }

    #[test]
    fn nary_defaults_to_integral_and_hides_limits() {
        let xml = format!(
            r#"<m:nary><m:naryPr><m:subHide m:val="1"/><m:supHide m:val="1"/></m:naryPr><m:sub/><m:sup/><m:e>{}</m:e></m:nary>"#,
            r("f")
        );
        assert_eq!(latex(&xml), r"\int f");
    }

    #[test]
    fn delimiters() {
        let parens = format!("<m:d><m:e>{}</m:e></m:d>", r("x+1"));
        assert_eq!(latex(&parens), r"\left(x+1\right)");
        let braces = format!(
            r#"<m:d><m:dPr><m:begChr m:val="{{"/><m:endChr m:val=""/></m:dPr><m:e>{}</m:e></m:d>"#,
            r("a")
        );
        assert_eq!(latex(&braces), r"\left\{a\right.");
        let sep = format!(
            r#"<m:d><m:dPr><m:begChr m:val="⟨"/><m:sepChr m:val=","/><m:endChr m:val="⟩"/></m:dPr><m:e>{}</m:e><m:e>{}</m:e></m:d>"#,
            r("u"),
            r("v")
        );
        assert_eq!(latex(&sep), r"\left\langle u,v\right\rangle");
    }

    #[test]
    fn matrix_of_fractions_inside_brackets() {
        let frac = |a: &str, b: &str| {
            format!("<m:f><m:num>{}</m:num><m:den>{}</m:den></m:f>", r(a), r(b))
        };
        let xml = format!(
            r#"<m:d><m:dPr><m:begChr m:val="["/><m:endChr m:val="]"/></m:dPr><m:e><m:m><m:mr><m:e>{}</m:e><m:e>{}</m:e></m:mr><m:mr><m:e>{}</m:e><m:e>{}</m:e></m:mr></m:m></m:e></m:d>"#,
            frac("1", "2"),
            r("0"),
            r("0"),
            frac("3", "4")
        );
        assert_eq!(
            latex(&xml),
            r"\left[\begin{matrix}\frac{1}{2} & 0 \\ 0 & \frac{3}{4}\end{matrix}\right]"
        );
    }

    #[test]
    fn functions_and_limits() {
        let sin = format!(
            r#"<m:func><m:fName><m:r><m:rPr><m:sty m:val="p"/></m:rPr><m:t>sin</m:t></m:r></m:fName><m:e>{}</m:e></m:func>"#,
            r("x")
        );
        assert_eq!(latex(&sin), r"\sin x");
        let custom = format!(
            "<m:func><m:fName>{}</m:fName><m:e>{}</m:e></m:func>",
            r("sgn"),
            r("x")
        );
        assert_eq!(latex(&custom), r"\operatorname{sgn}x");
        let lim = format!(
            r#"<m:func><m:fName><m:limLow><m:e><m:r><m:rPr><m:sty m:val="p"/></m:rPr><m:t>lim</m:t></m:r></m:e><m:lim>{}</m:lim></m:limLow></m:fName><m:e>{}</m:e></m:func>"#,
            r("x→0"),
            r("f")
        );
        assert_eq!(latex(&lim), r"\lim_{x\rightarrow0}f");
    }

    #[test]
    fn accents_bars_and_groups() {
        let hat = format!("<m:acc><m:e>{}</m:e></m:acc>", r("x"));
        assert_eq!(latex(&hat), r"\hat{x}");
        let vec = format!(
            r#"<m:acc><m:accPr><m:chr m:val="&#x20D7;"/></m:accPr><m:e>{}</m:e></m:acc>"#,
            r("v")
        );
        assert_eq!(latex(&vec), r"\vec{v}");
        let over = format!(
            r#"<m:bar><m:barPr><m:pos m:val="top"/></m:barPr><m:e>{}</m:e></m:bar>"#,
            r("z")
        );
        assert_eq!(latex(&over), r"\overline{z}");
        let brace = format!("<m:groupChr><m:e>{}</m:e></m:groupChr>", r("a+b"));
        assert_eq!(latex(&brace), r"\underbrace{a+b}");
    }

    #[test]
    fn equation_array_keeps_alignment() {
        let xml = format!(
            "<m:eqArr><m:e>{}</m:e><m:e>{}</m:e></m:eqArr>",
            r("x&amp;=1"),
            r("y&amp;=2")
        );
        assert_eq!(latex(&xml), r"\begin{aligned}x&=1 \\ y&=2\end{aligned}");
    }

    #[test]
    fn upright_words_become_mathrm() {
        let xml = r#"<m:r><m:rPr><m:nor/></m:rPr><m:t>speed</m:t></m:r>"#;
        assert_eq!(latex(xml), r"\mathrm{speed}");
    }

    #[test]
    fn atom_detection() {
        assert!(is_atom("x"));
        assert!(is_atom(r"\alpha"));
        assert!(is_atom(r"\frac{a}{b}"));
        assert!(is_atom(r"\left(x\right)"));
        assert!(is_atom(r"\left(a\left[b\right]\right)"));
        assert!(is_atom(r"\left\{a\right."));
        assert!(is_atom(r"\left\langle u,v\right\rangle"));
        assert!(!is_atom(r"\left(a\right)b"));
        assert!(!is_atom(r"\left(a\right)\left(b\right)"));
        assert!(!is_atom(r"\leftarrow x"));
        assert!(!is_atom("ab"));
        assert!(!is_atom(r"\alpha b"));
    }

    #[test]
    fn script_on_delimiter_followed_by_more_is_grouped() {
        let xml = format!(
            "<m:sSup><m:e><m:d><m:e>{}</m:e></m:d>{}</m:e><m:sup>{}</m:sup></m:sSup>",
            r("a"),
            r("b"),
            r("2")
        );
        assert_eq!(latex(&xml), r"{\left(a\right)b}^{2}");
        let alone = format!(
            "<m:sSup><m:e><m:d><m:e>{}</m:e></m:d></m:e><m:sup>{}</m:sup></m:sSup>",
            r("a"),
            r("2")
        );
        assert_eq!(latex(&alone), r"\left(a\right)^{2}");
    }
}
