//! Unicode math glyph → LaTeX macro table.
//!
//! Word stores formulas as Unicode (`α`, `∑`, `≤`); LaTeX wants macros. The
//! table below covers Greek letters, operators, relations, arrows, set and
//! logic symbols, big operators and miscellaneous glyphs. Anything not in the
//! table passes through unchanged, so plain ASCII is never altered.
//!
//! A handful of keys are two or three code points long (stacked integrals,
//! glyphs followed by U+0338 COMBINING LONG SOLIDUS OVERLAY for negation).
//! [`split_glyphs`] matches those greedily before falling back to single
//! characters.

use once_cell::sync::Lazy;
use std::borrow::Cow;
use std::collections::HashMap;

/// Multi-code-point sequences, longest first.
const LIGATURES: &[(&str, &str)] = &[
    ("∫∫∫", r"\iiint"),
    ("∫∫", r"\iint"),
    ("∮∮", r"\oiint"),
    ("=\u{338}", r"\neq"),
    ("<\u{338}", r"\nless"),
    (">\u{338}", r"\ngtr"),
    ("∈\u{338}", r"\notin"),
    ("⊂\u{338}", r"\not\subset"),
    ("⊃\u{338}", r"\not\supset"),
    ("≡\u{338}", r"\not\equiv"),
];

const SYMBOL_TABLE: &[(&str, &str)] = &[
    // ── Greek lowercase ──
    ("α", r"\alpha"),
    ("β", r"\beta"),
    ("γ", r"\gamma"),
    ("δ", r"\delta"),
    ("ε", r"\varepsilon"),
    ("ϵ", r"\epsilon"),
    ("ζ", r"\zeta"),
    ("η", r"\eta"),
    ("θ", r"\theta"),
    ("ϑ", r"\vartheta"),
    ("ι", r"\iota"),
    ("κ", r"\kappa"),
    ("λ", r"\lambda"),
    ("μ", r"\mu"),
    ("ν", r"\nu"),
    ("ξ", r"\xi"),
    ("ο", "o"),
    ("π", r"\pi"),
    ("ϖ", r"\varpi"),
    ("ρ", r"\rho"),
    ("ϱ", r"\varrho"),
    ("σ", r"\sigma"),
    ("ς", r"\varsigma"),
    ("τ", r"\tau"),
    ("υ", r"\upsilon"),
    ("φ", r"\varphi"),
    ("ϕ", r"\phi"),
    ("χ", r"\chi"),
    ("ψ", r"\psi"),
    ("ω", r"\omega"),
    // ── Greek uppercase ──
    ("Γ", r"\Gamma"),
    ("Δ", r"\Delta"),
    ("Θ", r"\Theta"),
    ("Λ", r"\Lambda"),
    ("Ξ", r"\Xi"),
    ("Π", r"\Pi"),
    ("Σ", r"\Sigma"),
    ("Υ", r"\Upsilon"),
    ("Φ", r"\Phi"),
    ("Ψ", r"\Psi"),
    ("Ω", r"\Omega"),
    // ── Binary operators ──
    ("±", r"\pm"),
    ("∓", r"\mp"),
    ("×", r"\times"),
    ("÷", r"\div"),
    ("·", r"\cdot"),
    ("⋅", r"\cdot"),
    ("∗", r"\ast"),
    ("∘", r"\circ"),
    ("•", r"\bullet"),
    ("⊕", r"\oplus"),
    ("⊗", r"\otimes"),
    ("⊙", r"\odot"),
    ("∧", r"\wedge"),
    ("∨", r"\vee"),
    ("∩", r"\cap"),
    ("∪", r"\cup"),
    ("∖", r"\setminus"),
    ("†", r"\dagger"),
    ("−", "-"),
    // ── Relations ──
    ("≤", r"\leq"),
    ("≥", r"\geq"),
    ("≠", r"\neq"),
    ("≈", r"\approx"),
    ("≡", r"\equiv"),
    ("∼", r"\sim"),
    ("≃", r"\simeq"),
    ("≅", r"\cong"),
    ("∝", r"\propto"),
    ("≪", r"\ll"),
    ("≫", r"\gg"),
    ("≺", r"\prec"),
    ("≻", r"\succ"),
    ("⊂", r"\subset"),
    ("⊃", r"\supset"),
    ("⊆", r"\subseteq"),
    ("⊇", r"\supseteq"),
    ("∈", r"\in"),
    ("∉", r"\notin"),
    ("∋", r"\ni"),
    ("⊥", r"\perp"),
    ("∥", r"\parallel"),
    ("∣", r"\mid"),
    ("⊢", r"\vdash"),
    ("≐", r"\doteq"),
    ("≜", r"\triangleq"),
    // ── Arrows ──
    ("→", r"\rightarrow"),
    ("←", r"\leftarrow"),
    ("↔", r"\leftrightarrow"),
    ("⇒", r"\Rightarrow"),
    ("⇐", r"\Leftarrow"),
    ("⇔", r"\Leftrightarrow"),
    ("↑", r"\uparrow"),
    ("↓", r"\downarrow"),
    ("↦", r"\mapsto"),
    ("⟶", r"\longrightarrow"),
    ("⟹", r"\Longrightarrow"),
    ("⟺", r"\Longleftrightarrow"),
    ("↗", r"\nearrow"),
    ("↘", r"\searrow"),
    ("⇌", r"\rightleftharpoons"),
    // ── Big operators ──
    ("∑", r"\sum"),
    ("∏", r"\prod"),
    ("∐", r"\coprod"),
    ("∫", r"\int"),
    ("∬", r"\iint"),
    ("∭", r"\iiint"),
    ("∮", r"\oint"),
    ("∯", r"\oiint"),
    ("⋃", r"\bigcup"),
    ("⋂", r"\bigcap"),
    ("⋁", r"\bigvee"),
    ("⋀", r"\bigwedge"),
    ("⨁", r"\bigoplus"),
    ("⨂", r"\bigotimes"),
    // ── Logic and sets ──
    ("∀", r"\forall"),
    ("∃", r"\exists"),
    ("∄", r"\nexists"),
    ("¬", r"\neg"),
    ("∅", r"\emptyset"),
    ("ℕ", r"\mathbb{N}"),
    ("ℤ", r"\mathbb{Z}"),
    ("ℚ", r"\mathbb{Q}"),
    ("ℝ", r"\mathbb{R}"),
    ("ℂ", r"\mathbb{C}"),
    ("∴", r"\therefore"),
    ("∵", r"\because"),
    // ── Delimiters ──
    ("⟨", r"\langle"),
    ("⟩", r"\rangle"),
    ("⌊", r"\lfloor"),
    ("⌋", r"\rfloor"),
    ("⌈", r"\lceil"),
    ("⌉", r"\rceil"),
    ("‖", r"\|"),
    // ── Miscellaneous ──
    ("∞", r"\infty"),
    ("∂", r"\partial"),
    ("∇", r"\nabla"),
    ("ℏ", r"\hbar"),
    ("ℓ", r"\ell"),
    ("ℜ", r"\Re"),
    ("ℑ", r"\Im"),
    ("ℵ", r"\aleph"),
    ("′", r"\prime"),
    ("°", r"^{\circ}"),
    ("…", r"\ldots"),
    ("⋯", r"\cdots"),
    ("⋮", r"\vdots"),
    ("⋱", r"\ddots"),
    ("∠", r"\angle"),
    ("△", r"\triangle"),
    ("√", r"\surd"),
];

static SYMBOLS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    SYMBOL_TABLE
        .iter()
        .chain(LIGATURES.iter())
        .copied()
        .collect()
});

/// Map one glyph (or recognised ligature) to its LaTeX form.
///
/// Unknown glyphs are returned unchanged.
pub fn normalize_symbol(glyph: &str) -> Cow<'_, str> {
    match SYMBOLS.get(glyph) {
        Some(mapped) => Cow::Borrowed(*mapped),
        None => Cow::Borrowed(glyph),
    }
}

/// Normalise every glyph of `text`, keeping control words separated from
/// following letters (`∂θ` → `\partial \theta`).
pub fn normalize_text(text: &str) -> String {
    let mut buf = LatexBuf::default();
    for glyph in split_glyphs(text) {
        buf.push(&normalize_symbol(glyph));
    }
    buf.into_string()
}

/// Split text into glyph units, matching ligatures greedily.
pub fn split_glyphs(text: &str) -> Vec<&str> {
    let mut out = Vec::with_capacity(text.len());
    let mut rest = text;
    while let Some(c) = rest.chars().next() {
        let len = LIGATURES
            .iter()
            .find(|(lig, _)| rest.starts_with(lig))
            .map(|(lig, _)| lig.len())
            .unwrap_or_else(|| c.len_utf8());
        out.push(&rest[..len]);
        rest = &rest[len..];
    }
    out
}

/// Accumulates LaTeX pieces, inserting a space where a control word would
/// otherwise run into the next letter.
#[derive(Debug, Default)]
pub struct LatexBuf {
    out: String,
    open_word: bool,
}

impl LatexBuf {
    pub fn push(&mut self, piece: &str) {
        if piece.is_empty() {
            return;
        }
        if self.open_word && starts_with_letter_or_word(piece) {
            self.out.push(' ');
        }
        self.out.push_str(piece);
        self.open_word = ends_with_control_word(piece);
    }

    pub fn is_empty(&self) -> bool {
        self.out.is_empty()
    }

    pub fn into_string(self) -> String {
        self.out
    }
}

fn ends_with_control_word(s: &str) -> bool {
    let trimmed = s.trim_end_matches(|c: char| c.is_ascii_alphabetic());
    if trimmed.len() == s.len() {
        return false;
    }
    let slashes = trimmed.len() - trimmed.trim_end_matches('\\').len();
    slashes % 2 == 1
}

fn starts_with_letter_or_word(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => true,
        Some('\\') => chars.next().is_some_and(|c| c.is_ascii_alphabetic()),
        _ => false,
    }
}
