use std::iter::Peekable;
use std::str::Chars;

use crate::fonts::FontFace;

/// A piece of a statement body.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Segment<'a> {
    Text(&'a str),
    Math { tex: &'a str, display: bool },
}

/// Split a body into text and math spans. Delimiters are `$..$`, `\(..\)`
/// (inline) and `$$..$$`, `\[..\]` (display). `\$` is a literal dollar, and an
/// unterminated opener stays in the text.
pub(crate) fn split_segments(body: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut text_start = 0;
    let mut i = 0;
    let bytes = body.as_bytes();

    while i < bytes.len() {
        let rest = &body[i..];
        let opener = if rest.starts_with("\\$") {
            i += 2;
            continue;
        } else if rest.starts_with("$$") {
            Some(("$$", "$$", true))
        } else if rest.starts_with('$') {
            Some(("$", "$", false))
        } else if rest.starts_with("\\(") {
            Some(("\\(", "\\)", false))
        } else if rest.starts_with("\\[") {
            Some(("\\[", "\\]", true))
        } else {
            None
        };

        let Some((open, close, display)) = opener else {
            i += rest.chars().next().map_or(1, char::len_utf8);
            continue;
        };
        let inner_start = i + open.len();
        match find_closer(&body[inner_start..], close) {
            Some(len) if len > 0 => {
                if text_start < i {
                    out.push(Segment::Text(&body[text_start..i]));
                }
                out.push(Segment::Math {
                    tex: &body[inner_start..inner_start + len],
                    display,
                });
                i = inner_start + len + close.len();
                text_start = i;
            }
            _ => i = inner_start,
        }
    }
    if text_start < body.len() {
        out.push(Segment::Text(&body[text_start..]));
    }
    out
}

/// Byte length up to the first unescaped `close`.
fn find_closer(s: &str, close: &str) -> Option<usize> {
    let mut i = 0;
    while i < s.len() {
        let rest = &s[i..];
        if close == "$" && rest.starts_with("\\$") {
            i += 2;
            continue;
        }
        if rest.starts_with(close) {
            return Some(i);
        }
        i += rest.chars().next().map_or(1, char::len_utf8);
    }
    None
}

/// One positioned mark inside a `MathBox`. `y` is the baseline offset, positive downward.
#[derive(Clone, Debug, PartialEq)]
pub enum MathItem {
    Glyph { ch: char, size: f32, x: f32, y: f32 },
    Rule { x: f32, y: f32, w: f32, h: f32 },
}

/// Typeset formula, relative to its own baseline origin.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MathBox {
    pub width: f32,
    pub ascent: f32,
    pub descent: f32,
    pub items: Vec<MathItem>,
}

impl MathBox {
    fn append(&mut self, other: MathBox, dx: f32, dy: f32) {
        self.ascent = self.ascent.max(other.ascent - dy);
        self.descent = self.descent.max(other.descent + dy);
        self.width = self.width.max(dx + other.width);
        self.items.extend(other.items.into_iter().map(|item| match item {
            MathItem::Glyph { ch, size, x, y } => MathItem::Glyph {
                ch,
                size,
                x: x + dx,
                y: y + dy,
            },
            MathItem::Rule { x, y, w, h } => MathItem::Rule {
                x: x + dx,
                y: y + dy,
                w,
                h,
            },
        }));
    }

    fn push_right(&mut self, other: MathBox) {
        let dx = self.width;
        self.append(other, dx, 0.0);
    }
}

/// Turns a TeX fragment into a box using the run's glyph metrics.
///
/// Called from a blocking worker; implementations may take arbitrarily long,
/// which is why block heights are only read after all jobs have settled.
pub trait Typesetter: Send + Sync {
    fn typeset(&self, tex: &str, display: bool, size: f32, font: &FontFace) -> MathBox;
}

/// Built-in typesetter for the TeX subset found in lecture notes.
#[derive(Clone, Copy, Debug, Default)]
pub struct TexTypesetter;

impl Typesetter for TexTypesetter {
    fn typeset(&self, tex: &str, display: bool, size: f32, font: &FontFace) -> MathBox {
        let nodes = Parser::new(tex).parse_list(false);
        let size = if display { size * 1.1 } else { size };
        layout_list(&nodes, size, font)
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Node {
    Sym(String),
    Op(char),
    Text(String),
    Space(f32),
    Group(Vec<Node>),
    Scripts {
        base: Box<Node>,
        sup: Option<Box<Node>>,
        sub: Option<Box<Node>>,
    },
    Frac(Box<Node>, Box<Node>),
    Sqrt(Box<Node>),
}

/// Deepest group, script or fraction nesting parsed as structure. Anything
/// nested further is kept as literal text.
const MAX_NESTING: usize = 64;

struct Parser<'a> {
    chars: Peekable<Chars<'a>>,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(tex: &'a str) -> Self {
        Parser {
            chars: tex.chars().peekable(),
            depth: 0,
        }
    }

    fn parse_list(&mut self, in_group: bool) -> Vec<Node> {
        let mut nodes: Vec<Node> = Vec::new();
        while let Some(&ch) = self.chars.peek() {
            match ch {
                '}' => {
                    self.chars.next();
                    if in_group {
                        break;
                    }
                }
                '^' | '_' => {
                    self.chars.next();
                    let script = self.parse_atom().unwrap_or(Node::Group(Vec::new()));
                    let prev = nodes.pop().unwrap_or(Node::Group(Vec::new()));
                    nodes.push(attach_script(prev, ch == '^', script));
                }
                _ => {
                    if let Some(node) = self.parse_atom() {
                        nodes.push(node);
                    }
                }
            }
        }
        nodes
    }

    fn skip_ws(&mut self) {
        while self.chars.peek().is_some_and(|c| c.is_whitespace()) {
            self.chars.next();
        }
    }

    /// Next single node, or None at the end of input or a closing brace.
    fn parse_atom(&mut self) -> Option<Node> {
        self.skip_ws();
        let ch = *self.chars.peek()?;
        if ch == '}' {
            return None;
        }
        if self.depth >= MAX_NESTING {
            return Some(Node::Text(self.chars.by_ref().collect()));
        }
        self.chars.next();
        self.depth += 1;
        let node = match ch {
            '{' => Node::Group(self.parse_list(true)),
            '\\' => self.parse_command(),
            '-' => Node::Op('\u{2212}'),
            '+' | '=' | '<' | '>' | ',' | ';' | ':' => Node::Op(ch),
            '\'' => Node::Sym("\u{2032}".into()),
            _ => Node::Sym(ch.to_string()),
        };
        self.depth -= 1;
        Some(node)
    }

    fn read_command_name(&mut self) -> String {
        let mut name = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_alphabetic() {
                name.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        if name.is_empty()
            && let Some(c) = self.chars.next()
        {
            name.push(c);
        }
        name
    }

    /// Raw text of a braced argument, braces balanced.
    fn read_raw_group(&mut self) -> String {
        self.skip_ws();
        if self.chars.peek() != Some(&'{') {
            return self.chars.next().map(String::from).unwrap_or_default();
        }
        self.chars.next();
        let mut depth = 1;
        let mut out = String::new();
        for c in self.chars.by_ref() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            out.push(c);
        }
        out
    }

    fn parse_command(&mut self) -> Node {
        let name = self.read_command_name();
        match name.as_str() {
            "frac" | "dfrac" | "tfrac" => {
                let num = self.parse_atom().unwrap_or(Node::Group(Vec::new()));
                let den = self.parse_atom().unwrap_or(Node::Group(Vec::new()));
                Node::Frac(Box::new(num), Box::new(den))
            }
            "sqrt" => {
                self.skip_ws();
                if self.chars.peek() == Some(&'[') {
                    // index is dropped
                    for c in self.chars.by_ref() {
                        if c == ']' {
                            break;
                        }
                    }
                }
                Node::Sqrt(Box::new(self.parse_atom().unwrap_or(Node::Group(Vec::new()))))
            }
            "text" | "textrm" | "textit" | "textbf" | "mathrm" | "operatorname" => {
                Node::Text(self.read_raw_group())
            }
            "mathbb" | "mathbf" | "mathcal" | "mathfrak" | "boldsymbol" => {
                let raw = self.read_raw_group();
                let styled: String = raw
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .map(|c| if name == "mathbb" { blackboard(c) } else { c })
                    .collect();
                Node::Sym(styled)
            }
            "left" | "right" | "big" | "Big" | "bigl" | "bigr" | "Bigl" | "Bigr" => {
                self.skip_ws();
                match self.chars.next() {
                    Some('.') | None => Node::Group(Vec::new()),
                    Some('\\') => {
                        let delim = self.read_command_name();
                        Node::Sym(symbol(&delim).map(String::from).unwrap_or(delim))
                    }
                    Some(c) => Node::Sym(c.to_string()),
                }
            }
            "," | ":" | ">" => Node::Space(0.17),
            ";" => Node::Space(0.28),
            " " => Node::Space(0.25),
            "!" => Node::Space(0.0),
            "quad" => Node::Space(1.0),
            "qquad" => Node::Space(2.0),
            "{" | "}" | "$" | "%" | "&" | "#" | "_" | "|" => Node::Sym(name),
            "\\" => Node::Space(0.5),
            _ => match symbol(&name) {
                Some(s) if is_relation(s) => s.chars().next().map_or(Node::Sym(s.into()), Node::Op),
                Some(s) => Node::Sym(s.into()),
                None if is_named_operator(&name) => Node::Text(name),
                None => Node::Sym(format!("\\{name}")),
            },
        }
    }
}

fn attach_script(prev: Node, is_sup: bool, script: Node) -> Node {
    match prev {
        Node::Scripts { base, sup, sub } => {
            let (sup, sub) = if is_sup {
                (Some(Box::new(script)), sub)
            } else {
                (sup, Some(Box::new(script)))
            };
            Node::Scripts { base, sup, sub }
        }
        base => {
            let script = Some(Box::new(script));
            let (sup, sub) = if is_sup { (script, None) } else { (None, script) };
            Node::Scripts {
                base: Box::new(base),
                sup,
                sub,
            }
        }
    }
}

fn blackboard(c: char) -> char {
    match c {
        'C' => 'ℂ',
        'N' => 'ℕ',
        'P' => 'ℙ',
        'Q' => 'ℚ',
        'R' => 'ℝ',
        'Z' => 'ℤ',
        'H' => 'ℍ',
        other => other,
    }
}

fn is_named_operator(name: &str) -> bool {
    matches!(
        name,
        "sin" | "cos" | "tan" | "log" | "ln" | "exp" | "lim" | "sup" | "inf" | "max" | "min"
            | "det" | "dim" | "ker" | "deg" | "gcd" | "arg" | "Pr" | "mod" | "limsup" | "liminf"
    )
}

fn is_relation(s: &str) -> bool {
    matches!(
        s,
        "≤" | "≥" | "≠" | "≈" | "≡" | "∼" | "≅" | "∈" | "∉" | "⊂" | "⊆" | "⊃" | "⊇" | "→" | "←"
            | "↔" | "⇒" | "⇐" | "⇔" | "↦" | "×" | "·" | "±" | "∪" | "∩" | "∘" | "⊕" | "⊗" | "∣"
            | "∧" | "∨"
    )
}

fn symbol(name: &str) -> Option<&'static str> {
    Some(match name {
        "alpha" => "α",
        "beta" => "β",
        "gamma" => "γ",
        "delta" => "δ",
        "epsilon" | "varepsilon" => "ε",
        "zeta" => "ζ",
        "eta" => "η",
        "theta" | "vartheta" => "θ",
        "iota" => "ι",
        "kappa" => "κ",
        "lambda" => "λ",
        "mu" => "μ",
        "nu" => "ν",
        "xi" => "ξ",
        "pi" => "π",
        "rho" | "varrho" => "ρ",
        "sigma" => "σ",
        "tau" => "τ",
        "phi" | "varphi" => "φ",
        "chi" => "χ",
        "psi" => "ψ",
        "omega" => "ω",
        "Gamma" => "Γ",
        "Delta" => "Δ",
        "Theta" => "Θ",
        "Lambda" => "Λ",
        "Xi" => "Ξ",
        "Pi" => "Π",
        "Sigma" => "Σ",
        "Phi" => "Φ",
        "Psi" => "Ψ",
        "Omega" => "Ω",
        "leq" | "le" => "≤",
        "geq" | "ge" => "≥",
        "neq" | "ne" => "≠",
        "approx" => "≈",
        "equiv" => "≡",
        "sim" => "∼",
        "cong" => "≅",
        "in" => "∈",
        "notin" => "∉",
        "subset" => "⊂",
        "subseteq" => "⊆",
        "supset" => "⊃",
        "supseteq" => "⊇",
        "cup" => "∪",
        "cap" => "∩",
        "setminus" => "∖",
        "emptyset" | "varnothing" => "∅",
        "forall" => "∀",
        "exists" => "∃",
        "neg" | "lnot" => "¬",
        "land" | "wedge" => "∧",
        "lor" | "vee" => "∨",
        "to" | "rightarrow" => "→",
        "leftarrow" | "gets" => "←",
        "leftrightarrow" => "↔",
        "Rightarrow" | "implies" => "⇒",
        "Leftarrow" => "⇐",
        "Leftrightarrow" | "iff" => "⇔",
        "mapsto" => "↦",
        "infty" => "∞",
        "partial" => "∂",
        "nabla" => "∇",
        "sum" => "∑",
        "prod" => "∏",
        "int" => "∫",
        "oint" => "∮",
        "times" => "×",
        "cdot" => "·",
        "cdots" | "ldots" | "dots" => "…",
        "pm" => "±",
        "circ" => "∘",
        "oplus" => "⊕",
        "otimes" => "⊗",
        "mid" => "∣",
        "langle" => "⟨",
        "rangle" => "⟩",
        "lfloor" => "⌊",
        "rfloor" => "⌋",
        "lceil" => "⌈",
        "rceil" => "⌉",
        "ell" => "ℓ",
        "aleph" => "ℵ",
        "prime" => "′",
        _ => return None,
    })
}

fn layout_list(nodes: &[Node], size: f32, font: &FontFace) -> MathBox {
    let mut out = MathBox {
        width: 0.0,
        ascent: font.ascent(size) * 0.75,
        descent: font.descent(size) * 0.5,
        items: Vec::new(),
    };
    for node in nodes {
        out.push_right(layout_node(node, size, font));
    }
    out
}

fn layout_glyphs(text: &str, size: f32, font: &FontFace) -> MathBox {
    let mut b = MathBox {
        width: 0.0,
        ascent: font.ascent(size),
        descent: font.descent(size),
        items: Vec::new(),
    };
    for ch in text.chars() {
        b.items.push(MathItem::Glyph {
            ch,
            size,
            x: b.width,
            y: 0.0,
        });
        b.width += font.advance(ch, size);
    }
    b
}

fn layout_node(node: &Node, size: f32, font: &FontFace) -> MathBox {
    match node {
        Node::Sym(s) | Node::Text(s) => layout_glyphs(s, size, font),
        Node::Op(ch) => {
            let pad = if matches!(ch, ',' | ';' | ':') { 0.0 } else { 0.22 * size };
            let mut b = MathBox {
                width: pad,
                ..MathBox::default()
            };
            let glyph = layout_glyphs(&ch.to_string(), size, font);
            b.append(glyph, pad, 0.0);
            b.width += if matches!(ch, ',' | ';') { 0.17 * size } else { pad };
            b
        }
        Node::Space(em) => MathBox {
            width: em * size,
            ..MathBox::default()
        },
        Node::Group(children) => layout_list(children, size, font),
        Node::Scripts { base, sup, sub } => {
            let mut b = layout_node(base, size, font);
            let x = b.width;
            let script_size = size * 0.7;
            let mut extra = 0.0f32;
            if let Some(sup) = sup {
                let s = layout_node(sup, script_size, font);
                let shift = (b.ascent - s.ascent * 0.5).max(size * 0.35);
                extra = extra.max(s.width);
                b.append(s, x, -shift);
            }
            if let Some(sub) = sub {
                let s = layout_node(sub, script_size, font);
                let shift = size * 0.2 + s.ascent * 0.3;
                extra = extra.max(s.width);
                b.append(s, x, shift);
            }
            b.width = x + extra + size * 0.05;
            b
        }
        Node::Frac(num, den) => {
            let inner = size * 0.85;
            let num = layout_node(num, inner, font);
            let den = layout_node(den, inner, font);
            let pad = size * 0.12;
            let width = num.width.max(den.width) + 2.0 * pad;
            let axis = size * 0.3;
            let bar = (size * 0.06).max(1.0);
            let gap = size * 0.12;
            let mut b = MathBox::default();
            b.items.push(MathItem::Rule {
                x: pad * 0.5,
                y: -axis - bar * 0.5,
                w: width - pad,
                h: bar,
            });
            b.ascent = axis + bar;
            b.descent = 0.0;
            let num_dy = -axis - bar * 0.5 - gap - num.descent;
            let den_dy = -axis + bar * 0.5 + gap + den.ascent;
            let num_dx = (width - num.width) * 0.5;
            let den_dx = (width - den.width) * 0.5;
            b.append(num, num_dx, num_dy);
            b.append(den, den_dx, den_dy);
            b.width = width;
            b
        }
        Node::Sqrt(inner) => {
            let inner = layout_node(inner, size, font);
            let inner_w = inner.width;
            let radical = layout_glyphs("√", size, font);
            let rad_w = radical.width;
            let bar = (size * 0.06).max(1.0);
            let top = inner.ascent + size * 0.1;
            let mut b = MathBox::default();
            b.append(radical, 0.0, 0.0);
            b.append(inner, rad_w, 0.0);
            b.items.push(MathItem::Rule {
                x: rad_w,
                y: -top - bar,
                w: inner_w + size * 0.05,
                h: bar,
            });
            b.ascent = b.ascent.max(top + bar);
            b.width = rad_w + inner_w + size * 0.1;
            b
        }
    }
}
