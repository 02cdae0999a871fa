use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;

use crate::error::Error;

/// Category of an extracted statement. Unknown names are kept verbatim in `Other`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "String")]
pub enum BlockKind {
    Definition,
    Theorem,
    Lemma,
    Proposition,
    Corollary,
    Remark,
    Claim,
    Axiom,
    Other(String),
}

impl From<String> for BlockKind {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().as_str() {
            "definition" => BlockKind::Definition,
            "theorem" => BlockKind::Theorem,
            "lemma" => BlockKind::Lemma,
            "proposition" => BlockKind::Proposition,
            "corollary" => BlockKind::Corollary,
            "remark" => BlockKind::Remark,
            "claim" => BlockKind::Claim,
            "axiom" => BlockKind::Axiom,
            _ => BlockKind::Other(s.trim().to_string()),
        }
    }
}

impl From<&str> for BlockKind {
    fn from(s: &str) -> Self {
        BlockKind::from(s.to_string())
    }
}

impl BlockKind {
    /// Lowercase key used for palette lookup.
    pub fn key(&self) -> String {
        match self {
            BlockKind::Definition => "definition".into(),
            BlockKind::Theorem => "theorem".into(),
            BlockKind::Lemma => "lemma".into(),
            BlockKind::Proposition => "proposition".into(),
            BlockKind::Corollary => "corollary".into(),
            BlockKind::Remark => "remark".into(),
            BlockKind::Claim => "claim".into(),
            BlockKind::Axiom => "axiom".into(),
            BlockKind::Other(name) => name.to_lowercase(),
        }
    }

    /// Capitalised display label ("Theorem", "Conjecture").
    pub fn label(&self) -> String {
        let key = match self {
            BlockKind::Other(name) => name.clone(),
            _ => self.key(),
        };
        let mut chars = key.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => "Statement".to_string(),
        }
    }
}

/// Reference to the page of the source notes a statement came from.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PageRef {
    Number(u32),
    Label(String),
}

impl fmt::Display for PageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageRef::Number(n) => write!(f, "{n}"),
            PageRef::Label(s) => f.write_str(s),
        }
    }
}

/// One extracted statement, as delivered by the extraction service.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: BlockKind,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(rename = "content")]
    pub body: String,
    #[serde(rename = "page", default)]
    pub source_page: Option<PageRef>,
}

impl ContentBlock {
    pub fn new(kind: impl Into<BlockKind>, body: impl Into<String>) -> Self {
        ContentBlock {
            kind: kind.into(),
            title: None,
            body: body.into(),
            source_page: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.source_page = Some(PageRef::Number(page));
        self
    }

    /// Title to display; synthesised from the kind and 0-based `index` when absent.
    pub fn display_title(&self, index: usize) -> String {
        match self.title.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => format!("{} {}", self.kind.label(), index + 1),
        }
    }
}

/// Position of one block on the rendered surface, in raster pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderedBlock {
    /// Position of the source block in the input sequence.
    pub index: usize,
    pub top_px: u32,
    pub height_px: u32,
}

impl RenderedBlock {
    pub fn new(index: usize, top_px: u32, height_px: u32) -> Self {
        RenderedBlock {
            index,
            top_px,
            height_px,
        }
    }

    pub fn bottom_px(&self) -> u32 {
        self.top_px.saturating_add(self.height_px)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BlocksPayload {
    Bare(Vec<ContentBlock>),
    Envelope { content: Vec<ContentBlock> },
}

/// Parse extraction output: either a JSON array of blocks or `{"content": [...]}`.
pub fn load_blocks(json: &str) -> Result<Vec<ContentBlock>, Error> {
    let payload: BlocksPayload = serde_json::from_str(json)?;
    Ok(match payload {
        BlocksPayload::Bare(blocks) => blocks,
        BlocksPayload::Envelope { content } => content,
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct Rgb(pub [u8; 3]);

impl TryFrom<String> for Rgb {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Rgb::parse_hex(&s).ok_or_else(|| format!("invalid colour '{s}', expected #rrggbb"))
    }
}

impl Rgb {
    pub fn parse_hex(s: &str) -> Option<Rgb> {
        let hex = s.trim().strip_prefix('#').unwrap_or(s.trim());
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Rgb([channel(0)?, channel(2)?, channel(4)?]))
    }
}

/// Cosmetic presentation of one block kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct KindStyle {
    pub accent: Rgb,
    pub fill: Rgb,
}

/// Colour lookup keyed by lowercase kind name, with a mandatory default entry.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Palette {
    pub default: KindStyle,
    pub kinds: HashMap<String, KindStyle>,
}

impl Default for Palette {
    fn default() -> Self {
        let style = |accent: [u8; 3], fill: [u8; 3]| KindStyle {
            accent: Rgb(accent),
            fill: Rgb(fill),
        };
        let kinds = [
            ("definition", style([0x1d, 0x4e, 0xd8], [0xef, 0xf6, 0xff])),
            ("theorem", style([0xb9, 0x1c, 0x1c], [0xfe, 0xf2, 0xf2])),
            ("lemma", style([0x04, 0x78, 0x57], [0xec, 0xfd, 0xf5])),
            ("proposition", style([0x6d, 0x28, 0xd9], [0xf5, 0xf3, 0xff])),
            ("corollary", style([0xb4, 0x53, 0x09], [0xff, 0xfb, 0xeb])),
            ("axiom", style([0x0f, 0x76, 0x6e], [0xf0, 0xfd, 0xfa])),
            ("remark", style([0x47, 0x55, 0x69], [0xf8, 0xfa, 0xfc])),
            ("claim", style([0xbe, 0x18, 0x5d], [0xfd, 0xf2, 0xf8])),
        ]
        .into_iter()
        .map(|(k, s)| (k.to_string(), s))
        .collect();
        Palette {
            default: style([0x37, 0x41, 0x51], [0xf9, 0xfa, 0xfb]),
            kinds,
        }
    }
}

impl Palette {
    pub fn style_for(&self, kind: &BlockKind) -> KindStyle {
        self.kinds.get(&kind.key()).copied().unwrap_or(self.default)
    }
}
