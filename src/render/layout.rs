use crate::config::Options;
use crate::fonts::FontFace;
use crate::model::{ContentBlock, KindStyle, Palette};
use crate::render::math::{MathBox, MathItem, Segment, split_segments};
use crate::render::raster::Canvas;

const BODY_COLOR: [u8; 3] = [0x11, 0x18, 0x27];
const META_COLOR: [u8; 3] = [0x6b, 0x72, 0x80];

/// Raster-pixel sizes for one run; every layout length is pre-multiplied by
/// the raster scale so block rectangles come out in surface pixels.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Metrics {
    pub(crate) width: f32,
    pub(crate) padding: f32,
    pub(crate) font_size: f32,
    pub(crate) title_size: f32,
    pub(crate) meta_size: f32,
    pub(crate) title_gap: f32,
    pub(crate) accent_bar: f32,
    pub(crate) gap: u32,
}

impl Metrics {
    pub(crate) fn new(options: &Options) -> Self {
        let s = options.raster_scale;
        let font_size = options.font_size * s;
        Metrics {
            width: options.surface_width_px() as f32,
            padding: options.block_padding as f32 * s,
            font_size,
            title_size: font_size * 1.1,
            meta_size: font_size * 0.8,
            title_gap: font_size * 0.5,
            accent_bar: (4.0 * s).round().max(1.0),
            gap: (options.block_gap as f32 * s).round() as u32,
        }
    }

    pub(crate) fn text_width(&self) -> f32 {
        self.width - 2.0 * self.padding
    }
}

/// One math fragment awaiting typesetting, in body order.
#[derive(Clone, Debug)]
pub(crate) struct MathJob {
    pub(crate) tex: String,
    pub(crate) display: bool,
}

pub(crate) fn collect_math_jobs(blocks: &[ContentBlock]) -> Vec<MathJob> {
    blocks
        .iter()
        .flat_map(|b| split_segments(&b.body))
        .filter_map(|seg| match seg {
            Segment::Math { tex, display } => Some(MathJob {
                tex: tex.to_string(),
                display,
            }),
            Segment::Text(_) => None,
        })
        .collect()
}

pub(crate) enum Piece {
    Word { text: String, size: f32 },
    Math(usize),
}

pub(crate) struct LineItem {
    pub(crate) x: f32,
    pub(crate) piece: Piece,
}

pub(crate) struct TextLine {
    pub(crate) items: Vec<LineItem>,
    pub(crate) width: f32,
    pub(crate) ascent: f32,
    pub(crate) descent: f32,
    pub(crate) min_height: f32,
    pub(crate) centered: bool,
}

impl TextLine {
    pub(crate) fn height(&self) -> f32 {
        (self.ascent + self.descent).max(self.min_height)
    }

    /// Baseline offset from the line's top edge.
    fn baseline(&self) -> f32 {
        (self.height() - self.ascent - self.descent) * 0.5 + self.ascent
    }
}

/// Greedy word wrapper. Whitespace is only inserted between atoms when the
/// source had whitespace there, so "$x$," stays glued.
struct LineBuilder<'f> {
    font: &'f FontFace,
    size: f32,
    max_width: f32,
    lines: Vec<TextLine>,
    current: TextLine,
    pending_space: bool,
}

impl<'f> LineBuilder<'f> {
    fn new(font: &'f FontFace, size: f32, max_width: f32) -> Self {
        LineBuilder {
            font,
            size,
            max_width,
            lines: Vec::new(),
            current: Self::empty_line(font, size),
            pending_space: false,
        }
    }

    fn empty_line(font: &FontFace, size: f32) -> TextLine {
        TextLine {
            items: Vec::new(),
            width: 0.0,
            ascent: font.ascent(size),
            descent: font.descent(size),
            min_height: font.line_height(size),
            centered: false,
        }
    }

    fn finish_line(&mut self) {
        let fresh = Self::empty_line(self.font, self.size);
        self.lines.push(std::mem::replace(&mut self.current, fresh));
    }

    fn push_atom(&mut self, piece: Piece, width: f32, ascent: f32, descent: f32, space: bool) {
        let space_w = self.font.advance(' ', self.size);
        let mut gap = if space && !self.current.items.is_empty() {
            space_w
        } else {
            0.0
        };
        if !self.current.items.is_empty() && self.current.width + gap + width > self.max_width {
            self.finish_line();
            gap = 0.0;
        }
        let line = &mut self.current;
        line.items.push(LineItem {
            x: line.width + gap,
            piece,
        });
        line.width += gap + width;
        line.ascent = line.ascent.max(ascent);
        line.descent = line.descent.max(descent);
    }

    fn push_text(&mut self, text: &str) {
        if text.starts_with(char::is_whitespace) {
            self.pending_space = true;
        }
        let mut any = false;
        for word in text.split_whitespace() {
            let display = word.replace("\\$", "$");
            let width = self.font.text_width(&display, self.size);
            let space = self.pending_space;
            self.push_atom(
                Piece::Word {
                    text: display,
                    size: self.size,
                },
                width,
                self.font.ascent(self.size),
                self.font.descent(self.size),
                space,
            );
            self.pending_space = true;
            any = true;
        }
        if any {
            self.pending_space = text.ends_with(char::is_whitespace);
        }
    }

    fn push_inline_math(&mut self, job: usize, b: &MathBox) {
        let space = self.pending_space;
        self.push_atom(Piece::Math(job), b.width, b.ascent, b.descent, space);
        self.pending_space = false;
    }

    fn push_display_math(&mut self, job: usize, b: &MathBox) {
        if !self.current.items.is_empty() {
            self.finish_line();
        }
        let pad = self.size * 0.3;
        self.current = TextLine {
            items: vec![LineItem {
                x: 0.0,
                piece: Piece::Math(job),
            }],
            width: b.width,
            ascent: b.ascent + pad,
            descent: b.descent + pad,
            min_height: self.font.line_height(self.size),
            centered: true,
        };
        self.finish_line();
        self.pending_space = false;
    }

    fn hard_break(&mut self) {
        if self.lines.is_empty() && self.current.items.is_empty() {
            return;
        }
        self.finish_line();
        self.pending_space = false;
    }

    fn finish(mut self) -> Vec<TextLine> {
        if !self.current.items.is_empty() {
            self.finish_line();
        }
        // trailing blank lines from terminal newlines carry no content
        while self.lines.last().is_some_and(|l| l.items.is_empty()) {
            self.lines.pop();
        }
        self.lines
    }
}

/// Wrapped and measured content of one block card.
pub(crate) struct BlockLayout {
    pub(crate) style: KindStyle,
    pub(crate) title_lines: Vec<TextLine>,
    pub(crate) page_label: Option<(String, f32)>,
    pub(crate) body_lines: Vec<TextLine>,
    pub(crate) height: u32,
}

/// Lay out one block. `next_job` indexes `math` and advances past this block's fragments.
pub(crate) fn layout_block(
    block: &ContentBlock,
    index: usize,
    font: &FontFace,
    metrics: &Metrics,
    palette: &Palette,
    math: &[MathBox],
    next_job: &mut usize,
) -> BlockLayout {
    let text_width = metrics.text_width();

    let page_label = block.source_page.as_ref().map(|p| {
        let label = format!("p. {p}");
        let w = font.text_width(&label, metrics.meta_size);
        (label, w)
    });
    let title_width = match &page_label {
        Some((_, w)) => (text_width - w - metrics.font_size).max(text_width * 0.5),
        None => text_width,
    };
    let mut title = LineBuilder::new(font, metrics.title_size, title_width);
    title.push_text(&block.display_title(index));
    let title_lines = title.finish();

    let mut body = LineBuilder::new(font, metrics.font_size, text_width);
    for seg in split_segments(&block.body) {
        match seg {
            Segment::Text(text) => {
                for (i, para) in text.split('\n').enumerate() {
                    if i > 0 {
                        body.hard_break();
                    }
                    body.push_text(para);
                }
            }
            Segment::Math { display, .. } => {
                let job = *next_job;
                *next_job += 1;
                let Some(b) = math.get(job) else {
                    continue;
                };
                if display {
                    body.push_display_math(job, b);
                } else {
                    body.push_inline_math(job, b);
                }
            }
        }
    }
    let body_lines = body.finish();

    let mut height = 2.0 * metrics.padding;
    height += title_lines.iter().map(TextLine::height).sum::<f32>();
    if !body_lines.is_empty() {
        height += metrics.title_gap;
        height += body_lines.iter().map(TextLine::height).sum::<f32>();
    }

    BlockLayout {
        style: palette.style_for(&block.kind),
        title_lines,
        page_label,
        body_lines,
        height: (height.ceil() as u32).max(1),
    }
}

/// Paint a measured block with its top edge at `top`.
pub(crate) fn paint_block(
    canvas: &mut Canvas,
    layout: &BlockLayout,
    top: u32,
    font: &FontFace,
    metrics: &Metrics,
    math: &[MathBox],
) {
    let top = top as f32;
    let h = layout.height as f32;
    canvas.fill_rect(0.0, top, metrics.width, h, layout.style.fill.0);
    canvas.fill_rect(0.0, top, metrics.accent_bar, h, layout.style.accent.0);

    let left = metrics.padding;
    let mut y = top + metrics.padding;

    for (i, line) in layout.title_lines.iter().enumerate() {
        let baseline = y + line.baseline();
        paint_line(canvas, line, left, baseline, font, math, layout.style.accent.0);
        if i == 0
            && let Some((label, w)) = &layout.page_label
        {
            let x = metrics.width - metrics.padding - w;
            for (ch, cx) in glyph_positions(label, metrics.meta_size, font, x) {
                font.draw(canvas, ch, metrics.meta_size, cx, baseline, META_COLOR);
            }
        }
        y += line.height();
    }

    if !layout.body_lines.is_empty() {
        y += metrics.title_gap;
    }
    for line in &layout.body_lines {
        let baseline = y + line.baseline();
        let x = if line.centered {
            left + ((metrics.text_width() - line.width) * 0.5).max(0.0)
        } else {
            left
        };
        paint_line(canvas, line, x, baseline, font, math, BODY_COLOR);
        y += line.height();
    }
}

fn paint_line(
    canvas: &mut Canvas,
    line: &TextLine,
    left: f32,
    baseline: f32,
    font: &FontFace,
    math: &[MathBox],
    color: [u8; 3],
) {
    for item in &line.items {
        let x0 = left + item.x;
        match &item.piece {
            Piece::Word { text, size } => {
                for (ch, cx) in glyph_positions(text, *size, font, x0) {
                    font.draw(canvas, ch, *size, cx, baseline, color);
                }
            }
            Piece::Math(job) => {
                let Some(b) = math.get(*job) else {
                    continue;
                };
                for mark in &b.items {
                    match *mark {
                        MathItem::Glyph { ch, size, x, y } => {
                            font.draw(canvas, ch, size, x0 + x, baseline + y, BODY_COLOR)
                        }
                        MathItem::Rule { x, y, w, h } => {
                            canvas.fill_rect(x0 + x, baseline + y, w, h.max(1.0), BODY_COLOR)
                        }
                    }
                }
            }
        }
    }
}

fn glyph_positions<'a>(
    text: &'a str,
    size: f32,
    font: &'a FontFace,
    x: f32,
) -> impl Iterator<Item = (char, f32)> + 'a {
    text.chars().scan(x, move |pen, ch| {
        let at = *pen;
        *pen += font.advance(ch, size);
        Some((ch, at))
    })
}
