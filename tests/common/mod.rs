#![allow(dead_code)]

use std::time::Duration;

use statement_pdf::units::{PageGeometry, Unit};
use statement_pdf::{
    ContentBlock, FontChoice, FontFace, MathBox, Options, RenderedBlock, TexTypesetter, Typesetter,
};

pub fn init_logging() {
    env_logger::builder().is_test(true).try_init().ok();
}

/// Small, font-independent options so tests are fast and deterministic.
pub fn options() -> Options {
    Options {
        font: FontChoice::Builtin,
        raster_scale: 1.0,
        layout_width: 400,
        ..Options::default()
    }
}

const KINDS: [&str; 4] = ["definition", "theorem", "lemma", "remark"];

/// `n` short statements cycling through a few kinds.
pub fn statements(n: usize) -> Vec<ContentBlock> {
    (0..n)
        .map(|i| {
            ContentBlock::new(
                KINDS[i % KINDS.len()],
                format!("Statement number {i} about a set $X_{i}$ and its closure."),
            )
            .with_title(format!("Result {i}"))
        })
        .collect()
}

/// Stacked block rectangles with a fixed gap, as the renderer lays them out.
pub fn stacked(heights: &[u32], gap: u32) -> Vec<RenderedBlock> {
    let mut top = 0;
    heights
        .iter()
        .enumerate()
        .map(|(i, &h)| {
            if i > 0 {
                top += gap;
            }
            let block = RenderedBlock::new(i, top, h);
            top += h;
            block
        })
        .collect()
}

/// Page measured in raster pixels, so one surface pixel is one page unit.
pub fn pixel_page(width: f64, height: f64, margin: f64) -> PageGeometry {
    PageGeometry {
        width,
        height,
        margin,
        unit: Unit::Px,
    }
}

/// Number of `/Type /Page` dictionaries (not `/Pages`) in a PDF.
pub fn count_pages(pdf: &[u8]) -> usize {
    let needle = b"/Type /Page";
    pdf.windows(needle.len() + 1)
        .filter(|w| &w[..needle.len()] == needle && w[needle.len()] != b's')
        .count()
}

pub fn count_images(pdf: &[u8]) -> usize {
    let needle = b"/Subtype /Image";
    pdf.windows(needle.len()).filter(|w| w == needle).count()
}

/// Typesets correctly but only after a delay per fragment.
pub struct SlowTypesetter(pub Duration);

impl Typesetter for SlowTypesetter {
    fn typeset(&self, tex: &str, display: bool, size: f32, font: &FontFace) -> MathBox {
        std::thread::sleep(self.0);
        TexTypesetter.typeset(tex, display, size, font)
    }
}
