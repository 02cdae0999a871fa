use std::ops::Range;

use crate::error::Error;
use crate::model::RenderedBlock;
use crate::units::{PageGeometry, UnitScale};

/// Pixel dimensions of the captured surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

/// Everything the assembler needs to place a slice on its page.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    pub scale: UnitScale,
    pub margin: f64,
    pub usable_width: f64,
    pub usable_height: f64,
}

/// Lossy fallback record: `lost_px` rows of block `block` did not fit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Clip {
    pub block: usize,
    pub lost_px: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PageSlice {
    /// Top edge of the first block on the page.
    pub y_start: u32,
    /// Start of the next slice, or the surface height for the last one.
    pub y_end: u32,
    /// Bottom edge of the last block placed; `[y_start, content_end)` is drawn.
    pub content_end: u32,
    /// Positions in the rendered block list.
    pub blocks: Range<usize>,
    pub clip: Option<Clip>,
    pub placement: Placement,
}

impl PageSlice {
    pub fn height_px(&self) -> u32 {
        self.y_end - self.y_start
    }

    pub fn content_height_px(&self) -> u32 {
        self.content_end - self.y_start
    }

    pub fn is_lossy(&self) -> bool {
        self.clip.is_some()
    }

    /// Height of the placed image in page units.
    pub fn placed_height(&self) -> f64 {
        self.placement.scale.to_physical(self.content_height_px())
    }
}

/// Scale and per-page pixel capacity for a surface of `surface_width_px`.
pub fn page_capacity(surface_width_px: u32, page: &PageGeometry) -> Result<(UnitScale, u32), Error> {
    let scale = UnitScale::derive(page.usable_width(), surface_width_px)?;
    let capacity = scale.capacity_px(page.usable_height())?;
    Ok((scale, capacity))
}

/// Partition the rendered surface into page-sized pixel ranges without
/// cutting through a block.
///
/// Each page starts at the top edge of the first block not yet placed and
/// greedily takes following blocks while the bottom of the last one stays
/// within the page capacity. A block taller than a whole page is placed
/// alone and clipped; the clip is recorded on the slice.
///
/// `blocks` must be in surface order and must not overlap.
pub fn slice_pages(
    blocks: &[RenderedBlock],
    surface: SurfaceSize,
    page: &PageGeometry,
) -> Result<Vec<PageSlice>, Error> {
    let (scale, capacity) = page_capacity(surface.width, page)?;
    if blocks.is_empty() {
        return Err(Error::EmptyInput);
    }
    if let Some(pair) = blocks.windows(2).find(|w| w[1].top_px < w[0].bottom_px()) {
        return Err(Error::InvalidInput(format!(
            "block {} at {}px starts above the bottom of block {} ({}px)",
            pair[1].index,
            pair[1].top_px,
            pair[0].index,
            pair[0].bottom_px()
        )));
    }
    let placement = Placement {
        scale,
        margin: page.margin,
        usable_width: page.usable_width(),
        usable_height: page.usable_height(),
    };

    let mut slices = Vec::new();
    let mut cursor = 0;
    while cursor < blocks.len() {
        let first = &blocks[cursor];
        let start = first.top_px;

        if first.height_px > capacity {
            let lost_px = first.height_px - capacity;
            log::warn!(
                "Block {} is {}px tall but a page holds {}px; clipping {}px",
                first.index,
                first.height_px,
                capacity,
                lost_px
            );
            slices.push(PageSlice {
                y_start: start,
                y_end: start.saturating_add(capacity),
                content_end: start.saturating_add(capacity),
                blocks: cursor..cursor + 1,
                clip: Some(Clip {
                    block: first.index,
                    lost_px,
                }),
                placement,
            });
            cursor += 1;
            continue;
        }

        let mut end = cursor + 1;
        while end < blocks.len() && blocks[end].bottom_px() - start <= capacity {
            end += 1;
        }
        let content_end = blocks[end - 1].bottom_px();
        let y_end = match blocks.get(end) {
            Some(next) => next.top_px,
            None => surface.height.max(content_end),
        };
        log::debug!(
            "Slice {}: blocks {}..{}, px {}..{} ({} of {} used)",
            slices.len(),
            cursor,
            end,
            start,
            y_end,
            content_end - start,
            capacity
        );
        slices.push(PageSlice {
            y_start: start,
            y_end,
            content_end,
            blocks: cursor..end,
            clip: None,
            placement,
        });
        cursor = end;
    }
    Ok(slices)
}
