mod common;

use statement_pdf::slicer::page_capacity;
use statement_pdf::units::{Orientation, PageFormat, PageGeometry, Unit};
use statement_pdf::{Clip, Error, PageSlice, RenderedBlock, SurfaceSize, slice_pages};

fn surface_for(blocks: &[RenderedBlock], width: u32) -> SurfaceSize {
    SurfaceSize {
        width,
        height: blocks.last().map(|b| b.bottom_px()).unwrap_or(0),
    }
}

/// Contiguous, ordered, and covering every block exactly once.
fn assert_partition(slices: &[PageSlice], blocks: &[RenderedBlock], surface: SurfaceSize) {
    assert_eq!(slices[0].y_start, blocks[0].top_px);
    assert_eq!(slices.last().unwrap().y_end, surface.height);
    for pair in slices.windows(2) {
        assert_eq!(pair[0].y_end, pair[1].y_start, "gap or overlap between slices");
        assert_eq!(pair[0].blocks.end, pair[1].blocks.start);
    }
    assert_eq!(slices[0].blocks.start, 0);
    assert_eq!(slices.last().unwrap().blocks.end, blocks.len());
    let total: u32 = slices.iter().map(PageSlice::height_px).sum();
    assert_eq!(total, surface.height - blocks[0].top_px);
}

#[test]
fn three_blocks_split_after_second() {
    let blocks = common::stacked(&[500, 500, 500], 24);
    let surface = surface_for(&blocks, 100);
    let page = common::pixel_page(100.0, 1100.0, 0.0);

    let slices = slice_pages(&blocks, surface, &page).unwrap();

    assert_eq!(slices.len(), 2);
    assert_eq!((slices[0].y_start, slices[0].y_end), (0, 1048));
    assert_eq!(slices[0].content_end, 1024);
    assert_eq!(slices[0].blocks, 0..2);
    assert_eq!((slices[1].y_start, slices[1].y_end), (1048, 1548));
    assert_eq!(slices[1].blocks, 2..3);
    assert!(slices.iter().all(|s| !s.is_lossy()));
    assert_partition(&slices, &blocks, surface);
}

#[test]
fn oversized_single_block_is_clipped() {
    let blocks = common::stacked(&[2000], 0);
    let surface = surface_for(&blocks, 100);
    let page = common::pixel_page(100.0, 1200.0, 0.0);

    let slices = slice_pages(&blocks, surface, &page).unwrap();

    assert_eq!(slices.len(), 1);
    assert_eq!((slices[0].y_start, slices[0].y_end), (0, 1200));
    assert!(slices[0].is_lossy());
    assert_eq!(
        slices[0].clip,
        Some(Clip {
            block: 0,
            lost_px: 800
        })
    );
}

#[test]
fn oversized_block_in_the_middle_gets_its_own_page() {
    let blocks = common::stacked(&[100, 900, 100], 10);
    let surface = surface_for(&blocks, 100);
    let page = common::pixel_page(100.0, 500.0, 0.0);

    let slices = slice_pages(&blocks, surface, &page).unwrap();

    assert_eq!(slices.len(), 3);
    assert_eq!(slices[0].blocks, 0..1);
    assert_eq!(slices[0].y_end, 110);
    assert_eq!(slices[1].blocks, 1..2);
    assert_eq!((slices[1].y_start, slices[1].y_end), (110, 610));
    assert_eq!(slices[1].clip.map(|c| c.lost_px), Some(400));
    assert_eq!(slices[2].blocks, 2..3);
    assert_eq!(slices[2].y_start, 1020);
    assert!(!slices[2].is_lossy());
}

#[test]
fn zero_capacity_is_degenerate() {
    let blocks = common::stacked(&[50], 0);
    let surface = surface_for(&blocks, 100);
    // margins eat the whole page height
    let page = common::pixel_page(100.0, 40.0, 20.0);
    let err = slice_pages(&blocks, surface, &page).unwrap_err();
    assert!(matches!(err, Error::DegenerateGeometry { .. }), "{err}");

    let page = common::pixel_page(100.0, 1000.0, 50.0);
    let err = slice_pages(&blocks, surface, &page).unwrap_err();
    assert!(matches!(err, Error::DegenerateGeometry { .. }), "{err}");
}

#[test]
fn empty_block_list_is_rejected_after_geometry() {
    let surface = SurfaceSize {
        width: 100,
        height: 0,
    };
    let ok_page = common::pixel_page(100.0, 500.0, 0.0);
    assert!(matches!(
        slice_pages(&[], surface, &ok_page),
        Err(Error::EmptyInput)
    ));

    let bad_page = common::pixel_page(100.0, 500.0, 60.0);
    assert!(matches!(
        slice_pages(&[], surface, &bad_page),
        Err(Error::DegenerateGeometry { .. })
    ));
}

#[test]
fn slices_are_maximal_and_within_capacity() {
    let heights: Vec<u32> = (0..40).map(|i| 60 + (i * 37) % 180).collect();
    let blocks = common::stacked(&heights, 16);
    let surface = surface_for(&blocks, 200);
    let page = common::pixel_page(200.0, 600.0, 0.0);
    let capacity = 600;

    let slices = slice_pages(&blocks, surface, &page).unwrap();

    assert_partition(&slices, &blocks, surface);
    for (i, slice) in slices.iter().enumerate() {
        assert!(!slice.is_lossy());
        assert!(slice.content_height_px() <= capacity, "slice {i} overflows");
        // each slice starts on a block's top edge and ends on one's bottom edge
        assert_eq!(slice.y_start, blocks[slice.blocks.start].top_px);
        assert_eq!(slice.content_end, blocks[slice.blocks.end - 1].bottom_px());
        if let Some(next) = blocks.get(slice.blocks.end) {
            assert!(
                next.bottom_px() - slice.y_start > capacity,
                "slice {i} could have taken block {}",
                next.index
            );
        }
    }
}

#[test]
fn slicing_is_deterministic() {
    let blocks = common::stacked(&[120, 340, 90, 410, 200, 75], 20);
    let surface = surface_for(&blocks, 300);
    let page = common::pixel_page(300.0, 450.0, 0.0);

    let first = slice_pages(&blocks, surface, &page).unwrap();
    let second = slice_pages(&blocks, surface, &page).unwrap();
    assert_eq!(first, second);
}

#[test]
fn placed_height_uses_physical_scale() {
    let page = PageGeometry::new(PageFormat::A4, Orientation::Portrait, Unit::Mm, 10.0);
    let (scale, capacity) = page_capacity(1600, &page).unwrap();

    let px_to_mm = 190.0 / 1600.0;
    assert!((scale.px_to_unit() - px_to_mm).abs() < 1e-9);
    assert_eq!(capacity, (277.0_f64 / px_to_mm).floor() as u32);

    let blocks = common::stacked(&[800, 800, 800], 40);
    let surface = surface_for(&blocks, 1600);
    let slices = slice_pages(&blocks, surface, &page).unwrap();

    assert_eq!(slices.len(), 2);
    let first = &slices[0];
    assert_eq!(first.blocks, 0..2);
    let expected = first.content_height_px() as f64 * px_to_mm;
    assert!((first.placed_height() - expected).abs() < 1e-6);
    assert!(first.placed_height() <= page.usable_height());
    assert_eq!(first.placement.margin, 10.0);
}

#[test]
fn overlapping_rectangles_are_rejected() {
    let blocks = vec![
        RenderedBlock::new(0, 0, 300),
        RenderedBlock::new(1, 100, 300),
    ];
    let surface = SurfaceSize {
        width: 100,
        height: 400,
    };
    let page = common::pixel_page(100.0, 1000.0, 0.0);

    let err = slice_pages(&blocks, surface, &page).unwrap_err();

    assert!(matches!(err, Error::InvalidInput(_)), "{err}");
}

#[test]
fn rectangles_near_the_pixel_limit_do_not_overflow() {
    let blocks = vec![RenderedBlock::new(0, u32::MAX - 10, 50)];
    assert_eq!(blocks[0].bottom_px(), u32::MAX);
    let surface = SurfaceSize {
        width: 100,
        height: u32::MAX,
    };
    let page = common::pixel_page(100.0, 30.0, 0.0);

    let slices = slice_pages(&blocks, surface, &page).unwrap();

    assert_eq!(slices.len(), 1);
    assert_eq!(slices[0].y_end, u32::MAX);
    assert!(slices[0].is_lossy());
}
