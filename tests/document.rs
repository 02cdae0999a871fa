mod common;

use std::time::Duration;

use statement_pdf::units::{PageFormat, Unit};
use statement_pdf::{
    CancellationToken, ContentBlock, Error, Options, Pipeline, convert_json_to_pdf,
    generate_document, generate_document_with_cancel,
};

#[tokio::test]
async fn one_page_per_slice() {
    common::init_logging();
    let blocks = common::statements(24);

    let doc = generate_document(&blocks, &common::options()).await.unwrap();

    assert!(doc.pdf.starts_with(b"%PDF"));
    assert!(doc.page_count() > 1, "24 statements should not fit one A4 page");
    assert_eq!(common::count_pages(&doc.pdf), doc.page_count());
    assert_eq!(common::count_images(&doc.pdf), doc.page_count());
    assert_eq!(doc.blocks.len(), 24);
    assert_eq!(doc.clipped().count(), 0);

    // every block lands on exactly one page, in order
    let mut next = 0;
    for slice in &doc.slices {
        assert_eq!(slice.blocks.start, next);
        next = slice.blocks.end;
    }
    assert_eq!(next, 24);
}

#[tokio::test]
async fn single_block_makes_single_page() {
    let blocks = vec![ContentBlock::new("axiom", "The empty set exists.")];

    let doc = generate_document(&blocks, &common::options()).await.unwrap();

    assert_eq!(doc.page_count(), 1);
    assert_eq!(common::count_pages(&doc.pdf), 1);
}

#[tokio::test]
async fn huge_block_is_clipped_but_still_rendered() {
    let options = Options {
        page: statement_pdf::PageSetup {
            format: PageFormat::A5,
            ..Default::default()
        },
        ..common::options()
    };
    let body = "A very long proof sketch that keeps going. ".repeat(300);
    let blocks = vec![
        ContentBlock::new("definition", "Short."),
        ContentBlock::new("theorem", body),
        ContentBlock::new("remark", "Short again."),
    ];

    let doc = generate_document(&blocks, &options).await.unwrap();

    let clips: Vec<_> = doc.clipped().collect();
    assert_eq!(clips.len(), 1);
    assert_eq!(clips[0].block, 1);
    assert!(clips[0].lost_px > 0);
    assert_eq!(doc.page_count(), 3);
    assert_eq!(common::count_pages(&doc.pdf), 3);
}

#[tokio::test]
async fn page_unit_does_not_change_pagination() {
    let blocks = common::statements(15);
    let mut in_mm = common::options();
    in_mm.page.margin = 10.0;
    let mut in_pt = common::options();
    in_pt.page.unit = Unit::Pt;
    in_pt.page.margin = Unit::Mm.to_points(10.0);

    let a = generate_document(&blocks, &in_mm).await.unwrap();
    let b = generate_document(&blocks, &in_pt).await.unwrap();

    let ranges = |d: &statement_pdf::GeneratedDocument| {
        d.slices.iter().map(|s| s.blocks.clone()).collect::<Vec<_>>()
    };
    assert_eq!(ranges(&a), ranges(&b));
}

#[tokio::test]
async fn cancelled_run_returns_no_document() {
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = generate_document_with_cancel(&common::statements(4), &common::options(), cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled), "{err}");
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn cancelling_mid_capture_releases_the_surface() {
    let pipeline = Pipeline::new(common::options());
    let blocks = common::statements(400);
    let cancel = CancellationToken::new();

    // cancel as soon as the painting worker holds its surface
    let watcher = async {
        for _ in 0..10_000 {
            if pipeline.surfaces().acquired() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        cancel.cancel();
    };
    let (result, ()) = tokio::join!(pipeline.run_with_cancel(&blocks, cancel.clone()), watcher);

    let err = result.unwrap_err();
    assert!(matches!(err, Error::Cancelled), "{err}");
    assert_eq!(pipeline.surfaces().acquired(), 1);
    assert_eq!(pipeline.surfaces().live(), 0);
}

#[tokio::test]
async fn pipeline_runs_are_independent() {
    let pipeline = Pipeline::new(common::options());
    let blocks = common::statements(8);

    let (a, b) = tokio::join!(pipeline.run(&blocks), pipeline.run(&blocks));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.slices, b.slices);
    assert_eq!(pipeline.surfaces().acquired(), 2);
    assert_eq!(pipeline.surfaces().live(), 0);
}

#[tokio::test]
async fn degenerate_margins_fail_before_rendering() {
    let mut options = common::options();
    options.page.margin = 200.0;
    let pipeline = Pipeline::new(options);

    let err = pipeline.run(&common::statements(2)).await.unwrap_err();

    assert!(matches!(err, Error::DegenerateGeometry { .. }), "{err}");
    assert_eq!(pipeline.surfaces().acquired(), 0);
}

#[tokio::test]
async fn converts_json_file() {
    let dir = std::env::temp_dir().join(format!("statement-pdf-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let input = dir.join("statements.json");
    let output = dir.join("statements.pdf");
    std::fs::write(
        &input,
        r#"{"content": [
            {"type": "definition", "title": "Open set", "content": "A set $U$ is open if ...", "page": 3},
            {"type": "theorem", "content": "$$\\int_0^1 x\\,dx = \\frac{1}{2}$$", "page": "iv"}
        ]}"#,
    )
    .unwrap();

    let doc = convert_json_to_pdf(&input, &output, &common::options())
        .await
        .unwrap();

    let written = std::fs::read(&output).unwrap();
    assert_eq!(written, doc.pdf);
    assert_eq!(doc.blocks.len(), 2);
    std::fs::remove_dir_all(&dir).ok();
}
