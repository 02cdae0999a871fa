mod common;

use std::sync::Arc;
use std::time::Duration;

use statement_pdf::{
    CancellationToken, ContentBlock, Error, FontChoice, Options, Pipeline, RenderedSurface, Stage,
};

async fn render(options: Options, blocks: &[ContentBlock]) -> RenderedSurface {
    Pipeline::new(options)
        .render(blocks, &CancellationToken::new())
        .await
        .expect("render")
}

#[tokio::test]
async fn empty_input_acquires_no_surface() {
    common::init_logging();
    let pipeline = Pipeline::new(common::options());

    let err = pipeline.run(&[]).await.unwrap_err();

    assert!(matches!(err, Error::EmptyInput), "{err}");
    assert_eq!(pipeline.surfaces().acquired(), 0);
}

#[tokio::test]
async fn blocks_are_stacked_in_order_with_gap() {
    let options = Options {
        raster_scale: 2.0,
        ..common::options()
    };
    let blocks = common::statements(6);

    let surface = render(options, &blocks).await;

    assert_eq!(surface.blocks.len(), 6);
    assert_eq!(surface.image.width(), 800);
    assert_eq!(surface.blocks[0].top_px, 0);
    for (i, pair) in surface.blocks.windows(2).enumerate() {
        assert_eq!(pair[0].index, i);
        assert_eq!(pair[1].top_px, pair[0].bottom_px() + 48);
    }
    assert!(surface.blocks.iter().all(|b| b.height_px > 0));
    assert_eq!(surface.image.height(), surface.blocks[5].bottom_px());
}

#[tokio::test]
async fn surface_is_released_after_run() {
    let pipeline = Pipeline::new(common::options());

    pipeline.run(&common::statements(3)).await.unwrap();

    let ledger = pipeline.surfaces();
    assert_eq!(ledger.acquired(), 1);
    assert_eq!(ledger.released(), 1);
    assert_eq!(ledger.live(), 0);
}

#[tokio::test]
async fn missing_title_matches_synthesised_one() {
    let blocks = vec![
        ContentBlock::new("theorem", "Every bounded monotone sequence converges."),
        ContentBlock::new("theorem", "Every bounded monotone sequence converges.")
            .with_title("Theorem 2"),
    ];

    let surface = render(common::options(), &blocks).await;

    assert_eq!(surface.blocks[0].height_px, surface.blocks[1].height_px);
}

#[tokio::test]
async fn unknown_kind_uses_default_style() {
    let options = common::options();
    let palette = options.palette.clone();
    let blocks = vec![
        ContentBlock::new("conjecture", "There are infinitely many twin primes."),
        ContentBlock::new("theorem", "There are infinitely many primes."),
    ];

    let surface = render(options, &blocks).await;

    let accent = |i: usize| surface.image.get_pixel(1, surface.blocks[i].top_px + 1).0;
    assert_eq!(accent(0), palette.default.accent.0);
    assert_eq!(accent(1), palette.style_for(&"theorem".into()).accent.0);
    assert_ne!(accent(0), accent(1));
}

#[tokio::test]
async fn long_body_wraps_into_a_taller_block() {
    let long = "The closure of a set is the smallest closed set containing it. ".repeat(20);
    let blocks = vec![
        ContentBlock::new("definition", "Short."),
        ContentBlock::new("definition", long),
    ];

    let surface = render(common::options(), &blocks).await;

    assert!(surface.blocks[1].height_px > 3 * surface.blocks[0].height_px);
}

#[tokio::test]
async fn display_fraction_is_taller_than_plain_text() {
    let blocks = vec![
        ContentBlock::new("lemma", "x").with_title("L"),
        ContentBlock::new("lemma", "$$\\frac{a}{b}$$").with_title("L"),
    ];

    let surface = render(common::options(), &blocks).await;

    assert!(surface.blocks[1].height_px > surface.blocks[0].height_px);
}

#[tokio::test]
async fn slow_math_times_out_during_stabilization() {
    let options = Options {
        stabilization_timeout_ms: 20,
        ..common::options()
    };
    let pipeline = Pipeline::new(options)
        .with_typesetter(Arc::new(common::SlowTypesetter(Duration::from_millis(300))));
    let blocks = vec![ContentBlock::new("theorem", "$a^2 + b^2 = c^2$ and $e^{i\\pi} = -1$")];

    let err = pipeline.run(&blocks).await.unwrap_err();

    assert!(
        matches!(
            err,
            Error::RenderTimeout {
                stage: Stage::Stabilization,
                ..
            }
        ),
        "{err}"
    );
    assert!(err.is_retryable());
    assert_eq!(pipeline.surfaces().acquired(), 0);
}

#[tokio::test]
async fn missing_font_file_fails_before_any_surface() {
    let options = Options {
        font: FontChoice::Path("/nonexistent/statement-pdf-test.ttf".into()),
        ..common::options()
    };
    let pipeline = Pipeline::new(options);

    let err = pipeline.run(&common::statements(2)).await.unwrap_err();

    assert!(matches!(err, Error::Io(_)), "{err}");
    assert_eq!(pipeline.surfaces().acquired(), 0);
}

#[tokio::test]
async fn invalid_scale_is_rejected() {
    let options = Options {
        raster_scale: 0.0,
        ..common::options()
    };

    let err = Pipeline::new(options)
        .run(&common::statements(1))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidInput(_)), "{err}");
}

#[tokio::test]
async fn capture_timeout_releases_the_surface() {
    let options = Options {
        capture_timeout_ms: 1,
        ..common::options()
    };
    let pipeline = Pipeline::new(options);

    let err = pipeline.run(&common::statements(400)).await.unwrap_err();

    assert!(
        matches!(
            err,
            Error::RenderTimeout {
                stage: Stage::Capture,
                ..
            }
        ),
        "{err}"
    );
    assert!(err.is_retryable());
    assert!(pipeline.surfaces().acquired() <= 1);
    assert_eq!(pipeline.surfaces().live(), 0);
}

#[tokio::test]
async fn deeply_nested_math_renders() {
    let body = format!("${}x{}$", "{".repeat(20_000), "}".repeat(20_000));
    let blocks = vec![ContentBlock::new("theorem", body)];

    let surface = render(common::options(), &blocks).await;

    assert_eq!(surface.blocks.len(), 1);
    assert!(surface.blocks[0].height_px > 0);
}

#[tokio::test]
async fn oversized_padding_is_rejected() {
    let options = Options {
        block_padding: u32::MAX,
        ..common::options()
    };

    let err = Pipeline::new(options)
        .run(&common::statements(1))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidInput(_)), "{err}");
}
