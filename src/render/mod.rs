mod layout;
pub mod math;
pub(crate) mod raster;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use image::RgbImage;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Options;
use crate::error::{Error, Stage};
use crate::fonts::FontFace;
use crate::model::{ContentBlock, RenderedBlock};
use crate::slicer::SurfaceSize;

use layout::{BlockLayout, MathJob, Metrics, collect_math_jobs, layout_block, paint_block};
use math::{MathBox, Typesetter};
use raster::Canvas;

/// Largest surface we are willing to allocate, in bytes of RGB data.
const MAX_SURFACE_BYTES: u64 = 1 << 31;

/// The captured full surface plus every block's rectangle on it.
#[derive(Debug)]
pub struct RenderedSurface {
    pub image: Arc<RgbImage>,
    pub blocks: Vec<RenderedBlock>,
}

impl RenderedSurface {
    pub fn size(&self) -> SurfaceSize {
        SurfaceSize {
            width: self.image.width(),
            height: self.image.height(),
        }
    }
}

/// Counts temporary surfaces acquired and released by a pipeline.
#[derive(Debug, Default)]
pub struct SurfaceLedger {
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl SurfaceLedger {
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.acquired().saturating_sub(self.released())
    }
}

/// Off-screen compositing target, released when dropped.
struct Surface {
    canvas: Canvas,
    ledger: Arc<SurfaceLedger>,
}

impl Surface {
    fn acquire(ledger: &Arc<SurfaceLedger>, size: SurfaceSize) -> Result<Surface, Error> {
        let bytes = size.width as u64 * size.height as u64 * 3;
        if bytes > MAX_SURFACE_BYTES {
            return Err(Error::InvalidInput(format!(
                "surface {}x{} exceeds the {MAX_SURFACE_BYTES} byte limit",
                size.width, size.height
            )));
        }
        ledger.acquired.fetch_add(1, Ordering::SeqCst);
        log::debug!("Acquired {}x{} surface", size.width, size.height);
        Ok(Surface {
            canvas: Canvas::new(size.width, size.height),
            ledger: Arc::clone(ledger),
        })
    }

    /// Hand out the painted pixels; the surface itself is released on return.
    fn capture(mut self) -> RgbImage {
        std::mem::replace(&mut self.canvas, Canvas::new(0, 0)).into_image()
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        self.ledger.released.fetch_add(1, Ordering::SeqCst);
        log::debug!("Released surface");
    }
}

/// Layout issued but not yet stable: the font is loading and math is still
/// being typeset on a blocking worker.
pub(crate) struct PendingLayout {
    blocks: Arc<[ContentBlock]>,
    metrics: Metrics,
    jobs: JoinHandle<Result<(FontFace, Vec<MathBox>), Error>>,
    worker_cancel: CancellationToken,
}

/// Layout whose deferred content has settled; geometry may be read.
pub(crate) struct SettledLayout {
    blocks: Arc<[ContentBlock]>,
    font: Arc<FontFace>,
    metrics: Metrics,
    math: Arc<[MathBox]>,
}

/// Measured cards and rectangles, ready to paint.
pub(crate) struct MeasuredLayout {
    font: Arc<FontFace>,
    metrics: Metrics,
    math: Arc<[MathBox]>,
    cards: Vec<BlockLayout>,
    rects: Vec<RenderedBlock>,
    size: SurfaceSize,
}

pub(crate) fn issue_layout(
    blocks: &[ContentBlock],
    options: &Options,
    typesetter: Arc<dyn Typesetter>,
    cancel: &CancellationToken,
) -> Result<PendingLayout, Error> {
    if blocks.is_empty() {
        return Err(Error::EmptyInput);
    }
    let metrics = Metrics::new(options);
    let pending: Vec<MathJob> = collect_math_jobs(blocks);
    log::debug!("Issued layout: {} blocks, {} math fragments", blocks.len(), pending.len());

    let worker_cancel = cancel.child_token();
    let token = worker_cancel.clone();
    let choice = options.font.clone();
    let size = metrics.font_size;
    let jobs = tokio::task::spawn_blocking(move || {
        let font = FontFace::load(&choice)?;
        let mut out = Vec::with_capacity(pending.len());
        for job in pending {
            if token.is_cancelled() {
                return Err(Error::Cancelled);
            }
            out.push(typesetter.typeset(&job.tex, job.display, size, &font));
        }
        Ok((font, out))
    });

    Ok(PendingLayout {
        blocks: blocks.into(),
        metrics,
        jobs,
        worker_cancel,
    })
}

impl PendingLayout {
    /// Wait for all deferred content to finish, bounded by `timeout`.
    pub(crate) async fn settle(
        self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<SettledLayout, Error> {
        let PendingLayout {
            blocks,
            metrics,
            jobs,
            worker_cancel,
        } = self;
        let (font, math) =
            join_bounded(jobs, worker_cancel, cancel, timeout, Stage::Stabilization).await?;
        Ok(SettledLayout {
            blocks,
            font: Arc::new(font),
            metrics,
            math: math.into(),
        })
    }
}

/// Await a blocking worker under `timeout`. On expiry or cancellation the
/// worker's token is cancelled and the worker is joined before the error is
/// returned, so whatever it holds is dropped first. Dropping this future
/// cancels the worker too.
async fn join_bounded<T: Send + 'static>(
    mut handle: JoinHandle<Result<T, Error>>,
    worker: CancellationToken,
    cancel: &CancellationToken,
    timeout: Duration,
    stage: Stage,
) -> Result<T, Error> {
    let _guard = worker.clone().drop_guard();
    let failure = tokio::select! {
        biased;
        _ = cancel.cancelled() => Error::Cancelled,
        _ = tokio::time::sleep(timeout) => Error::RenderTimeout { stage, timeout },
        joined = &mut handle => return joined.map_err(|e| Error::Worker(e.to_string()))?,
    };
    worker.cancel();
    // the worker stops at its next token check
    if let Err(e) = handle.await {
        log::warn!("Abandoned {stage} worker failed: {e}");
    }
    Err(failure)
}

impl SettledLayout {
    pub(crate) fn measure(self, options: &Options) -> MeasuredLayout {
        let mut next_job = 0;
        let cards: Vec<BlockLayout> = self
            .blocks
            .iter()
            .enumerate()
            .map(|(i, block)| {
                layout_block(
                    block,
                    i,
                    &self.font,
                    &self.metrics,
                    &options.palette,
                    &self.math,
                    &mut next_job,
                )
            })
            .collect();

        let mut rects = Vec::with_capacity(cards.len());
        let mut top = 0u32;
        for (i, card) in cards.iter().enumerate() {
            if i > 0 {
                top = top.saturating_add(self.metrics.gap);
            }
            rects.push(RenderedBlock::new(i, top, card.height));
            top = top.saturating_add(card.height);
        }

        MeasuredLayout {
            size: SurfaceSize {
                width: self.metrics.width as u32,
                height: top,
            },
            font: self.font,
            metrics: self.metrics,
            math: self.math,
            cards,
            rects,
        }
    }
}

impl MeasuredLayout {
    /// Paint every card onto a fresh surface and capture its pixels.
    pub(crate) async fn capture(
        self,
        ledger: &Arc<SurfaceLedger>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<RenderedSurface, Error> {
        let MeasuredLayout {
            font,
            metrics,
            math,
            cards,
            rects,
            size,
        } = self;
        let worker_cancel = cancel.child_token();
        let token = worker_cancel.clone();
        let ledger = Arc::clone(ledger);
        let paint_rects = rects.clone();

        let handle = tokio::task::spawn_blocking(move || {
            if token.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let mut surface = Surface::acquire(&ledger, size)?;
            for (card, rect) in cards.iter().zip(&paint_rects) {
                if token.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                paint_block(&mut surface.canvas, card, rect.top_px, &font, &metrics, &math);
            }
            Ok(surface.capture())
        });

        let image = join_bounded(handle, worker_cancel, cancel, timeout, Stage::Capture).await?;
        Ok(RenderedSurface {
            image: Arc::new(image),
            blocks: rects,
        })
    }
}

/// Layout renderer: stacks block cards on one tall raster surface.
///
/// Block heights are only read from a `SettledLayout`, after every math
/// fragment has been typeset under the stabilization timeout. Painting then
/// runs on a second worker that owns the temporary surface, under the
/// capture timeout.
pub(crate) async fn render(
    blocks: &[ContentBlock],
    options: &Options,
    typesetter: Arc<dyn Typesetter>,
    ledger: &Arc<SurfaceLedger>,
    cancel: &CancellationToken,
) -> Result<RenderedSurface, Error> {
    let t0 = Instant::now();
    let pending = issue_layout(blocks, options, typesetter, cancel)?;
    let settled = pending
        .settle(options.stabilization_timeout(), cancel)
        .await?;
    let t_settle = t0.elapsed();

    let measured = settled.measure(options);
    let size = measured.size;
    let t_measure = t0.elapsed();

    let surface = measured
        .capture(ledger, options.capture_timeout(), cancel)
        .await?;
    let t_capture = t0.elapsed();

    log::info!(
        "Render phases: settle={:.1}ms, measure={:.1}ms, capture={:.1}ms ({}x{} surface, {} blocks)",
        t_settle.as_secs_f64() * 1000.0,
        (t_measure - t_settle).as_secs_f64() * 1000.0,
        (t_capture - t_measure).as_secs_f64() * 1000.0,
        size.width,
        size.height,
        surface.blocks.len(),
    );
    Ok(surface)
}
