pub mod config;
mod error;
mod fonts;
pub mod model;
mod pdf;
pub mod render;
pub mod slicer;
pub mod units;

pub use config::{FontChoice, Options, PageSetup};
pub use error::{Error, Stage};
pub use fonts::FontFace;
pub use model::{BlockKind, ContentBlock, RenderedBlock, load_blocks};
pub use render::math::{MathBox, MathItem, TexTypesetter, Typesetter};
pub use render::{RenderedSurface, SurfaceLedger};
pub use slicer::{Clip, PageSlice, SurfaceSize, slice_pages};
pub use tokio_util::sync::CancellationToken;

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use slicer::page_capacity;

/// A finished paginated document.
#[derive(Debug)]
pub struct GeneratedDocument {
    pub pdf: Vec<u8>,
    pub slices: Vec<PageSlice>,
    pub blocks: Vec<RenderedBlock>,
    pub surface: SurfaceSize,
}

impl GeneratedDocument {
    pub fn page_count(&self) -> usize {
        self.slices.len()
    }

    /// Blocks that were truncated because they exceed one page.
    pub fn clipped(&self) -> impl Iterator<Item = &Clip> {
        self.slices.iter().filter_map(|s| s.clip.as_ref())
    }
}

/// One configured pagination pipeline. Each `run` owns its own surface and
/// document; runs never share mutable state.
pub struct Pipeline {
    options: Options,
    typesetter: Arc<dyn Typesetter>,
    ledger: Arc<SurfaceLedger>,
}

impl Pipeline {
    pub fn new(options: Options) -> Self {
        Pipeline {
            options,
            typesetter: Arc::new(TexTypesetter),
            ledger: Arc::new(SurfaceLedger::default()),
        }
    }

    pub fn with_typesetter(mut self, typesetter: Arc<dyn Typesetter>) -> Self {
        self.typesetter = typesetter;
        self
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Surfaces acquired and released by this pipeline's runs so far.
    pub fn surfaces(&self) -> &SurfaceLedger {
        &self.ledger
    }

    pub async fn run(&self, blocks: &[ContentBlock]) -> Result<GeneratedDocument, Error> {
        self.run_with_cancel(blocks, CancellationToken::new()).await
    }

    /// Render, slice and assemble. Cancelling `cancel` abandons the run; the
    /// in-flight worker is joined and its surface released before
    /// `Error::Cancelled` is returned. No partial document is returned.
    pub async fn run_with_cancel(
        &self,
        blocks: &[ContentBlock],
        cancel: CancellationToken,
    ) -> Result<GeneratedDocument, Error> {
        let result = self.run_stages(blocks, &cancel).await;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        result
    }

    /// Layout renderer only: the captured surface and block rectangles.
    pub async fn render(
        &self,
        blocks: &[ContentBlock],
        cancel: &CancellationToken,
    ) -> Result<RenderedSurface, Error> {
        self.preflight(blocks)?;
        render::render(
            blocks,
            &self.options,
            Arc::clone(&self.typesetter),
            &self.ledger,
            cancel,
        )
        .await
    }

    /// Slice a rendered surface and assemble the PDF.
    pub async fn paginate(
        &self,
        surface: &RenderedSurface,
        cancel: &CancellationToken,
    ) -> Result<GeneratedDocument, Error> {
        let t0 = Instant::now();
        let geometry = self.options.page.geometry();
        let size = surface.size();
        let slices = slice_pages(&surface.blocks, size, &geometry)?;
        let t_slice = t0.elapsed();

        let image = Arc::clone(&surface.image);
        let worker_slices = slices.clone();
        let title = self.options.title.clone();
        let token = cancel.clone();
        let pdf = tokio::task::spawn_blocking(move || {
            pdf::assemble(&image, &worker_slices, &geometry, &title, &token)
        })
        .await
        .map_err(|e| Error::Worker(e.to_string()))??;

        log::info!(
            "Paginate phases: slice={:.1}ms, assemble={:.1}ms ({} pages, {} clipped)",
            t_slice.as_secs_f64() * 1000.0,
            (t0.elapsed() - t_slice).as_secs_f64() * 1000.0,
            slices.len(),
            slices.iter().filter(|s| s.is_lossy()).count(),
        );

        Ok(GeneratedDocument {
            pdf,
            slices,
            blocks: surface.blocks.clone(),
            surface: size,
        })
    }

    async fn run_stages(
        &self,
        blocks: &[ContentBlock],
        cancel: &CancellationToken,
    ) -> Result<GeneratedDocument, Error> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let surface = self.render(blocks, cancel).await?;
        self.paginate(&surface, cancel).await
    }

    /// Checks that need no surface: input present, options sane, page capacity positive.
    fn preflight(&self, blocks: &[ContentBlock]) -> Result<(), Error> {
        if blocks.is_empty() {
            return Err(Error::EmptyInput);
        }
        self.options.validate()?;
        let geometry = self.options.page.geometry();
        page_capacity(self.options.surface_width_px(), &geometry)?;
        Ok(())
    }
}

/// Paginate `blocks` into a PDF with the default typesetter.
pub async fn generate_document(
    blocks: &[ContentBlock],
    options: &Options,
) -> Result<GeneratedDocument, Error> {
    Pipeline::new(options.clone()).run(blocks).await
}

/// Like [`generate_document`], abandoning the run when `cancel` fires.
pub async fn generate_document_with_cancel(
    blocks: &[ContentBlock],
    options: &Options,
    cancel: CancellationToken,
) -> Result<GeneratedDocument, Error> {
    Pipeline::new(options.clone())
        .run_with_cancel(blocks, cancel)
        .await
}

pub async fn convert_json_to_pdf(
    input: &Path,
    output: &Path,
    options: &Options,
) -> Result<GeneratedDocument, Error> {
    let t0 = Instant::now();

    let json = std::fs::read_to_string(input)?;
    let blocks = load_blocks(&json)?;
    let t_parse = t0.elapsed();

    let doc = generate_document(&blocks, options).await?;
    let t_render = t0.elapsed();

    std::fs::write(output, &doc.pdf)?;
    let t_total = t0.elapsed();

    log::info!(
        "Timing: parse={:.1}ms, paginate={:.1}ms, write={:.1}ms, total={:.1}ms (output {} bytes)",
        t_parse.as_secs_f64() * 1000.0,
        (t_render - t_parse).as_secs_f64() * 1000.0,
        (t_total - t_render).as_secs_f64() * 1000.0,
        t_total.as_secs_f64() * 1000.0,
        doc.pdf.len(),
    );

    Ok(doc)
}
