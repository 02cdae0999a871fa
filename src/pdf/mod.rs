mod encode;

use std::time::Instant;

use image::RgbImage;
use pdf_writer::{Content, Filter, Name, Pdf, Rect, Ref, TextStr};
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::slicer::PageSlice;
use crate::units::PageGeometry;

use encode::{EncodedImage, encode_rows};

/// Image placement in points, measured from the page's top-left corner.
struct Placed {
    image: usize,
    x: f32,
    top: f32,
    width: f32,
    height: f32,
}

#[derive(Default)]
struct PageContent {
    placements: Vec<Placed>,
}

/// Multi-page document under construction. Starts with one empty page.
pub(crate) struct PdfDocument {
    page_width: f32,
    page_height: f32,
    pages: Vec<PageContent>,
    images: Vec<EncodedImage>,
}

impl PdfDocument {
    pub(crate) fn new(page_width: f32, page_height: f32) -> Self {
        PdfDocument {
            page_width,
            page_height,
            pages: vec![PageContent::default()],
            images: Vec::new(),
        }
    }

    pub(crate) fn add_page(&mut self) {
        self.pages.push(PageContent::default());
    }

    pub(crate) fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Place `image` on the current (last) page.
    pub(crate) fn place_image(&mut self, image: EncodedImage, x: f32, top: f32, width: f32, height: f32) {
        let index = self.images.len();
        self.images.push(image);
        if let Some(page) = self.pages.last_mut() {
            page.placements.push(Placed {
                image: index,
                x,
                top,
                width,
                height,
            });
        }
    }

    pub(crate) fn finish(self, title: &str) -> Vec<u8> {
        let mut pdf = Pdf::new();
        let mut next_id = 1i32;
        let mut alloc = || {
            let r = Ref::new(next_id);
            next_id += 1;
            r
        };

        let catalog_id = alloc();
        let pages_id = alloc();
        let info_id = alloc();

        let mut image_refs: Vec<Ref> = Vec::with_capacity(self.images.len());
        for img in &self.images {
            let xobj_ref = alloc();
            let mut xobj = pdf.image_xobject(xobj_ref, &img.data);
            xobj.filter(Filter::FlateDecode);
            xobj.width(img.width as i32);
            xobj.height(img.height as i32);
            xobj.color_space().device_rgb();
            xobj.bits_per_component(8);
            image_refs.push(xobj_ref);
        }

        let n = self.pages.len();
        let page_ids: Vec<Ref> = (0..n).map(|_| alloc()).collect();
        let content_ids: Vec<Ref> = (0..n).map(|_| alloc()).collect();

        pdf.catalog(catalog_id).pages(pages_id);
        pdf.pages(pages_id)
            .kids(page_ids.iter().copied())
            .count(n as i32);
        pdf.document_info(info_id)
            .title(TextStr(title))
            .creator(TextStr("statement-pdf"));

        for (i, page) in self.pages.iter().enumerate() {
            let mut content = Content::new();
            for p in &page.placements {
                content.save_state();
                content.transform([
                    p.width,
                    0.0,
                    0.0,
                    p.height,
                    p.x,
                    self.page_height - p.top - p.height,
                ]);
                content.x_object(Name(format!("Im{}", p.image + 1).as_bytes()));
                content.restore_state();
            }
            let raw = content.finish();
            let compressed = miniz_oxide::deflate::compress_to_vec_zlib(raw.as_slice(), 6);
            pdf.stream(content_ids[i], &compressed).filter(Filter::FlateDecode);

            let mut pdf_page = pdf.page(page_ids[i]);
            pdf_page
                .media_box(Rect::new(0.0, 0.0, self.page_width, self.page_height))
                .parent(pages_id)
                .contents(content_ids[i]);
            if !page.placements.is_empty() {
                let mut resources = pdf_page.resources();
                let mut xobjects = resources.x_objects();
                for p in &page.placements {
                    let name = format!("Im{}", p.image + 1);
                    xobjects.pair(Name(name.as_bytes()), image_refs[p.image]);
                }
            }
        }

        pdf.finish()
    }
}

/// Document assembler: one page per slice, each holding one placed image.
/// The first slice goes on the initial page, every later slice adds a page
/// first. Placement uses each slice's own scale.
pub(crate) fn assemble(
    surface: &RgbImage,
    slices: &[PageSlice],
    page: &PageGeometry,
    title: &str,
    cancel: &CancellationToken,
) -> Result<Vec<u8>, Error> {
    let t0 = Instant::now();
    let (page_w, page_h) = page.size_pt();
    let unit = page.unit;
    let mut doc = PdfDocument::new(page_w, page_h);

    for (i, slice) in slices.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if i > 0 {
            doc.add_page();
        }
        let image = encode_rows(surface, slice.y_start, slice.content_end)?;
        let p = slice.placement;
        let margin = unit.to_points(p.margin) as f32;
        doc.place_image(
            image,
            margin,
            margin,
            unit.to_points(p.usable_width) as f32,
            unit.to_points(slice.placed_height()) as f32,
        );
    }
    let t_encode = t0.elapsed();

    let pages = doc.page_count();
    let bytes = doc.finish(title);
    log::info!(
        "Assembly: encode={:.1}ms, write={:.1}ms ({} pages, {} bytes)",
        t_encode.as_secs_f64() * 1000.0,
        (t0.elapsed() - t_encode).as_secs_f64() * 1000.0,
        pages,
        bytes.len(),
    );
    Ok(bytes)
}
