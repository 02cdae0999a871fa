use image::{Rgb, RgbImage};
use ttf_parser::OutlineBuilder;

/// RGB drawing target with clipped fills and coverage blending.
pub(crate) struct Canvas {
    img: RgbImage,
}

impl Canvas {
    pub(crate) fn new(width: u32, height: u32) -> Self {
        Canvas {
            img: RgbImage::from_pixel(width, height, Rgb([255, 255, 255])),
        }
    }

    pub(crate) fn into_image(self) -> RgbImage {
        self.img
    }

    /// Fill an axis-aligned rectangle; edges are rounded to whole pixels.
    pub(crate) fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: [u8; 3]) {
        let x0 = x.round().max(0.0) as u32;
        let y0 = y.round().max(0.0) as u32;
        let x1 = ((x + w).round().max(0.0) as u32).min(self.img.width());
        let y1 = ((y + h).round().max(0.0) as u32).min(self.img.height());
        for py in y0..y1 {
            for px in x0..x1 {
                self.img.put_pixel(px, py, Rgb(color));
            }
        }
    }

    pub(crate) fn blend(&mut self, x: i64, y: i64, alpha: f32, color: [u8; 3]) {
        if x < 0 || y < 0 || x >= self.img.width() as i64 || y >= self.img.height() as i64 {
            return;
        }
        let alpha = alpha.clamp(0.0, 1.0);
        if alpha <= 0.0 {
            return;
        }
        let px = self.img.get_pixel_mut(x as u32, y as u32);
        for (dst, src) in px.0.iter_mut().zip(color) {
            *dst = (*dst as f32 * (1.0 - alpha) + src as f32 * alpha).round() as u8;
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Point {
    x: f32,
    y: f32,
}

/// Signed-area coverage accumulator for anti-aliased outline filling.
///
/// Each line segment deposits its area contribution into the cell it crosses;
/// a running prefix sum per row then yields coverage under the non-zero rule.
pub(crate) struct Coverage {
    w: usize,
    h: usize,
    acc: Vec<f32>,
}

impl Coverage {
    pub(crate) fn new(w: usize, h: usize) -> Self {
        Coverage {
            w,
            h,
            acc: vec![0.0; w * h + 4],
        }
    }

    fn add(&mut self, idx: isize, v: f32) {
        if idx >= 0
            && let Some(cell) = self.acc.get_mut(idx as usize)
        {
            *cell += v;
        }
    }

    fn draw_line(&mut self, p0: Point, p1: Point) {
        if (p0.y - p1.y).abs() <= f32::EPSILON {
            return;
        }
        let (dir, p0, p1) = if p0.y < p1.y {
            (1.0, p0, p1)
        } else {
            (-1.0, p1, p0)
        };
        let dxdy = (p1.x - p0.x) / (p1.y - p0.y);
        let mut x = p0.x;
        if p0.y < 0.0 {
            x -= p0.y * dxdy;
        }
        let y_first = p0.y.max(0.0) as usize;
        let y_last = (p1.y.ceil().max(0.0) as usize).min(self.h);
        for y in y_first..y_last {
            let row = (y * self.w) as isize;
            let dy = ((y + 1) as f32).min(p1.y) - (y as f32).max(p0.y);
            let x_next = x + dxdy * dy;
            let d = dy * dir;
            let (x0, x1) = if x < x_next { (x, x_next) } else { (x_next, x) };
            let x0_floor = x0.floor();
            let x0i = x0_floor as isize;
            let x1_ceil = x1.ceil();
            let x1i = x1_ceil as isize;
            if x1i <= x0i + 1 {
                let xmf = 0.5 * (x + x_next) - x0_floor;
                self.add(row + x0i, d - d * xmf);
                self.add(row + x0i + 1, d * xmf);
            } else {
                let s = (x1 - x0).recip();
                let x0f = x0 - x0_floor;
                let a0 = 0.5 * s * (1.0 - x0f) * (1.0 - x0f);
                let x1f = x1 - x1_ceil + 1.0;
                let am = 0.5 * s * x1f * x1f;
                self.add(row + x0i, d * a0);
                if x1i == x0i + 2 {
                    self.add(row + x0i + 1, d * (1.0 - a0 - am));
                } else {
                    let a1 = s * (1.5 - x0f);
                    self.add(row + x0i + 1, d * (a1 - a0));
                    for xi in x0i + 2..x1i - 1 {
                        self.add(row + xi, d * s);
                    }
                    let a2 = a1 + (x1i - x0i - 3) as f32 * s;
                    self.add(row + x1i - 1, d * (1.0 - a2 - am));
                }
                self.add(row + x1i, d * am);
            }
            x = x_next;
        }
    }

    /// Blend the accumulated coverage onto `canvas` with its top-left at (left, top).
    pub(crate) fn composite(&self, canvas: &mut Canvas, left: i64, top: i64, color: [u8; 3]) {
        for y in 0..self.h {
            let mut sum = 0.0f32;
            for x in 0..self.w {
                sum += self.acc[y * self.w + x];
                let alpha = sum.abs().min(1.0);
                if alpha > 1.0 / 255.0 {
                    canvas.blend(left + x as i64, top + y as i64, alpha, color);
                }
            }
        }
    }
}

/// Feeds a glyph outline into a `Coverage` buffer.
///
/// Font units are mapped with `x' = x * scale + dx`, `y' = dy - y * scale`
/// (font space is y-up, the buffer is y-down). Curves are flattened.
pub(crate) struct GlyphBuilder<'a> {
    pub(crate) coverage: &'a mut Coverage,
    pub(crate) scale: f32,
    pub(crate) dx: f32,
    pub(crate) dy: f32,
    last: Point,
    start: Point,
}

const CURVE_STEPS: usize = 8;

impl<'a> GlyphBuilder<'a> {
    pub(crate) fn new(coverage: &'a mut Coverage, scale: f32, dx: f32, dy: f32) -> Self {
        GlyphBuilder {
            coverage,
            scale,
            dx,
            dy,
            last: Point::default(),
            start: Point::default(),
        }
    }

    fn map(&self, x: f32, y: f32) -> Point {
        Point {
            x: x * self.scale + self.dx,
            y: self.dy - y * self.scale,
        }
    }

    fn segment_to(&mut self, p: Point) {
        self.coverage.draw_line(self.last, p);
        self.last = p;
    }
}

impl OutlineBuilder for GlyphBuilder<'_> {
    fn move_to(&mut self, x: f32, y: f32) {
        let p = self.map(x, y);
        self.last = p;
        self.start = p;
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let p = self.map(x, y);
        self.segment_to(p);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let p0 = self.last;
        let c = self.map(x1, y1);
        let p = self.map(x, y);
        for i in 1..=CURVE_STEPS {
            let t = i as f32 / CURVE_STEPS as f32;
            let mt = 1.0 - t;
            self.segment_to(Point {
                x: mt * mt * p0.x + 2.0 * mt * t * c.x + t * t * p.x,
                y: mt * mt * p0.y + 2.0 * mt * t * c.y + t * t * p.y,
            });
        }
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let p0 = self.last;
        let c1 = self.map(x1, y1);
        let c2 = self.map(x2, y2);
        let p = self.map(x, y);
        for i in 1..=CURVE_STEPS {
            let t = i as f32 / CURVE_STEPS as f32;
            let mt = 1.0 - t;
            let (a, b, c, d) = (mt * mt * mt, 3.0 * mt * mt * t, 3.0 * mt * t * t, t * t * t);
            self.segment_to(Point {
                x: a * p0.x + b * c1.x + c * c2.x + d * p.x,
                y: a * p0.y + b * c1.y + c * c2.y + d * p.y,
            });
        }
    }

    fn close(&mut self) {
        let start = self.start;
        if (self.last.x - start.x).abs() > f32::EPSILON || (self.last.y - start.y).abs() > f32::EPSILON
        {
            self.segment_to(start);
        }
    }
}
