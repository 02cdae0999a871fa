use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use memmap2::Mmap;
use ttf_parser::{Face, GlyphId};

use crate::config::FontChoice;
use crate::error::Error;
use crate::render::raster::{Canvas, Coverage, GlyphBuilder};

/// Regular sans faces tried in order when scanning system font directories.
const PREFERRED_FILES: &[&str] = &[
    "dejavusans.ttf",
    "liberationsans-regular.ttf",
    "notosans-regular.ttf",
    "arial.ttf",
    "helvetica.ttc",
    "freesans.ttf",
    "opensans-regular.ttf",
    "roboto-regular.ttf",
];

/// Mapped font files, kept for the life of the process so faces can borrow them.
static MAPPED: OnceLock<Mutex<HashMap<PathBuf, &'static Mmap>>> = OnceLock::new();

static SYSTEM_FACE: OnceLock<Option<PathBuf>> = OnceLock::new();

/// Glyph metrics and rasterisation for one face.
#[derive(Clone)]
pub enum FontFace {
    Outline(OutlineFace),
    /// Helvetica-like advances, glyphs drawn as solid boxes.
    Builtin,
}

#[derive(Clone)]
pub struct OutlineFace {
    face: Face<'static>,
    units_per_em: f32,
    ascender: f32,
    descender: f32,
    line_gap: f32,
}

impl FontFace {
    pub(crate) fn load(choice: &FontChoice) -> Result<FontFace, Error> {
        match choice {
            FontChoice::Builtin => Ok(FontFace::Builtin),
            FontChoice::Path(path) => OutlineFace::open(path).map(FontFace::Outline),
            FontChoice::System => {
                let found = SYSTEM_FACE.get_or_init(find_system_face);
                match found {
                    Some(path) => match OutlineFace::open(path) {
                        Ok(face) => Ok(FontFace::Outline(face)),
                        Err(e) => {
                            log::warn!("System font {} unusable ({e}), using builtin glyphs", path.display());
                            Ok(FontFace::Builtin)
                        }
                    },
                    None => {
                        log::warn!("No system sans font found, using builtin glyphs");
                        Ok(FontFace::Builtin)
                    }
                }
            }
        }
    }

    /// Horizontal advance of `ch` at `size` pixels per em.
    pub fn advance(&self, ch: char, size: f32) -> f32 {
        if let FontFace::Outline(o) = self
            && let Some(gid) = o.face.glyph_index(ch)
            && let Some(adv) = o.face.glyph_hor_advance(gid)
        {
            return adv as f32 / o.units_per_em * size;
        }
        builtin_width_1000(ch) * size / 1000.0
    }

    pub fn text_width(&self, text: &str, size: f32) -> f32 {
        text.chars().map(|ch| self.advance(ch, size)).sum()
    }

    pub fn ascent(&self, size: f32) -> f32 {
        match self {
            FontFace::Outline(o) => o.ascender / o.units_per_em * size,
            FontFace::Builtin => 0.8 * size,
        }
    }

    /// Depth below the baseline, positive.
    pub fn descent(&self, size: f32) -> f32 {
        match self {
            FontFace::Outline(o) => -o.descender / o.units_per_em * size,
            FontFace::Builtin => 0.2 * size,
        }
    }

    pub fn line_height(&self, size: f32) -> f32 {
        let gap = match self {
            FontFace::Outline(o) => o.line_gap / o.units_per_em * size,
            FontFace::Builtin => 0.0,
        };
        (self.ascent(size) + self.descent(size) + gap).max(1.25 * size)
    }

    /// Draw `ch` with its origin at (x, baseline).
    pub(crate) fn draw(
        &self,
        canvas: &mut Canvas,
        ch: char,
        size: f32,
        x: f32,
        baseline: f32,
        color: [u8; 3],
    ) {
        if ch.is_whitespace() {
            return;
        }
        if let FontFace::Outline(o) = self
            && let Some(gid) = o.face.glyph_index(ch)
        {
            o.draw_glyph(canvas, gid, size, x, baseline, color);
            return;
        }
        draw_box_glyph(canvas, ch, self.advance(ch, size), size, x, baseline, color);
    }
}

impl OutlineFace {
    fn open(path: &Path) -> Result<OutlineFace, Error> {
        let data = map_font_file(path)?;
        let face = Face::parse(data, 0)
            .map_err(|e| Error::Font(format!("{}: {e}", path.display())))?;
        let units_per_em = face.units_per_em() as f32;
        log::debug!("Loaded font {} ({} glyphs)", path.display(), face.number_of_glyphs());
        Ok(OutlineFace {
            units_per_em,
            ascender: face.ascender() as f32,
            descender: face.descender() as f32,
            line_gap: face.line_gap() as f32,
            face,
        })
    }

    fn draw_glyph(
        &self,
        canvas: &mut Canvas,
        gid: GlyphId,
        size: f32,
        x: f32,
        baseline: f32,
        color: [u8; 3],
    ) {
        let Some(bbox) = self.face.glyph_bounding_box(gid) else {
            return; // blank glyph
        };
        let scale = size / self.units_per_em;
        let left = x + bbox.x_min as f32 * scale - 1.0;
        let top = baseline - bbox.y_max as f32 * scale - 1.0;
        let (left_i, top_i) = (left.floor(), top.floor());
        let w = ((bbox.x_max - bbox.x_min) as f32 * scale + 3.0).ceil() as usize;
        let h = ((bbox.y_max - bbox.y_min) as f32 * scale + 3.0).ceil() as usize;

        let mut coverage = Coverage::new(w, h);
        let dx = 1.0 + (left - left_i) - bbox.x_min as f32 * scale;
        let dy = 1.0 + (top - top_i) + bbox.y_max as f32 * scale;
        let mut builder = GlyphBuilder::new(&mut coverage, scale, dx, dy);
        if self.face.outline_glyph(gid, &mut builder).is_none() {
            return;
        }
        coverage.composite(canvas, left_i as i64, top_i as i64, color);
    }
}

fn draw_box_glyph(
    canvas: &mut Canvas,
    ch: char,
    advance: f32,
    size: f32,
    x: f32,
    baseline: f32,
    color: [u8; 3],
) {
    let height = if ch.is_lowercase() { 0.5 * size } else { 0.7 * size };
    let inset = (advance * 0.1).max(0.5);
    canvas.fill_rect(
        x + inset,
        baseline - height,
        (advance - 2.0 * inset).max(1.0),
        height,
        color,
    );
}

fn map_font_file(path: &Path) -> Result<&'static [u8], Error> {
    let registry = MAPPED.get_or_init(|| Mutex::new(HashMap::new()));
    let mut mapped = registry
        .lock()
        .map_err(|_| Error::Font("font registry poisoned".into()))?;
    if let Some(&data) = mapped.get(path) {
        let bytes: &'static [u8] = data;
        return Ok(bytes);
    }
    let file = std::fs::File::open(path)?;
    let data = unsafe { Mmap::map(&file) }?;
    let data: &'static Mmap = Box::leak(Box::new(data));
    mapped.insert(path.to_path_buf(), data);
    let bytes: &'static [u8] = data;
    Ok(bytes)
}

#[cfg(target_os = "linux")]
const SYSTEM_DIRS: &[&str] = &["/usr/share/fonts", "/usr/local/share/fonts"];
#[cfg(target_os = "macos")]
const SYSTEM_DIRS: &[&str] = &["/Library/Fonts", "/System/Library/Fonts"];
#[cfg(target_os = "windows")]
const SYSTEM_DIRS: &[&str] = &["C:\\Windows\\Fonts"];
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
const SYSTEM_DIRS: &[&str] = &[];

/// Per-user font directory, relative to `$HOME`.
#[cfg(target_os = "linux")]
const USER_DIR: Option<&str> = Some(".local/share/fonts");
#[cfg(target_os = "macos")]
const USER_DIR: Option<&str> = Some("Library/Fonts");
#[cfg(not(any(target_os = "linux", target_os = "macos")))]
const USER_DIR: Option<&str> = None;

/// Search roots: `STATEMENT_PDF_FONTS` (a path list), then the user and
/// system directories. Subdirectories are walked by `find_system_face`.
fn font_directories() -> Vec<PathBuf> {
    let configured = std::env::var_os("STATEMENT_PDF_FONTS");
    let user = USER_DIR
        .zip(std::env::var_os("HOME"))
        .map(|(rel, home)| PathBuf::from(home).join(rel));
    configured
        .iter()
        .flat_map(|list| std::env::split_paths(list))
        .filter(|p| !p.as_os_str().is_empty())
        .chain(user)
        .chain(SYSTEM_DIRS.iter().map(PathBuf::from))
        .collect()
}

fn is_font_file(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref(),
        Some("ttf" | "otf" | "ttc")
    )
}

/// Walk the font directories and return the best-ranked preferred face.
fn find_system_face() -> Option<PathBuf> {
    let t0 = std::time::Instant::now();
    let mut best: Option<(usize, PathBuf)> = None;
    let mut visited = std::collections::HashSet::new();
    let mut stack = font_directories();
    let mut files_seen = 0u32;

    while let Some(dir) = stack.pop() {
        if !visited.insert(dir.clone()) {
            continue;
        }
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            if !is_font_file(&path) {
                continue;
            }
            files_seen += 1;
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.to_ascii_lowercase())
                .unwrap_or_default();
            if let Some(rank) = PREFERRED_FILES.iter().position(|p| *p == name)
                && best.as_ref().is_none_or(|(r, _)| rank < *r)
            {
                best = Some((rank, path));
            }
        }
    }

    log::info!(
        "Font scan: {:.1}ms, {} font files, selected {:?}",
        t0.elapsed().as_secs_f64() * 1000.0,
        files_seen,
        best.as_ref().map(|(_, p)| p),
    );
    best.map(|(_, p)| p)
}

/// Approximate Helvetica advance widths in 1000-units.
fn builtin_width_1000(ch: char) -> f32 {
    match ch {
        ' ' => 278.0,
        '!'..='/' | ':'..='@' | '['..='`' | '{'..='~' => 333.0,
        '0'..='9' => 556.0,
        'I' | 'J' => 278.0,
        'M' => 833.0,
        'A'..='Z' => 667.0,
        'f' | 'i' | 'j' | 'l' | 't' => 278.0,
        'm' | 'w' => 833.0,
        'a'..='z' => 556.0,
        _ => 556.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_metrics_are_fixed() {
        let font = FontFace::Builtin;
        assert_eq!(font.advance('M', 10.0), 8.33);
        assert_eq!(font.text_width("ii", 100.0), 55.6);
        assert_eq!(font.line_height(20.0), 25.0);
    }

    #[test]
    fn system_directories_are_searched_last() {
        let dirs = font_directories();
        let system: Vec<PathBuf> = SYSTEM_DIRS.iter().map(PathBuf::from).collect();

        assert!(dirs.len() >= system.len());
        assert_eq!(dirs[dirs.len() - system.len()..], system[..]);
        assert!(dirs.iter().all(|d| !d.as_os_str().is_empty()));
    }
}
