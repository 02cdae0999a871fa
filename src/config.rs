use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::Error;
use crate::model::Palette;
use crate::units::{Orientation, PageFormat, PageGeometry, Unit};

/// Where glyph shapes and metrics come from.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontChoice {
    /// Scan the platform font directories for a regular sans face.
    #[default]
    System,
    /// A specific TTF/OTF/TTC file.
    Path(PathBuf),
    /// Fixed-metric box glyphs; needs no font files.
    Builtin,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct PageSetup {
    pub format: PageFormat,
    pub orientation: Orientation,
    pub unit: Unit,
    pub margin: f64,
}

impl Default for PageSetup {
    fn default() -> Self {
        PageSetup {
            format: PageFormat::A4,
            orientation: Orientation::Portrait,
            unit: Unit::Mm,
            margin: 10.0,
        }
    }
}

impl PageSetup {
    pub fn geometry(&self) -> PageGeometry {
        PageGeometry::new(self.format, self.orientation, self.unit, self.margin)
    }
}

/// Options for one pagination run.
///
/// Lengths in layout pixels (`layout_width`, `block_gap`, `font_size`,
/// `block_padding`) are multiplied by `raster_scale` before rendering.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Options {
    pub page: PageSetup,
    pub raster_scale: f32,
    pub layout_width: u32,
    pub block_gap: u32,
    pub font_size: f32,
    pub block_padding: u32,
    pub font: FontChoice,
    pub palette: Palette,
    pub stabilization_timeout_ms: u64,
    pub capture_timeout_ms: u64,
    pub title: String,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            page: PageSetup::default(),
            raster_scale: 2.0,
            layout_width: 800,
            block_gap: 24,
            font_size: 16.0,
            block_padding: 20,
            font: FontChoice::System,
            palette: Palette::default(),
            stabilization_timeout_ms: 10_000,
            capture_timeout_ms: 10_000,
            title: "Extracted statements".to_string(),
        }
    }
}

impl Options {
    pub fn from_json_file(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn stabilization_timeout(&self) -> Duration {
        Duration::from_millis(self.stabilization_timeout_ms)
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }

    /// Scaled raster width of the surface.
    pub fn surface_width_px(&self) -> u32 {
        (self.layout_width as f32 * self.raster_scale).round() as u32
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if !self.raster_scale.is_finite() || self.raster_scale <= 0.0 {
            return Err(Error::InvalidInput(format!(
                "raster scale must be positive, got {}",
                self.raster_scale
            )));
        }
        if !self.font_size.is_finite() || self.font_size <= 0.0 {
            return Err(Error::InvalidInput(format!(
                "font size must be positive, got {}",
                self.font_size
            )));
        }
        if self.layout_width <= self.block_padding.saturating_mul(2) {
            return Err(Error::InvalidInput(format!(
                "layout width {} leaves no room inside {}px padding",
                self.layout_width, self.block_padding
            )));
        }
        Ok(())
    }
}
