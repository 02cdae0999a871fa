use serde::Deserialize;

use crate::error::Error;

/// Physical unit the page geometry is expressed in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Pt,
    #[default]
    Mm,
    Cm,
    In,
    /// CSS pixel, 96 per inch.
    Px,
}

impl Unit {
    pub fn points_per_unit(self) -> f64 {
        match self {
            Unit::Pt => 1.0,
            Unit::Mm => 72.0 / 25.4,
            Unit::Cm => 72.0 / 2.54,
            Unit::In => 72.0,
            Unit::Px => 0.75,
        }
    }

    pub fn to_points(self, value: f64) -> f64 {
        value * self.points_per_unit()
    }

    pub fn from_mm(self, mm: f64) -> f64 {
        Unit::Mm.to_points(mm) / self.points_per_unit()
    }

    pub fn parse(s: &str) -> Option<Unit> {
        match s.to_ascii_lowercase().as_str() {
            "pt" => Some(Unit::Pt),
            "mm" => Some(Unit::Mm),
            "cm" => Some(Unit::Cm),
            "in" => Some(Unit::In),
            "px" => Some(Unit::Px),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageFormat {
    A3,
    #[default]
    A4,
    A5,
    Letter,
    Legal,
    Custom {
        width_mm: f64,
        height_mm: f64,
    },
}

impl PageFormat {
    /// Portrait (width, height) in millimetres.
    pub fn size_mm(self) -> (f64, f64) {
        match self {
            PageFormat::A3 => (297.0, 420.0),
            PageFormat::A4 => (210.0, 297.0),
            PageFormat::A5 => (148.0, 210.0),
            PageFormat::Letter => (215.9, 279.4),
            PageFormat::Legal => (215.9, 355.6),
            PageFormat::Custom {
                width_mm,
                height_mm,
            } => (width_mm, height_mm),
        }
    }

    pub fn parse(s: &str) -> Option<PageFormat> {
        match s.to_ascii_lowercase().as_str() {
            "a3" => Some(PageFormat::A3),
            "a4" => Some(PageFormat::A4),
            "a5" => Some(PageFormat::A5),
            "letter" => Some(PageFormat::Letter),
            "legal" => Some(PageFormat::Legal),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

/// Target page dimensions, all in `unit`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageGeometry {
    pub width: f64,
    pub height: f64,
    pub margin: f64,
    pub unit: Unit,
}

impl PageGeometry {
    pub fn new(format: PageFormat, orientation: Orientation, unit: Unit, margin: f64) -> Self {
        let (w_mm, h_mm) = format.size_mm();
        let (w_mm, h_mm) = match orientation {
            Orientation::Portrait => (w_mm, h_mm),
            Orientation::Landscape => (h_mm, w_mm),
        };
        PageGeometry {
            width: unit.from_mm(w_mm),
            height: unit.from_mm(h_mm),
            margin,
            unit,
        }
    }

    pub fn usable_width(&self) -> f64 {
        self.width - 2.0 * self.margin
    }

    pub fn usable_height(&self) -> f64 {
        self.height - 2.0 * self.margin
    }

    /// Page size in PDF points.
    pub fn size_pt(&self) -> (f32, f32) {
        (
            self.unit.to_points(self.width) as f32,
            self.unit.to_points(self.height) as f32,
        )
    }
}

/// Physical units per raster pixel.
///
/// Derived once per run from the captured surface width and the page's usable
/// width; the slicer and the assembler must both use the same value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UnitScale {
    px_to_unit: f64,
}

impl UnitScale {
    pub fn derive(usable_width: f64, surface_width_px: u32) -> Result<Self, Error> {
        if surface_width_px == 0 {
            return Err(Error::degenerate("rendered surface has zero width"));
        }
        if !usable_width.is_finite() || usable_width <= 0.0 {
            return Err(Error::degenerate(format!(
                "usable page width {usable_width} is not positive"
            )));
        }
        Ok(UnitScale {
            px_to_unit: usable_width / surface_width_px as f64,
        })
    }

    pub fn px_to_unit(self) -> f64 {
        self.px_to_unit
    }

    pub fn to_physical(self, px: u32) -> f64 {
        px as f64 * self.px_to_unit
    }

    /// Whole pixels of surface that fit into `usable_height`.
    pub fn capacity_px(self, usable_height: f64) -> Result<u32, Error> {
        let capacity = (usable_height / self.px_to_unit).floor();
        if !capacity.is_finite() || capacity <= 0.0 {
            return Err(Error::degenerate(format!(
                "page capacity is {capacity}px (usable height {usable_height}, {} units/px)",
                self.px_to_unit
            )));
        }
        Ok(capacity.min(u32::MAX as f64) as u32)
    }
}
