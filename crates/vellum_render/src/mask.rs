//! Single-channel coverage for clips and luminance masks

use tiny_skia::{IntSize, Mask, Pixmap};
use vellum_core::Affine;

use crate::canvas::ClipRegion;
use crate::convert;

/// ITU-R BT.709 luminance weights
pub const LUMINANCE_R: f32 = 0.2125;
pub const LUMINANCE_G: f32 = 0.7154;
pub const LUMINANCE_B: f32 = 0.0721;

/// Pixel grid a coverage buffer is rendered on
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CoverageGrid {
    pub width: u32,
    pub height: u32,
    /// Grid pixel space to device space
    pub to_device: Affine,
}

/// 8-bit coverage on a `CoverageGrid`
#[derive(Clone, Debug, PartialEq)]
pub struct Coverage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub to_device: Affine,
}

impl Coverage {
    /// Luminance-to-alpha of a premultiplied pixmap, scaled by `opacity`
    ///
    /// On premultiplied channels the weighted sum already carries the mask's
    /// alpha, so each value is `luminance * alpha * opacity`.
    pub fn from_luminance(pixmap: &Pixmap, opacity: f32, to_device: Affine) -> Self {
        let opacity = opacity.clamp(0.0, 1.0);
        let data = pixmap
            .data()
            .chunks_exact(4)
            .map(|px| {
                let lum = LUMINANCE_R * px[0] as f32
                    + LUMINANCE_G * px[1] as f32
                    + LUMINANCE_B * px[2] as f32;
                (lum * opacity).round().clamp(0.0, 255.0) as u8
            })
            .collect();
        Self {
            width: pixmap.width(),
            height: pixmap.height(),
            data,
            to_device,
        }
    }

    /// Rasterize a clip region; `transform` maps its user space to device
    pub fn from_clip(region: &ClipRegion, transform: &Affine, grid: &CoverageGrid) -> Option<Self> {
        let to_grid = grid.to_device.inverse()? * *transform;
        let mask = region_mask(region, &to_grid, grid.width, grid.height)?;
        Some(Self {
            width: grid.width,
            height: grid.height,
            data: mask.data().to_vec(),
            to_device: grid.to_device,
        })
    }

    /// Constant coverage over a grid
    pub fn uniform(grid: &CoverageGrid, value: f32) -> Self {
        let v = (value.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self {
            width: grid.width,
            height: grid.height,
            data: vec![v; grid.width as usize * grid.height as usize],
            to_device: grid.to_device,
        }
    }

    /// Multiply by another coverage on the same grid
    pub fn multiply(&mut self, other: &Coverage) {
        if other.width != self.width || other.height != self.height {
            tracing::warn!(
                "coverage size mismatch: {}x{} vs {}x{}",
                self.width,
                self.height,
                other.width,
                other.height
            );
            return;
        }
        multiply_bytes(&mut self.data, &other.data);
    }

    pub fn scale(&mut self, factor: f32) {
        if factor >= 1.0 {
            return;
        }
        let factor = factor.max(0.0);
        for v in &mut self.data {
            *v = (*v as f32 * factor).round() as u8;
        }
    }

    /// Mean coverage in [0, 1]
    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.data.iter().map(|v| *v as u64).sum();
        sum as f32 / (self.data.len() as f32 * 255.0)
    }

    pub fn to_mask(&self) -> Option<Mask> {
        Mask::from_vec(self.data.clone(), IntSize::from_wh(self.width, self.height)?)
    }
}

/// `a = a * b / 255`
pub(crate) fn multiply_bytes(a: &mut [u8], b: &[u8]) {
    for (x, y) in a.iter_mut().zip(b) {
        *x = ((*x as u16 * *y as u16 + 127) / 255) as u8;
    }
}

/// Union of the region's shapes, intersected with its outer regions
pub(crate) fn region_mask(region: &ClipRegion, transform: &Affine, width: u32, height: u32) -> Option<Mask> {
    let mut mask = Mask::new(width, height)?;
    let ts = convert::transform(transform);
    for shape in &region.shapes {
        if let Some(path) = convert::path(&shape.path) {
            mask.fill_path(&path, convert::fill_rule(shape.rule), true, ts);
        }
    }
    if let Some(outer) = &region.within {
        let outer = region_mask(outer, transform, width, height)?;
        multiply_bytes(mask.data_mut(), outer.data());
    }
    Some(mask)
}
