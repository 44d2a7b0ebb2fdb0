//! CPU rasterization for the globe surface texture: an RGBA canvas with
//! source-over blending and an id raster for point-to-country lookups.
//!
//! Polygons are filled with the even-odd rule, sampling pixel centers, with no
//! anti-aliasing (ids must never blend).

use foundation::Rgba;

/// Calls `span(y, x_start, x_end)` for each run of pixels inside `rings`.
///
/// Rings are closed implicitly; coordinates are in pixels.
pub fn scanline_spans(
    rings: &[Vec<[f64; 2]>],
    width: usize,
    height: usize,
    mut span: impl FnMut(usize, usize, usize),
) {
    let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
    for p in rings.iter().flatten() {
        min_y = min_y.min(p[1]);
        max_y = max_y.max(p[1]);
    }
    if !min_y.is_finite() || !max_y.is_finite() || width == 0 || height == 0 {
        return;
    }

    let y_start = (min_y - 0.5).ceil().max(0.0) as usize;
    let y_end = ((max_y - 0.5).floor() + 1.0).clamp(0.0, height as f64) as usize;
    let mut crossings: Vec<f64> = Vec::new();

    for y in y_start..y_end {
        let sy = y as f64 + 0.5;
        crossings.clear();
        for ring in rings {
            let n = ring.len();
            if n < 3 {
                continue;
            }
            for i in 0..n {
                let a = ring[i];
                let b = ring[(i + 1) % n];
                // Half-open rule so shared vertices count once.
                if (a[1] <= sy) != (b[1] <= sy) {
                    let t = (sy - a[1]) / (b[1] - a[1]);
                    crossings.push(a[0] + t * (b[0] - a[0]));
                }
            }
        }
        crossings.sort_by(f64::total_cmp);

        for pair in crossings.chunks_exact(2) {
            let x0 = (pair[0] - 0.5).ceil().max(0.0);
            let x1 = ((pair[1] - 0.5).ceil()).min(width as f64);
            if x1 > x0 {
                span(y, x0 as usize, x1 as usize);
            }
        }
    }
}

/// RGBA8 image composited like a 2D canvas (`source-over`).
#[derive(Debug, Clone, PartialEq)]
pub struct RgbaCanvas {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
}

fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

impl RgbaCanvas {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width * height * 4],
        }
    }

    pub fn fill(&mut self, color: Rgba) {
        let px = color.map(to_u8);
        for chunk in self.pixels.chunks_exact_mut(4) {
            chunk.copy_from_slice(&px);
        }
    }

    pub fn pixel(&self, x: usize, y: usize) -> [u8; 4] {
        let i = (y * self.width + x) * 4;
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }

    fn blend_span(&mut self, y: usize, x0: usize, x1: usize, color: Rgba) {
        let a = color[3].clamp(0.0, 1.0);
        if a <= 0.0 {
            return;
        }
        let row = y * self.width * 4;
        for x in x0..x1 {
            let i = row + x * 4;
            let dst = &mut self.pixels[i..i + 4];
            let da = dst[3] as f32 / 255.0;
            let out_a = a + da * (1.0 - a);
            for c in 0..3 {
                let d = dst[c] as f32 / 255.0;
                let v = if out_a > 0.0 {
                    (color[c] * a + d * da * (1.0 - a)) / out_a
                } else {
                    0.0
                };
                dst[c] = to_u8(v);
            }
            dst[3] = to_u8(out_a);
        }
    }

    pub fn fill_rings(&mut self, rings: &[Vec<[f64; 2]>], color: Rgba) {
        let (w, h) = (self.width, self.height);
        scanline_spans(rings, w, h, |y, x0, x1| self.blend_span(y, x0, x1, color));
    }
}

/// Per-pixel feature ids; `0` means "nothing here", feature `i` is stored as
/// `i + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct IdRaster {
    pub width: usize,
    pub height: usize,
    ids: Vec<u32>,
}

impl IdRaster {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            ids: vec![0; width * height],
        }
    }

    pub fn fill_rings(&mut self, rings: &[Vec<[f64; 2]>], feature_index: usize) {
        let id = u32::try_from(feature_index + 1).unwrap_or(u32::MAX);
        let (w, h) = (self.width, self.height);
        let ids = &mut self.ids;
        scanline_spans(rings, w, h, |y, x0, x1| {
            ids[y * w + x0..y * w + x1].fill(id);
        });
    }

    /// Feature index at a pixel, clamped to the raster.
    pub fn lookup(&self, x: f64, y: f64) -> Option<usize> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        let px = (x.floor().max(0.0) as usize).min(self.width - 1);
        let py = (y.floor().max(0.0) as usize).min(self.height - 1);
        match self.ids[py * self.width + px] {
            0 => None,
            id => Some(id as usize - 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<[f64; 2]> {
        vec![[x0, y0], [x1, y0], [x1, y1], [x0, y1]]
    }

    #[test]
    fn square_covers_pixel_centers_inside() {
        let mut covered = 0;
        scanline_spans(&[square(1.0, 1.0, 5.0, 3.0)], 10, 10, |_, x0, x1| {
            covered += x1 - x0;
        });
        assert_eq!(covered, 4 * 2);
    }

    #[test]
    fn holes_are_left_unfilled() {
        let mut raster = IdRaster::new(10, 10);
        raster.fill_rings(&[square(0.0, 0.0, 10.0, 10.0), square(4.0, 4.0, 6.0, 6.0)], 2);
        assert_eq!(raster.lookup(1.5, 1.5), Some(2));
        assert_eq!(raster.lookup(5.0, 5.0), None);
    }

    #[test]
    fn lookup_clamps_to_edges() {
        let mut raster = IdRaster::new(4, 4);
        raster.fill_rings(&[square(0.0, 0.0, 4.0, 4.0)], 0);
        assert_eq!(raster.lookup(100.0, -5.0), Some(0));
    }

    #[test]
    fn translucent_fill_blends_over_background() {
        let mut canvas = RgbaCanvas::new(2, 1);
        canvas.fill([0.0, 0.0, 0.0, 1.0]);
        canvas.fill_rings(&[square(0.0, 0.0, 1.0, 1.0)], [1.0, 1.0, 1.0, 0.5]);
        assert_eq!(canvas.pixel(0, 0), [128, 128, 128, 255]);
        assert_eq!(canvas.pixel(1, 0), [0, 0, 0, 255]);
    }
}
