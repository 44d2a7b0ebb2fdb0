//! Equirectangular surface texture for the globe: countries binned into a hex
//! grid and colored by visit tier, with a location-density heatmap on top.

use std::collections::BTreeMap;
use std::f64::consts::PI;

// Same value as the unstable `std::f64::consts::SQRT_3`.
const SQRT_3: f64 = 1.732050807568877293527446341505872367_f64;

use foundation::Rgba;
use runtime::{Version, VersionCounter};
use scene::{Country, CountryStats, LocationSample, Ring};

use crate::raster::{IdRaster, RgbaCanvas};
use crate::symbology::TextureColors;

/// Hex size in pixels at the reference texture width.
pub const BASE_HEX_SIZE: f64 = 9.0;
pub const BASE_TEXTURE_WIDTH: f64 = 4096.0;
/// Gap between neighboring hexes as a fraction of the hex size.
pub const HEX_MARGIN: f64 = 0.2;

const COUNTRY_TIER_FRACTIONS: [f64; 2] = [0.33, 0.66];
const HEAT_TIER_FRACTIONS: [f64; 4] = [0.05, 0.15, 0.35, 0.65];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextureError {
    /// Requested or device-limited width leaves no pixels.
    ZeroSize { desired: u32, max_texture_size: u32 },
}

impl std::fmt::Display for TextureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TextureError::ZeroSize {
                desired,
                max_texture_size,
            } => write!(
                f,
                "texture width resolves to zero (desired {desired}, device max {max_texture_size})"
            ),
        }
    }
}

impl std::error::Error for TextureError {}

/// RGBA8 pixels, row-major from the north-west corner.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
pub struct TextureRequest<'a> {
    pub countries: &'a [Country],
    pub country_stats: &'a CountryStats,
    pub max_visits: f64,
    pub colors: TextureColors,
    pub locations: &'a [LocationSample],
    pub highest_location_count: f64,
}

/// Visit tier of a country.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CountryTier {
    NoData,
    Low,
    Medium,
    High,
}

pub fn classify_country(visits: f64, max_visits: f64) -> CountryTier {
    if !(visits >= 1.0) {
        CountryTier::NoData
    } else if visits < max_visits * COUNTRY_TIER_FRACTIONS[0] {
        CountryTier::Low
    } else if visits < max_visits * COUNTRY_TIER_FRACTIONS[1] {
        CountryTier::Medium
    } else {
        CountryTier::High
    }
}

/// Heat tier index `0..5` for a positive density.
pub fn classify_density(density: f64, highest: f64) -> usize {
    HEAT_TIER_FRACTIONS
        .iter()
        .position(|f| density < highest * f)
        .unwrap_or(HEAT_TIER_FRACTIONS.len())
}

/// Flat-top hex layout: odd columns are shifted down half a row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HexGrid {
    pub size: f64,
    pub width: f64,
    pub height: f64,
}

impl HexGrid {
    pub fn for_texture(width: u32, height: u32) -> Self {
        Self {
            size: BASE_HEX_SIZE * (width as f64 / BASE_TEXTURE_WIDTH),
            width: width as f64,
            height: height as f64,
        }
    }

    pub fn col_spacing(&self) -> f64 {
        1.5 * self.size
    }

    pub fn row_spacing(&self) -> f64 {
        SQRT_3 * self.size
    }

    pub fn draw_radius(&self) -> f64 {
        self.size * (1.0 - HEX_MARGIN)
    }

    pub fn cols(&self) -> usize {
        (self.width / self.col_spacing()).ceil() as usize + 1
    }

    pub fn rows(&self) -> usize {
        (self.height / self.row_spacing()).ceil() as usize + 1
    }

    /// Center of a cell, or `None` when it falls off the texture.
    pub fn center(&self, col: usize, row: usize) -> Option<(f64, f64)> {
        let cx = col as f64 * self.col_spacing();
        let offset = if col & 1 == 1 { self.row_spacing() / 2.0 } else { 0.0 };
        let cy = row as f64 * self.row_spacing() + offset;
        (cx < self.width && cy < self.height).then_some((cx, cy))
    }

    pub fn centers(&self) -> impl Iterator<Item = (usize, usize, f64, f64)> + '_ {
        (0..self.cols()).flat_map(move |col| {
            (0..self.rows()).filter_map(move |row| {
                self.center(col, row).map(|(cx, cy)| (col, row, cx, cy))
            })
        })
    }
}

fn hexagon(cx: f64, cy: f64, radius: f64) -> Vec<[f64; 2]> {
    (0..6)
        .map(|i| {
            let angle = PI / 3.0 * i as f64;
            [cx + radius * angle.cos(), cy + radius * angle.sin()]
        })
        .collect()
}

/// Equirectangular projection onto a `width x width/2` texture.
fn project(lng_deg: f64, lat_deg: f64, width: f64) -> [f64; 2] {
    let scale = width / (2.0 * PI);
    [
        width / 2.0 + lng_deg.to_radians() * scale,
        width / 4.0 - lat_deg.to_radians() * scale,
    ]
}

/// Projects a ring, unwrapping longitude jumps so antimeridian-crossing rings
/// stay contiguous (they may then extend past either edge).
fn project_ring(ring: &Ring, width: f64) -> Vec<[f64; 2]> {
    let mut out = Vec::with_capacity(ring.len());
    let mut prev_lng: Option<f64> = None;
    for &[lng, lat] in ring {
        let lng = match prev_lng {
            Some(prev) => prev + foundation::math::wrap_longitude(lng - prev),
            None => lng,
        };
        prev_lng = Some(lng);
        out.push(project(lng, lat, width));
    }
    out
}

/// Projected rings for one polygon, repeated one texture-width left or right
/// when they spill over an edge.
fn polygon_copies(polygon: &[Ring], width: f64) -> Vec<Vec<Vec<[f64; 2]>>> {
    let rings: Vec<Vec<[f64; 2]>> = polygon.iter().map(|r| project_ring(r, width)).collect();
    let (min_x, max_x) = rings
        .iter()
        .flatten()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
            (lo.min(p[0]), hi.max(p[0]))
        });

    let mut copies = Vec::with_capacity(2);
    for shift in [-width, width] {
        if (shift < 0.0 && max_x > width) || (shift > 0.0 && min_x < 0.0) {
            copies.push(
                rings
                    .iter()
                    .map(|r| r.iter().map(|p| [p[0] + shift, p[1]]).collect())
                    .collect(),
            );
        }
    }
    copies.push(rings);
    copies
}

/// Raster where each pixel holds the index of the country covering it.
pub fn build_lookup_raster(countries: &[Country], width: u32, height: u32) -> IdRaster {
    let mut raster = IdRaster::new(width as usize, height as usize);
    for (index, country) in countries.iter().enumerate() {
        for polygon in &country.polygons {
            for rings in polygon_copies(polygon, width as f64) {
                raster.fill_rings(&rings, index);
            }
        }
    }
    raster
}

fn color_key(c: Rgba) -> [u8; 4] {
    c.map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
}

/// Hex centers grouped by fill color, so each color is filled in one pass.
#[derive(Debug, Default)]
struct HexBatches {
    batches: BTreeMap<[u8; 4], (Rgba, Vec<(f64, f64)>)>,
}

impl HexBatches {
    fn push(&mut self, color: Rgba, center: (f64, f64)) {
        self.batches
            .entry(color_key(color))
            .or_insert_with(|| (color, Vec::new()))
            .1
            .push(center);
    }

    fn draw(&self, canvas: &mut RgbaCanvas, radius: f64) {
        for (color, centers) in self.batches.values() {
            for &(cx, cy) in centers {
                canvas.fill_rings(&[hexagon(cx, cy, radius)], *color);
            }
        }
    }

    fn hex_count(&self) -> usize {
        self.batches.values().map(|(_, c)| c.len()).sum()
    }
}

fn country_batches(
    grid: &HexGrid,
    lookup: &IdRaster,
    request: &TextureRequest<'_>,
) -> HexBatches {
    let colors = &request.colors;
    let country_colors: Vec<Rgba> = request
        .countries
        .iter()
        .map(|country| {
            let visits = request.country_stats.get(&country.code).copied().unwrap_or(0.0);
            match classify_country(visits, request.max_visits) {
                CountryTier::NoData => colors.no_data,
                CountryTier::Low => colors.country_tiers[0],
                CountryTier::Medium => colors.country_tiers[1],
                CountryTier::High => colors.country_tiers[2],
            }
        })
        .collect();

    let mut batches = HexBatches::default();
    for (_, _, cx, cy) in grid.centers() {
        if let Some(index) = lookup.lookup(cx, cy) {
            let color = country_colors.get(index).copied().unwrap_or(colors.no_data);
            batches.push(color, (cx, cy));
        }
    }
    batches
}

/// Density per hex cell: each location contributes `count * (1 - d / r)`
/// within the influence radius `r = 1.5 * column spacing`.
pub fn heat_density(grid: &HexGrid, locations: &[LocationSample]) -> Vec<Vec<f64>> {
    let (cols, rows) = (grid.cols(), grid.rows());
    let mut density = vec![vec![0.0; rows]; cols];
    let influence = grid.col_spacing() * 1.5;
    let (col_spacing, row_spacing) = (grid.col_spacing(), grid.row_spacing());

    for loc in locations {
        if !loc.count.is_finite() || !loc.lat_deg.is_finite() || !loc.lng_deg.is_finite() {
            continue;
        }
        let [px, py] = project(loc.lng_deg, loc.lat_deg, grid.width);
        let col_lo = ((px - influence) / col_spacing).floor().max(0.0) as usize;
        let col_hi = (((px + influence) / col_spacing).ceil().max(0.0) as usize).min(cols - 1);
        let row_lo = ((py - influence) / row_spacing - 1.0).floor().max(0.0) as usize;
        let row_hi = (((py + influence) / row_spacing).ceil().max(0.0) as usize).min(rows - 1);

        for col in col_lo..=col_hi {
            for row in row_lo..=row_hi {
                let Some((cx, cy)) = grid.center(col, row) else {
                    continue;
                };
                let d = ((cx - px).powi(2) + (cy - py).powi(2)).sqrt();
                if d < influence {
                    density[col][row] += loc.count * (1.0 - d / influence);
                }
            }
        }
    }
    density
}

fn heat_batches(grid: &HexGrid, request: &TextureRequest<'_>) -> HexBatches {
    let mut batches = HexBatches::default();
    let density = heat_density(grid, request.locations);
    for (col, row, cx, cy) in grid.centers() {
        let d = density[col][row];
        if d > 0.0 {
            let tier = classify_density(d, request.highest_location_count);
            batches.push(request.colors.heatmap_tiers[tier], (cx, cy));
        }
    }
    batches
}

/// Summary of one build, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextureStats {
    pub country_hexes: usize,
    pub heat_hexes: usize,
    pub color_batches: usize,
}

pub fn texture_size(desired_width: u32, max_texture_size: u32) -> Result<(u32, u32), TextureError> {
    let width = desired_width.min(max_texture_size) & !1;
    if width < 2 {
        return Err(TextureError::ZeroSize {
            desired: desired_width,
            max_texture_size,
        });
    }
    Ok((width, width / 2))
}

pub fn build_texture(
    request: &TextureRequest<'_>,
    desired_width: u32,
    max_texture_size: u32,
) -> Result<(TextureImage, TextureStats), TextureError> {
    let (width, height) = texture_size(desired_width, max_texture_size)?;
    let grid = HexGrid::for_texture(width, height);

    let mut canvas = RgbaCanvas::new(width as usize, height as usize);
    canvas.fill(request.colors.globe_fill);

    let lookup = build_lookup_raster(request.countries, width, height);
    let countries = country_batches(&grid, &lookup, request);
    countries.draw(&mut canvas, grid.draw_radius());

    let mut stats = TextureStats {
        country_hexes: countries.hex_count(),
        color_batches: countries.batches.len(),
        ..TextureStats::default()
    };

    if !request.locations.is_empty() && request.highest_location_count > 0.0 {
        let heat = heat_batches(&grid, request);
        heat.draw(&mut canvas, grid.draw_radius());
        stats.heat_hexes = heat.hex_count();
        stats.color_batches += heat.batches.len();
    }

    Ok((
        TextureImage {
            width,
            height,
            rgba: canvas.pixels,
        },
        stats,
    ))
}

/// Versioned rebuilds: only the most recently begun build may be applied.
#[derive(Debug, Default)]
pub struct TextureBuilder {
    versions: VersionCounter,
}

impl TextureBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self) -> Version {
        self.versions.begin()
    }

    pub fn is_current(&self, version: Version) -> bool {
        self.versions.is_current(version)
    }

    /// Returns the image if no newer build has started since `version`.
    pub fn accept(&self, version: Version, image: TextureImage) -> Option<TextureImage> {
        self.is_current(version).then_some(image)
    }

    /// Makes every in-flight build stale.
    pub fn invalidate(&mut self) {
        self.versions.invalidate();
    }
}
