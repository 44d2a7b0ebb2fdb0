//! Screen-space paths for the canvas-2D backend, cached per projection.
//!
//! The sphere outline, graticule and country shapes only change with the
//! projection. Paths are rebuilt when the rotation moves more than 0.01°,
//! the pixel scale more than 0.001, or the viewport size changes at all.
//! Everything is clipped to the visible hemisphere; clipped country rings
//! are closed along the horizon.

use compute::project;
use foundation::Rgba;
use layers::{CountryTier, TextureColors, classify_country};
use scene::{Country, CountryStats, Polygon, ProjectionParams};

const ROTATION_EPSILON_DEG: f64 = 0.01;
const SCALE_EPSILON: f64 = 0.001;
/// Longest edge, in degrees, before rings are resampled.
const RESAMPLE_STEP_DEG: f64 = 2.0;
const HORIZON_STEP_DEG: f64 = 5.0;
const GRATICULE_STEP_DEG: f64 = 10.0;

pub type ScreenPath = Vec<[f32; 2]>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionKey {
    pub rotation: [f64; 2],
    /// Globe radius in pixels.
    pub scale: f64,
    pub width: f64,
    pub height: f64,
}

impl ProjectionKey {
    pub fn from_params(params: &ProjectionParams) -> Self {
        Self {
            rotation: params.rotation,
            scale: params.radius * params.scale,
            width: params.width,
            height: params.height,
        }
    }

    /// Whether paths built for `self` are stale under `other`.
    pub fn differs(&self, other: &ProjectionKey) -> bool {
        (self.rotation[0] - other.rotation[0]).abs() > ROTATION_EPSILON_DEG
            || (self.rotation[1] - other.rotation[1]).abs() > ROTATION_EPSILON_DEG
            || (self.scale - other.scale).abs() > SCALE_EPSILON
            || self.width != other.width
            || self.height != other.height
    }
}

/// Countries sharing one fill color.
#[derive(Debug, Clone, PartialEq)]
pub struct CountryGroup {
    pub fill: Rgba,
    pub polygons: Vec<Polygon>,
}

/// Groups countries by visit tier, in tier order; empty tiers are omitted.
pub fn group_countries(
    countries: &[Country],
    stats: &CountryStats,
    max_visits: f64,
    colors: &TextureColors,
) -> Vec<CountryGroup> {
    let tiers = [
        (CountryTier::NoData, colors.no_data),
        (CountryTier::Low, colors.country_tiers[0]),
        (CountryTier::Medium, colors.country_tiers[1]),
        (CountryTier::High, colors.country_tiers[2]),
    ];
    tiers
        .iter()
        .filter_map(|&(tier, fill)| {
            let polygons: Vec<Polygon> = countries
                .iter()
                .filter(|c| {
                    let visits = stats.get(&c.code).copied().unwrap_or(0.0);
                    classify_country(visits, max_visits) == tier
                })
                .flat_map(|c| c.polygons.iter().cloned())
                .collect();
            (!polygons.is_empty()).then_some(CountryGroup { fill, polygons })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereOutline {
    pub center: [f32; 2],
    pub radius: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FillPaths {
    pub fill: Rgba,
    /// Closed rings; fill with the even-odd rule.
    pub rings: Vec<ScreenPath>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedPaths {
    pub sphere: SphereOutline,
    pub graticule: Vec<ScreenPath>,
    pub country_fills: Vec<FillPaths>,
    /// Every country outline, for one combined stroke.
    pub country_stroke: Vec<ScreenPath>,
}

#[derive(Debug, Default)]
pub struct PathCache {
    key: Option<ProjectionKey>,
    paths: Option<CachedPaths>,
    rebuilds: u64,
}

impl PathCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops cached paths, e.g. after the country groups or theme change.
    pub fn invalidate(&mut self) {
        self.key = None;
        self.paths = None;
    }

    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    pub fn needs_rebuild(&self, params: &ProjectionParams) -> bool {
        let key = ProjectionKey::from_params(params);
        self.paths.is_none() || self.key.is_none_or(|k| k.differs(&key))
    }

    /// Cached paths for `params`, rebuilt first when stale.
    pub fn paths(&mut self, params: &ProjectionParams, groups: &[CountryGroup]) -> &CachedPaths {
        if self.needs_rebuild(params) {
            self.paths = None;
            self.key = Some(ProjectionKey::from_params(params));
            self.rebuilds += 1;
        }
        self.paths.get_or_insert_with(|| build_paths(params, groups))
    }
}

pub fn build_paths(params: &ProjectionParams, groups: &[CountryGroup]) -> CachedPaths {
    let view = View::new(params);
    let sphere = SphereOutline {
        center: [(params.width / 2.0) as f32, (params.height / 2.0) as f32],
        radius: (params.radius * params.scale) as f32,
    };

    let graticule = graticule_lines()
        .iter()
        .flat_map(|line| view.clip_line(line))
        .collect();

    let mut country_stroke = Vec::new();
    let country_fills = groups
        .iter()
        .map(|group| {
            let mut rings = Vec::new();
            for ring in group.polygons.iter().flatten() {
                let resampled = resample(ring);
                rings.extend(view.clip_ring(&resampled));
                let mut closed = resampled;
                if let Some(&first) = closed.first() {
                    closed.push(first);
                }
                country_stroke.extend(view.clip_line(&closed));
            }
            FillPaths {
                fill: group.fill,
                rings,
            }
        })
        .collect();

    CachedPaths {
        sphere,
        graticule,
        country_fills,
        country_stroke,
    }
}

/// Meridians every 10° (polar caps only on the 90° ones) and parallels
/// every 10° up to ±80°, as `[lng, lat]` polylines.
fn graticule_lines() -> Vec<Vec<[f64; 2]>> {
    let steps = |from: f64, to: f64| {
        let n = ((to - from) / RESAMPLE_STEP_DEG).round() as usize;
        (0..=n).map(move |i| from + (to - from) * i as f64 / n as f64)
    };
    let mut lines = Vec::new();
    let mut lng = -180.0;
    while lng < 180.0 {
        let extent = if lng % 90.0 == 0.0 { 90.0 } else { 80.0 };
        lines.push(steps(-extent, extent).map(|lat| [lng, lat]).collect());
        lng += GRATICULE_STEP_DEG;
    }
    let mut lat = -80.0;
    while lat <= 80.0 {
        lines.push(steps(-180.0, 180.0).map(|lng| [lng, lat]).collect());
        lat += GRATICULE_STEP_DEG;
    }
    lines
}

/// Splits long edges of a closed ring so clipping and projection follow
/// the surface.
fn resample(ring: &[[f64; 2]]) -> Vec<[f64; 2]> {
    let mut out = Vec::with_capacity(ring.len());
    for (i, &a) in ring.iter().enumerate() {
        let b = ring[(i + 1) % ring.len()];
        out.push(a);
        let span = (b[0] - a[0]).abs().max((b[1] - a[1]).abs());
        if span > 180.0 {
            // Antimeridian jump; the clip handles the break.
            continue;
        }
        let n = (span / RESAMPLE_STEP_DEG).ceil() as usize;
        for k in 1..n {
            let t = k as f64 / n as f64;
            out.push([a[0] + (b[0] - a[0]) * t, a[1] + (b[1] - a[1]) * t]);
        }
    }
    // A closing duplicate would be emitted again by the ring walk.
    if out.len() > 1 && out.first() == out.last() {
        out.pop();
    }
    out
}

type V3 = [f64; 3];

fn unit(lng_deg: f64, lat_deg: f64) -> V3 {
    let (phi, lam) = (lat_deg.to_radians(), lng_deg.to_radians());
    [phi.cos() * lam.cos(), phi.cos() * lam.sin(), phi.sin()]
}

fn dot(a: V3, b: V3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross(a: V3, b: V3) -> V3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn normalize(v: V3) -> V3 {
    let len = dot(v, v).sqrt();
    if len > 0.0 {
        [v[0] / len, v[1] / len, v[2] / len]
    } else {
        v
    }
}

struct View<'a> {
    params: &'a ProjectionParams,
    center: V3,
}

impl<'a> View<'a> {
    fn new(params: &'a ProjectionParams) -> Self {
        Self {
            params,
            center: unit(-params.rotation[0], -params.rotation[1]),
        }
    }

    fn side(&self, p: V3) -> f64 {
        dot(self.center, p)
    }

    /// Where the segment `a`-`b` meets the horizon.
    fn crossing(&self, a: V3, b: V3) -> V3 {
        let (da, db) = (self.side(a), self.side(b));
        let t = da / (da - db);
        let p = normalize([
            a[0] + (b[0] - a[0]) * t,
            a[1] + (b[1] - a[1]) * t,
            a[2] + (b[2] - a[2]) * t,
        ]);
        // Snap onto the horizon plane.
        let d = self.side(p);
        normalize([
            p[0] - self.center[0] * d,
            p[1] - self.center[1] * d,
            p[2] - self.center[2] * d,
        ])
    }

    /// Horizon points strictly between `from` and `to`, the short way round.
    fn horizon_arc(&self, from: V3, to: V3) -> Vec<V3> {
        let u = from;
        let v = cross(self.center, u);
        let theta = dot(to, v).atan2(dot(to, u));
        let n = (theta.abs().to_degrees() / HORIZON_STEP_DEG).ceil() as usize;
        (1..n)
            .map(|k| {
                let a = theta * k as f64 / n as f64;
                let (s, c) = a.sin_cos();
                [u[0] * c + v[0] * s, u[1] * c + v[1] * s, u[2] * c + v[2] * s]
            })
            .collect()
    }

    fn to_screen(&self, p: V3) -> [f32; 2] {
        let lat = p[2].clamp(-1.0, 1.0).asin().to_degrees();
        let lng = p[1].atan2(p[0]).to_degrees();
        let [x, y] = project(self.params, lat, lng);
        [x as f32, y as f32]
    }

    fn clip_line(&self, line: &[[f64; 2]]) -> Vec<ScreenPath> {
        let mut out = Vec::new();
        let mut current: ScreenPath = Vec::new();
        let mut prev: Option<V3> = None;
        for &[lng, lat] in line {
            let p = unit(lng, lat);
            let inside = self.side(p) > 0.0;
            match prev {
                Some(q) if (self.side(q) > 0.0) != inside => {
                    let x = self.to_screen(self.crossing(q, p));
                    current.push(x);
                    if inside {
                        current = vec![x];
                    } else {
                        out.push(std::mem::take(&mut current));
                    }
                }
                _ => {}
            }
            if inside {
                current.push(self.to_screen(p));
            }
            prev = Some(p);
        }
        out.push(current);
        out.retain(|path| path.len() >= 2);
        out
    }

    /// Sutherland-Hodgman against the horizon plane, walking the horizon
    /// between each exit and the following entry.
    fn clip_ring(&self, ring: &[[f64; 2]]) -> Option<ScreenPath> {
        if ring.len() < 3 {
            return None;
        }
        let pts: Vec<V3> = ring.iter().map(|&[lng, lat]| unit(lng, lat)).collect();
        let mut out: Vec<V3> = Vec::with_capacity(pts.len());
        let mut last_exit: Option<V3> = None;
        let mut first_entry: Option<V3> = None;

        for i in 0..pts.len() {
            let prev = pts[(i + pts.len() - 1) % pts.len()];
            let cur = pts[i];
            let (prev_in, cur_in) = (self.side(prev) > 0.0, self.side(cur) > 0.0);
            match (prev_in, cur_in) {
                (true, true) => out.push(cur),
                (true, false) => {
                    let exit = self.crossing(prev, cur);
                    out.push(exit);
                    last_exit = Some(exit);
                }
                (false, true) => {
                    let entry = self.crossing(prev, cur);
                    match last_exit.take() {
                        Some(exit) => out.extend(self.horizon_arc(exit, entry)),
                        None => first_entry = Some(entry),
                    }
                    out.push(entry);
                    out.push(cur);
                }
                (false, false) => {}
            }
        }
        if let (Some(exit), Some(entry)) = (last_exit, first_entry) {
            out.extend(self.horizon_arc(exit, entry));
        }

        (out.len() >= 3).then(|| out.into_iter().map(|p| self.to_screen(p)).collect())
    }
}
