//! Screen-space visibility for location points.
//!
//! Each visible location becomes seven floats `[x, y, radius, r, g, b, count]`
//! in an orthographic projection that matches the rendered globe. Points on the
//! far hemisphere are culled; a non-finite projection writes `NaN` into `x` and
//! consumers skip the entry.

use std::collections::HashMap;

use foundation::Rgb;
use scene::{LocationSample, ProjectionParams};
use serde::{Deserialize, Serialize};

pub const POINT_STRIDE: usize = 7;

/// Point cap for the main-thread fallback.
pub const SYNC_POINT_CAP: usize = 500;

pub const MIN_POINT_RADIUS: f64 = 3.0;
pub const MAX_POINT_RADIUS: f64 = 12.0;

const RAMP_CACHE_LIMIT: usize = 1000;

/// Used when the ramp cannot produce a color.
pub const FALLBACK_POINT_COLOR: Rgb = [1.0, 0.78, 0.39];

/// Yellow-orange-red, nine stops.
const YL_OR_RD: [[u8; 3]; 9] = [
    [0xff, 0xff, 0xcc],
    [0xff, 0xed, 0xa0],
    [0xfe, 0xd9, 0x76],
    [0xfe, 0xb2, 0x4c],
    [0xfd, 0x8d, 0x3c],
    [0xfc, 0x4e, 0x2a],
    [0xe3, 0x1a, 0x1c],
    [0xbd, 0x00, 0x26],
    [0x80, 0x00, 0x26],
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisibilityRequest {
    pub locations: Vec<LocationSample>,
    #[serde(flatten)]
    pub projection: ProjectionParams,
    /// Highest location count; sets the color domain.
    pub highest: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct VisibilityResult {
    pub buffer: Vec<f32>,
    pub count: usize,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct VisiblePoint {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub color: Rgb,
    pub count: f32,
}

/// Uniform cubic B-spline through the scheme, per channel.
fn basis_channel(stops: &[[u8; 3]], channel: usize, t: f64) -> f64 {
    let n = stops.len() - 1;
    let t = t.clamp(0.0, 1.0);
    let i = if t >= 1.0 {
        n - 1
    } else {
        ((t * n as f64).floor() as usize).min(n - 1)
    };
    let v = |k: usize| stops[k][channel] as f64;
    let v1 = v(i);
    let v2 = v(i + 1);
    let v0 = if i > 0 { v(i - 1) } else { 2.0 * v1 - v2 };
    let v3 = if i < n - 1 { v(i + 2) } else { 2.0 * v2 - v1 };

    let t1 = (t - i as f64 / n as f64) * n as f64;
    let t2 = t1 * t1;
    let t3 = t2 * t1;
    ((1.0 - 3.0 * t1 + 3.0 * t2 - t3) * v0
        + (4.0 - 6.0 * t2 + 3.0 * t3) * v1
        + (1.0 + 3.0 * t1 + 3.0 * t2 - 3.0 * t3) * v2
        + t3 * v3)
        / 6.0
}

fn yl_or_rd(t: f64) -> Option<Rgb> {
    if !t.is_finite() {
        return None;
    }
    let mut out = [0.0f32; 3];
    for (c, slot) in out.iter_mut().enumerate() {
        let v = basis_channel(&YL_OR_RD, c, t).round().clamp(0.0, 255.0);
        *slot = v as f32 / 255.0;
    }
    Some(out)
}

/// Square-root scaled sequential color ramp over `[0, highest * 3]`.
///
/// Colors are memoized per count until the domain changes. The memo stops
/// growing at 1000 entries.
#[derive(Debug, Clone, Default)]
pub struct ColorRamp {
    highest: Option<f64>,
    domain_max: f64,
    cache: HashMap<u64, Rgb>,
}

impl ColorRamp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the domain was rebuilt.
    pub fn set_highest(&mut self, highest: f64) -> bool {
        if self.highest.is_some_and(|h| h.to_bits() == highest.to_bits()) {
            return false;
        }
        self.highest = Some(highest);
        self.domain_max = if highest > 0.0 { highest * 3.0 } else { 1.0 };
        self.cache.clear();
        true
    }

    pub fn domain(&self) -> [f64; 2] {
        [0.0, self.domain_max]
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn color(&mut self, count: f64) -> Rgb {
        if self.highest.is_none() {
            self.set_highest(0.0);
        }
        let key = count.to_bits();
        if let Some(c) = self.cache.get(&key) {
            return *c;
        }
        let t = count.sqrt() / self.domain_max.sqrt();
        let color = yl_or_rd(t).unwrap_or(FALLBACK_POINT_COLOR);
        if self.cache.len() < RAMP_CACHE_LIMIT {
            self.cache.insert(key, color);
        }
        color
    }
}

pub fn point_radius(count: f64) -> f64 {
    (count.sqrt() * 2.0).clamp(MIN_POINT_RADIUS, MAX_POINT_RADIUS)
}

/// Orthographic projection rotated by `params.rotation`.
pub fn project(params: &ProjectionParams, lat_deg: f64, lng_deg: f64) -> [f64; 2] {
    let k = params.radius * params.scale;
    let phi = lat_deg.to_radians();
    let lam = (lng_deg + params.rotation[0]).to_radians();
    let dphi = params.rotation[1].to_radians();

    let x = phi.cos() * lam.sin();
    let y = phi.sin() * dphi.cos() + phi.cos() * lam.cos() * dphi.sin();
    [params.width / 2.0 + k * x, params.height / 2.0 - k * y]
}

/// Whether `(lat, lng)` faces the viewer.
pub fn is_front_facing(params: &ProjectionParams, lat_deg: f64, lng_deg: f64) -> bool {
    let center_lat = (-params.rotation[1]).to_radians();
    let center_lng = (-params.rotation[0]).to_radians();
    let phi = lat_deg.to_radians();
    let lam = lng_deg.to_radians();
    let dot = center_lat.sin() * phi.sin()
        + center_lat.cos() * phi.cos() * (lam - center_lng).cos();
    dot > 0.0
}

fn compute_points<'a>(
    locations: impl Iterator<Item = &'a LocationSample>,
    params: &ProjectionParams,
    ramp: &mut ColorRamp,
) -> VisibilityResult {
    let mut buffer = Vec::new();
    let mut count = 0;
    for loc in locations {
        if !(loc.count > 0.0) || !is_front_facing(params, loc.lat_deg, loc.lng_deg) {
            continue;
        }
        let [x, y] = project(params, loc.lat_deg, loc.lng_deg);
        let color = ramp.color(loc.count);
        let x = if x.is_finite() && y.is_finite() { x as f32 } else { f32::NAN };
        buffer.extend_from_slice(&[
            x,
            y as f32,
            point_radius(loc.count) as f32,
            color[0],
            color[1],
            color[2],
            loc.count as f32,
        ]);
        count += 1;
    }
    VisibilityResult { buffer, count }
}

pub fn compute_visible_points(request: &VisibilityRequest, ramp: &mut ColorRamp) -> VisibilityResult {
    ramp.set_highest(request.highest);
    compute_points(request.locations.iter(), &request.projection, ramp)
}

/// Reduced-fidelity variant for the main thread: samples every n-th location
/// so that at most `cap` are considered.
pub fn compute_visible_points_sync(
    request: &VisibilityRequest,
    ramp: &mut ColorRamp,
    cap: usize,
) -> VisibilityResult {
    ramp.set_highest(request.highest);
    let n = request.locations.len();
    let stride = if cap == 0 { n.max(1) } else { n.div_ceil(cap).max(1) };
    let sampled = request.locations.iter().step_by(stride).take(cap);
    compute_points(sampled, &request.projection, ramp)
}

/// Decodes a seven-float buffer, dropping `NaN` sentinels and any trailing
/// partial entry.
pub fn decode_points(buffer: &[f32]) -> Vec<VisiblePoint> {
    buffer
        .chunks_exact(POINT_STRIDE)
        .filter(|p| !p[0].is_nan() && !p[1].is_nan())
        .map(|p| VisiblePoint {
            x: p[0],
            y: p[1],
            radius: p[2],
            color: [p[3], p[4], p[5]],
            count: p[6],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn assert_close(a: f64, b: f64, eps: f64) {
        assert!((a - b).abs() <= eps, "{a} != {b} (eps {eps})");
    }

    fn params(rotation: [f64; 2]) -> ProjectionParams {
        ProjectionParams {
            width: 200.0,
            height: 200.0,
            scale: 1.0,
            rotation,
            radius: 100.0,
        }
    }

    fn request(locations: Vec<LocationSample>, rotation: [f64; 2]) -> VisibilityRequest {
        VisibilityRequest {
            locations,
            projection: params(rotation),
            highest: 10.0,
        }
    }

    #[test]
    fn projects_like_a_rotated_orthographic_view() {
        let p = params([0.0, 0.0]);
        let [x, y] = project(&p, 0.0, 0.0);
        assert_close(x, 100.0, 1e-9);
        assert_close(y, 100.0, 1e-9);

        let [x, _] = project(&p, 0.0, 45.0);
        assert_close(x, 100.0 + 100.0 * 45f64.to_radians().sin(), 1e-9);
        let [_, y] = project(&p, 45.0, 0.0);
        assert_close(y, 100.0 - 100.0 * 45f64.to_radians().sin(), 1e-9);

        let [x, y] = project(&params([-90.0, 0.0]), 0.0, 90.0);
        assert_close(x, 100.0, 1e-9);
        assert_close(y, 100.0, 1e-9);

        let [_, y] = project(&params([0.0, -30.0]), 30.0, 0.0);
        assert_close(y, 100.0, 1e-9);
    }

    #[test]
    fn view_center_faces_the_viewer_for_every_rotation() {
        for lng_step in 0..24 {
            for lat_step in 0..=12 {
                let lng = -180.0 + 15.0 * lng_step as f64;
                let lat = -90.0 + 15.0 * lat_step as f64;
                let p = params([-lng, -lat]);

                assert!(is_front_facing(&p, lat, lng), "center ({lat}, {lng})");
                assert!(
                    !is_front_facing(&p, -lat, lng + 180.0),
                    "antipode of ({lat}, {lng})"
                );

                let [x, y] = project(&p, lat, lng);
                assert_close(x, p.width / 2.0, 1e-9);
                assert_close(y, p.height / 2.0, 1e-9);
            }
        }
    }

    #[test]
    fn far_side_and_horizon_are_culled() {
        let p = params([0.0, 0.0]);
        assert!(is_front_facing(&p, 0.0, 89.0));
        assert!(!is_front_facing(&p, 0.0, 90.0));
        assert!(!is_front_facing(&p, 0.0, 180.0));
        assert!(is_front_facing(&params([180.0, 0.0]), 0.0, -180.0));
    }

    #[test]
    fn buffer_holds_seven_floats_per_visible_point() {
        let req = request(
            vec![
                LocationSample::new(0.0, 0.0, 4.0),
                LocationSample::new(0.0, 170.0, 9.0),
                LocationSample::new(10.0, 10.0, 0.0),
                LocationSample::new(10.0, -10.0, 100.0),
            ],
            [0.0, 0.0],
        );
        let result = compute_visible_points(&req, &mut ColorRamp::new());
        assert_eq!(result.count, 2);
        assert_eq!(result.buffer.len(), 2 * POINT_STRIDE);

        let first = &result.buffer[..POINT_STRIDE];
        assert_eq!(first[0], 100.0);
        assert_eq!(first[1], 100.0);
        assert_eq!(first[2], 4.0);
        assert_eq!(first[6], 4.0);
        assert_eq!(result.buffer[POINT_STRIDE + 2], 12.0);
    }

    #[test]
    fn radius_is_clamped() {
        assert_eq!(point_radius(1.0), 3.0);
        assert_eq!(point_radius(9.0), 6.0);
        assert_eq!(point_radius(1e6), 12.0);
    }

    #[test]
    fn ramp_spans_yellow_to_dark_red() {
        let mut ramp = ColorRamp::new();
        ramp.set_highest(10.0);
        assert_eq!(ramp.domain(), [0.0, 30.0]);

        let low = ramp.color(0.0);
        assert_eq!(low, [1.0, 1.0, 204.0 / 255.0]);
        let high = ramp.color(30.0);
        assert_eq!(high, [128.0 / 255.0, 0.0, 38.0 / 255.0]);

        let mid = ramp.color(10.0);
        assert!(mid[1] < low[1] && mid[1] > high[1], "{mid:?}");
    }

    #[test]
    fn empty_domain_falls_back_to_unit() {
        let mut ramp = ColorRamp::new();
        ramp.set_highest(0.0);
        assert_eq!(ramp.domain(), [0.0, 1.0]);
        assert_eq!(ramp.color(1.0), [128.0 / 255.0, 0.0, 38.0 / 255.0]);
        assert_eq!(ramp.color(f64::NAN), FALLBACK_POINT_COLOR);
    }

    #[test]
    fn ramp_cache_is_bounded_and_reset_on_domain_change() {
        let mut ramp = ColorRamp::new();
        assert!(ramp.set_highest(2000.0));
        for c in 0..1200 {
            ramp.color(c as f64);
        }
        assert_eq!(ramp.cache_len(), 1000);
        assert!(!ramp.set_highest(2000.0));
        assert_eq!(ramp.cache_len(), 1000);
        assert!(ramp.set_highest(3000.0));
        assert_eq!(ramp.cache_len(), 0);
    }

    #[test]
    fn decoder_skips_nan_sentinels() {
        let mut buffer = vec![1.0, 2.0, 3.0, 0.1, 0.2, 0.3, 5.0];
        buffer.extend_from_slice(&[f32::NAN, 2.0, 3.0, 0.1, 0.2, 0.3, 6.0]);
        buffer.extend_from_slice(&[7.0, 8.0]);
        let points = decode_points(&buffer);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].color, [0.1, 0.2, 0.3]);
        assert_eq!(points[0].count, 5.0);
    }

    #[test]
    fn sync_variant_samples_down_to_the_cap() {
        let locations = (0..2000)
            .map(|i| LocationSample::new(0.0, (i % 120) as f64 - 60.0, 1.0))
            .collect();
        let req = request(locations, [0.0, 0.0]);
        let mut ramp = ColorRamp::new();
        let full = compute_visible_points(&req, &mut ramp);
        let sampled = compute_visible_points_sync(&req, &mut ramp, SYNC_POINT_CAP);
        assert_eq!(full.count, 2000);
        assert_eq!(sampled.count, 500);
    }

    #[test]
    fn request_wire_format_is_flat() {
        let req = request(vec![LocationSample::new(1.0, 2.0, 3.0)], [10.0, -20.0]);
        let json = serde_json::to_value(&req).expect("serialize");
        assert_eq!(json["width"], 200.0);
        assert_eq!(json["rotation"][1], -20.0);
        assert_eq!(json["locations"][0]["lng"], 2.0);
        let back: VisibilityRequest = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, req);
    }
}
