use std::f64::consts::PI;

use foundation::math::{GeoPoint, Vec3, great_circle_distance, great_circle_interpolate};

/// Radius of an arc endpoint; slightly above the surface to avoid z-fighting.
pub const ARC_BASE_RADIUS: f64 = 1.008;
/// Peak lift (as a fraction of the unit radius) for an antipodal arc.
pub const ARC_MAX_LIFT: f64 = 0.08;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ArcOptions {
    pub segments: u32,
    /// Fraction of the arc to emit, in `[0, 1]`.
    pub progress: f64,
    pub half_width: f64,
}

impl Default for ArcOptions {
    fn default() -> Self {
        Self {
            segments: 50,
            progress: 1.0,
            half_width: 0.002,
        }
    }
}

/// Ribbon along a lifted great-circle arc, two vertices per sample, laid out
/// for a triangle strip.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArcGeometry {
    pub positions: Vec<[f32; 3]>,
    pub alphas: Vec<f32>,
    /// Normalized position along the arc, used for dashes and reveal.
    pub progress_params: Vec<f32>,
}

impl ArcGeometry {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

pub fn build_arc(start: GeoPoint, end: GeoPoint, opts: ArcOptions) -> ArcGeometry {
    let segments = opts.segments.max(1);
    let angle = great_circle_distance(start, end);
    let sample_count = (segments as f64 * opts.progress.clamp(0.0, 1.0)).floor() as u32;

    let center: Vec<(Vec3, f64)> = (0..=sample_count)
        .map(|i| {
            let t = i as f64 / segments as f64;
            let point = great_circle_interpolate(start, end, t).to_xyz(1.0);
            let lift = (t * PI).sin() * ARC_MAX_LIFT * (angle / PI);
            let len = point.length();
            let scale = if len > 0.0 { (ARC_BASE_RADIUS + lift) / len } else { 0.0 };
            (point * scale, t)
        })
        .collect();

    if center.len() < 2 {
        return ArcGeometry::default();
    }

    let mut geometry = ArcGeometry {
        positions: Vec::with_capacity(center.len() * 2),
        alphas: Vec::with_capacity(center.len() * 2),
        progress_params: Vec::with_capacity(center.len() * 2),
    };

    let last = center.len() - 1;
    for (i, &(p, t)) in center.iter().enumerate() {
        let tangent = if i == 0 {
            center[1].0 - p
        } else if i == last {
            p - center[i - 1].0
        } else {
            center[i + 1].0 - center[i - 1].0
        };

        // Coincident endpoints give a zero tangent; the side stays zero too.
        let side = tangent.cross(p).normalize_or_zero() * opts.half_width;
        let alpha = (t * PI).sin() as f32;

        geometry.positions.push((p + side).to_f32());
        geometry.positions.push((p - side).to_f32());
        geometry.alphas.extend([alpha, alpha]);
        geometry.progress_params.extend([t as f32, t as f32]);
    }

    geometry
}

#[cfg(test)]
mod tests {
    use super::*;

    fn len(p: [f32; 3]) -> f32 {
        (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt()
    }

    #[test]
    fn full_arc_has_two_vertices_per_sample() {
        let arc = build_arc(
            GeoPoint::new(37.7, -122.4),
            GeoPoint::new(51.5, -0.1),
            ArcOptions::default(),
        );
        assert_eq!(arc.vertex_count(), 51 * 2);
        assert_eq!(arc.alphas.len(), arc.vertex_count());
        assert_eq!(arc.progress_params.len(), arc.vertex_count());
        assert_eq!(arc.progress_params[0], 0.0);
        assert_eq!(*arc.progress_params.last().unwrap(), 1.0);
    }

    #[test]
    fn endpoints_are_flush_and_midpoint_is_lifted() {
        let arc = build_arc(
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 90.0),
            ArcOptions {
                half_width: 0.0,
                ..ArcOptions::default()
            },
        );
        let first = len(arc.positions[0]);
        let mid = len(arc.positions[50]);
        assert!((first - ARC_BASE_RADIUS as f32).abs() < 1e-5);
        let expected_mid = ARC_BASE_RADIUS + ARC_MAX_LIFT * 0.5;
        assert!((mid - expected_mid as f32).abs() < 1e-4, "mid radius {mid}");
        assert_eq!(arc.alphas[0], 0.0);
        assert!((arc.alphas[50] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn ribbon_width_matches_half_width() {
        let arc = build_arc(
            GeoPoint::new(10.0, 10.0),
            GeoPoint::new(40.0, 60.0),
            ArcOptions::default(),
        );
        let (a, b) = (arc.positions[20], arc.positions[21]);
        let d = ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt();
        assert!((d - 0.004).abs() < 1e-5);
    }

    #[test]
    fn partial_progress_emits_fewer_samples() {
        let arc = build_arc(
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(20.0, 20.0),
            ArcOptions {
                progress: 0.5,
                ..ArcOptions::default()
            },
        );
        assert_eq!(arc.vertex_count(), 26 * 2);
        assert_eq!(*arc.progress_params.last().unwrap(), 0.5);
    }

    #[test]
    fn identical_endpoints_are_degenerate_but_finite() {
        let p = GeoPoint::new(48.8, 2.3);
        let arc = build_arc(p, p, ArcOptions::default());
        assert_eq!(arc.vertex_count(), 102);
        assert!(arc.positions.iter().flatten().all(|v| v.is_finite()));
        assert!(arc.alphas.iter().all(|a| a.is_finite()));
    }

    #[test]
    fn too_little_progress_is_empty() {
        let arc = build_arc(
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 10.0),
            ArcOptions {
                progress: 0.01,
                ..ArcOptions::default()
            },
        );
        assert!(arc.is_empty());
    }
}
