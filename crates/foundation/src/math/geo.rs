use super::Vec3;

/// Geographic position in degrees on the unit sphere.
///
/// Latitude is clamped to `[-90, 90]` and longitude wrapped to `(-180, 180]`
/// on construction, so every `GeoPoint` in the system is already canonical.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GeoPoint {
    pub lat_deg: f64,
    pub lng_deg: f64,
}

impl GeoPoint {
    pub fn new(lat_deg: f64, lng_deg: f64) -> Self {
        Self {
            lat_deg: lat_deg.clamp(-90.0, 90.0),
            lng_deg: wrap_longitude(lng_deg),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.lat_deg.is_finite() && self.lng_deg.is_finite()
    }

    /// Unit-sphere position scaled by `radius`.
    pub fn to_xyz(&self, radius: f64) -> Vec3 {
        Vec3::from_array(lat_lng_to_xyz(self.lat_deg, self.lng_deg, radius))
    }
}

/// Wraps a longitude in degrees into `(-180, 180]`.
pub fn wrap_longitude(lng_deg: f64) -> f64 {
    if !lng_deg.is_finite() {
        return lng_deg;
    }
    let wrapped = (lng_deg + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 { 180.0 } else { wrapped }
}

/// Y-up globe coordinates: `+z` faces longitude 0, `+x` faces longitude 90.
pub fn lat_lng_to_xyz(lat_deg: f64, lng_deg: f64, radius: f64) -> [f64; 3] {
    let lat = lat_deg.to_radians();
    let lng = lng_deg.to_radians();
    [
        radius * lat.cos() * lng.sin(),
        radius * lat.sin(),
        radius * lat.cos() * lng.cos(),
    ]
}

fn haversin(x: f64) -> f64 {
    let s = (x / 2.0).sin();
    s * s
}

/// Central angle between two points in radians.
pub fn great_circle_distance(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat0, lng0) = (a.lat_deg.to_radians(), a.lng_deg.to_radians());
    let (lat1, lng1) = (b.lat_deg.to_radians(), b.lng_deg.to_radians());
    let h = haversin(lat1 - lat0) + lat0.cos() * lat1.cos() * haversin(lng1 - lng0);
    2.0 * h.clamp(0.0, 1.0).sqrt().asin()
}

/// Shortest-path interpolation along the great circle from `a` to `b`.
///
/// `t = 0` yields `a` and `t = 1` yields `b`. Coincident points always yield `a`.
pub fn great_circle_interpolate(a: GeoPoint, b: GeoPoint, t: f64) -> GeoPoint {
    let d = great_circle_distance(a, b);
    if d == 0.0 {
        return a;
    }

    let (lat0, lng0) = (a.lat_deg.to_radians(), a.lng_deg.to_radians());
    let (lat1, lng1) = (b.lat_deg.to_radians(), b.lng_deg.to_radians());
    let k = d.sin();
    let kb = (t * d).sin() / k;
    let ka = (d - t * d).sin() / k;

    let x = ka * lat0.cos() * lng0.cos() + kb * lat1.cos() * lng1.cos();
    let y = ka * lat0.cos() * lng0.sin() + kb * lat1.cos() * lng1.sin();
    let z = ka * lat0.sin() + kb * lat1.sin();

    GeoPoint::new(
        z.atan2((x * x + y * y).sqrt()).to_degrees(),
        y.atan2(x).to_degrees(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    #[test]
    fn wrap_longitude_lands_in_half_open_range() {
        assert_close(wrap_longitude(190.0), -170.0, 1e-12);
        assert_close(wrap_longitude(-180.0), 180.0, 1e-12);
        assert_close(wrap_longitude(540.0), 180.0, 1e-12);
        assert_close(wrap_longitude(-3.0), -3.0, 1e-12);
    }

    #[test]
    fn xyz_axes_match_globe_orientation() {
        let p = lat_lng_to_xyz(0.0, 0.0, 1.0);
        assert_close(p[2], 1.0, 1e-12);
        let east = lat_lng_to_xyz(0.0, 90.0, 1.0);
        assert_close(east[0], 1.0, 1e-12);
        let north = lat_lng_to_xyz(90.0, 0.0, 2.0);
        assert_close(north[1], 2.0, 1e-12);
    }

    #[test]
    fn distance_between_antipodes_is_pi() {
        let a = GeoPoint::new(10.0, 20.0);
        let b = GeoPoint::new(-10.0, -160.0);
        assert_close(great_circle_distance(a, b), std::f64::consts::PI, 1e-9);
        assert_eq!(great_circle_distance(a, a), 0.0);
    }

    #[test]
    fn interpolate_hits_endpoints_and_equator_midpoint() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(0.0, 90.0);
        let mid = great_circle_interpolate(a, b, 0.5);
        assert_close(mid.lat_deg, 0.0, 1e-9);
        assert_close(mid.lng_deg, 45.0, 1e-9);
        let end = great_circle_interpolate(a, b, 1.0);
        assert_close(end.lng_deg, 90.0, 1e-9);
    }

    #[test]
    fn interpolate_same_point_is_stable() {
        let a = GeoPoint::new(51.5, -0.12);
        let p = great_circle_interpolate(a, a, 0.3);
        assert_eq!(p, a);
    }
}
