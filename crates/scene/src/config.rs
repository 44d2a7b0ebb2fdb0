use serde::{Deserialize, Serialize};

/// Tuning for interaction, animation and texture generation.
///
/// Hosts may pass a partial JSON object; missing fields keep their defaults.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobeConfig {
    // ── Interaction ──────────────────────────────────────────
    /// Degrees of rotation per mouse pixel.
    pub mouse_sensitivity: f64,
    /// Degrees of rotation per touch pixel.
    pub touch_sensitivity: f64,
    /// How much zoom slows down dragging: factor = 1 - zoom * damping.
    pub zoom_drag_damping: f64,
    /// Latitude clamp (degrees, symmetric).
    pub latitude_limit_deg: f64,
    /// Zoom change per wheel pixel.
    pub wheel_zoom_per_px: f64,
    /// Multiplier applied to wheel deltas reported in lines.
    pub wheel_line_multiplier: f64,
    /// Drag samples older than this do not update the release velocity.
    pub max_velocity_sample_ms: f64,

    // ── Inertia and auto-rotation ────────────────────────────
    /// Release speed (deg-units per ms, either axis) that starts coasting.
    pub inertia_start_threshold: f64,
    /// Exponential decay rate per second.
    pub inertia_decay_rate: f64,
    /// Coasting stops when both velocity components fall below this.
    pub inertia_stop_threshold: f64,
    /// Rotation applied per unit of velocity per ms while coasting.
    pub inertia_gain: f64,
    /// Idle spin in degrees per second.
    pub auto_rotate_deg_per_s: f64,
    /// Duration of the animated point-of-view transition.
    pub intro_spin_ms: f64,

    // ── Camera ───────────────────────────────────────────────
    /// Vertical field of view for landscape viewports.
    pub fov_deg: f64,
    /// Fraction of the base camera distance removed at full zoom.
    pub zoom_distance_factor: f64,

    // ── Animations ───────────────────────────────────────────
    pub arc_duration_ms: f64,
    pub arc_fade_ms: f64,
    pub arc_segments: u32,
    pub arc_half_width: f64,
    pub ripple_duration_ms: f64,
    pub ripple_max_radius: f64,
    /// Delay between an arc's start and its destination ripple.
    pub traffic_delay_ms: f64,
    /// Events whose endpoints are closer than this (both axes) get no arc.
    pub near_threshold_deg: f64,

    // ── Surface texture ──────────────────────────────────────
    /// Texture width requested per CSS pixel of the container.
    pub texture_scale: f64,
}

impl Default for GlobeConfig {
    fn default() -> Self {
        Self {
            mouse_sensitivity: 0.3,
            touch_sensitivity: 0.5,
            zoom_drag_damping: 0.8,
            latitude_limit_deg: 85.0,
            wheel_zoom_per_px: 0.001,
            wheel_line_multiplier: 50.0,
            max_velocity_sample_ms: 100.0,

            inertia_start_threshold: 0.01,
            inertia_decay_rate: 3.0,
            inertia_stop_threshold: 0.001,
            inertia_gain: 0.3,
            auto_rotate_deg_per_s: 9.0,
            intro_spin_ms: 1000.0,

            fov_deg: 30.0,
            zoom_distance_factor: 0.7,

            arc_duration_ms: 2000.0,
            arc_fade_ms: 500.0,
            arc_segments: 50,
            arc_half_width: 0.002,
            ripple_duration_ms: 1500.0,
            ripple_max_radius: 6.0,
            traffic_delay_ms: 1200.0,
            near_threshold_deg: 5.0,

            texture_scale: 2.0,
        }
    }
}

impl GlobeConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Sets one numeric field by name, clamped to a safe range.
    ///
    /// Returns `false` for unknown keys.
    pub fn set(&mut self, key: &str, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        match key {
            "mouse_sensitivity" => self.mouse_sensitivity = value.clamp(0.01, 5.0),
            "touch_sensitivity" => self.touch_sensitivity = value.clamp(0.01, 5.0),
            "zoom_drag_damping" => self.zoom_drag_damping = value.clamp(0.0, 0.95),
            "latitude_limit_deg" => self.latitude_limit_deg = value.clamp(0.0, 89.0),
            "wheel_zoom_per_px" => self.wheel_zoom_per_px = value.clamp(0.0, 0.05),
            "inertia_decay_rate" => self.inertia_decay_rate = value.clamp(0.1, 50.0),
            "inertia_gain" => self.inertia_gain = value.clamp(0.0, 5.0),
            "auto_rotate_deg_per_s" => self.auto_rotate_deg_per_s = value.clamp(-360.0, 360.0),
            "intro_spin_ms" => self.intro_spin_ms = value.clamp(0.0, 10_000.0),
            "fov_deg" => self.fov_deg = value.clamp(5.0, 120.0),
            "zoom_distance_factor" => self.zoom_distance_factor = value.clamp(0.0, 0.9),
            "arc_duration_ms" => self.arc_duration_ms = value.clamp(1.0, 60_000.0),
            "ripple_duration_ms" => self.ripple_duration_ms = value.clamp(1.0, 60_000.0),
            "ripple_max_radius" => self.ripple_max_radius = value.clamp(0.0, 90.0),
            "traffic_delay_ms" => self.traffic_delay_ms = value.clamp(0.0, 60_000.0),
            "near_threshold_deg" => self.near_threshold_deg = value.clamp(0.0, 180.0),
            "texture_scale" => self.texture_scale = value.clamp(0.25, 4.0),
            _ => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::GlobeConfig;

    #[test]
    fn defaults_are_stable() {
        let cfg = GlobeConfig::default();
        assert_eq!(cfg.mouse_sensitivity, 0.3);
        assert_eq!(cfg.touch_sensitivity, 0.5);
        assert_eq!(cfg.latitude_limit_deg, 85.0);
        assert_eq!(cfg.inertia_decay_rate, 3.0);
        assert_eq!(cfg.inertia_stop_threshold, 0.001);
        assert_eq!(cfg.auto_rotate_deg_per_s, 9.0);
        assert_eq!(cfg.intro_spin_ms, 1000.0);
        assert_eq!(cfg.arc_segments, 50);
        assert_eq!(cfg.traffic_delay_ms, 1200.0);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = GlobeConfig::from_json(r#"{"mouse_sensitivity": 0.6, "arc_duration_ms": 900}"#)
            .expect("valid config");
        assert_eq!(cfg.mouse_sensitivity, 0.6);
        assert_eq!(cfg.arc_duration_ms, 900.0);
        assert_eq!(cfg.touch_sensitivity, 0.5);
    }

    #[test]
    fn set_clamps_and_rejects_unknown_keys() {
        let mut cfg = GlobeConfig::default();
        assert!(cfg.set("fov_deg", 500.0));
        assert_eq!(cfg.fov_deg, 120.0);
        assert!(!cfg.set("warp_speed", 9.0));
        assert!(!cfg.set("fov_deg", f64::NAN));
        assert_eq!(cfg.fov_deg, 120.0);
    }
}
