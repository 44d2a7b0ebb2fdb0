//! Rotation/zoom controller for the globe: drag, wheel, inertia, auto-rotate
//! and the eased point-of-view transition.
//!
//! The controller never touches the GPU. The render loop calls [`CameraController::update`]
//! once per frame and then reads matrices or projection parameters from it.

use foundation::math::{
    Mat4, Vec2, Vec3, lat_lng_to_xyz, mat4_look_at_rh, mat4_mul, mat4_perspective_rh_z0,
    mat4_rotation_x, mat4_rotation_y, mat4_transform_point, wrap_longitude,
};

use serde::{Deserialize, Serialize};

use crate::config::GlobeConfig;

const NEAR: f64 = 0.01;
const FAR: f64 = 10.0;

/// Mutually exclusive camera behaviors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraMode {
    #[default]
    AutoRotating,
    Dragging,
    Coasting,
    IntroSpin,
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointerKind {
    #[default]
    Mouse,
    Touch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WheelUnit {
    #[default]
    Pixel,
    Line,
}

/// Everything the render loop reads each frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    /// Longitude facing the viewer, degrees in `(-180, 180]`.
    pub longitude: f64,
    /// Latitude facing the viewer, degrees.
    pub latitude: f64,
    /// `0` = whole globe, `1` = closest.
    pub zoom: f64,
    pub mode: CameraMode,
    /// Last drag speed in pixels per millisecond.
    pub velocity: Vec2,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            longitude: 0.0,
            latitude: 20.0,
            zoom: 0.0,
            mode: CameraMode::AutoRotating,
            velocity: Vec2::new(0.0, 0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraMatrices {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_proj: Mat4,
    pub eye: Vec3,
}

/// Orthographic view parameters for screen-space point projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectionParams {
    pub width: f64,
    pub height: f64,
    pub scale: f64,
    /// `[-longitude, -latitude]`, i.e. the rotation that brings the view
    /// center to the middle of the screen.
    pub rotation: [f64; 2],
    /// Apparent globe radius in pixels at `scale = 1`.
    pub radius: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct IntroSpin {
    from: (f64, f64),
    to: (f64, f64),
    elapsed_ms: f64,
}

#[derive(Debug, Clone)]
pub struct CameraController {
    state: CameraState,
    config: GlobeConfig,
    pointer_kind: PointerKind,
    last_pos_px: Vec2,
    last_drag_ms: f64,
    intro: Option<IntroSpin>,
}

impl Default for CameraController {
    fn default() -> Self {
        Self::new(GlobeConfig::default())
    }
}

impl CameraController {
    pub fn new(config: GlobeConfig) -> Self {
        Self {
            state: CameraState::default(),
            config,
            pointer_kind: PointerKind::Mouse,
            last_pos_px: Vec2::new(0.0, 0.0),
            last_drag_ms: 0.0,
            intro: None,
        }
    }

    pub fn state(&self) -> CameraState {
        self.state
    }

    pub fn mode(&self) -> CameraMode {
        self.state.mode
    }

    pub fn is_dragging(&self) -> bool {
        self.state.mode == CameraMode::Dragging
    }

    pub fn set_config(&mut self, config: GlobeConfig) {
        self.config = config;
    }

    fn zoom_factor(&self) -> f64 {
        1.0 - self.state.zoom * self.config.zoom_drag_damping
    }

    fn rotate_by(&mut self, d_lng: f64, d_lat: f64) {
        let limit = self.config.latitude_limit_deg;
        self.state.longitude = wrap_longitude(self.state.longitude + d_lng);
        self.state.latitude = (self.state.latitude + d_lat).clamp(-limit, limit);
    }

    pub fn on_pointer_down(&mut self, pos_px: [f64; 2], now_ms: f64, kind: PointerKind) {
        self.state.mode = CameraMode::Dragging;
        self.state.velocity = Vec2::new(0.0, 0.0);
        self.intro = None;
        self.pointer_kind = kind;
        self.last_pos_px = Vec2::new(pos_px[0], pos_px[1]);
        self.last_drag_ms = now_ms;
    }

    pub fn on_pointer_move(&mut self, pos_px: [f64; 2], now_ms: f64) {
        if !self.is_dragging() {
            return;
        }
        let pos = Vec2::new(pos_px[0], pos_px[1]);
        let delta = pos - self.last_pos_px;
        self.last_pos_px = pos;
        self.apply_drag(delta, now_ms);
    }

    fn apply_drag(&mut self, delta: Vec2, now_ms: f64) {
        let dt = now_ms - self.last_drag_ms;
        if dt > 0.0 && dt < self.config.max_velocity_sample_ms {
            self.state.velocity = Vec2::new(delta.x / dt, delta.y / dt);
        }
        self.last_drag_ms = now_ms;

        let sensitivity = match self.pointer_kind {
            PointerKind::Mouse => self.config.mouse_sensitivity,
            PointerKind::Touch => self.config.touch_sensitivity,
        };
        let k = sensitivity * self.zoom_factor();
        self.rotate_by(-delta.x * k, delta.y * k);
    }

    pub fn on_pointer_up(&mut self) {
        if !self.is_dragging() {
            return;
        }
        let v = self.state.velocity;
        let threshold = self.config.inertia_start_threshold;
        self.state.mode = if v.x.abs() > threshold || v.y.abs() > threshold {
            CameraMode::Coasting
        } else {
            CameraMode::Idle
        };
    }

    /// Wheel zoom. Cancels auto-rotation but lets coasting continue.
    pub fn on_wheel(&mut self, delta_y: f64, unit: WheelUnit) {
        let mut amount = -delta_y * self.config.wheel_zoom_per_px;
        if unit == WheelUnit::Line {
            amount *= self.config.wheel_line_multiplier;
        }
        self.zoom_by(amount);
    }

    /// Two-finger pinch; `delta` is the change in zoom units.
    pub fn on_pinch(&mut self, delta: f64) {
        self.zoom_by(delta);
    }

    fn zoom_by(&mut self, amount: f64) {
        if !amount.is_finite() {
            return;
        }
        self.state.zoom = (self.state.zoom + amount).clamp(0.0, 1.0);
        if self.state.mode == CameraMode::AutoRotating {
            self.state.mode = CameraMode::Idle;
        }
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        if zoom.is_finite() {
            self.state.zoom = zoom.clamp(0.0, 1.0);
        }
    }

    pub fn set_auto_rotate(&mut self, enabled: bool) {
        match (enabled, self.state.mode) {
            (true, CameraMode::Idle | CameraMode::Coasting) => {
                self.state.mode = CameraMode::AutoRotating;
            }
            (false, CameraMode::AutoRotating) => self.state.mode = CameraMode::Idle,
            _ => {}
        }
    }

    /// Turns the globe to face `(lat, lng)`.
    ///
    /// Animated transitions ease out over `intro_spin_ms` along the shorter
    /// longitude direction and hand control back to auto-rotation.
    pub fn set_point_of_view(&mut self, lat_deg: f64, lng_deg: f64, animate: bool) {
        if !lat_deg.is_finite() || !lng_deg.is_finite() {
            return;
        }
        let limit = self.config.latitude_limit_deg;
        let target_lat = lat_deg.clamp(-limit, limit);
        let target_lng = wrap_longitude(lng_deg);
        self.state.velocity = Vec2::new(0.0, 0.0);

        if !animate || self.config.intro_spin_ms <= 0.0 {
            self.intro = None;
            self.state.longitude = target_lng;
            self.state.latitude = target_lat;
            if matches!(self.state.mode, CameraMode::IntroSpin | CameraMode::Coasting) {
                self.state.mode = CameraMode::AutoRotating;
            }
            return;
        }

        let from_lng = self.state.longitude;
        let unwrapped_target = from_lng + wrap_longitude(target_lng - from_lng);
        self.intro = Some(IntroSpin {
            from: (self.state.latitude, from_lng),
            to: (target_lat, unwrapped_target),
            elapsed_ms: 0.0,
        });
        self.state.mode = CameraMode::IntroSpin;
    }

    /// Advances time-driven motion by one frame. No-op while dragging.
    pub fn update(&mut self, dt_s: f64) {
        let dt_s = dt_s.clamp(0.0, 0.1);
        match self.state.mode {
            CameraMode::Dragging | CameraMode::Idle => {}
            CameraMode::IntroSpin => self.advance_intro(dt_s),
            CameraMode::AutoRotating => {
                self.rotate_by(-self.config.auto_rotate_deg_per_s * dt_s, 0.0);
            }
            CameraMode::Coasting => self.advance_inertia(dt_s),
        }
    }

    fn advance_intro(&mut self, dt_s: f64) {
        let Some(mut intro) = self.intro else {
            self.state.mode = CameraMode::AutoRotating;
            return;
        };
        intro.elapsed_ms += dt_s * 1000.0;
        let t = (intro.elapsed_ms / self.config.intro_spin_ms).min(1.0);
        let eased = 1.0 - (1.0 - t).powi(3);

        let lat = intro.from.0 + (intro.to.0 - intro.from.0) * eased;
        let lng = intro.from.1 + (intro.to.1 - intro.from.1) * eased;
        self.state.latitude = lat;
        self.state.longitude = wrap_longitude(lng);

        if t >= 1.0 {
            self.intro = None;
            self.state.latitude = intro.to.0;
            self.state.longitude = wrap_longitude(intro.to.1);
            self.state.mode = CameraMode::AutoRotating;
        } else {
            self.intro = Some(intro);
        }
    }

    fn advance_inertia(&mut self, dt_s: f64) {
        let decay = (-self.config.inertia_decay_rate * dt_s).exp();
        self.state.velocity = Vec2::new(
            self.state.velocity.x * decay,
            self.state.velocity.y * decay,
        );

        let k = dt_s * 1000.0 * self.config.inertia_gain * self.zoom_factor();
        let v = self.state.velocity;
        self.rotate_by(-v.x * k, v.y * k);

        let stop = self.config.inertia_stop_threshold;
        if v.x.abs() < stop && v.y.abs() < stop {
            self.state.mode = CameraMode::Idle;
            self.state.velocity = Vec2::new(0.0, 0.0);
        }
    }

    fn fov_rad(&self, aspect: f64) -> f64 {
        self.config.fov_deg.to_radians() / aspect.min(1.0)
    }

    fn camera_distance(&self, fov_rad: f64) -> f64 {
        let base = 1.0 / (0.8 * fov_rad / 2.0).tan();
        base * (1.0 - self.state.zoom * self.config.zoom_distance_factor)
    }

    pub fn matrices(&self, width: f64, height: f64) -> CameraMatrices {
        let aspect = if height > 0.0 { (width / height).max(1e-6) } else { 1.0 };
        let fov = self.fov_rad(aspect);
        let projection = mat4_perspective_rh_z0(fov, aspect, NEAR, FAR);
        let distance = self.camera_distance(fov);

        let rotation = mat4_mul(
            mat4_rotation_y((self.state.longitude + 180.0).to_radians()),
            mat4_rotation_x(self.state.latitude.to_radians()),
        );
        let eye = mat4_transform_point(rotation, Vec3::new(0.0, 0.0, -distance));
        let up = mat4_transform_point(rotation, Vec3::new(0.0, 1.0, 0.0));
        let view = mat4_look_at_rh(eye, Vec3::ZERO, up);

        CameraMatrices {
            view,
            projection,
            view_proj: mat4_mul(projection, view),
            eye,
        }
    }

    /// Unit vector from the globe center toward the viewer.
    pub fn view_direction(&self) -> Vec3 {
        Vec3::from_array(lat_lng_to_xyz(
            self.state.latitude,
            self.state.longitude,
            1.0,
        ))
    }

    /// Orthographic approximation of the perspective globe, for screen-space
    /// point overlays.
    pub fn projection_params(&self, width: f64, height: f64) -> ProjectionParams {
        let aspect = if height > 0.0 { (width / height).max(1e-6) } else { 1.0 };
        let fov = self.fov_rad(aspect);
        let distance = self.camera_distance(fov).max(1.0 + 1e-6);
        let tan_angular_radius = 1.0 / (distance * distance - 1.0).sqrt();
        let radius = (height / 2.0) * tan_angular_radius / (fov / 2.0).tan();

        ProjectionParams {
            width,
            height,
            scale: 1.0,
            rotation: [-self.state.longitude, -self.state.latitude],
            radius,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    fn at_origin() -> CameraController {
        let mut cam = CameraController::default();
        cam.set_point_of_view(0.0, 0.0, false);
        cam
    }

    #[test]
    fn mouse_drag_moves_longitude_by_sensitivity() {
        let mut cam = at_origin();
        cam.on_pointer_down([100.0, 100.0], 0.0, PointerKind::Mouse);
        assert_eq!(cam.mode(), CameraMode::Dragging);
        cam.on_pointer_move([110.0, 100.0], 16.0);
        assert_close(cam.state().longitude, -3.0, 1e-12);
        assert_close(cam.state().latitude, 0.0, 1e-12);
    }

    #[test]
    fn touch_drag_is_more_sensitive_and_zoom_damped() {
        let mut cam = at_origin();
        cam.set_zoom(0.5);
        cam.on_pointer_down([0.0, 0.0], 0.0, PointerKind::Touch);
        cam.on_pointer_move([0.0, 10.0], 10.0);
        assert_close(cam.state().latitude, 10.0 * 0.5 * 0.6, 1e-12);
    }

    #[test]
    fn drag_wraps_longitude_and_clamps_latitude() {
        let mut cam = CameraController::default();
        cam.set_point_of_view(80.0, 179.0, false);
        cam.on_pointer_down([0.0, 0.0], 0.0, PointerKind::Mouse);
        cam.on_pointer_move([-10.0, 100.0], 5.0);
        assert_close(cam.state().longitude, -178.0, 1e-9);
        assert_eq!(cam.state().latitude, 85.0);
    }

    #[test]
    fn stale_move_does_not_update_velocity() {
        let mut cam = at_origin();
        cam.on_pointer_down([0.0, 0.0], 0.0, PointerKind::Mouse);
        cam.on_pointer_move([5.0, 0.0], 500.0);
        assert_eq!(cam.state().velocity, Vec2::new(0.0, 0.0));
        cam.on_pointer_up();
        assert_eq!(cam.mode(), CameraMode::Idle);
    }

    #[test]
    fn fast_release_starts_coasting() {
        let mut cam = at_origin();
        cam.on_pointer_down([0.0, 0.0], 0.0, PointerKind::Mouse);
        cam.on_pointer_move([20.0, 0.0], 10.0);
        assert_close(cam.state().velocity.x, 2.0, 1e-12);
        cam.on_pointer_up();
        assert_eq!(cam.mode(), CameraMode::Coasting);

        let before = cam.state().longitude;
        cam.update(1.0 / 60.0);
        assert!(cam.state().longitude < before);
    }

    #[test]
    fn inertia_from_unit_velocity_stops_after_139_frames() {
        // exp(-3/60)^n < 0.001 first holds at n = 139 (n > 138.16).
        let mut cam = at_origin();
        cam.on_pointer_down([0.0, 0.0], 0.0, PointerKind::Mouse);
        cam.on_pointer_move([10.0, 0.0], 10.0);
        cam.on_pointer_up();
        assert_eq!(cam.state().velocity, Vec2::new(1.0, 0.0));

        let mut frames = 0;
        while cam.mode() == CameraMode::Coasting {
            cam.update(1.0 / 60.0);
            frames += 1;
            assert!(frames < 1000, "inertia never stopped");
        }
        assert_eq!(frames, 139);
        assert_eq!(cam.mode(), CameraMode::Idle);
    }

    #[test]
    fn wheel_zooms_clamps_and_cancels_auto_rotate_only() {
        let mut cam = CameraController::default();
        assert_eq!(cam.mode(), CameraMode::AutoRotating);
        cam.on_wheel(-100.0, WheelUnit::Pixel);
        assert_close(cam.state().zoom, 0.1, 1e-12);
        assert_eq!(cam.mode(), CameraMode::Idle);

        cam.on_wheel(-1.0, WheelUnit::Line);
        assert_close(cam.state().zoom, 0.15, 1e-12);
        cam.on_wheel(-100_000.0, WheelUnit::Pixel);
        assert_eq!(cam.state().zoom, 1.0);

        // Coasting survives a wheel event.
        let mut cam = at_origin();
        cam.on_pointer_down([0.0, 0.0], 0.0, PointerKind::Mouse);
        cam.on_pointer_move([30.0, 0.0], 10.0);
        cam.on_pointer_up();
        cam.on_wheel(10.0, WheelUnit::Pixel);
        assert_eq!(cam.mode(), CameraMode::Coasting);
    }

    #[test]
    fn pointer_down_cancels_coasting_and_auto_rotate() {
        let mut cam = at_origin();
        cam.on_pointer_down([0.0, 0.0], 0.0, PointerKind::Mouse);
        cam.on_pointer_move([30.0, 0.0], 10.0);
        cam.on_pointer_up();
        cam.on_pointer_down([0.0, 0.0], 20.0, PointerKind::Mouse);
        assert_eq!(cam.mode(), CameraMode::Dragging);
        assert_eq!(cam.state().velocity, Vec2::new(0.0, 0.0));

        let lng = cam.state().longitude;
        cam.update(0.05);
        assert_eq!(cam.state().longitude, lng);
    }

    #[test]
    fn auto_rotate_spins_west_at_configured_rate() {
        let mut cam = at_origin();
        cam.update(0.1);
        assert_close(cam.state().longitude, -0.9, 1e-12);
        // Frame steps are clamped.
        cam.update(5.0);
        assert_close(cam.state().longitude, -1.8, 1e-12);
    }

    #[test]
    fn animated_point_of_view_eases_then_resumes_auto_rotate() {
        let mut cam = at_origin();
        cam.set_point_of_view(40.0, 170.0, true);
        assert_eq!(cam.mode(), CameraMode::IntroSpin);

        cam.update(0.1);
        let early = cam.state();
        // Ease-out cubic at t = 0.1.
        let eased = 1.0 - 0.9f64.powi(3);
        assert_close(early.latitude, 40.0 * eased, 1e-9);
        assert_close(early.longitude, 170.0 * eased, 1e-9);

        let mut frames = 1;
        while cam.mode() == CameraMode::IntroSpin {
            cam.update(0.1);
            frames += 1;
            assert!(frames <= 11, "transition overran");
        }
        assert_eq!(cam.mode(), CameraMode::AutoRotating);
        assert_close(cam.state().latitude, 40.0, 1e-9);
        assert_close(cam.state().longitude, 170.0, 1e-9);
    }

    #[test]
    fn animated_point_of_view_takes_the_short_way_round() {
        let mut cam = CameraController::default();
        cam.set_point_of_view(0.0, 170.0, false);
        cam.set_point_of_view(0.0, -170.0, true);
        cam.update(0.1);
        // Heading east across the antimeridian rather than 340° west.
        let lng = cam.state().longitude;
        assert!(lng > 170.0 || lng < -170.0, "took the long way: {lng}");
    }

    #[test]
    fn eye_faces_the_view_center() {
        let mut cam = CameraController::default();
        cam.set_point_of_view(30.0, 45.0, false);
        let m = cam.matrices(800.0, 600.0);
        let dir = m.eye.normalize_or_zero();
        let expected = cam.view_direction();
        assert!((dir - expected).length() < 1e-5);

        // The view center projects to the middle of the screen.
        let surface = mat4_transform_point(m.view_proj, expected);
        let w = {
            let vp = m.view_proj;
            (vp[0][3] as f64) * expected.x
                + (vp[1][3] as f64) * expected.y
                + (vp[2][3] as f64) * expected.z
                + vp[3][3] as f64
        };
        assert!((surface.x / w).abs() < 1e-4);
        assert!((surface.y / w).abs() < 1e-4);
    }

    #[test]
    fn zoom_moves_the_camera_closer() {
        let mut cam = CameraController::default();
        let far = cam.matrices(800.0, 600.0).eye.length();
        cam.set_zoom(1.0);
        let near = cam.matrices(800.0, 600.0).eye.length();
        assert_close(near / far, 0.3, 1e-5);
        assert!(cam.projection_params(800.0, 600.0).radius > 0.0);
    }

    #[test]
    fn projection_rotation_is_negated_view_center() {
        let mut cam = CameraController::default();
        cam.set_point_of_view(12.0, -40.0, false);
        let p = cam.projection_params(640.0, 480.0);
        assert_eq!(p.rotation, [40.0, -12.0]);
        assert_eq!((p.width, p.height, p.scale), (640.0, 480.0, 1.0));
    }
}
