//! Browser-independent globe state.
//!
//! Everything the wasm bindings mutate lives here: datasets, theme, camera,
//! animations and delayed ripples, plus the bookkeeping that decides when a
//! texture rebuild or a visibility request is due. Drawing and the worker are
//! owned by the bindings.

use std::rc::Rc;

use compute::{
    ColorRamp, SYNC_POINT_CAP, VisibilityRequest, VisiblePoint, compute_visible_points_sync,
    decode_points,
};
use foundation::{ColorCache, Rgb};
use gpu::{CountryGroup, ProjectionKey, group_countries};
use layers::{
    Palette, TextureBuilder, TextureColors, TextureError, TextureImage, TextureRequest,
    TextureStats, Theme, build_texture,
};
use runtime::{FrameClock, TimerSet, Version};
use scene::{
    AnimationSet, CameraController, CameraMatrices, Country, CountryStats, Datacenters,
    GlobeConfig, LocationSample, ProjectionParams, Retired, RippleSpec, TrafficEvent,
    TrafficEventError, TrafficResponse, highest_count, max_country_visits, plan_traffic_event,
};

/// Inputs of one texture build, detached from the session so the build can
/// run after the current call returns.
#[derive(Debug, Clone)]
pub struct TextureJob {
    pub version: Version,
    countries: Rc<Vec<Country>>,
    country_stats: Rc<CountryStats>,
    locations: Rc<Vec<LocationSample>>,
    colors: TextureColors,
    desired_width: u32,
}

impl TextureJob {
    pub fn desired_width(&self) -> u32 {
        self.desired_width
    }

    pub fn build(&self, max_texture_size: u32) -> Result<(TextureImage, TextureStats), TextureError> {
        let request = TextureRequest {
            countries: &self.countries,
            country_stats: &self.country_stats,
            max_visits: max_country_visits(&self.country_stats),
            colors: self.colors,
            locations: &self.locations,
            highest_location_count: highest_count(&self.locations),
        };
        build_texture(&request, self.desired_width, max_texture_size)
    }
}

/// Camera output for one frame, in drawing-buffer pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameView {
    pub now_ms: f64,
    pub width: f64,
    pub height: f64,
    pub camera: CameraMatrices,
    pub projection: ProjectionParams,
}

pub struct GlobeSession {
    config: GlobeConfig,
    theme: Theme,
    colors: ColorCache,
    camera: CameraController,
    clock: FrameClock,
    animations: AnimationSet,
    timers: TimerSet<RippleSpec>,
    css_size: [f64; 2],
    pixel_ratio: f64,
    countries: Rc<Vec<Country>>,
    country_stats: Rc<CountryStats>,
    locations: Rc<Vec<LocationSample>>,
    datacenters: Datacenters,
    textures: TextureBuilder,
    fallback_ramp: ColorRamp,
    visibility_key: Option<ProjectionKey>,
    visibility_dirty: bool,
    running: bool,
}

impl Default for GlobeSession {
    fn default() -> Self {
        Self::new(GlobeConfig::default())
    }
}

impl GlobeSession {
    pub fn new(config: GlobeConfig) -> Self {
        Self {
            config,
            theme: Theme::default(),
            colors: ColorCache::new(),
            camera: CameraController::new(config),
            clock: FrameClock::new(),
            animations: AnimationSet::new(),
            timers: TimerSet::new(),
            css_size: [0.0, 0.0],
            pixel_ratio: 1.0,
            countries: Rc::new(Vec::new()),
            country_stats: Rc::new(CountryStats::new()),
            locations: Rc::new(Vec::new()),
            datacenters: Datacenters::new(),
            textures: TextureBuilder::new(),
            fallback_ramp: ColorRamp::new(),
            visibility_key: None,
            visibility_dirty: true,
            running: false,
        }
    }

    // ── Configuration ────────────────────────────────────────

    pub fn config(&self) -> &GlobeConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: GlobeConfig) {
        self.config = config;
        self.camera.set_config(config);
    }

    /// Returns `false` for unknown keys.
    pub fn set_config_value(&mut self, key: &str, value: f64) -> bool {
        let mut config = self.config;
        if !config.set(key, value) {
            return false;
        }
        self.set_config(config);
        true
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    /// Returns whether the theme actually changed.
    pub fn set_theme(&mut self, theme: Theme) -> bool {
        let changed = self.theme != theme;
        self.theme = theme;
        changed
    }

    pub fn palette(&self) -> Palette {
        self.theme.palette()
    }

    pub fn texture_colors(&mut self) -> TextureColors {
        self.theme.palette().texture_colors(&mut self.colors)
    }

    pub fn arc_color(&mut self) -> Rgb {
        self.theme.palette().arc_color(&mut self.colors)
    }

    /// Container size in CSS pixels and the device pixel ratio.
    pub fn set_size(&mut self, css_width: f64, css_height: f64, pixel_ratio: f64) {
        self.css_size = [css_width.max(0.0), css_height.max(0.0)];
        self.pixel_ratio = if pixel_ratio.is_finite() && pixel_ratio > 0.0 {
            pixel_ratio
        } else {
            1.0
        };
    }

    /// Drawing-buffer size in device pixels.
    pub fn pixel_size(&self) -> [u32; 2] {
        [
            (self.css_size[0] * self.pixel_ratio).round() as u32,
            (self.css_size[1] * self.pixel_ratio).round() as u32,
        ]
    }

    // ── Datasets ─────────────────────────────────────────────

    pub fn set_countries(&mut self, countries: Vec<Country>) {
        self.countries = Rc::new(countries);
    }

    pub fn set_country_stats(&mut self, stats: CountryStats) {
        self.country_stats = Rc::new(stats);
    }

    pub fn set_locations(&mut self, locations: Vec<LocationSample>) {
        self.locations = Rc::new(locations);
        self.visibility_dirty = true;
    }

    pub fn set_datacenters(&mut self, datacenters: Datacenters) {
        self.datacenters = datacenters;
    }

    pub fn country_count(&self) -> usize {
        self.countries.len()
    }

    pub fn location_count(&self) -> usize {
        self.locations.len()
    }

    pub fn datacenter_count(&self) -> usize {
        self.datacenters.len()
    }

    /// Country polygons grouped by visit tier, for the canvas-2D backend.
    pub fn country_groups(&mut self) -> Vec<CountryGroup> {
        let colors = self.texture_colors();
        group_countries(
            &self.countries,
            &self.country_stats,
            max_country_visits(&self.country_stats),
            &colors,
        )
    }

    // ── Surface texture ──────────────────────────────────────

    /// Starts a rebuild; any job started earlier becomes stale.
    pub fn texture_job(&mut self) -> TextureJob {
        let colors = self.texture_colors();
        TextureJob {
            version: self.textures.begin(),
            countries: Rc::clone(&self.countries),
            country_stats: Rc::clone(&self.country_stats),
            locations: Rc::clone(&self.locations),
            colors,
            desired_width: (self.css_size[0] * self.config.texture_scale).round() as u32,
        }
    }

    /// `None` when a newer job started (or teardown ran) in the meantime.
    pub fn accept_texture(&self, version: Version, image: TextureImage) -> Option<TextureImage> {
        self.textures.accept(version, image)
    }

    // ── Traffic ──────────────────────────────────────────────

    /// Starts the animations for one event. Rejected events leave no trace.
    /// Whether frames are being drawn. Traffic events are only accepted
    /// while they are, since frames are what retire animations.
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    pub fn trigger_traffic(
        &mut self,
        event: &TrafficEvent,
        now_ms: f64,
    ) -> Result<TrafficResponse, TrafficEventError> {
        if !self.running {
            return Err(TrafficEventError::NotReady);
        }
        let color = self.arc_color();
        let plan = plan_traffic_event(event, &self.datacenters, &self.config, color)?;
        Ok(plan.apply(&mut self.animations, &mut self.timers, now_ms))
    }

    pub fn animations(&self) -> &AnimationSet {
        &self.animations
    }

    pub fn pending_ripples(&self) -> usize {
        self.timers.len()
    }

    // ── Frame ────────────────────────────────────────────────

    pub fn camera(&self) -> &CameraController {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut CameraController {
        &mut self.camera
    }

    /// Advances time: starts due ripples, moves the camera and returns the
    /// view for this frame.
    pub fn begin_frame(&mut self, now_ms: f64) -> FrameView {
        let frame = self.clock.tick(now_ms);
        for (_, ripple) in self.timers.drain_due(now_ms) {
            self.animations.add_ripple(ripple, now_ms);
        }
        self.camera.update(frame.dt_s);

        let [w, h] = self.pixel_size();
        let (width, height) = (w as f64, h as f64);
        FrameView {
            now_ms,
            width,
            height,
            camera: self.camera.matrices(width, height),
            projection: self.camera.projection_params(width, height),
        }
    }

    /// A worker request when the view moved past the path-cache epsilon or
    /// the locations changed since the last request.
    pub fn visibility_request(&mut self, projection: &ProjectionParams) -> Option<VisibilityRequest> {
        if self.locations.is_empty() {
            return None;
        }
        let key = ProjectionKey::from_params(projection);
        let moved = self.visibility_key.is_none_or(|k| k.differs(&key));
        if !moved && !self.visibility_dirty {
            return None;
        }
        self.visibility_key = Some(key);
        self.visibility_dirty = false;
        Some(VisibilityRequest {
            locations: self.locations.as_ref().clone(),
            projection: *projection,
            highest: highest_count(&self.locations),
        })
    }

    /// Reduced-fidelity points computed on the calling thread.
    pub fn fallback_points(&mut self, projection: &ProjectionParams) -> Vec<VisiblePoint> {
        if self.locations.is_empty() {
            return Vec::new();
        }
        let request = VisibilityRequest {
            locations: self.locations.as_ref().clone(),
            projection: *projection,
            highest: highest_count(&self.locations),
        };
        let result = compute_visible_points_sync(&request, &mut self.fallback_ramp, SYNC_POINT_CAP);
        decode_points(&result.buffer)
    }

    pub fn retire(&mut self, now_ms: f64) -> Retired {
        self.animations.retire(now_ms)
    }

    /// Forget the last frame time, so a restarted loop does not see one huge step.
    pub fn pause_clock(&mut self) {
        self.clock.reset();
    }

    /// Drops every animation and delayed ripple and makes in-flight texture
    /// builds stale. Returns what the backend must release.
    pub fn teardown(&mut self) -> Retired {
        self.running = false;
        self.textures.invalidate();
        self.timers.clear();
        self.visibility_key = None;
        self.visibility_dirty = true;
        self.animations.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foundation::math::GeoPoint;
    use pretty_assertions::assert_eq;

    fn session() -> GlobeSession {
        let mut s = GlobeSession::default();
        s.set_size(400.0, 300.0, 2.0);
        let mut dcs = Datacenters::new();
        dcs.insert("FRA".to_string(), GeoPoint::new(50.1, 8.7));
        s.set_datacenters(dcs);
        s.set_running(true);
        s
    }

    fn event(lat: f64, lng: f64, colo: &str) -> TrafficEvent {
        TrafficEvent {
            latitude: Some(lat),
            longitude: Some(lng),
            colo: Some(colo.to_string()),
            city: None,
        }
    }

    fn square(code: &str, lng0: f64, lat0: f64, lng1: f64, lat1: f64) -> Country {
        Country {
            code: code.to_string(),
            polygons: vec![vec![vec![
                [lng0, lat0],
                [lng1, lat0],
                [lng1, lat1],
                [lng0, lat1],
                [lng0, lat0],
            ]]],
        }
    }

    #[test]
    fn drawing_buffer_follows_pixel_ratio() {
        let mut s = session();
        assert_eq!(s.pixel_size(), [800, 600]);
        s.set_size(100.0, 50.0, f64::NAN);
        assert_eq!(s.pixel_size(), [100, 50]);
    }

    #[test]
    fn distant_event_schedules_destination_ripple() {
        let mut s = session();
        let response = s.trigger_traffic(&event(40.7, -74.0, "FRA"), 1000.0).expect("planned");
        assert!(response.arc.is_some());
        assert_eq!(s.animations().arcs().len(), 1);
        assert_eq!(s.animations().ripples().len(), 1);
        assert_eq!(s.pending_ripples(), 1);

        s.begin_frame(1000.0 + s.config().traffic_delay_ms - 1.0);
        assert_eq!(s.animations().ripples().len(), 1);
        s.begin_frame(1000.0 + s.config().traffic_delay_ms);
        assert_eq!(s.animations().ripples().len(), 2);
        assert_eq!(s.pending_ripples(), 0);
    }

    #[test]
    fn rejected_event_leaves_no_animation() {
        let mut s = session();
        let err = s.trigger_traffic(&event(1.0, 2.0, "XXX"), 0.0).unwrap_err();
        assert_eq!(err, TrafficEventError::UnknownDatacenter("XXX".to_string()));
        assert!(s.animations().is_empty());
        assert_eq!(s.pending_ripples(), 0);
    }

    #[test]
    fn events_wait_for_a_running_globe() {
        let mut s = session();
        s.set_running(false);
        for _ in 0..5 {
            let err = s.trigger_traffic(&event(40.7, -74.0, "FRA"), 0.0).unwrap_err();
            assert_eq!(err, TrafficEventError::NotReady);
        }
        assert!(s.animations().is_empty());
        assert_eq!(s.pending_ripples(), 0);

        s.set_running(true);
        s.trigger_traffic(&event(40.7, -74.0, "FRA"), 0.0).expect("planned");
        assert_eq!(s.animations().arcs().len(), 1);
    }

    #[test]
    fn torn_down_session_rejects_events() {
        let mut s = session();
        s.teardown();
        assert!(!s.is_running());
        assert_eq!(
            s.trigger_traffic(&event(40.7, -74.0, "FRA"), 0.0),
            Err(TrafficEventError::NotReady)
        );
        assert!(s.animations().is_empty());
        assert_eq!(s.pending_ripples(), 0);
    }

    #[test]
    fn teardown_cancels_delayed_ripples() {
        let mut s = session();
        s.trigger_traffic(&event(-33.9, 151.2, "FRA"), 0.0).expect("planned");
        let retired = s.teardown();
        assert_eq!(retired.arcs.len(), 1);
        assert_eq!(retired.ripples.len(), 1);

        s.begin_frame(10_000.0);
        assert!(s.animations().is_empty());
        assert_eq!(s.pending_ripples(), 0);
    }

    #[test]
    fn only_the_latest_texture_job_is_accepted() {
        let mut s = session();
        s.set_countries(vec![square("DE", 6.0, 47.0, 15.0, 55.0)]);
        let first = s.texture_job();
        let second = s.texture_job();
        assert_eq!(second.desired_width(), 800);

        let (image, _) = second.build(512).expect("texture");
        assert_eq!((image.width, image.height), (512, 256));
        assert!(s.accept_texture(first.version, image.clone()).is_none());
        assert!(s.accept_texture(second.version, image.clone()).is_some());

        s.teardown();
        assert!(s.accept_texture(second.version, image).is_none());
    }

    #[test]
    fn visibility_requests_follow_view_and_data_changes() {
        let mut s = session();
        let view = s.begin_frame(0.0);
        assert!(s.visibility_request(&view.projection).is_none());

        s.set_locations(vec![LocationSample::new(10.0, 20.0, 3.0)]);
        let request = s.visibility_request(&view.projection).expect("new data");
        assert_eq!(request.highest, 3.0);
        assert_eq!(request.locations.len(), 1);
        assert!(s.visibility_request(&view.projection).is_none());

        let mut moved = view.projection;
        moved.rotation[0] += 0.005;
        assert!(s.visibility_request(&moved).is_none());
        moved.rotation[0] += 1.0;
        assert!(s.visibility_request(&moved).is_some());
    }

    #[test]
    fn fallback_points_are_projected_on_the_main_thread() {
        let mut s = session();
        s.camera_mut().set_point_of_view(0.0, 0.0, false);
        s.set_locations(vec![
            LocationSample::new(0.0, 0.0, 5.0),
            LocationSample::new(0.0, 180.0, 5.0),
        ]);
        let view = s.begin_frame(0.0);
        let points = s.fallback_points(&view.projection);
        assert_eq!(points.len(), 1);
        assert!((points[0].x as f64 - view.width / 2.0).abs() < 1.0);
        assert!((points[0].y as f64 - view.height / 2.0).abs() < 1.0);
    }

    #[test]
    fn country_groups_use_theme_tiers() {
        let mut s = session();
        s.set_countries(vec![
            square("DE", 6.0, 47.0, 15.0, 55.0),
            square("FR", -5.0, 42.0, 8.0, 51.0),
        ]);
        let mut stats = CountryStats::new();
        stats.insert("DE".to_string(), 100.0);
        s.set_country_stats(stats);

        let light = s.country_groups();
        assert_eq!(light.len(), 2);
        assert!(s.set_theme(Theme::Dark));
        assert!(!s.set_theme(Theme::Dark));
        let dark = s.country_groups();
        assert_ne!(light[1].fill, dark[1].fill);
        assert_eq!(light[1].polygons, dark[1].polygons);
    }

    #[test]
    fn config_updates_reach_the_camera() {
        let mut s = session();
        assert!(s.set_config_value("auto_rotate_deg_per_s", 0.0));
        assert!(!s.set_config_value("no_such_key", 1.0));
        let before = s.camera().state().longitude;
        s.begin_frame(0.0);
        s.begin_frame(50.0);
        assert_eq!(s.camera().state().longitude, before);
    }
}
