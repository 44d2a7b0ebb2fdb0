use gloo_net::http::Request;
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use wasm_bindgen_futures::spawn_local;
use web_sys::HtmlCanvasElement;

use compute::VisibilityClient;
use formats::{parse_countries, parse_country_stats, parse_datacenters, parse_locations, sphere_bin};
use gpu::{
    BackendKind, FrameInputs, PointSource, RenderBackend, RenderError, plan_frame, select_backend,
};
use layers::Theme;
use scene::{
    CameraController, DEFAULT_SPHERE_DIVISIONS, GlobeConfig, PointerKind, SphereMesh,
    TrafficEvent, TrafficEventError, WheelUnit, build_sphere,
};

mod canvas2d;
mod session;
mod wgpu;
mod worker;

use canvas2d::Canvas2dBackend;
use session::{GlobeSession, TextureJob};
use wgpu::{WgpuBackend, init_wgpu_backend};
use worker::WebWorkerTransport;

pub use worker::visibility_worker_main;

// Guard against double initialization (hot reload, worker re-entry).
static INITIALIZED: AtomicBool = AtomicBool::new(false);
static PANIC_HOOK_SET: OnceLock<()> = OnceLock::new();

fn log(msg: &str) {
    web_sys::console::log_1(&JsValue::from_str(msg));
}

fn warn(msg: &str) {
    web_sys::console::warn_1(&JsValue::from_str(msg));
}

fn error(msg: &str) {
    web_sys::console::error_1(&JsValue::from_str(msg));
}

fn to_js(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// Yield to the browser event loop so input and paint run before heavy work.
async fn yield_now() {
    let promise = js_sys::Promise::new(&mut |resolve, _| {
        let scheduled = web_sys::window().is_some_and(|window| {
            window
                .set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, 0)
                .is_ok()
        });
        if !scheduled {
            let _ = resolve.call0(&JsValue::NULL);
        }
    });
    let _ = JsFuture::from(promise).await;
}

fn now_ms() -> f64 {
    // Same clock as requestAnimationFrame timestamps.
    web_sys::window()
        .and_then(|w| w.performance())
        .map(|p| p.now())
        .unwrap_or_else(foundation::now_ms)
}

enum ActiveBackend {
    Gpu(WgpuBackend),
    Canvas(Canvas2dBackend),
}

impl ActiveBackend {
    fn as_backend(&mut self) -> &mut dyn RenderBackend {
        match self {
            ActiveBackend::Gpu(b) => b,
            ActiveBackend::Canvas(b) => b,
        }
    }

    fn kind(&self) -> BackendKind {
        match self {
            ActiveBackend::Gpu(_) => BackendKind::WebGl,
            ActiveBackend::Canvas(_) => BackendKind::Canvas2d,
        }
    }
}

type FrameCallback = Rc<RefCell<Option<Closure<dyn FnMut(f64)>>>>;

#[derive(Default)]
struct GlobeState {
    session: GlobeSession,
    canvas: Option<HtmlCanvasElement>,
    backend: Option<ActiveBackend>,
    worker: Option<VisibilityClient<WebWorkerTransport>>,
    loop_running: bool,
    /// Identifies the live animation-frame loop; older loops stop themselves.
    loop_token: u64,
    /// Bumped by init and destroy so a slow init cannot install a backend
    /// after the globe was torn down.
    generation: u64,
}

impl GlobeState {
    fn render_frame(&mut self, now_ms: f64) -> Result<(), RenderError> {
        let Some(backend) = self.backend.as_mut() else {
            return Err(RenderError::NotReady);
        };
        let view = self.session.begin_frame(now_ms);

        if let Some(client) = self.worker.as_mut() {
            if let Some(request) = self.session.visibility_request(&view.projection) {
                if let Err(err) = client.compute_async(request) {
                    warn(&format!("visibility request not sent: {err}"));
                }
            }
        }

        let answered = self
            .worker
            .as_ref()
            .filter(|client| client.responses() > 0)
            .map(|client| client.current());
        let fallback;
        let (points, point_source) = match answered {
            Some(points) => (points, PointSource::Worker),
            None => {
                fallback = self.session.fallback_points(&view.projection);
                (&fallback[..], PointSource::SyncFallback)
            }
        };

        let plan = plan_frame(&FrameInputs {
            now_ms,
            width: view.width,
            height: view.height,
            camera: &view.camera,
            projection: view.projection,
            animations: self.session.animations(),
            points,
            point_source,
        });
        let rendered = backend.as_backend().render(&plan);

        let retired = self.session.retire(now_ms);
        if !retired.is_empty() {
            backend.as_backend().release(&retired);
        }
        rendered
    }
}

thread_local! {
    static STATE: RefCell<GlobeState> = RefCell::new(GlobeState::default());
}

/// TLS access that yields a default during teardown instead of panicking.
fn with_state<F, R>(f: F) -> R
where
    F: FnOnce(&RefCell<GlobeState>) -> R,
    R: Default,
{
    STATE.try_with(f).unwrap_or_default()
}

fn with_camera(f: impl FnOnce(&mut CameraController)) {
    with_state(|state| f(state.borrow_mut().session.camera_mut()));
}

fn init_panic_hook() {
    PANIC_HOOK_SET.get_or_init(console_error_panic_hook::set_once);
}

#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }
    init_panic_hook();
    Ok(())
}

fn canvas_by_id(canvas_id: &str) -> Result<HtmlCanvasElement, JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
    let document = window
        .document()
        .ok_or_else(|| JsValue::from_str("no document"))?;
    document
        .get_element_by_id(canvas_id)
        .ok_or_else(|| JsValue::from_str(&format!("missing canvas #{canvas_id}")))?
        .dyn_into::<HtmlCanvasElement>()
        .map_err(|_| JsValue::from_str(&format!("#{canvas_id} is not a canvas")))
}

/// Probes WebGL2 on a scratch canvas so the real one keeps its context free.
fn webgl_available() -> bool {
    let Some(document) = web_sys::window().and_then(|w| w.document()) else {
        return false;
    };
    let Ok(probe) = document.create_element("canvas") else {
        return false;
    };
    let Ok(probe) = probe.dyn_into::<HtmlCanvasElement>() else {
        return false;
    };
    matches!(probe.get_context("webgl2"), Ok(Some(_)))
}

async fn fetch_response(url: &str) -> Result<gloo_net::http::Response, JsValue> {
    let resp = Request::get(url)
        .send()
        .await
        .map_err(|e| JsValue::from_str(&format!("fetch {url} failed: {e}")))?;
    if !resp.ok() {
        return Err(JsValue::from_str(&format!(
            "fetch {url} failed: HTTP {}",
            resp.status()
        )));
    }
    Ok(resp)
}

async fn load_sphere(url: Option<&str>) -> SphereMesh {
    if let Some(url) = url {
        let loaded = match fetch_response(url).await {
            Ok(resp) => resp
                .binary()
                .await
                .map_err(to_js)
                .and_then(|bytes| sphere_bin::decode(&bytes).map_err(to_js)),
            Err(err) => Err(err),
        };
        match loaded {
            Ok(mesh) => return mesh,
            Err(err) => warn(&format!("sphere mesh {url} unavailable, building locally: {err:?}")),
        }
    }
    build_sphere(DEFAULT_SPHERE_DIVISIONS).unwrap_or_default()
}

fn start_worker(script_url: &str) -> Result<(), JsValue> {
    let transport = WebWorkerTransport::spawn(script_url, |result| {
        with_state(|state| {
            let mut s = state.borrow_mut();
            let Some(client) = s.worker.as_mut() else {
                return;
            };
            match result {
                Ok(response) => client.on_message(response),
                Err(err) => {
                    error(&err.to_string());
                    client.on_error(&err);
                }
            }
        })
    })?;
    with_state(|state| state.borrow_mut().worker = Some(VisibilityClient::new(transport)));
    Ok(())
}

/// Creates the drawing backend on `canvas_id`.
///
/// Resolves to `false` when the chosen backend cannot be created; nothing is
/// installed in that case and the caller decides on a fallback. Points are
/// projected on the main thread until the worker at `worker_url` answers;
/// without a worker they always are.
#[wasm_bindgen]
pub async fn init_globe(
    canvas_id: String,
    prefer_webgl: bool,
    worker_url: Option<String>,
    sphere_url: Option<String>,
) -> Result<bool, JsValue> {
    let canvas = canvas_by_id(&canvas_id)?;
    destroy_globe();
    let generation = with_state(|state| state.borrow().generation);

    let kind = select_backend(prefer_webgl, webgl_available());
    let backend = match kind {
        BackendKind::WebGl => {
            let sphere = load_sphere(sphere_url.as_deref()).await;
            match init_wgpu_backend(canvas.clone(), &sphere).await {
                Ok(b) => ActiveBackend::Gpu(b),
                Err(err) => {
                    error(&format!("webgl init failed: {err:?}"));
                    return Ok(false);
                }
            }
        }
        BackendKind::Canvas2d => {
            let palette = with_state(|state| state.borrow().session.palette());
            match Canvas2dBackend::new(canvas.clone(), palette) {
                Ok(b) => ActiveBackend::Canvas(b),
                Err(err) => {
                    error(&format!("2d canvas init failed: {err:?}"));
                    return Ok(false);
                }
            }
        }
    };

    let rejected = with_state(move |state| {
        let mut s = state.borrow_mut();
        if s.generation != generation {
            return Some(backend);
        }
        s.canvas = Some(canvas);
        s.backend = Some(backend);
        None
    });
    if let Some(mut stale) = rejected {
        log("globe init superseded; discarding backend");
        stale.as_backend().destroy();
        return Ok(false);
    }

    if let Some(url) = worker_url.as_deref() {
        if let Err(err) = start_worker(url) {
            warn(&format!("visibility worker unavailable, projecting on main thread: {err:?}"));
        }
    }

    log(&format!("globe initialized with {} backend", kind.name()));
    refresh_surface();
    Ok(true)
}

/// Pushes data-dependent surface state to the backend: country groups for
/// canvas 2D, a versioned texture rebuild for WebGL.
fn refresh_surface() {
    let job = with_state(|state| {
        let mut guard = state.borrow_mut();
        let s = &mut *guard;
        match s.backend.as_mut() {
            Some(ActiveBackend::Canvas(b)) => {
                b.set_palette(s.session.palette());
                b.set_country_groups(s.session.country_groups());
                None
            }
            Some(ActiveBackend::Gpu(b)) if s.session.pixel_size()[0] > 0 => {
                Some((s.session.texture_job(), b.max_texture_size()))
            }
            _ => None,
        }
    });
    if let Some((job, max_texture_size)) = job {
        spawn_local(rebuild_texture(job, max_texture_size));
    }
}

async fn rebuild_texture(job: TextureJob, max_texture_size: u32) {
    yield_now().await;
    if job.desired_width() < 2 {
        return;
    }
    let version = job.version;
    let built = job.build(max_texture_size);
    with_state(|state| {
        let mut guard = state.borrow_mut();
        let s = &mut *guard;
        let (image, stats) = match built {
            Ok(built) => built,
            Err(err) => {
                warn(&format!("surface texture skipped: {err}"));
                return;
            }
        };
        let Some(image) = s.session.accept_texture(version, image) else {
            log("stale surface texture discarded");
            return;
        };
        if let Some(ActiveBackend::Gpu(b)) = s.backend.as_mut() {
            match b.upload_texture(&image) {
                Ok(()) => log(&format!(
                    "surface texture {}x{}: {} country hexes, {} heat hexes, {} color batches",
                    image.width, image.height, stats.country_hexes, stats.heat_hexes, stats.color_batches
                )),
                Err(err) => warn(&format!("surface texture upload failed: {err}")),
            }
        }
    });
}

#[wasm_bindgen]
pub fn set_canvas_size(css_width: f64, css_height: f64, pixel_ratio: f64) {
    let first_size = with_state(|state| {
        let mut guard = state.borrow_mut();
        let s = &mut *guard;
        let had_size = s.session.pixel_size()[0] > 0;
        s.session.set_size(css_width, css_height, pixel_ratio);
        let [w, h] = s.session.pixel_size();
        if let Some(canvas) = &s.canvas {
            canvas.set_width(w);
            canvas.set_height(h);
        }
        if let Some(b) = s.backend.as_mut() {
            b.as_backend().update_size(w, h);
        }
        !had_size && w > 0
    });
    if first_size {
        refresh_surface();
    }
}

#[wasm_bindgen]
pub fn set_theme(name: &str) -> Result<(), JsValue> {
    let theme = Theme::from_name(name)
        .ok_or_else(|| JsValue::from_str(&format!("unknown theme {name:?}")))?;
    if with_state(|state| state.borrow_mut().session.set_theme(theme)) {
        refresh_surface();
    }
    Ok(())
}

#[wasm_bindgen]
pub fn set_countries_json(json: &str) -> Result<(), JsValue> {
    let countries = parse_countries(json).map_err(to_js)?;
    with_state(|state| state.borrow_mut().session.set_countries(countries));
    refresh_surface();
    Ok(())
}

#[wasm_bindgen]
pub fn set_country_stats_json(json: &str) -> Result<(), JsValue> {
    let stats = parse_country_stats(json).map_err(to_js)?;
    with_state(|state| state.borrow_mut().session.set_country_stats(stats));
    refresh_surface();
    Ok(())
}

#[wasm_bindgen]
pub fn set_locations_json(json: &str) -> Result<(), JsValue> {
    let locations = parse_locations(json).map_err(to_js)?;
    with_state(|state| state.borrow_mut().session.set_locations(locations));
    refresh_surface();
    Ok(())
}

#[wasm_bindgen]
pub fn set_datacenters_json(json: &str) -> Result<(), JsValue> {
    let datacenters = parse_datacenters(json).map_err(to_js)?;
    with_state(|state| state.borrow_mut().session.set_datacenters(datacenters));
    Ok(())
}

/// Fetches a dataset and applies it like the matching `set_*_json` call.
///
/// `kind` is one of `countries`, `country_stats`, `locations`, `datacenters`.
#[wasm_bindgen]
pub async fn load_dataset(kind: String, url: String) -> Result<(), JsValue> {
    let text = fetch_response(&url).await?.text().await.map_err(to_js)?;
    match kind.as_str() {
        "countries" => set_countries_json(&text),
        "country_stats" | "stats" => set_country_stats_json(&text),
        "locations" => set_locations_json(&text),
        "datacenters" => set_datacenters_json(&text),
        other => Err(JsValue::from_str(&format!("unknown dataset kind {other:?}"))),
    }
}

/// Animates one visitor → datacenter event. Malformed events, unknown
/// datacenters and events arriving while the render loop is stopped are
/// logged and dropped.
#[wasm_bindgen]
pub fn trigger_traffic_event(json: &str) {
    let event = match TrafficEvent::from_json(json) {
        Ok(event) => event,
        Err(err) => {
            warn(&format!("traffic event dropped: {err}"));
            return;
        }
    };
    let now = now_ms();
    let outcome = with_state(|state| {
        let mut s = state.borrow_mut();
        if s.backend.is_none() {
            return Some(Err(TrafficEventError::NotReady));
        }
        Some(s.session.trigger_traffic(&event, now))
    });
    if let Some(Err(err)) = outcome {
        warn(&format!("traffic event dropped: {err}"));
    }
}

fn wheel_unit(delta_mode: u32) -> WheelUnit {
    // DOM deltaMode: 0 pixels, 1 lines, 2 pages.
    match delta_mode {
        0 => WheelUnit::Pixel,
        _ => WheelUnit::Line,
    }
}

#[wasm_bindgen]
pub fn on_pointer_down(x: f64, y: f64, is_touch: bool) {
    let kind = if is_touch {
        PointerKind::Touch
    } else {
        PointerKind::Mouse
    };
    let now = now_ms();
    with_camera(|camera| camera.on_pointer_down([x, y], now, kind));
}

#[wasm_bindgen]
pub fn on_pointer_move(x: f64, y: f64) {
    let now = now_ms();
    with_camera(|camera| camera.on_pointer_move([x, y], now));
}

#[wasm_bindgen]
pub fn on_pointer_up() {
    with_camera(|camera| camera.on_pointer_up());
}

#[wasm_bindgen]
pub fn on_wheel(delta_y: f64, delta_mode: u32) {
    with_camera(|camera| camera.on_wheel(delta_y, wheel_unit(delta_mode)));
}

/// Two-finger zoom; `delta` is in wheel pixels (positive zooms out).
#[wasm_bindgen]
pub fn on_pinch(delta: f64) {
    with_camera(|camera| camera.on_pinch(delta));
}

#[wasm_bindgen]
pub fn set_point_of_view(lat: f64, lng: f64, animate: bool) {
    with_camera(|camera| camera.set_point_of_view(lat, lng, animate));
}

#[wasm_bindgen]
pub fn set_auto_rotate(enabled: bool) {
    with_camera(|camera| camera.set_auto_rotate(enabled));
}

#[wasm_bindgen]
pub fn set_zoom(zoom: f64) {
    with_camera(|camera| camera.set_zoom(zoom));
}

#[wasm_bindgen]
pub fn set_globe_config_json(json: &str) -> Result<(), JsValue> {
    let config = GlobeConfig::from_json(json).map_err(to_js)?;
    with_state(|state| state.borrow_mut().session.set_config(config));
    Ok(())
}

/// Returns `false` for unknown keys or non-finite values.
#[wasm_bindgen]
pub fn set_globe_config(key: &str, value: f64) -> bool {
    with_state(|state| state.borrow_mut().session.set_config_value(key, value))
}

#[wasm_bindgen]
pub fn get_globe_config_json() -> Result<String, JsValue> {
    let config = with_state(|state| *state.borrow().session.config());
    serde_json::to_string(&config).map_err(to_js)
}

#[derive(Debug, Default, Serialize)]
struct GlobeStatus {
    backend: Option<&'static str>,
    longitude: f64,
    latitude: f64,
    zoom: f64,
    arcs: usize,
    ripples: usize,
    pending_ripples: usize,
    worker_results: u64,
    worker_busy: bool,
    worker_failed_posts: u64,
    gpu_resources: usize,
    path_rebuilds: u64,
    countries: usize,
    locations: usize,
    datacenters: usize,
    loop_running: bool,
}

#[wasm_bindgen]
pub fn globe_status_json() -> Result<String, JsValue> {
    let status = with_state(|state| {
        let s = state.borrow();
        let camera = s.session.camera().state();
        GlobeStatus {
            backend: s.backend.as_ref().map(|b| b.kind().name()),
            longitude: camera.longitude,
            latitude: camera.latitude,
            zoom: camera.zoom,
            arcs: s.session.animations().arcs().len(),
            ripples: s.session.animations().ripples().len(),
            pending_ripples: s.session.pending_ripples(),
            worker_results: s.worker.as_ref().map_or(0, |w| w.responses()),
            worker_busy: s.worker.as_ref().is_some_and(|w| w.is_busy()),
            worker_failed_posts: s.worker.as_ref().map_or(0, |w| w.failed_posts()),
            gpu_resources: match &s.backend {
                Some(ActiveBackend::Gpu(b)) => b.resource_count(),
                _ => 0,
            },
            path_rebuilds: match &s.backend {
                Some(ActiveBackend::Canvas(b)) => b.path_rebuilds(),
                _ => 0,
            },
            countries: s.session.country_count(),
            locations: s.session.location_count(),
            datacenters: s.session.datacenter_count(),
            loop_running: s.loop_running,
        }
    });
    serde_json::to_string(&status).map_err(to_js)
}

/// Draws one frame at `now_ms` (animation-frame clock).
#[wasm_bindgen]
pub fn render_frame(now_ms: f64) -> Result<(), JsValue> {
    match with_state(|state| Some(state.borrow_mut().render_frame(now_ms))) {
        Some(Err(err)) => Err(to_js(err)),
        _ => Ok(()),
    }
}

fn request_frame(callback: &Closure<dyn FnMut(f64)>) -> Result<i32, JsValue> {
    web_sys::window()
        .ok_or_else(|| JsValue::from_str("no window"))?
        .request_animation_frame(callback.as_ref().unchecked_ref())
}

#[wasm_bindgen]
pub fn start_render_loop() -> Result<(), JsValue> {
    let token = with_state(|state| {
        let mut s = state.borrow_mut();
        if s.loop_running || s.backend.is_none() {
            return None;
        }
        s.loop_running = true;
        s.session.set_running(true);
        s.loop_token += 1;
        Some(s.loop_token)
    });
    let Some(token) = token else {
        return Ok(());
    };

    let callback: FrameCallback = Rc::new(RefCell::new(None));
    let this = Rc::clone(&callback);
    *callback.borrow_mut() = Some(Closure::new(move |now: f64| {
        let live = with_state(|state| {
            let s = state.borrow();
            s.loop_running && s.loop_token == token
        });
        if !live {
            // Break the self-reference once this call has returned.
            let finished = this.borrow_mut().take();
            spawn_local(async move { drop(finished) });
            return;
        }
        if let Err(err) = render_frame(now) {
            warn(&format!("frame failed: {err:?}"));
        }
        if let Some(next) = this.borrow().as_ref() {
            if let Err(err) = request_frame(next) {
                error(&format!("requestAnimationFrame failed: {err:?}"));
            }
        }
    }));

    let first = callback.borrow();
    match first.as_ref() {
        Some(cb) => request_frame(cb).map(|_| ()),
        None => Ok(()),
    }
}

#[wasm_bindgen]
pub fn stop_render_loop() {
    with_state(|state| {
        let mut s = state.borrow_mut();
        s.loop_running = false;
        s.session.set_running(false);
        s.session.pause_clock();
    });
}

/// Stops the loop, cancels delayed ripples and in-flight texture builds,
/// terminates the worker and frees every GPU resource. Datasets are kept.
#[wasm_bindgen]
pub fn destroy_globe() {
    with_state(|state| {
        let mut guard = state.borrow_mut();
        let s = &mut *guard;
        s.loop_running = false;
        s.generation += 1;
        let retired = s.session.teardown();
        if let Some(mut client) = s.worker.take() {
            client.destroy();
        }
        if let Some(mut backend) = s.backend.take() {
            let backend = backend.as_backend();
            backend.release(&retired);
            backend.destroy();
        }
        s.canvas = None;
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wheel_delta_modes() {
        assert_eq!(wheel_unit(0), WheelUnit::Pixel);
        assert_eq!(wheel_unit(1), WheelUnit::Line);
        assert_eq!(wheel_unit(2), WheelUnit::Line);
    }

    #[test]
    fn frames_without_backend_are_not_ready() {
        let mut state = GlobeState::default();
        assert_eq!(state.render_frame(0.0), Err(RenderError::NotReady));
    }
}
