//! A traffic event carried through planning, delayed ripples and retirement
//! into the draw lists of successive frames.

use compute::{ColorRamp, SYNC_POINT_CAP, VisibilityRequest, compute_visible_points_sync, decode_points};
use foundation::math::GeoPoint;
use gpu::{FrameInputs, FramePlan, PointSource, RenderCommand, plan_frame};
use pretty_assertions::assert_eq;
use runtime::TimerSet;
use scene::{
    AnimationSet, CameraController, Datacenters, GlobeConfig, LocationSample, RippleSpec,
    TrafficEvent, plan_traffic_event,
};

const WIDTH: f64 = 800.0;
const HEIGHT: f64 = 600.0;

fn kinds(plan: &FramePlan<'_>) -> Vec<&'static str> {
    plan.commands
        .iter()
        .map(|c| match c {
            RenderCommand::Sphere => "sphere",
            RenderCommand::Arc { .. } => "arc",
            RenderCommand::Ripple { .. } => "ripple",
            RenderCommand::Points { .. } => "points",
        })
        .collect()
}

#[test]
fn traffic_event_flows_through_frames_until_retired() {
    let config = GlobeConfig::default();
    let controller = CameraController::new(config);
    let camera = controller.matrices(WIDTH, HEIGHT);
    let projection = controller.projection_params(WIDTH, HEIGHT);

    let mut datacenters = Datacenters::new();
    datacenters.insert("FRA".to_string(), GeoPoint::new(50.1, 8.7));
    let event = TrafficEvent::from_json(r#"{"latitude": 40.7, "longitude": -74.0, "COLO": "FRA"}"#)
        .expect("event json");

    let mut animations = AnimationSet::new();
    let mut timers: TimerSet<RippleSpec> = TimerSet::new();
    let response = plan_traffic_event(&event, &datacenters, &config, [1.0, 0.5, 0.0])
        .expect("planned")
        .apply(&mut animations, &mut timers, 0.0);
    assert!(response.delayed_ripple.is_some());

    // One location straight under the camera is always on the near side.
    let view = controller.state();
    let request = VisibilityRequest {
        locations: vec![LocationSample::new(view.latitude, view.longitude, 4.0)],
        projection,
        highest: 4.0,
    };
    let result = compute_visible_points_sync(&request, &mut ColorRamp::new(), SYNC_POINT_CAP);
    let points = decode_points(&result.buffer);
    assert_eq!(points.len(), 1);

    let frame = |now_ms, animations: &AnimationSet| {
        kinds(&plan_frame(&FrameInputs {
            now_ms,
            width: WIDTH,
            height: HEIGHT,
            camera: &camera,
            projection,
            animations,
            points: &points,
            point_source: PointSource::SyncFallback,
        }))
    };

    assert_eq!(frame(600.0, &animations), vec!["sphere", "arc", "ripple", "points"]);

    let now = config.traffic_delay_ms + 100.0;
    for (_, spec) in timers.drain_due(now) {
        animations.add_ripple(spec, now);
    }
    let retired = animations.retire(now);
    assert_eq!(retired.ripples, vec![response.ripple]);
    assert!(timers.is_empty());
    assert_eq!(frame(now, &animations), vec!["sphere", "arc", "ripple", "points"]);

    let later = 10_000.0;
    let retired = animations.retire(later);
    assert_eq!(retired.arcs, response.arc.into_iter().collect::<Vec<_>>());
    assert_eq!(retired.ripples.len(), 1);
    assert!(animations.is_empty());
    assert_eq!(frame(later, &animations), vec!["sphere", "points"]);
}
