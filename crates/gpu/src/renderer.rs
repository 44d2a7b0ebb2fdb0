//! Per-frame draw planning, independent of the drawing API.
//!
//! [`plan_frame`] turns camera, animation and point state into an ordered
//! command list. Backends replay it verbatim: sphere, then arcs, then
//! ripples, then points.

use compute::VisiblePoint;
use foundation::Rgb;
use foundation::math::Mat4;
use scene::{AnimationId, AnimationSet, ArcGeometry, CameraMatrices, ProjectionParams};

/// Where the points of this frame came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointSource {
    Worker,
    /// Reduced-fidelity main-thread result, used until the worker answers.
    SyncFallback,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderCommand<'a> {
    /// Opaque, depth-tested, textured.
    Sphere,
    /// Additive, depth-tested without depth writes.
    Arc {
        id: AnimationId,
        /// Full ribbon; only the first `vertex_count` vertices are drawn.
        geometry: &'a ArcGeometry,
        vertex_count: u32,
        fade: f32,
        color: Rgb,
    },
    /// Additive, no depth test; occlusion is resolved per fragment.
    Ripple {
        id: AnimationId,
        position: [f32; 3],
        size_px: f32,
        alpha: f32,
        ring_width: f32,
        color: Rgb,
    },
    Points {
        points: &'a [VisiblePoint],
        source: PointSource,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct FrameInputs<'a> {
    pub now_ms: f64,
    pub width: f64,
    pub height: f64,
    pub camera: &'a CameraMatrices,
    pub projection: ProjectionParams,
    pub animations: &'a AnimationSet,
    pub points: &'a [VisiblePoint],
    pub point_source: PointSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FramePlan<'a> {
    pub view_proj: Mat4,
    pub eye: [f32; 3],
    pub viewport: [f32; 2],
    /// Orthographic view matching the camera, for screen-space backends.
    pub projection: ProjectionParams,
    pub commands: Vec<RenderCommand<'a>>,
}

impl FramePlan<'_> {
    pub fn arc_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, RenderCommand::Arc { .. }))
            .count()
    }

    pub fn ripple_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, RenderCommand::Ripple { .. }))
            .count()
    }
}

pub fn plan_frame<'a>(inputs: &FrameInputs<'a>) -> FramePlan<'a> {
    let now = inputs.now_ms;
    let mut commands = vec![RenderCommand::Sphere];

    for arc in inputs.animations.arcs() {
        let vertex_count = arc.visible_vertex_count(now);
        let fade = arc.fade(now);
        if vertex_count == 0 || fade <= 0.0 {
            continue;
        }
        commands.push(RenderCommand::Arc {
            id: arc.id,
            geometry: &arc.geometry,
            vertex_count: vertex_count as u32,
            fade: fade as f32,
            color: arc.color,
        });
    }

    for ripple in inputs.animations.ripples() {
        if ripple.is_retired(now) {
            continue;
        }
        commands.push(RenderCommand::Ripple {
            id: ripple.id,
            position: ripple.world_position(),
            size_px: ripple.size_px(now, inputs.height) as f32,
            alpha: ripple.alpha(now) as f32,
            ring_width: ripple.ring_width(now) as f32,
            color: ripple.color,
        });
    }

    if !inputs.points.is_empty() {
        commands.push(RenderCommand::Points {
            points: inputs.points,
            source: inputs.point_source,
        });
    }

    let eye = inputs.camera.eye;
    FramePlan {
        view_proj: inputs.camera.view_proj,
        eye: [eye.x as f32, eye.y as f32, eye.z as f32],
        viewport: [inputs.width as f32, inputs.height as f32],
        projection: inputs.projection,
        commands,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foundation::math::GeoPoint;
    use scene::{ArcOptions, ArcSpec, CameraController, RippleSpec};

    fn arc_spec(duration_ms: f64) -> ArcSpec {
        ArcSpec {
            source: GeoPoint::new(0.0, 0.0),
            destination: GeoPoint::new(40.0, 60.0),
            duration_ms,
            fade_ms: 500.0,
            color: [1.0, 0.5, 0.0],
            options: ArcOptions::default(),
        }
    }

    fn ripple_spec() -> RippleSpec {
        RippleSpec {
            center: GeoPoint::new(10.0, 10.0),
            duration_ms: 1000.0,
            max_radius: 6.0,
            color: [1.0, 0.5, 0.0],
        }
    }

    fn point() -> VisiblePoint {
        VisiblePoint {
            x: 10.0,
            y: 20.0,
            radius: 3.0,
            color: [1.0, 1.0, 0.8],
            count: 1.0,
        }
    }

    fn kind(cmd: &RenderCommand<'_>) -> u8 {
        match cmd {
            RenderCommand::Sphere => 0,
            RenderCommand::Arc { .. } => 1,
            RenderCommand::Ripple { .. } => 2,
            RenderCommand::Points { .. } => 3,
        }
    }

    #[test]
    fn commands_follow_fixed_layer_order() {
        let controller = CameraController::default();
        let camera = controller.matrices(800.0, 600.0);
        let mut set = AnimationSet::new();
        // Insert in reverse layer order; the plan must not care.
        set.add_ripple(ripple_spec(), 0.0);
        set.add_arc(arc_spec(1000.0), 0.0);
        set.add_arc(arc_spec(1000.0), 0.0);
        let points = [point(), point()];

        let plan = plan_frame(&FrameInputs {
            now_ms: 600.0,
            width: 800.0,
            height: 600.0,
            camera: &camera,
            projection: controller.projection_params(800.0, 600.0),
            animations: &set,
            points: &points,
            point_source: PointSource::Worker,
        });

        let kinds: Vec<u8> = plan.commands.iter().map(kind).collect();
        assert_eq!(kinds, vec![0, 1, 1, 2, 3]);
        assert_eq!(plan.arc_count(), 2);
        assert_eq!(plan.viewport, [800.0, 600.0]);
    }

    #[test]
    fn arcs_too_short_to_draw_are_skipped() {
        let controller = CameraController::default();
        let camera = controller.matrices(100.0, 100.0);
        let mut set = AnimationSet::new();
        set.add_arc(arc_spec(1000.0), 0.0);

        let inputs = |now_ms| FrameInputs {
            now_ms,
            width: 100.0,
            height: 100.0,
            camera: &camera,
            projection: controller.projection_params(100.0, 100.0),
            animations: &set,
            points: &[],
            point_source: PointSource::SyncFallback,
        };

        // 102 vertices: 2% reveals 2, below the four-vertex minimum.
        assert_eq!(plan_frame(&inputs(20.0)).arc_count(), 0);
        let plan = plan_frame(&inputs(500.0));
        assert_eq!(
            plan.commands[1],
            RenderCommand::Arc {
                id: set.arcs()[0].id,
                geometry: &set.arcs()[0].geometry,
                vertex_count: 50,
                fade: 1.0,
                color: [1.0, 0.5, 0.0],
            }
        );
        // Fully faded arcs are not drawn even before retirement.
        assert_eq!(plan_frame(&inputs(1500.0)).arc_count(), 0);
        assert_eq!(plan_frame(&inputs(1500.0)).commands.len(), 1);
    }

    #[test]
    fn ripples_carry_animation_state() {
        let controller = CameraController::default();
        let camera = controller.matrices(100.0, 400.0);
        let mut set = AnimationSet::new();
        set.add_ripple(ripple_spec(), 0.0);

        let plan = plan_frame(&FrameInputs {
            now_ms: 500.0,
            width: 100.0,
            height: 400.0,
            camera: &camera,
            projection: controller.projection_params(100.0, 400.0),
            animations: &set,
            points: &[],
            point_source: PointSource::Worker,
        });
        assert_eq!(plan.ripple_count(), 1);
        let RenderCommand::Ripple { alpha, ring_width, position, .. } = plan.commands[1] else {
            panic!("expected ripple, got {:?}", plan.commands[1]);
        };
        assert_eq!(alpha, 0.5);
        assert!((ring_width - 0.325).abs() < 1e-6);
        assert_eq!(position, set.ripples()[0].world_position());
    }
}
