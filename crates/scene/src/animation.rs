//! Time-driven arc and ripple animations spawned by traffic events.
//!
//! Animations are plain data sampled against the frame clock; the render
//! loop owns their GPU buffers and releases them when [`AnimationSet::retire`]
//! reports the ids.

use std::f64::consts::PI;

use foundation::Rgb;
use foundation::math::GeoPoint;

use crate::arc::{ArcGeometry, ArcOptions, build_arc};

/// Ripples float just above the surface.
pub const RIPPLE_RADIUS: f64 = 1.005;
/// Arcs with fewer visible vertices than this are not drawn.
pub const MIN_DRAWABLE_ARC_VERTICES: usize = 4;
const MIN_RIPPLE_SIZE_PX: f64 = 12.0;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AnimationId(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub struct ArcAnimation {
    pub id: AnimationId,
    pub source: GeoPoint,
    pub destination: GeoPoint,
    pub start_ms: f64,
    pub duration_ms: f64,
    pub fade_ms: f64,
    pub geometry: ArcGeometry,
    pub color: Rgb,
}

impl ArcAnimation {
    pub fn vertex_count(&self) -> usize {
        self.geometry.vertex_count()
    }

    fn elapsed(&self, now_ms: f64) -> f64 {
        (now_ms - self.start_ms).max(0.0)
    }

    pub fn progress(&self, now_ms: f64) -> f64 {
        if self.duration_ms <= 0.0 {
            return 1.0;
        }
        (self.elapsed(now_ms) / self.duration_ms).min(1.0)
    }

    /// Vertices of the strip revealed so far, rounded down to whole quads.
    /// Zero while the reveal is too short to draw.
    pub fn visible_vertex_count(&self, now_ms: f64) -> usize {
        let revealed = (self.vertex_count() as f64 * self.progress(now_ms)).floor() as usize & !1;
        if revealed < MIN_DRAWABLE_ARC_VERTICES {
            0
        } else {
            revealed
        }
    }

    pub fn fade(&self, now_ms: f64) -> f64 {
        let over = self.elapsed(now_ms) - self.duration_ms;
        if over <= 0.0 {
            return 1.0;
        }
        if self.fade_ms <= 0.0 {
            return 0.0;
        }
        (1.0 - over / self.fade_ms).clamp(0.0, 1.0)
    }

    pub fn is_retired(&self, now_ms: f64) -> bool {
        self.elapsed(now_ms) >= self.duration_ms + self.fade_ms
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RippleAnimation {
    pub id: AnimationId,
    pub center: GeoPoint,
    pub start_ms: f64,
    pub duration_ms: f64,
    /// Final ring radius in degrees of arc.
    pub max_radius: f64,
    pub color: Rgb,
}

impl RippleAnimation {
    pub fn progress(&self, now_ms: f64) -> f64 {
        if self.duration_ms <= 0.0 {
            return 1.0;
        }
        ((now_ms - self.start_ms) / self.duration_ms).clamp(0.0, 1.0)
    }

    pub fn alpha(&self, now_ms: f64) -> f64 {
        1.0 - self.progress(now_ms)
    }

    /// Ring thickness as a fraction of the sprite, thinning as it expands.
    pub fn ring_width(&self, now_ms: f64) -> f64 {
        0.25 + 0.15 * (1.0 - self.progress(now_ms))
    }

    /// Point-sprite size for a drawing buffer `viewport_h` pixels tall.
    pub fn size_px(&self, now_ms: f64, viewport_h: f64) -> f64 {
        let globe_px = viewport_h * 0.4;
        let size = self.max_radius * globe_px * PI / 180.0 * 4.0 * self.progress(now_ms);
        size.max(MIN_RIPPLE_SIZE_PX)
    }

    pub fn world_position(&self) -> [f32; 3] {
        self.center.to_xyz(RIPPLE_RADIUS).to_f32()
    }

    pub fn is_retired(&self, now_ms: f64) -> bool {
        self.progress(now_ms) >= 1.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Retired {
    pub arcs: Vec<AnimationId>,
    pub ripples: Vec<AnimationId>,
}

impl Retired {
    pub fn is_empty(&self) -> bool {
        self.arcs.is_empty() && self.ripples.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArcSpec {
    pub source: GeoPoint,
    pub destination: GeoPoint,
    pub duration_ms: f64,
    pub fade_ms: f64,
    pub color: Rgb,
    pub options: ArcOptions,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RippleSpec {
    pub center: GeoPoint,
    pub duration_ms: f64,
    pub max_radius: f64,
    pub color: Rgb,
}

/// Live animations, in creation order.
#[derive(Debug, Default)]
pub struct AnimationSet {
    next_id: u64,
    arcs: Vec<ArcAnimation>,
    ripples: Vec<RippleAnimation>,
}

impl AnimationSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> AnimationId {
        self.next_id += 1;
        AnimationId(self.next_id)
    }

    /// Builds the full ribbon once; the reveal is a draw-range over it.
    pub fn add_arc(&mut self, spec: ArcSpec, now_ms: f64) -> AnimationId {
        let id = self.allocate_id();
        let geometry = build_arc(
            spec.source,
            spec.destination,
            ArcOptions {
                progress: 1.0,
                ..spec.options
            },
        );
        self.arcs.push(ArcAnimation {
            id,
            source: spec.source,
            destination: spec.destination,
            start_ms: now_ms,
            duration_ms: spec.duration_ms,
            fade_ms: spec.fade_ms,
            geometry,
            color: spec.color,
        });
        id
    }

    pub fn add_ripple(&mut self, spec: RippleSpec, now_ms: f64) -> AnimationId {
        let id = self.allocate_id();
        self.ripples.push(RippleAnimation {
            id,
            center: spec.center,
            start_ms: now_ms,
            duration_ms: spec.duration_ms,
            max_radius: spec.max_radius,
            color: spec.color,
        });
        id
    }

    pub fn arcs(&self) -> &[ArcAnimation] {
        &self.arcs
    }

    pub fn ripples(&self) -> &[RippleAnimation] {
        &self.ripples
    }

    pub fn arc(&self, id: AnimationId) -> Option<&ArcAnimation> {
        self.arcs.iter().find(|a| a.id == id)
    }

    pub fn len(&self) -> usize {
        self.arcs.len() + self.ripples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops finished animations and returns their ids.
    pub fn retire(&mut self, now_ms: f64) -> Retired {
        let mut retired = Retired::default();
        self.arcs.retain(|arc| {
            let done = arc.is_retired(now_ms);
            if done {
                retired.arcs.push(arc.id);
            }
            !done
        });
        self.ripples.retain(|ripple| {
            let done = ripple.is_retired(now_ms);
            if done {
                retired.ripples.push(ripple.id);
            }
            !done
        });
        retired
    }

    /// Drops everything, e.g. on teardown.
    pub fn clear(&mut self) -> Retired {
        Retired {
            arcs: self.arcs.drain(..).map(|a| a.id).collect(),
            ripples: self.ripples.drain(..).map(|r| r.id).collect(),
        }
    }
}
