//! Traffic events: a visitor location hitting a datacenter, turned into an arc
//! plus ripples (or a lone ripple for short hops).

use std::collections::BTreeMap;

use foundation::Rgb;
use foundation::math::GeoPoint;
use runtime::{TimerId, TimerSet};
use serde::{Deserialize, Serialize};

use crate::animation::{AnimationId, AnimationSet, ArcSpec, RippleSpec};
use crate::arc::ArcOptions;
use crate::config::GlobeConfig;

/// Datacenter code to location.
pub type Datacenters = BTreeMap<String, GeoPoint>;

/// Event payload as delivered by the host.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrafficEvent {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default, rename = "COLO", alias = "colo")]
    pub colo: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

impl TrafficEvent {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrafficEventError {
    MissingField(&'static str),
    UnknownDatacenter(String),
    /// The globe is not rendering, so nothing would retire the animation.
    NotReady,
}

impl std::fmt::Display for TrafficEventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrafficEventError::MissingField(name) => {
                write!(f, "traffic event is missing `{name}`")
            }
            TrafficEventError::UnknownDatacenter(code) => {
                write!(f, "no coordinates for datacenter {code}")
            }
            TrafficEventError::NotReady => write!(f, "globe is not ready"),
        }
    }
}

impl std::error::Error for TrafficEventError {}

#[derive(Debug, Clone, PartialEq)]
pub enum TrafficPlan {
    /// Source and destination are too close for a visible arc.
    RippleOnly { destination: RippleSpec },
    ArcAndRipples {
        arc: ArcSpec,
        source: RippleSpec,
        destination: RippleSpec,
        /// Delay before the destination ripple starts.
        destination_delay_ms: f64,
    },
}

/// What [`TrafficPlan::apply`] started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrafficResponse {
    pub arc: Option<AnimationId>,
    pub ripple: AnimationId,
    pub delayed_ripple: Option<TimerId>,
}

impl TrafficPlan {
    pub fn has_arc(&self) -> bool {
        matches!(self, TrafficPlan::ArcAndRipples { .. })
    }

    /// Starts the immediate animations and schedules the delayed ripple.
    pub fn apply(
        self,
        animations: &mut AnimationSet,
        timers: &mut TimerSet<RippleSpec>,
        now_ms: f64,
    ) -> TrafficResponse {
        match self {
            TrafficPlan::RippleOnly { destination } => TrafficResponse {
                arc: None,
                ripple: animations.add_ripple(destination, now_ms),
                delayed_ripple: None,
            },
            TrafficPlan::ArcAndRipples {
                arc,
                source,
                destination,
                destination_delay_ms,
            } => TrafficResponse {
                arc: Some(animations.add_arc(arc, now_ms)),
                ripple: animations.add_ripple(source, now_ms),
                delayed_ripple: Some(timers.schedule(now_ms + destination_delay_ms, destination)),
            },
        }
    }
}

/// Resolves an event against the datacenter table.
pub fn plan_traffic_event(
    event: &TrafficEvent,
    datacenters: &Datacenters,
    config: &GlobeConfig,
    color: Rgb,
) -> Result<TrafficPlan, TrafficEventError> {
    let lat = event
        .latitude
        .filter(|v| v.is_finite())
        .ok_or(TrafficEventError::MissingField("latitude"))?;
    let lng = event
        .longitude
        .filter(|v| v.is_finite())
        .ok_or(TrafficEventError::MissingField("longitude"))?;
    let code = event
        .colo
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or(TrafficEventError::MissingField("COLO"))?;
    let end = *datacenters
        .get(code)
        .ok_or_else(|| TrafficEventError::UnknownDatacenter(code.to_string()))?;

    let delay = config.traffic_delay_ms;
    let destination = RippleSpec {
        center: end,
        duration_ms: delay * 1.2,
        max_radius: config.ripple_max_radius,
        color,
    };

    let near = config.near_threshold_deg;
    if (end.lat_deg - lat).abs() < near && (end.lng_deg - lng).abs() < near {
        return Ok(TrafficPlan::RippleOnly { destination });
    }

    let start = GeoPoint::new(lat, lng);
    Ok(TrafficPlan::ArcAndRipples {
        arc: ArcSpec {
            source: start,
            destination: end,
            duration_ms: delay,
            fade_ms: config.arc_fade_ms,
            color,
            options: ArcOptions {
                segments: config.arc_segments,
                progress: 1.0,
                half_width: config.arc_half_width,
            },
        },
        source: RippleSpec {
            center: start,
            duration_ms: delay * 0.8,
            max_radius: config.ripple_max_radius / 2.0,
            color,
        },
        destination,
        destination_delay_ms: delay,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn datacenters() -> Datacenters {
        let mut dcs = Datacenters::new();
        dcs.insert("SJC".into(), GeoPoint::new(37.36, -121.93));
        dcs.insert("NRT".into(), GeoPoint::new(35.76, 140.39));
        dcs
    }

    fn event(lat: f64, lng: f64, colo: &str) -> TrafficEvent {
        TrafficEvent {
            latitude: Some(lat),
            longitude: Some(lng),
            colo: Some(colo.into()),
            city: None,
        }
    }

    const ORANGE: Rgb = [1.0, 0.6, 0.2];

    #[test]
    fn nearby_visitor_gets_ripple_only() {
        let cfg = GlobeConfig::default();
        let plan = plan_traffic_event(&event(37.77, -122.42, "SJC"), &datacenters(), &cfg, ORANGE)
            .expect("valid event");
        let TrafficPlan::RippleOnly { destination } = plan else {
            panic!("expected ripple only, got {plan:?}");
        };
        assert_eq!(destination.max_radius, 6.0);
        assert_eq!(destination.duration_ms, 1440.0);
    }

    #[test]
    fn distant_visitor_gets_arc_and_staggered_ripples() {
        let cfg = GlobeConfig::default();
        let plan = plan_traffic_event(&event(48.85, 2.35, "NRT"), &datacenters(), &cfg, ORANGE)
            .expect("valid event");
        assert!(plan.has_arc());

        let mut animations = AnimationSet::new();
        let mut timers = TimerSet::new();
        let response = plan.apply(&mut animations, &mut timers, 10_000.0);

        assert!(response.arc.is_some());
        assert_eq!(animations.arcs().len(), 1);
        assert_eq!(animations.arcs()[0].duration_ms, 1200.0);
        assert_eq!(animations.ripples().len(), 1);
        assert_eq!(animations.ripples()[0].max_radius, 3.0);
        assert_eq!(animations.ripples()[0].duration_ms, 960.0);

        assert!(timers.drain_due(11_199.0).is_empty());
        let due = timers.drain_due(11_200.0);
        assert_eq!(due.len(), 1);
        assert_eq!(Some(due[0].0), response.delayed_ripple);
        assert_eq!(due[0].1.max_radius, 6.0);
    }

    #[test]
    fn incomplete_events_are_rejected() {
        let cfg = GlobeConfig::default();
        let dcs = datacenters();

        let mut missing = event(1.0, 2.0, "SJC");
        missing.latitude = None;
        assert_eq!(
            plan_traffic_event(&missing, &dcs, &cfg, ORANGE),
            Err(TrafficEventError::MissingField("latitude"))
        );

        let unknown = event(1.0, 2.0, "XXX");
        assert_eq!(
            plan_traffic_event(&unknown, &dcs, &cfg, ORANGE),
            Err(TrafficEventError::UnknownDatacenter("XXX".into()))
        );
    }

    #[test]
    fn host_json_uses_upper_case_colo() {
        let ev = TrafficEvent::from_json(r#"{"latitude": 1.5, "longitude": 2.5, "COLO": "SJC"}"#)
            .expect("json");
        assert_eq!(ev.colo.as_deref(), Some("SJC"));
        let ev = TrafficEvent::from_json(r#"{"colo": "NRT"}"#).expect("json");
        assert_eq!(ev.colo.as_deref(), Some("NRT"));
        assert_eq!(ev.latitude, None);
    }
}
