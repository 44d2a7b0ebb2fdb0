use foundation::time::Time;

/// Delta used for the very first frame, before any previous timestamp exists.
pub const FIRST_FRAME_DT_S: f64 = 0.016;
/// Upper bound on a single frame step; long stalls (tab in background) are
/// clamped so animations never jump.
pub const MAX_FRAME_DT_S: f64 = 0.1;

/// Frame metadata handed to every per-frame consumer.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Frame {
    /// 0-based frame index.
    pub index: u64,
    /// Clamped delta time (seconds).
    pub dt_s: f64,
    /// Host timestamp of the frame.
    pub time: Time,
}

/// Turns host timestamps (ms, animation-frame cadence) into clamped frame steps.
#[derive(Debug, Default, Clone)]
pub struct FrameClock {
    last_ms: Option<f64>,
    index: u64,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&mut self, now_ms: f64) -> Frame {
        let dt_s = match self.last_ms {
            None => FIRST_FRAME_DT_S,
            Some(last) => ((now_ms - last) / 1000.0).clamp(0.0, MAX_FRAME_DT_S),
        };
        self.last_ms = Some(now_ms);
        let frame = Frame {
            index: self.index,
            dt_s,
            time: Time::from_ms(now_ms),
        };
        self.index = self.index.wrapping_add(1);
        frame
    }

    /// Forget the previous timestamp, e.g. after the loop was stopped.
    pub fn reset(&mut self) {
        self.last_ms = None;
    }
}
