use std::collections::BTreeMap;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(pub u64);

#[derive(Debug)]
struct Timer<T> {
    due_ms: f64,
    payload: T,
}

/// Registry of delayed actions that must not outlive their owner.
///
/// Ids are issued in schedule order, so `drain_due` is deterministic for
/// timers that share a due time.
#[derive(Debug)]
pub struct TimerSet<T> {
    next_id: u64,
    timers: BTreeMap<TimerId, Timer<T>>,
}

impl<T> Default for TimerSet<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            timers: BTreeMap::new(),
        }
    }
}

impl<T> TimerSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn schedule(&mut self, due_ms: f64, payload: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.timers.insert(id, Timer { due_ms, payload });
        id
    }

    pub fn cancel(&mut self, id: TimerId) -> Option<T> {
        self.timers.remove(&id).map(|t| t.payload)
    }

    /// Removes and returns every timer due at or before `now_ms`, ordered by
    /// due time then schedule order.
    pub fn drain_due(&mut self, now_ms: f64) -> Vec<(TimerId, T)> {
        let due: Vec<TimerId> = self
            .timers
            .iter()
            .filter(|(_, t)| t.due_ms <= now_ms)
            .map(|(id, _)| *id)
            .collect();

        let mut fired: Vec<(TimerId, f64, T)> = due
            .into_iter()
            .filter_map(|id| self.timers.remove(&id).map(|t| (id, t.due_ms, t.payload)))
            .collect();
        fired.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        fired.into_iter().map(|(id, _, p)| (id, p)).collect()
    }

    /// Drops every pending timer and returns their ids so host-side timeouts
    /// can be cleared too.
    pub fn clear(&mut self) -> Vec<TimerId> {
        let ids = self.timers.keys().copied().collect();
        self.timers.clear();
        ids
    }
}
