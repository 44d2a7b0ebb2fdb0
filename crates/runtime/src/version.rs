/// Ticket identifying one asynchronous rebuild.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(pub u64);

/// Monotonic counter used to discard results of superseded async work.
///
/// Every `begin()` supersedes all earlier tickets; `invalidate()` supersedes
/// them without issuing a new one (teardown).
#[derive(Debug, Default, Clone)]
pub struct VersionCounter {
    current: u64,
}

impl VersionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self) -> Version {
        self.current = self.current.wrapping_add(1);
        Version(self.current)
    }

    pub fn current(&self) -> Version {
        Version(self.current)
    }

    pub fn is_current(&self, ticket: Version) -> bool {
        ticket.0 == self.current
    }

    pub fn invalidate(&mut self) {
        self.current = self.current.wrapping_add(1);
    }
}
