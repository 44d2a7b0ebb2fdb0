/// Single-slot, latest-wins mailbox in front of one asynchronous executor.
///
/// At most one request is in flight and at most one is pending. A request
/// submitted while busy replaces any pending one; intermediate requests are
/// dropped, never queued.
#[derive(Debug)]
pub struct Mailbox<T> {
    busy: bool,
    pending: Option<T>,
    dispatched: u64,
    dropped: u64,
}

/// What the caller must do after [`Mailbox::submit`].
#[derive(Debug, PartialEq, Eq)]
pub enum Submit<T> {
    /// The executor was idle: send this request now.
    Dispatch(T),
    /// Stored as pending. Carries the older pending request it replaced, if any.
    Coalesced { replaced: Option<T> },
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self {
            busy: false,
            pending: None,
            dispatched: 0,
            dropped: 0,
        }
    }
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Requests sent to the executor so far.
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Requests overwritten before they could be dispatched.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn submit(&mut self, request: T) -> Submit<T> {
        if !self.busy {
            self.busy = true;
            self.dispatched += 1;
            return Submit::Dispatch(request);
        }
        let replaced = self.pending.replace(request);
        if replaced.is_some() {
            self.dropped += 1;
        }
        Submit::Coalesced { replaced }
    }

    /// The in-flight request finished. Returns the pending request, which is
    /// now in flight and must be sent.
    pub fn complete(&mut self) -> Option<T> {
        match self.pending.take() {
            Some(next) => {
                self.busy = true;
                self.dispatched += 1;
                Some(next)
            }
            None => {
                self.busy = false;
                None
            }
        }
    }

    /// The executor failed. Clears the busy flag and drops any pending request.
    pub fn fail(&mut self) -> Option<T> {
        self.busy = false;
        let dropped = self.pending.take();
        if dropped.is_some() {
            self.dropped += 1;
        }
        dropped
    }
}
