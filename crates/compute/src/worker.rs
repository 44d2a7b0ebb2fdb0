//! Background visibility computation behind a coalescing mailbox.
//!
//! The client never queues: while a request is in flight, newer requests
//! overwrite one pending slot. Transports move requests to an executor (a
//! native thread here, a dedicated web worker in the browser) and hand
//! responses back through [`VisibilityClient::on_message`].

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::JoinHandle;
use std::time::Duration;

use runtime::{Mailbox, Submit};
use serde::{Deserialize, Serialize};

use crate::visibility::{
    ColorRamp, VisibilityRequest, VisiblePoint, compute_visible_points, decode_points, POINT_STRIDE,
};

pub type WorkerRequest = VisibilityRequest;

/// Flat `[x, y, radius, r, g, b, count]` records.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub buffer: Vec<f32>,
    pub count: usize,
}

impl WorkerResponse {
    /// The populated prefix of the buffer.
    pub fn records(&self) -> &[f32] {
        let len = (self.count * POINT_STRIDE).min(self.buffer.len());
        &self.buffer[..len]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerError {
    /// The executor is gone (terminated or crashed).
    Disconnected,
    Spawn(String),
    Post(String),
    /// The executor reported an error instead of a result.
    Failed(String),
}

impl std::fmt::Display for WorkerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerError::Disconnected => write!(f, "visibility worker disconnected"),
            WorkerError::Spawn(msg) => write!(f, "failed to start visibility worker: {msg}"),
            WorkerError::Post(msg) => write!(f, "failed to post to visibility worker: {msg}"),
            WorkerError::Failed(msg) => write!(f, "visibility worker error: {msg}"),
        }
    }
}

impl std::error::Error for WorkerError {}

/// Executor-side state: keeps the color ramp alive across requests.
#[derive(Debug, Default)]
pub struct VisibilityWorker {
    ramp: ColorRamp,
}

impl VisibilityWorker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&mut self, request: &WorkerRequest) -> WorkerResponse {
        let result = compute_visible_points(request, &mut self.ramp);
        WorkerResponse {
            buffer: result.buffer,
            count: result.count,
        }
    }
}

pub trait VisibilityTransport {
    fn post(&mut self, request: WorkerRequest) -> Result<(), WorkerError>;

    fn terminate(&mut self);

    /// Next delivered message, for transports that are polled rather than
    /// driving the client from callbacks.
    fn poll(&mut self) -> Option<Result<WorkerResponse, WorkerError>> {
        None
    }
}

/// Handle for one [`VisibilityClient::compute`] call.
#[derive(Debug)]
pub struct Receipt {
    rx: Receiver<Vec<VisiblePoint>>,
}

impl Receipt {
    fn channel() -> (Sender<Vec<VisiblePoint>>, Self) {
        let (tx, rx) = mpsc::channel();
        (tx, Self { rx })
    }

    fn resolved(points: Vec<VisiblePoint>) -> Self {
        let (tx, receipt) = Self::channel();
        let _ = tx.send(points);
        receipt
    }

    /// `None` until resolved; also `None` if the client was destroyed first.
    pub fn poll(&self) -> Option<Vec<VisiblePoint>> {
        self.rx.try_recv().ok()
    }

    /// Blocks the calling thread. Only for native callers.
    pub fn wait(self, timeout: Duration) -> Result<Vec<VisiblePoint>, WorkerError> {
        self.rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => WorkerError::Failed("timed out".to_string()),
            RecvTimeoutError::Disconnected => WorkerError::Disconnected,
        })
    }
}

#[derive(Debug)]
pub struct VisibilityClient<T: VisibilityTransport> {
    transport: Option<T>,
    mailbox: Mailbox<WorkerRequest>,
    current: Vec<VisiblePoint>,
    awaiter: Option<Sender<Vec<VisiblePoint>>>,
    responses: u64,
    failed_posts: u64,
}

impl<T: VisibilityTransport> VisibilityClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport: Some(transport),
            mailbox: Mailbox::new(),
            current: Vec::new(),
            awaiter: None,
            responses: 0,
            failed_posts: 0,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.mailbox.is_busy()
    }

    pub fn has_pending(&self) -> bool {
        self.mailbox.has_pending()
    }

    pub fn is_destroyed(&self) -> bool {
        self.transport.is_none()
    }

    /// Latest decoded result.
    pub fn current(&self) -> &[VisiblePoint] {
        &self.current
    }

    /// Results received so far; zero until the worker first answers.
    pub fn responses(&self) -> u64 {
        self.responses
    }

    /// Requests the transport refused to post.
    pub fn failed_posts(&self) -> u64 {
        self.failed_posts
    }

    pub fn mailbox(&self) -> &Mailbox<WorkerRequest> {
        &self.mailbox
    }

    fn send(&mut self, request: WorkerRequest) -> Result<(), WorkerError> {
        let posted = match self.transport.as_mut() {
            Some(t) => t.post(request),
            None => Err(WorkerError::Disconnected),
        };
        if let Err(e) = &posted {
            self.failed_posts += 1;
            self.on_error(e);
        }
        posted
    }

    /// Fire-and-forget. Coalesces while a request is in flight.
    pub fn compute_async(&mut self, request: WorkerRequest) -> Result<(), WorkerError> {
        if self.transport.is_none() {
            return Err(WorkerError::Disconnected);
        }
        match self.mailbox.submit(request) {
            Submit::Dispatch(req) => self.send(req),
            Submit::Coalesced { .. } => Ok(()),
        }
    }

    /// Resolves with this request's result, or immediately with the current
    /// points when the request had to be coalesced.
    pub fn compute(&mut self, request: WorkerRequest) -> Receipt {
        if self.transport.is_none() {
            return Receipt::resolved(self.current.clone());
        }
        match self.mailbox.submit(request) {
            Submit::Dispatch(req) => {
                let (tx, receipt) = Receipt::channel();
                self.awaiter = Some(tx);
                // On failure `on_error` has already resolved the receipt.
                if let Err(err) = self.send(req) {
                    tracing::warn!(%err, "visibility request not posted");
                }
                receipt
            }
            Submit::Coalesced { .. } => Receipt::resolved(self.current.clone()),
        }
    }

    pub fn on_message(&mut self, response: WorkerResponse) {
        self.current = decode_points(response.records());
        self.responses += 1;
        if let Some(tx) = self.awaiter.take() {
            let _ = tx.send(self.current.clone());
        }
        if let Some(next) = self.mailbox.complete() {
            if let Err(err) = self.send(next) {
                tracing::warn!(%err, "queued visibility request not posted");
            }
        }
    }

    /// Clears the busy flag, resolves any awaiter with the current points and
    /// drops the pending request.
    pub fn on_error(&mut self, _error: &WorkerError) {
        self.mailbox.fail();
        if let Some(tx) = self.awaiter.take() {
            let _ = tx.send(self.current.clone());
        }
    }

    /// Drains a polled transport. Returns the number of messages handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let Some(message) = self.transport.as_mut().and_then(|t| t.poll()) else {
                break;
            };
            handled += 1;
            match message {
                Ok(response) => self.on_message(response),
                Err(e) => {
                    self.on_error(&e);
                    if e == WorkerError::Disconnected {
                        break;
                    }
                }
            }
        }
        handled
    }

    pub fn destroy(&mut self) {
        if let Some(mut t) = self.transport.take() {
            t.terminate();
        }
        self.mailbox = Mailbox::new();
        self.awaiter = None;
        self.current.clear();
    }
}

impl<T: VisibilityTransport> Drop for VisibilityClient<T> {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Runs [`VisibilityWorker`] on a native thread.
#[derive(Debug)]
pub struct ThreadTransport {
    requests: Option<Sender<WorkerRequest>>,
    responses: Receiver<Result<WorkerResponse, WorkerError>>,
    handle: Option<JoinHandle<()>>,
}

impl ThreadTransport {
    pub fn spawn() -> Result<Self, WorkerError> {
        let (req_tx, req_rx) = mpsc::channel::<WorkerRequest>();
        let (resp_tx, resp_rx) = mpsc::channel();
        let handle = std::thread::Builder::new()
            .name("visibility-worker".to_string())
            .spawn(move || {
                let mut worker = VisibilityWorker::new();
                for request in req_rx {
                    if resp_tx.send(Ok(worker.handle(&request))).is_err() {
                        break;
                    }
                }
            })
            .map_err(|e| WorkerError::Spawn(e.to_string()))?;
        Ok(Self {
            requests: Some(req_tx),
            responses: resp_rx,
            handle: Some(handle),
        })
    }

    /// Blocks until a message arrives or `timeout` passes.
    pub fn wait(&self, timeout: Duration) -> Option<Result<WorkerResponse, WorkerError>> {
        match self.responses.recv_timeout(timeout) {
            Ok(msg) => Some(msg),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(WorkerError::Disconnected)),
        }
    }
}

impl VisibilityTransport for ThreadTransport {
    fn post(&mut self, request: WorkerRequest) -> Result<(), WorkerError> {
        let tx = self.requests.as_ref().ok_or(WorkerError::Disconnected)?;
        tx.send(request).map_err(|_| WorkerError::Disconnected)
    }

    fn terminate(&mut self) {
        // Closing the request channel ends the worker loop.
        self.requests = None;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    fn poll(&mut self) -> Option<Result<WorkerResponse, WorkerError>> {
        match self.responses.try_recv() {
            Ok(msg) => Some(msg),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) if self.requests.is_some() => {
                Some(Err(WorkerError::Disconnected))
            }
            Err(TryRecvError::Disconnected) => None,
        }
    }
}

impl Drop for ThreadTransport {
    fn drop(&mut self) {
        self.terminate();
    }
}
