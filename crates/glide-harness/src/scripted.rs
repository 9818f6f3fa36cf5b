//! Scripted transport.
//!
//! Replays a queue of canned outcomes, one per request, and records every
//! request it receives. A step can be gated so the request stays in flight
//! until the test opens the gate, which is how cancellation and superseding
//! are exercised deterministically. Once the script runs out, requests pend
//! forever, like a long poll on an idle server.

use std::{collections::VecDeque, sync::Arc};

use glide_client::{Transport, TransportError};
use glide_proto::{SyncRequest, SyncResponse};
use parking_lot::Mutex;
use tokio::sync::{Notify, watch};

/// Holds a scripted response until opened.
#[derive(Debug, Clone, Default)]
pub struct Gate {
    notify: Arc<Notify>,
}

impl Gate {
    /// Release the held response. Opening before the request arrives lets it
    /// through immediately.
    pub fn open(&self) {
        self.notify.notify_one();
    }
}

enum Step {
    Respond(SyncResponse),
    Fail(TransportError),
    Gated(Gate, Result<SyncResponse, TransportError>),
}

struct Inner {
    script: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<SyncRequest>>,
    received: watch::Sender<usize>,
    echo_txn: bool,
}

/// Transport replaying a fixed script.
#[derive(Clone)]
pub struct ScriptedTransport {
    inner: Arc<Inner>,
}

impl ScriptedTransport {
    /// Empty script. Responses without a `txn_id` get the request's id.
    pub fn new() -> Self {
        Self::build(true)
    }

    /// Empty script that returns responses exactly as queued.
    pub fn verbatim() -> Self {
        Self::build(false)
    }

    fn build(echo_txn: bool) -> Self {
        let (received, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                script: Mutex::new(VecDeque::new()),
                requests: Mutex::new(Vec::new()),
                received,
                echo_txn,
            }),
        }
    }

    /// Queue a response.
    pub fn push_response(&self, response: SyncResponse) {
        self.inner.script.lock().push_back(Step::Respond(response));
    }

    /// Queue an error.
    pub fn push_error(&self, error: TransportError) {
        self.inner.script.lock().push_back(Step::Fail(error));
    }

    /// Queue a response held back until the returned gate opens.
    pub fn push_gated(&self, response: SyncResponse) -> Gate {
        self.push_gated_result(Ok(response))
    }

    /// Queue an outcome held back until the returned gate opens.
    pub fn push_gated_result(&self, outcome: Result<SyncResponse, TransportError>) -> Gate {
        let gate = Gate::default();
        self.inner.script.lock().push_back(Step::Gated(gate.clone(), outcome));
        gate
    }

    /// Steps not yet consumed.
    pub fn remaining(&self) -> usize {
        self.inner.script.lock().len()
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<SyncRequest> {
        self.inner.requests.lock().clone()
    }

    /// Number of requests received so far.
    pub fn request_count(&self) -> usize {
        self.inner.requests.lock().len()
    }

    /// Wait until at least `count` requests have arrived.
    pub async fn wait_for_requests(&self, count: usize) {
        let mut received = self.inner.received.subscribe();
        let _ = received.wait_for(|&n| n >= count).await;
    }

    async fn serve(&self, request: SyncRequest) -> Result<SyncResponse, TransportError> {
        let txn_id = request.txn_id.clone();
        let step = self.inner.script.lock().pop_front();
        self.inner.requests.lock().push(request);
        self.inner.received.send_modify(|n| *n += 1);

        let outcome = match step {
            Some(Step::Respond(response)) => Ok(response),
            Some(Step::Fail(error)) => Err(error),
            Some(Step::Gated(gate, outcome)) => {
                gate.notify.notified().await;
                outcome
            },
            None => std::future::pending().await,
        };

        outcome.map(|mut response| {
            if self.inner.echo_txn && response.txn_id.is_none() {
                response.txn_id = Some(txn_id);
            }
            response
        })
    }
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for ScriptedTransport {
    fn sync(
        &self,
        request: SyncRequest,
    ) -> impl std::future::Future<Output = Result<SyncResponse, TransportError>> + Send {
        let transport = self.clone();
        async move { transport.serve(request).await }
    }
}
