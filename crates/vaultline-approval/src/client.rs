//! Prompt-side view of the approval slot.

use crate::error::ApprovalError;
use crate::server::{ApprovalListener, ApprovalServer};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use vaultline_types::{ApprovalRequest, ApprovalResponse, RequestId};

/// Decisions remembered for duplicate detection.
const DECIDED_HISTORY: usize = 64;

/// What the prompt UI talks to.
///
/// Tracks the current request reactively and lets the user decide each
/// request exactly once. Only the most recent decisions are remembered; a
/// request that has dropped out of that history is long gone from the slot.
pub struct ApprovalClient {
    server: Arc<ApprovalServer>,
    current: watch::Receiver<Option<ApprovalRequest>>,
    decided: Mutex<VecDeque<RequestId>>,
    _listener: ApprovalListener,
}

impl ApprovalClient {
    /// Start listening to `server`.
    pub fn connect(server: Arc<ApprovalServer>) -> Result<Self, ApprovalError> {
        let (tx, current) = watch::channel(None);
        let listener = server.listen(move |request| {
            tx.send_replace(request);
        })?;
        Ok(Self {
            server,
            current,
            decided: Mutex::new(VecDeque::with_capacity(DECIDED_HISTORY)),
            _listener: listener,
        })
    }

    /// The request currently in the slot.
    pub fn current(&self) -> Option<ApprovalRequest> {
        self.current.borrow().clone()
    }

    /// Wait until the slot holds a request this client has not decided yet.
    pub async fn next_request(&self) -> Result<ApprovalRequest, ApprovalError> {
        let mut current = self.current.clone();
        let request = current
            .wait_for(|request| {
                request
                    .as_ref()
                    .is_some_and(|r| !self.is_decided(r.id))
            })
            .await
            .map_err(|_| ApprovalError::ChannelClosed)?;
        request.clone().ok_or(ApprovalError::NoPendingRequest)
    }

    /// Approve request `id`, passing `args` back to the caller.
    pub fn approve(&self, id: RequestId, args: Option<Value>) -> Result<(), ApprovalError> {
        self.decide(ApprovalResponse::approved(id, args))
    }

    pub fn reject(&self, id: RequestId) -> Result<(), ApprovalError> {
        self.decide(ApprovalResponse::rejected(id))
    }

    fn decided(&self) -> MutexGuard<'_, VecDeque<RequestId>> {
        self.decided.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_decided(&self, id: RequestId) -> bool {
        self.decided().contains(&id)
    }

    /// Send `response` once per request.
    ///
    /// If the server could not vacate the slot the decision is forgotten
    /// again, so the user can answer once more and retry the write.
    fn decide(&self, response: ApprovalResponse) -> Result<(), ApprovalError> {
        let id = response.id;
        {
            let mut decided = self.decided();
            if decided.contains(&id) {
                return Err(ApprovalError::AlreadyDecided(id));
            }
            if decided.len() == DECIDED_HISTORY {
                decided.pop_front();
            }
            decided.push_back(id);
        }
        log::debug!("request {} decided: {:?}", id, response.status);

        let sent = self.server.send_response(response);
        if sent.is_err() {
            self.decided().retain(|decided| *decided != id);
        }
        sent
    }
}
