//! Background-side caller of the approval protocol.
//!
//! [`ApprovalRequester::request`] places a request in the slot, brings up
//! the prompt and waits for the first terminal response carrying its id.

use crate::config::ApprovalConfig;
use crate::error::ApprovalError;
use crate::relay::MessageBus;
use crate::store::ApprovalStore;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use vaultline_types::{
    ApprovalPayload, ApprovalRequest, ApprovalResponse, ApprovalStatus, DappInfo,
};

// ── Prompt lifecycle ─────────────────────────────────────────────────────────

/// Observes whether a prompt surface is still open.
#[derive(Debug, Clone)]
pub struct PromptHandle {
    closed: watch::Receiver<bool>,
}

/// Owner side of a [`PromptHandle`]; dropping it also counts as closing.
#[derive(Debug)]
pub struct PromptCloser {
    tx: watch::Sender<bool>,
}

impl PromptCloser {
    pub fn close(&self) {
        self.tx.send_replace(true);
    }
}

impl PromptHandle {
    /// A new open prompt and the means to close it.
    pub fn open() -> (PromptCloser, PromptHandle) {
        let (tx, closed) = watch::channel(false);
        (PromptCloser { tx }, PromptHandle { closed })
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow() || self.closed.has_changed().is_err()
    }

    /// Resolves once the prompt is closed.
    pub async fn closed(&mut self) {
        // A dropped closer is an error here, which also means closed.
        let _ = self.closed.wait_for(|closed| *closed).await;
    }
}

/// Opens the prompt surface, or focuses the one already open.
pub trait PromptLauncher: Send + Sync {
    fn open(&self) -> Result<PromptHandle, ApprovalError>;
}

/// Launcher that reuses the open prompt and only calls `open` when there is
/// none.
pub struct ReusablePrompt<F> {
    open: F,
    current: Mutex<Option<PromptHandle>>,
}

impl<F> ReusablePrompt<F>
where
    F: Fn() -> Result<PromptHandle, ApprovalError> + Send + Sync,
{
    pub fn new(open: F) -> Self {
        Self {
            open,
            current: Mutex::new(None),
        }
    }
}

impl<F> PromptLauncher for ReusablePrompt<F>
where
    F: Fn() -> Result<PromptHandle, ApprovalError> + Send + Sync,
{
    fn open(&self) -> Result<PromptHandle, ApprovalError> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = current.as_ref().filter(|h| !h.is_closed()) {
            return Ok(handle.clone());
        }
        let handle = (self.open)()?;
        *current = Some(handle.clone());
        Ok(handle)
    }
}

// ── Requester ────────────────────────────────────────────────────────────────

pub struct ApprovalRequester {
    store: ApprovalStore,
    responses: MessageBus,
    launcher: Arc<dyn PromptLauncher>,
    config: ApprovalConfig,
}

impl ApprovalRequester {
    /// `responses` is the bus the prompt's relay delivers to.
    pub fn new(
        store: ApprovalStore,
        responses: MessageBus,
        launcher: Arc<dyn PromptLauncher>,
        config: ApprovalConfig,
    ) -> Self {
        Self {
            store,
            responses,
            launcher,
            config,
        }
    }

    /// Ask the user to approve `payload` and wait for the outcome.
    ///
    /// Any request already pending is superseded. Resolves with the first
    /// terminal response for this request: the user's decision, `Rejected`
    /// if the prompt closes first, or `Timeout` if the request is superseded
    /// or the configured timeout elapses.
    pub async fn request(
        &self,
        dapp: DappInfo,
        payload: ApprovalPayload,
    ) -> Result<ApprovalResponse, ApprovalError> {
        let mut responses = self.responses.subscribe();
        let request = ApprovalRequest::new(dapp, payload);
        let id = request.id;
        self.store.replace(&request)?;
        log::debug!(
            "approval request {} ({:?}) from {}",
            id,
            request.kind(),
            request.dapp_info.domain
        );

        let mut prompt = match self.launcher.open() {
            Ok(prompt) => prompt,
            Err(e) => {
                self.store.clear_if(id)?;
                return Err(e);
            }
        };

        let timeout = self.config.request_timeout;
        let deadline = async move {
            match timeout {
                Some(delay) => tokio::time::sleep(delay).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                message = responses.recv() => match message {
                    Ok(message) => {
                        if let Some(response) = ApprovalResponse::from_message(&message) {
                            if response.id == id {
                                return Ok(response);
                            }
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!("approval response bus lagged by {} messages", skipped);
                    }
                    Err(RecvError::Closed) => return Err(ApprovalError::ChannelClosed),
                },
                _ = prompt.closed() => {
                    log::debug!("prompt closed before request {} was decided", id);
                    self.store.clear_if(id)?;
                    return Ok(ApprovalResponse::rejected(id));
                }
                _ = &mut deadline => {
                    log::debug!("approval request {} timed out", id);
                    self.store.clear_if(id)?;
                    return Ok(ApprovalResponse::timeout(id));
                }
            }
        }
    }

    /// Like [`request`](Self::request), turning anything but approval into
    /// an error. Returns the approval's arguments.
    pub async fn request_approval(
        &self,
        dapp: DappInfo,
        payload: ApprovalPayload,
    ) -> Result<Option<Value>, ApprovalError> {
        let response = self.request(dapp, payload).await?;
        match response.status {
            ApprovalStatus::Approved => Ok(response.args),
            ApprovalStatus::Rejected => Err(ApprovalError::Rejected(response.id)),
            ApprovalStatus::Timeout => Err(ApprovalError::TimedOut(response.id)),
        }
    }
}
