//! Prompt-side owner of the approval slot.
//!
//! The server mirrors the id of the request currently in the slot. When the
//! slot moves from one request straight to another, the previous one was
//! superseded and its caller is sent a `Timeout`. A slot that is vacated was
//! answered or withdrawn, so nothing is sent for it.
//!
//! Responses for the tracked request vacate the slot; every response,
//! matching or not, is relayed to its caller.

use crate::error::ApprovalError;
use crate::relay::ResponseRelay;
use crate::store::ApprovalStore;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use vaultline_types::{ApprovalRequest, ApprovalResponse, RequestId};

type TrackedId = Arc<Mutex<Option<RequestId>>>;

pub struct ApprovalServer {
    store: ApprovalStore,
    relay: ResponseRelay,
    current: TrackedId,
}

impl ApprovalServer {
    pub fn new(store: ApprovalStore, relay: ResponseRelay) -> Self {
        Self {
            store,
            relay,
            current: Arc::new(Mutex::new(None)),
        }
    }

    /// Id of the request being tracked, if any.
    pub fn current_request_id(&self) -> Option<RequestId> {
        *lock(&self.current)
    }

    /// Watch the slot.
    ///
    /// `callback` is called once with the current request, then again after
    /// every change to the slot, in commit order. Dropping the returned
    /// listener stops watching.
    pub fn listen<F>(&self, mut callback: F) -> Result<ApprovalListener, ApprovalError>
    where
        F: FnMut(Option<ApprovalRequest>) + Send + 'static,
    {
        let mut changes = self.store.subscribe()?;
        let initial = self.store.current()?;
        *lock(&self.current) = initial.as_ref().map(|r| r.id);
        callback(initial);

        let current = Arc::clone(&self.current);
        let relay = self.relay.clone();
        let task = tokio::spawn(async move {
            while let Some(change) = changes.next().await {
                let next_id = change.new.as_ref().map(|r| r.id);
                let previous = std::mem::replace(&mut *lock(&current), next_id);
                callback(change.new);

                if let (Some(previous), Some(next)) = (previous, next_id) {
                    if previous != next {
                        log::debug!("approval request {} superseded by {}", previous, next);
                        relay.deliver(&ApprovalResponse::timeout(previous));
                    }
                }
            }
        });

        Ok(ApprovalListener { task })
    }

    /// Answer a request.
    ///
    /// If `response` is for the tracked request the slot is vacated. The
    /// response is relayed either way, so a late answer for a superseded
    /// request still reaches that request's caller. When vacating fails the
    /// error is returned after relaying and the request stays tracked, so
    /// answering again retries the write.
    pub fn send_response(&self, response: ApprovalResponse) -> Result<(), ApprovalError> {
        let mut result = Ok(());
        if self.current_request_id() == Some(response.id) {
            match self.store.clear_if(response.id) {
                Ok(_) => {
                    let mut current = lock(&self.current);
                    if *current == Some(response.id) {
                        *current = None;
                    }
                }
                Err(e) => {
                    log::warn!("could not vacate approval slot for {}: {}", response.id, e);
                    result = Err(e);
                }
            }
        }
        self.relay.deliver(&response);
        result
    }
}

/// Stops the slot watcher when dropped.
pub struct ApprovalListener {
    task: JoinHandle<()>,
}

impl Drop for ApprovalListener {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn lock(current: &Mutex<Option<RequestId>>) -> std::sync::MutexGuard<'_, Option<RequestId>> {
    current.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::MessageBus;
    use crate::testing::FailingCasStorage;
    use serde_json::Value;
    use std::time::Duration;
    use tokio::sync::{broadcast, mpsc};
    use vaultline_storage::MemoryStorage;
    use vaultline_types::{ApprovalPayload, ApprovalStatus, DappInfo};

    fn request() -> ApprovalRequest {
        ApprovalRequest::new(DappInfo::new("https://dapp.example"), ApprovalPayload::Connect)
    }

    fn setup() -> (ApprovalStore, ApprovalServer, broadcast::Receiver<Value>) {
        let store = ApprovalStore::new(Arc::new(MemoryStorage::persistent()));
        let bus = MessageBus::new(16);
        let rx = bus.subscribe();
        let server = ApprovalServer::new(store.clone(), ResponseRelay::Extension(bus));
        (store, server, rx)
    }

    async fn next_response(rx: &mut broadcast::Receiver<Value>) -> ApprovalResponse {
        let message = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        ApprovalResponse::from_message(&message).unwrap()
    }

    #[tokio::test]
    async fn test_listen_delivers_initial_request() {
        let (store, server, _rx) = setup();
        let r1 = request();
        store.replace(&r1).unwrap();

        let (tx, mut seen) = mpsc::unbounded_channel();
        let _listener = server.listen(move |r| tx.send(r).unwrap()).unwrap();

        assert_eq!(seen.recv().await.unwrap().map(|r| r.id), Some(r1.id));
        assert_eq!(server.current_request_id(), Some(r1.id));
    }

    #[tokio::test]
    async fn test_supersession_times_out_previous() {
        let (store, server, mut rx) = setup();
        let (tx, mut seen) = mpsc::unbounded_channel();
        let _listener = server.listen(move |r| tx.send(r).unwrap()).unwrap();
        assert_eq!(seen.recv().await.unwrap(), None);

        let r1 = request();
        let r2 = request();
        store.replace(&r1).unwrap();
        assert_eq!(seen.recv().await.unwrap().map(|r| r.id), Some(r1.id));
        store.replace(&r2).unwrap();
        assert_eq!(seen.recv().await.unwrap().map(|r| r.id), Some(r2.id));

        let response = next_response(&mut rx).await;
        assert_eq!(response.id, r1.id);
        assert_eq!(response.status, ApprovalStatus::Timeout);
        assert_eq!(server.current_request_id(), Some(r2.id));
        assert_eq!(store.current().unwrap().map(|r| r.id), Some(r2.id));
    }

    #[tokio::test]
    async fn test_response_for_current_clears_slot() {
        let (store, server, mut rx) = setup();
        let (tx, mut seen) = mpsc::unbounded_channel();
        let _listener = server.listen(move |r| tx.send(r).unwrap()).unwrap();
        seen.recv().await.unwrap();

        let r1 = request();
        store.replace(&r1).unwrap();
        seen.recv().await.unwrap();

        server.send_response(ApprovalResponse::rejected(r1.id)).unwrap();
        let response = next_response(&mut rx).await;
        assert_eq!(response, ApprovalResponse::rejected(r1.id));
        assert_eq!(store.current().unwrap(), None);
        assert_eq!(server.current_request_id(), None);

        // Vacating the slot is not a supersession.
        assert_eq!(seen.recv().await.unwrap(), None);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_late_response_does_not_clear_newer_request() {
        let (store, server, mut rx) = setup();
        let (tx, mut seen) = mpsc::unbounded_channel();
        let _listener = server.listen(move |r| tx.send(r).unwrap()).unwrap();
        seen.recv().await.unwrap();

        let r1 = request();
        let r2 = request();
        store.replace(&r1).unwrap();
        seen.recv().await.unwrap();
        store.replace(&r2).unwrap();
        seen.recv().await.unwrap();
        assert_eq!(next_response(&mut rx).await.status, ApprovalStatus::Timeout);

        server
            .send_response(ApprovalResponse::approved(r1.id, None))
            .unwrap();
        let late = next_response(&mut rx).await;
        assert_eq!(late.id, r1.id);
        assert_eq!(late.status, ApprovalStatus::Approved);
        assert_eq!(store.current().unwrap().map(|r| r.id), Some(r2.id));
        assert_eq!(server.current_request_id(), Some(r2.id));
    }

    #[tokio::test]
    async fn test_failed_clear_still_answers_caller() {
        let storage = FailingCasStorage::new();
        let store = ApprovalStore::new(Arc::new(storage.clone()));
        let bus = MessageBus::new(16);
        let mut rx = bus.subscribe();
        let server = ApprovalServer::new(store.clone(), ResponseRelay::Extension(bus));
        let (tx, mut seen) = mpsc::unbounded_channel();
        let _listener = server.listen(move |r| tx.send(r).unwrap()).unwrap();
        seen.recv().await.unwrap();

        let r1 = request();
        store.replace(&r1).unwrap();
        seen.recv().await.unwrap();

        storage.set_failing(true);
        assert!(matches!(
            server.send_response(ApprovalResponse::approved(r1.id, None)),
            Err(ApprovalError::Storage(_))
        ));
        let response = next_response(&mut rx).await;
        assert_eq!(response, ApprovalResponse::approved(r1.id, None));
        assert_eq!(server.current_request_id(), Some(r1.id));
        assert_eq!(store.current().unwrap().map(|r| r.id), Some(r1.id));

        // Answering again retries vacating the slot.
        storage.set_failing(false);
        server
            .send_response(ApprovalResponse::approved(r1.id, None))
            .unwrap();
        assert_eq!(next_response(&mut rx).await.id, r1.id);
        assert_eq!(store.current().unwrap(), None);
        assert_eq!(server.current_request_id(), None);
    }

    #[tokio::test]
    async fn test_withdrawn_request_is_not_timed_out() {
        let (store, server, mut rx) = setup();
        let (tx, mut seen) = mpsc::unbounded_channel();
        let _listener = server.listen(move |r| tx.send(r).unwrap()).unwrap();
        seen.recv().await.unwrap();

        let r1 = request();
        store.replace(&r1).unwrap();
        seen.recv().await.unwrap();
        assert!(store.clear_if(r1.id).unwrap());
        assert_eq!(seen.recv().await.unwrap(), None);

        let r2 = request();
        store.replace(&r2).unwrap();
        assert_eq!(seen.recv().await.unwrap().map(|r| r.id), Some(r2.id));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dropped_listener_stops_tracking() {
        let (store, server, mut rx) = setup();
        let r1 = request();
        store.replace(&r1).unwrap();
        let listener = server.listen(|_| {}).unwrap();
        drop(listener);
        tokio::task::yield_now().await;

        store.replace(&request()).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(server.current_request_id(), Some(r1.id));
    }
}
