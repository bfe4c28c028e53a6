//! Request correlation: id allocation, pending map, timeouts.
//!
//! Each outstanding request owns a oneshot channel stored in the pending
//! map. The reader task resolves it by id; a deadline or a dropped sender
//! rejects it. Entries are removed before their channel fires, so a request
//! can never resolve twice, and a late response for an already-failed id
//! finds no entry and is dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, oneshot};

use crate::error::LspError;

pub(crate) struct RequestTracker {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<serde_json::Value>>>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate a fresh id and register a pending slot for it.
    ///
    /// Ids are strictly increasing and never reused for the tracker's
    /// lifetime.
    pub async fn register(&self) -> (u64, oneshot::Receiver<serde_json::Value>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);
        (id, rx)
    }

    /// Route a response frame to its pending slot.
    ///
    /// Unknown ids (already timed out, or never issued) are dropped — a
    /// defensive no-op, never a panic.
    pub async fn resolve(&self, id: u64, frame: serde_json::Value) {
        let sender = self.pending.lock().await.remove(&id);
        match sender {
            Some(tx) => {
                let _ = tx.send(frame);
            }
            None => {
                tracing::debug!("dropping response for unknown request id {id}");
            }
        }
    }

    /// Remove a pending slot without firing it. Returns whether it existed.
    pub async fn remove(&self, id: u64) -> bool {
        self.pending.lock().await.remove(&id).is_some()
    }

    /// Reject every outstanding request by dropping its sender.
    ///
    /// Callers blocked in [`wait`](Self::wait) observe `SessionClosed`
    /// immediately instead of running out their deadline.
    pub async fn fail_all(&self) {
        self.pending.lock().await.clear();
    }

    /// Await the response for `id`, enforcing the deadline.
    ///
    /// On success returns the frame's `result`; a frame carrying an `error`
    /// object becomes [`LspError::Rpc`]. Timeout and channel teardown both
    /// clean up the pending entry.
    pub async fn wait(
        &self,
        id: u64,
        rx: oneshot::Receiver<serde_json::Value>,
        deadline: Duration,
    ) -> Result<serde_json::Value, LspError> {
        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(frame)) => {
                if let Some(err) = frame.get("error") {
                    let code = err.get("code").and_then(serde_json::Value::as_i64).unwrap_or(0);
                    let message = err
                        .get("message")
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or("unknown error")
                        .to_string();
                    Err(LspError::Rpc { code, message })
                } else {
                    Ok(frame.get("result").cloned().unwrap_or(serde_json::Value::Null))
                }
            }
            Ok(Err(_)) => {
                // Sender dropped: session died or fail_all() ran.
                self.remove(id).await;
                Err(LspError::SessionClosed)
            }
            Err(_) => {
                self.remove(id).await;
                Err(LspError::Timeout(deadline))
            }
        }
    }

    #[cfg(test)]
    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ids_are_strictly_increasing_and_unique() {
        let tracker = RequestTracker::new();
        let mut seen = Vec::new();
        for _ in 0..100 {
            let (id, _rx) = tracker.register().await;
            seen.push(id);
        }
        for pair in seen.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[tokio::test]
    async fn test_resolve_fires_and_removes_entry() {
        let tracker = RequestTracker::new();
        let (id, rx) = tracker.register().await;
        assert_eq!(tracker.pending_len().await, 1);

        tracker
            .resolve(id, serde_json::json!({"id": id, "result": {"ok": true}}))
            .await;
        assert_eq!(tracker.pending_len().await, 0);

        let frame = rx.await.unwrap();
        assert_eq!(frame["result"]["ok"], true);
    }

    #[tokio::test]
    async fn test_resolve_unknown_id_is_noop() {
        let tracker = RequestTracker::new();
        tracker.resolve(999, serde_json::json!({"result": {}})).await;
        assert_eq!(tracker.pending_len().await, 0);
    }

    #[tokio::test]
    async fn test_timeout_rejects_once_and_cleans_up() {
        let tracker = RequestTracker::new();
        let (id, rx) = tracker.register().await;

        let result = tracker.wait(id, rx, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(LspError::Timeout(_))));
        assert_eq!(tracker.pending_len().await, 0, "no residual pending entry");

        // A late response for the timed-out id finds no entry.
        tracker.resolve(id, serde_json::json!({"result": {}})).await;
        assert_eq!(tracker.pending_len().await, 0);
    }

    #[tokio::test]
    async fn test_wait_returns_result_field() {
        let tracker = RequestTracker::new();
        let (id, rx) = tracker.register().await;
        tracker
            .resolve(id, serde_json::json!({"id": id, "result": [1, 2, 3]}))
            .await;

        let result = tracker.wait(id, rx, Duration::from_secs(1)).await.unwrap();
        assert_eq!(result, serde_json::json!([1, 2, 3]));
    }

    #[tokio::test]
    async fn test_wait_maps_error_object_to_rpc_error() {
        let tracker = RequestTracker::new();
        let (id, rx) = tracker.register().await;
        tracker
            .resolve(
                id,
                serde_json::json!({
                    "id": id,
                    "error": { "code": -32600, "message": "invalid request" }
                }),
            )
            .await;

        match tracker.wait(id, rx, Duration::from_secs(1)).await {
            Err(LspError::Rpc { code, message }) => {
                assert_eq!(code, -32600);
                assert_eq!(message, "invalid request");
            }
            other => panic!("expected Rpc error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fail_all_rejects_outstanding_requests() {
        let tracker = RequestTracker::new();
        let (id1, rx1) = tracker.register().await;
        let (_id2, _rx2) = tracker.register().await;
        assert_eq!(tracker.pending_len().await, 2);

        tracker.fail_all().await;
        assert_eq!(tracker.pending_len().await, 0);

        // Rejection is immediate, not a deadline expiry.
        let result = tracker.wait(id1, rx1, Duration::from_secs(60)).await;
        assert!(matches!(result, Err(LspError::SessionClosed)));
    }

    #[tokio::test]
    async fn test_concurrent_requests_hold_distinct_ids() {
        let tracker = RequestTracker::new();
        let (id1, rx1) = tracker.register().await;
        let (id2, rx2) = tracker.register().await;
        assert_ne!(id1, id2);

        // Responses arrive out of order; each lands on its own slot.
        tracker
            .resolve(id2, serde_json::json!({"id": id2, "result": "second"}))
            .await;
        tracker
            .resolve(id1, serde_json::json!({"id": id1, "result": "first"}))
            .await;

        assert_eq!(
            tracker.wait(id1, rx1, Duration::from_secs(1)).await.unwrap(),
            serde_json::json!("first")
        );
        assert_eq!(
            tracker.wait(id2, rx2, Duration::from_secs(1)).await.unwrap(),
            serde_json::json!("second")
        );
    }
}
