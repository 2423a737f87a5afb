//! Pending Request Table.
//!
//! Maps a request id to the one-shot slot its caller is waiting on. Every
//! entry is removed exactly once, by whichever of response, failure,
//! timeout or connection loss gets there first; anything that arrives later
//! finds no entry and is dropped.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::error::{Result, RpcError};
use crate::protocol::RpcResponse;

/// Receiving side of a pending entry.
pub type ResponseSlot = oneshot::Receiver<Result<RpcResponse>>;

#[derive(Debug)]
struct PendingEntry {
    connection_id: u64,
    tx: oneshot::Sender<Result<RpcResponse>>,
}

impl PendingEntry {
    fn resolve(self, outcome: Result<RpcResponse>) {
        // The caller may have dropped its handle; nothing to deliver then.
        let _ = self.tx.send(outcome);
    }
}

/// Concurrent table of outstanding requests keyed by request id.
#[derive(Debug, Default)]
pub struct PendingRequests {
    entries: DashMap<u32, PendingEntry>,
}

impl PendingRequests {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry for `request_id`, sent on connection `connection_id`.
    ///
    /// Fails with [`RpcError::DuplicateRequest`] if the id is outstanding.
    pub fn register(&self, request_id: u32, connection_id: u64) -> Result<ResponseSlot> {
        match self.entries.entry(request_id) {
            Entry::Occupied(_) => Err(RpcError::DuplicateRequest(request_id)),
            Entry::Vacant(vacant) => {
                let (tx, rx) = oneshot::channel();
                vacant.insert(PendingEntry { connection_id, tx });
                Ok(rx)
            }
        }
    }

    /// Resolve the entry for `request_id` with a response.
    ///
    /// Returns `false` if there was no entry (late or unknown response).
    pub fn complete(&self, request_id: u32, response: RpcResponse) -> bool {
        match self.entries.remove(&request_id) {
            Some((_, entry)) => {
                entry.resolve(Ok(response));
                true
            }
            None => {
                tracing::debug!("Discarding response for unknown request {}", request_id);
                false
            }
        }
    }

    /// Resolve the entry for `request_id` with an error.
    pub fn fail(&self, request_id: u32, error: RpcError) -> bool {
        match self.entries.remove(&request_id) {
            Some((_, entry)) => {
                entry.resolve(Err(error));
                true
            }
            None => false,
        }
    }

    /// Fail every outstanding entry. Returns how many were failed.
    pub fn fail_all<F>(&self, error: F) -> usize
    where
        F: Fn() -> RpcError,
    {
        let ids: Vec<u32> = self.entries.iter().map(|e| *e.key()).collect();
        ids.into_iter()
            .filter(|id| self.fail(*id, error()))
            .count()
    }

    /// Fail the entries that were sent on `connection_id`.
    pub fn fail_connection<F>(&self, connection_id: u64, error: F) -> usize
    where
        F: Fn() -> RpcError,
    {
        let ids: Vec<u32> = self
            .entries
            .iter()
            .filter(|e| e.value().connection_id == connection_id)
            .map(|e| *e.key())
            .collect();

        let mut failed = 0;
        for id in ids {
            if let Some((_, entry)) = self
                .entries
                .remove_if(&id, |_, entry| entry.connection_id == connection_id)
            {
                entry.resolve(Err(error()));
                failed += 1;
            }
        }
        failed
    }

    /// Whether `request_id` is outstanding.
    #[inline]
    pub fn contains(&self, request_id: u32) -> bool {
        self.entries.contains_key(&request_id)
    }

    /// Number of outstanding entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_register_and_complete() {
        let pending = PendingRequests::new();
        let slot = pending.register(1, 7).unwrap();
        assert!(pending.contains(1));

        assert!(pending.complete(1, RpcResponse::success(1, json!("ok"))));
        assert!(pending.is_empty());

        let response = slot.await.unwrap().unwrap();
        assert_eq!(response.data, Some(json!("ok")));
    }

    #[test]
    fn test_duplicate_register_fails() {
        let pending = PendingRequests::new();
        let _slot = pending.register(4, 1).unwrap();
        assert!(matches!(
            pending.register(4, 2),
            Err(RpcError::DuplicateRequest(4))
        ));
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_late_response_is_discarded() {
        let pending = PendingRequests::new();
        let _slot = pending.register(9, 1).unwrap();
        assert!(pending.fail(9, RpcError::ConnectionClosed));

        assert!(!pending.complete(9, RpcResponse::success(9, json!(1))));
        assert!(!pending.fail(9, RpcError::ConnectionClosed));
    }

    #[test]
    fn test_complete_after_handle_dropped() {
        let pending = PendingRequests::new();
        drop(pending.register(2, 1).unwrap());
        assert!(pending.complete(2, RpcResponse::fail(2, "gone")));
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_fail_all() {
        let pending = PendingRequests::new();
        let slots: Vec<_> = (1..=3).map(|id| pending.register(id, id as u64).unwrap()).collect();

        assert_eq!(pending.fail_all(|| RpcError::ConnectionClosed), 3);
        assert!(pending.is_empty());

        for slot in slots {
            assert!(matches!(slot.await.unwrap(), Err(RpcError::ConnectionClosed)));
        }
    }

    #[tokio::test]
    async fn test_fail_connection_only_touches_its_entries() {
        let pending = PendingRequests::new();
        let a = pending.register(1, 100).unwrap();
        let b = pending.register(2, 200).unwrap();
        let c = pending.register(3, 100).unwrap();

        let failed = pending.fail_connection(100, || RpcError::Connection("reset".into()));
        assert_eq!(failed, 2);
        assert_eq!(pending.len(), 1);
        assert!(pending.contains(2));

        assert!(a.await.unwrap().is_err());
        assert!(c.await.unwrap().is_err());

        pending.complete(2, RpcResponse::success(2, json!(null)));
        assert!(b.await.unwrap().is_ok());
    }
}
