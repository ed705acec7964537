//! Long-running query tracking.
//!
//! Operations like "list the reachable groups" collect replies over a window
//! rather than blocking. Each state machine owns a single outstanding slot
//! with an explicit deadline; a second concurrent query is an error, and
//! there is no cancellation primitive.

use std::time::Duration;
use thiserror::Error;

/// Opaque identifier for tracking application queries through the system.
///
/// The runner maps `RequestId` -> response channel, keeping async response
/// handling out of the synchronous state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Error starting a query.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    /// Only one query may be outstanding at a time.
    #[error("a query is already pending")]
    AlreadyPending,
}

/// A single-outstanding query slot that collects replies until a deadline.
#[derive(Debug)]
pub struct QuerySlot<T> {
    pending: Option<PendingQuery<T>>,
}

#[derive(Debug)]
struct PendingQuery<T> {
    id: RequestId,
    deadline: Duration,
    collected: Vec<T>,
}

impl<T> Default for QuerySlot<T> {
    fn default() -> Self {
        Self { pending: None }
    }
}

impl<T> QuerySlot<T> {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a query that collects replies until `deadline`.
    pub fn begin(&mut self, id: RequestId, deadline: Duration) -> Result<(), QueryError> {
        if self.pending.is_some() {
            return Err(QueryError::AlreadyPending);
        }
        self.pending = Some(PendingQuery {
            id,
            deadline,
            collected: Vec::new(),
        });
        Ok(())
    }

    /// Whether a query is outstanding.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Record a reply. Returns false (and drops the reply) when no query is
    /// outstanding.
    pub fn collect(&mut self, item: T) -> bool {
        match &mut self.pending {
            Some(q) => {
                q.collected.push(item);
                true
            }
            None => false,
        }
    }

    /// Close the slot if its deadline has passed, yielding the query id and
    /// everything collected.
    pub fn take_expired(&mut self, now: Duration) -> Option<(RequestId, Vec<T>)> {
        if self.pending.as_ref()?.deadline > now {
            return None;
        }
        let q = self.pending.take()?;
        Some((q.id, q.collected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_query_is_an_error() {
        let mut slot: QuerySlot<u32> = QuerySlot::new();
        slot.begin(RequestId(1), Duration::from_secs(1)).unwrap();
        assert_eq!(
            slot.begin(RequestId(2), Duration::from_secs(2)),
            Err(QueryError::AlreadyPending)
        );
    }

    #[test]
    fn collects_until_deadline() {
        let mut slot: QuerySlot<u32> = QuerySlot::new();
        slot.begin(RequestId(1), Duration::from_millis(500)).unwrap();
        assert!(slot.collect(10));
        assert!(slot.collect(20));

        assert!(slot.take_expired(Duration::from_millis(499)).is_none());
        let (id, items) = slot.take_expired(Duration::from_millis(500)).unwrap();
        assert_eq!(id, RequestId(1));
        assert_eq!(items, vec![10, 20]);

        // Slot is free again.
        assert!(!slot.is_pending());
        assert!(!slot.collect(30));
    }
}
