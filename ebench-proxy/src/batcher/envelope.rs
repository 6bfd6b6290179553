//! Batch envelopes and the partial-failure policy.
//!
//! ```text
//!   Open ──seal()──▶ Flushing ──resolve()──▶ Resolved | Failed
//! ```
//!
//! An [`BatchEnvelope`] is only mutated while open. Sealing splits it into
//! the store requests (handed to exactly one flush) and the
//! [`PendingResults`] that receive the positionally aligned outcomes.

use std::fmt;
use std::time::{Duration, Instant};

use ebench_core::{OperationError, OperationResult};
use tokio::sync::oneshot;

use crate::store::{ItemResult, StoreRequest};

/// Lifecycle of an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeState {
    Open,
    Flushing,
    Resolved,
    Failed,
}

impl fmt::Display for EnvelopeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvelopeState::Open => write!(f, "Open"),
            EnvelopeState::Flushing => write!(f, "Flushing"),
            EnvelopeState::Resolved => write!(f, "Resolved"),
            EnvelopeState::Failed => write!(f, "Failed"),
        }
    }
}

/// Accumulator of pending operations, owned by the coordinator
pub struct BatchEnvelope {
    id: u64,
    capacity: usize,
    opened_at: Instant,
    requests: Vec<StoreRequest>,
    waiters: Vec<oneshot::Sender<OperationResult>>,
}

impl BatchEnvelope {
    pub fn new(id: u64, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            id,
            capacity,
            opened_at: Instant::now(),
            requests: Vec::with_capacity(capacity),
            waiters: Vec::with_capacity(capacity),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.requests.len() >= self.capacity
    }

    /// Age of the oldest pending operation
    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }

    /// Append an operation; returns its position within the envelope.
    ///
    /// Callers seal a full envelope before pushing again.
    pub fn push(&mut self, request: StoreRequest, waiter: oneshot::Sender<OperationResult>) -> usize {
        debug_assert!(!self.is_full(), "push into a full envelope");
        self.requests.push(request);
        self.waiters.push(waiter);
        self.requests.len() - 1
    }

    /// Close the envelope to new operations
    pub fn seal(self) -> (Vec<StoreRequest>, PendingResults) {
        let pending = PendingResults {
            id: self.id,
            opened_at: self.opened_at,
            state: EnvelopeState::Flushing,
            waiters: self.waiters,
        };
        (self.requests, pending)
    }
}

/// Result slots of a sealed envelope
pub struct PendingResults {
    id: u64,
    opened_at: Instant,
    state: EnvelopeState,
    waiters: Vec<oneshot::Sender<OperationResult>>,
}

impl PendingResults {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    pub fn state(&self) -> EnvelopeState {
        self.state
    }

    /// Time since the first operation entered the envelope
    pub fn waited(&self) -> Duration {
        self.opened_at.elapsed()
    }

    /// Distribute the outcome of the flush to every waiter.
    ///
    /// Returns the terminal state together with the results that were sent.
    pub fn resolve(
        mut self,
        outcome: Result<Vec<ItemResult>, OperationError>,
        allow_partial: bool,
    ) -> (EnvelopeState, Vec<OperationResult>) {
        let (state, results) = apply_policy(outcome, self.waiters.len(), allow_partial);
        self.state = state;
        for (waiter, result) in self.waiters.drain(..).zip(results.iter().cloned()) {
            // Receiver gone means the caller stopped waiting; nothing to do.
            let _ = waiter.send(result);
        }
        (state, results)
    }
}

/// Map a flush outcome to per-item results.
///
/// - A batch-level error fails every item with that error.
/// - With `allow_partial`, each item stands on its own.
/// - Without it, the first rejected item fails the whole envelope and its
///   cause is reported for every item. Items the store applied stay
///   applied; only the reporting is all-or-nothing.
pub fn apply_policy(
    outcome: Result<Vec<ItemResult>, OperationError>,
    expected: usize,
    allow_partial: bool,
) -> (EnvelopeState, Vec<OperationResult>) {
    let items = match outcome {
        Ok(items) if items.len() == expected => items,
        Ok(items) => {
            let cause = OperationError::unavailable(format!(
                "store returned {} results for {} operations",
                items.len(),
                expected
            ));
            return fail_all(cause, expected);
        }
        Err(cause) => return fail_all(cause, expected),
    };

    if allow_partial {
        let results = items
            .into_iter()
            .map(|item| match item {
                Ok(value) => OperationResult::ok(value),
                Err(e) => OperationResult::failed(OperationError::rejected(e.to_string())),
            })
            .collect();
        return (EnvelopeState::Resolved, results);
    }

    if let Some(Err(e)) = items.iter().find(|item| item.is_err()) {
        return fail_all(OperationError::rejected(e.to_string()), expected);
    }

    let results = items
        .into_iter()
        .map(|item| OperationResult::ok(item.ok().flatten()))
        .collect();
    (EnvelopeState::Resolved, results)
}

fn fail_all(cause: OperationError, count: usize) -> (EnvelopeState, Vec<OperationResult>) {
    (EnvelopeState::Failed, vec![OperationResult::failed(cause); count])
}
