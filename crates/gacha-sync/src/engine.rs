//! Per-key history reconciliation.
//!
//! Each overlay instance appends the ids of events it produced to a local
//! buffer. The buffer is merged into the shared store in one of two ways:
//!
//! - **Hard update** (on a peer notification): read the remote history and
//!   write back the de-duplicated union, remote order first. Exact and
//!   idempotent.
//! - **Soft update** (periodic): compare only the tails. If the remote tail
//!   also appears locally, append what came after it; otherwise append the
//!   whole buffer. Cheap, but two instances flushing from the same stale tail
//!   can both append, so duplicates are possible. Hard updates fix that up.
//!
//! Both merges run in one async critical section per engine, so they never
//! interleave. Ids recorded while a merge is in flight land in an inbox and
//! are picked up by the next merge.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::store::RemoteStore;

/// Result of a soft update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoftOutcome {
    /// Nothing recorded since the last flush; the store was not touched.
    Idle,
    /// The remote tail already matches the local tail; nothing written.
    UpToDate,
    /// New ids were written.
    Appended {
        /// How many ids were appended remotely.
        count: usize,
    },
}

#[derive(Debug, Default)]
struct EngineState {
    /// Ids recorded since the last successful flush.
    local: Vec<String>,
    /// Remote history as of the last successful read or write.
    baseline: Vec<String>,
}

/// Synchronizes one history key between this instance and the store.
#[derive(Debug)]
pub struct SyncEngine {
    key: String,
    store: RemoteStore,
    state: tokio::sync::Mutex<EngineState>,
    inbox: Mutex<Vec<String>>,
}

impl SyncEngine {
    /// Create an engine for `key`. Nothing is read until
    /// [`fetch_initial`](Self::fetch_initial).
    pub fn new(store: RemoteStore, key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            store,
            state: tokio::sync::Mutex::new(EngineState::default()),
            inbox: Mutex::new(Vec::new()),
        }
    }

    /// The store key this engine owns.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Append an event id to the local buffer.
    ///
    /// Never waits on an in-flight merge.
    pub fn record(&self, id: impl Into<String>) {
        self.inbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(id.into());
    }

    /// Load the remote history, creating an empty one if the key is absent.
    ///
    /// Returns the number of ids in the remote history.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidRemoteState`] if the key holds something
    /// other than an array of ids, or [`SyncError::RemoteUnavailable`] if the
    /// store cannot be reached.
    pub async fn fetch_initial(&self) -> Result<usize, SyncError> {
        let mut state = self.state.lock().await;
        let remote = match self.store.get(&self.key).await? {
            Some(remote) => remote,
            None => {
                self.store.set(&self.key, &[]).await?;
                info!(key = %self.key, "initialized empty history");
                Vec::new()
            }
        };
        let len = remote.len();
        state.baseline = remote;
        debug!(key = %self.key, len, "loaded history");
        Ok(len)
    }

    /// Exact reconciliation: write `remote ∪ local` and clear the local buffer.
    ///
    /// Returns the number of ids that were new to the store.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidRemoteState`] for a malformed remote value
    /// and [`SyncError::RemoteUnavailable`] if the store cannot be reached.
    /// The local buffer is kept on any error.
    pub async fn hard_update(&self) -> Result<usize, SyncError> {
        let mut state = self.state.lock().await;
        self.drain_inbox(&mut state);

        let remote = self.store.get(&self.key).await?.unwrap_or_default();
        let remote_len = remote.len();

        let mut seen: HashSet<&str> = HashSet::with_capacity(remote_len);
        let mut union: Vec<String> = Vec::with_capacity(remote_len);
        for id in remote.iter().chain(state.local.iter()) {
            if seen.insert(id.as_str()) {
                union.push(id.clone());
            }
        }
        let added = union.len().saturating_sub(distinct(&remote));

        self.store.set(&self.key, &union).await?;
        info!(
            key = %self.key,
            remote = remote_len,
            local = state.local.len(),
            added,
            "hard update committed"
        );
        state.local.clear();
        state.baseline = union;
        Ok(added)
    }

    /// Incremental reconciliation by tail comparison.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidRemoteState`] for a malformed remote value
    /// and [`SyncError::RemoteUnavailable`] if the store cannot be reached.
    /// The local buffer is kept on any error.
    pub async fn soft_update(&self) -> Result<SoftOutcome, SyncError> {
        let mut state = self.state.lock().await;
        self.drain_inbox(&mut state);

        if state.local.is_empty() {
            return Ok(SoftOutcome::Idle);
        }

        let mut remote = self.store.get(&self.key).await?.unwrap_or_default();
        let remote_tail = remote.last();
        if remote_tail.is_some() && remote_tail == state.local.last() {
            debug!(key = %self.key, "remote tail matches local tail");
            return Ok(SoftOutcome::UpToDate);
        }

        let resume_after = remote_tail.and_then(|tail| state.local.iter().position(|id| id == tail));
        let suffix: Vec<String> = match resume_after {
            Some(index) => state
                .local
                .iter()
                .skip(index.saturating_add(1))
                .cloned()
                .collect(),
            None => state.local.clone(),
        };
        let count = suffix.len();
        remote.extend(suffix);

        self.store.set(&self.key, &remote).await?;
        info!(key = %self.key, appended = count, total = remote.len(), "soft update committed");
        state.local.clear();
        state.baseline = remote;
        Ok(SoftOutcome::Appended { count })
    }

    /// Remote history as of the last successful merge or fetch.
    pub async fn history(&self) -> Vec<String> {
        self.state.lock().await.baseline.clone()
    }

    /// Number of ids recorded but not yet flushed.
    pub async fn pending(&self) -> usize {
        let local = self.state.lock().await.local.len();
        let inbox = self.inbox.lock().unwrap_or_else(PoisonError::into_inner).len();
        local.saturating_add(inbox)
    }

    fn drain_inbox(&self, state: &mut EngineState) {
        let mut inbox = self.inbox.lock().unwrap_or_else(PoisonError::into_inner);
        if !inbox.is_empty() {
            state.local.append(&mut inbox);
        }
    }
}

/// Count of distinct ids in a history.
fn distinct(ids: &[String]) -> usize {
    ids.iter().map(String::as_str).collect::<HashSet<_>>().len()
}

/// Log a failed merge at the level its kind deserves.
pub(crate) fn log_merge_error(key: &str, operation: &'static str, error: &SyncError) {
    match error {
        SyncError::InvalidRemoteState { .. } => {
            tracing::error!(key, operation, error = %error, "remote history is malformed, not repairing");
        }
        _ => warn!(key, operation, error = %error, "merge failed, will retry"),
    }
}
