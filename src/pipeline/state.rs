//! Observable pipeline state with run supersession
//!
//! The holder is single-writer, multi-reader: the active run publishes,
//! everyone else watches. Every write carries the token of the run that
//! produced it; a write from a superseded run compares against the active
//! token and is discarded, so a late result from an old run can never
//! clobber a newer run's state.

use std::sync::Mutex;
use tokio::sync::watch;
use uuid::Uuid;

use crate::models::{EpgList, PipelineState};

/// Identifies one pipeline run for compare-and-discard on writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunToken(Uuid);

pub struct StateHolder {
    tx: watch::Sender<PipelineState>,
    active_run: Mutex<Option<RunToken>>,
}

impl StateHolder {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(PipelineState::Idle);
        Self {
            tx,
            active_run: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> PipelineState {
        self.tx.borrow().clone()
    }

    /// Start a new run, superseding whichever run was active before. The
    /// old run's future writes will no longer match and get discarded.
    pub fn begin_run(&self) -> RunToken {
        let token = RunToken(Uuid::new_v4());
        *self.lock_active() = Some(token);
        token
    }

    /// Publish a state value on behalf of `run`. Returns `false`, leaving
    /// the state untouched, when `run` has been superseded.
    pub fn publish(&self, run: RunToken, state: PipelineState) -> bool {
        // Holding the lock across the send keeps writes totally ordered.
        let guard = self.lock_active();
        if *guard != Some(run) {
            return false;
        }
        self.tx.send_replace(state);
        true
    }

    /// Replace only the EPG field of a `Ready` state on behalf of `run`.
    /// Returns `false` when the run was superseded or the state is no
    /// longer `Ready`.
    pub fn update_epg(&self, run: RunToken, epg: EpgList) -> bool {
        let guard = self.lock_active();
        if *guard != Some(run) {
            return false;
        }
        self.tx.send_if_modified(|state| match state {
            PipelineState::Ready { epg: slot, .. } => {
                *slot = epg;
                true
            }
            _ => false,
        })
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<RunToken>> {
        match self.active_run.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for StateHolder {
    fn default() -> Self {
        Self::new()
    }
}
