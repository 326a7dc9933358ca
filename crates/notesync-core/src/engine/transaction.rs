//! Optimistic view updates with snapshot rollback.

use tokio::sync::watch;

use crate::models::{NoteViewState, ViewError, ViewSummary};
use crate::Error;

/// How a mutating engine operation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    /// Effects succeeded; the view state as finalized.
    Committed(NoteViewState),
    /// An effect failed; the view was restored to `snapshot` with `error` attached.
    RolledBack {
        snapshot: NoteViewState,
        error: ViewError,
    },
}

impl OperationOutcome {
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }

    #[must_use]
    pub const fn error(&self) -> Option<&ViewError> {
        match self {
            Self::Committed(_) => None,
            Self::RolledBack { error, .. } => Some(error),
        }
    }
}

/// Snapshot taken before an operation mutates the published view.
pub(crate) struct ViewTransaction<'a> {
    state: &'a watch::Sender<NoteViewState>,
    snapshot: NoteViewState,
    operation: &'static str,
}

impl<'a> ViewTransaction<'a> {
    pub fn begin(state: &'a watch::Sender<NoteViewState>, operation: &'static str) -> Self {
        let snapshot = state.borrow().clone();
        Self {
            state,
            snapshot,
            operation,
        }
    }

    pub const fn operation(&self) -> &'static str {
        self.operation
    }

    pub const fn snapshot(&self) -> &NoteViewState {
        &self.snapshot
    }

    /// Publish an optimistic change.
    pub fn apply(&self, change: impl FnOnce(&mut NoteViewState)) {
        self.state.send_modify(change);
    }

    /// Finalize the optimistic state and publish it.
    pub fn commit(self, finalize: impl FnOnce(&mut NoteViewState)) -> OperationOutcome {
        self.state.send_modify(|state| {
            finalize(state);
            state.is_loading = false;
        });
        let committed = self.state.borrow().clone();
        tracing::debug!("{} committed: {:?}", self.operation, ViewSummary::from(&committed));
        OperationOutcome::Committed(committed)
    }

    /// Restore the snapshot, attaching `error` to the published state.
    pub fn rollback(self, error: &Error) -> OperationOutcome {
        let error = ViewError::from(error);
        let mut restored = self.snapshot.clone();
        restored.exception = Some(error.clone());
        self.state.send_replace(restored);
        tracing::debug!("{} rolled back: {}", self.operation, error.message);
        OperationOutcome::RolledBack {
            snapshot: self.snapshot,
            error,
        }
    }
}
