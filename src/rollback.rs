//! # Rollback
//!
//! This module covers the rollback ledger returned by every weave: an ordered list of undo actions.
//!
//! Ledgers can be merged, invoked directly, or entered as a [`RollbackGuard`] which undoes
//! everything when it goes out of scope.

use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use tracing::{debug, error};

use crate::error::{RollbackError, WeaveError};

/// A single undo action
pub type UndoFn = dyn Fn() -> Result<(), RollbackError>;

/// Ordered collection of undo actions.
///
/// Invoking the ledger runs every action in insertion order and stops at the first failure.
/// The ledger does not track whether it already ran: running it again replays the same actions,
/// which is harmless for attribute restores.
#[derive(Clone, Default)]
pub struct Rollback {
    /// Undo actions, in insertion order
    actions: Vec<Rc<UndoFn>>,
}
impl Rollback {
    /// Creates an empty ledger
    pub fn new() -> Self {
        Self::default()
    }
    /// Creates a ledger holding a single action
    pub fn from_action(action: impl Fn() -> Result<(), RollbackError> + 'static) -> Self {
        let mut rollback = Self::new();
        rollback.push(action);
        rollback
    }
    /// Appends an undo action
    pub fn push(&mut self, action: impl Fn() -> Result<(), RollbackError> + 'static) {
        self.actions.push(Rc::new(action));
    }
    /// Appends every action of `other`
    pub fn merge(&mut self, other: Rollback) {
        self.actions.extend(other.actions);
    }
    /// Number of undo actions
    pub fn len(&self) -> usize {
        self.actions.len()
    }
    /// Whether the ledger has nothing to undo
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Runs every undo action, in insertion order
    pub fn rollback(&self) -> Result<(), RollbackError> {
        debug!(actions = self.actions.len(), "rolling back");
        for action in &self.actions {
            action()?;
        }
        Ok(())
    }

    /// Enters the ledger as a scope, rolling back when the guard is dropped
    pub fn enter(self) -> RollbackGuard {
        RollbackGuard {
            rollback: Some(self),
        }
    }

    /// Undoes a weave that failed part way and hands back the failure
    pub(crate) fn abort(self, cause: WeaveError) -> WeaveError {
        if let Err(e) = self.rollback() {
            error!(error = %e, cause = %cause, "failed to undo a partial weave");
        }
        cause
    }
}
impl fmt::Debug for Rollback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rollback")
            .field("actions", &self.actions.len())
            .finish()
    }
}
impl FromIterator<Rollback> for Rollback {
    fn from_iter<I: IntoIterator<Item = Rollback>>(iter: I) -> Self {
        let mut rollback = Self::new();
        rollback.extend(iter);
        rollback
    }
}
impl Extend<Rollback> for Rollback {
    fn extend<I: IntoIterator<Item = Rollback>>(&mut self, iter: I) {
        for other in iter {
            self.merge(other);
        }
    }
}

/// Scope guard for a [`Rollback`].
///
/// Dropping the guard runs the ledger; failures can only be logged from there, so use
/// [`RollbackGuard::exit`] to observe them.
pub struct RollbackGuard {
    /// The ledger. `Option` so that [`RollbackGuard::exit`] can take it out before [`Drop::drop`]
    rollback: Option<Rollback>,
}
impl RollbackGuard {
    /// Leaves the scope, rolling back and reporting failures
    pub fn exit(mut self) -> Result<(), RollbackError> {
        match self.rollback.take() {
            Some(rollback) => rollback.rollback(),
            None => Ok(()),
        }
    }
}
impl Deref for RollbackGuard {
    type Target = [Rc<UndoFn>];

    fn deref(&self) -> &Self::Target {
        match &self.rollback {
            Some(rollback) => &rollback.actions,
            None => &[],
        }
    }
}
impl Drop for RollbackGuard {
    fn drop(&mut self) {
        if let Some(rollback) = self.rollback.take() {
            if let Err(e) = rollback.rollback() {
                error!(error = %e, "rollback failed while leaving scope");
            }
        }
    }
}
