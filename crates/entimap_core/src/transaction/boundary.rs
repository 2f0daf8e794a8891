//! Commit boundaries.

use crate::error::CoreResult;
use crate::types::{EntityType, SessionId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Validated changes of one entity type, ready to be applied to the
/// committed store they came from.
pub trait PendingFlush: Send {
    /// Returns the entity type the changes belong to.
    fn entity_type(&self) -> EntityType;

    /// Returns the number of entity writes (deletes plus upserts).
    fn write_count(&self) -> usize;

    /// Applies the changes.
    ///
    /// Either all writes land in the store or none do.
    fn apply(self: Box<Self>) -> CoreResult<()>;
}

/// Identifies a committing session to its boundary.
///
/// Clones share one discard flag. A boundary that throws away changes a
/// session already handed over raises the flag; the session rolls back on
/// its next access.
#[derive(Debug, Clone)]
pub struct SessionTicket {
    id: SessionId,
    discarded: Arc<AtomicBool>,
}

impl SessionTicket {
    /// Creates a ticket for the session.
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            discarded: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the session ID.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Marks the session's handed-over changes as thrown away.
    pub fn discard(&self) {
        self.discarded.store(true, Ordering::Release);
    }

    /// Returns `true` if changes were thrown away since the last
    /// [`take_discarded`](Self::take_discarded).
    pub fn is_discarded(&self) -> bool {
        self.discarded.load(Ordering::Acquire)
    }

    /// Clears the flag, returning whether it was raised.
    pub fn take_discarded(&self) -> bool {
        self.discarded.swap(false, Ordering::AcqRel)
    }
}

/// Decides what happens to a session's validated changes.
///
/// A session hands every successful commit to exactly one boundary: either
/// the changes are applied right away, or they are enlisted in a
/// surrounding unit of work that applies them later.
pub trait CommitBoundary: Send + Sync {
    /// Takes ownership of the flushes of one session commit.
    fn finalize(
        &self,
        session: &SessionTicket,
        flushes: Vec<Box<dyn PendingFlush>>,
    ) -> CoreResult<()>;

    /// Returns `true` if commits are deferred to an outer transaction.
    fn is_joined(&self) -> bool {
        false
    }
}

/// Boundary of a session that manages its own commits.
///
/// Flushes are applied one entity type after the other. If one fails, the
/// types applied before it stay applied.
#[derive(Debug, Default, Clone, Copy)]
pub struct Autonomous;

impl CommitBoundary for Autonomous {
    fn finalize(
        &self,
        session: &SessionTicket,
        flushes: Vec<Box<dyn PendingFlush>>,
    ) -> CoreResult<()> {
        for flush in flushes {
            trace!(
                session = %session.id(),
                entity_type = %flush.entity_type(),
                writes = flush.write_count(),
                "applying flush"
            );
            flush.apply()?;
        }
        Ok(())
    }
}
