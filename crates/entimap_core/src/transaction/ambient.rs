//! Ambient transactions.

use crate::error::CoreResult;
use crate::transaction::boundary::{CommitBoundary, PendingFlush, SessionTicket};
use crate::types::SessionId;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Flushes enlisted by one session commit.
struct Enlistment {
    session: SessionTicket,
    flushes: Vec<Box<dyn PendingFlush>>,
}

#[derive(Default)]
struct AmbientState {
    /// Enlisted commits, in the order they happened.
    enlisted: Vec<Enlistment>,
    /// Number of completed outer commits.
    commits: u64,
}

impl Drop for AmbientState {
    fn drop(&mut self) {
        if !self.enlisted.is_empty() {
            for enlistment in &self.enlisted {
                enlistment.session.discard();
            }
            warn!(
                participants = self.enlisted.len(),
                "ambient transaction dropped with uncommitted session changes"
            );
        }
    }
}

/// A unit of work owned by the surrounding execution context.
///
/// Sessions of repositories opened with `join_transaction` do not apply
/// their commits themselves. Each session commit is validated and then
/// enlisted here; [`commit`](Self::commit) applies everything enlisted so
/// far in enlistment order, [`abort`](Self::abort) throws it away.
///
/// Sessions whose enlisted changes are thrown away, by `abort` or by a
/// failed `commit`, roll back on their next access so that they never show
/// entities the repository does not have.
///
/// Cloning yields another handle to the same transaction, so several
/// repositories can join one outer unit of work.
///
/// # Example
///
/// ```rust,ignore
/// let txn = AmbientTransaction::new();
/// let notes = Repository::open_in(RepositoryConfig::new(), txn.clone());
///
/// let mut session = notes.session();
/// session.insert(note)?;
/// session.commit()?; // validated and enlisted
///
/// txn.commit()?;     // applied to the repository
/// ```
#[derive(Clone, Default)]
pub struct AmbientTransaction {
    inner: Arc<Mutex<AmbientState>>,
}

impl AmbientTransaction {
    /// Creates a new, empty transaction.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the sessions that enlisted changes, in enlistment order.
    #[must_use]
    pub fn participants(&self) -> Vec<SessionId> {
        let state = self.inner.lock();
        let mut sessions: Vec<SessionId> = Vec::with_capacity(state.enlisted.len());
        for enlistment in &state.enlisted {
            let id = enlistment.session.id();
            if !sessions.contains(&id) {
                sessions.push(id);
            }
        }
        sessions
    }

    /// Returns the number of enlisted flushes.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner
            .lock()
            .enlisted
            .iter()
            .map(|e| e.flushes.len())
            .sum()
    }

    /// Returns `true` if nothing is waiting to be applied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending_count() == 0
    }

    /// Returns the number of completed commits.
    #[must_use]
    pub fn commit_count(&self) -> u64 {
        self.inner.lock().commits
    }

    /// Applies every enlisted flush.
    ///
    /// Flushes are applied in enlistment order. The first failure stops the
    /// commit: flushes applied before it stay applied, the rest are
    /// discarded, and the sessions that enlisted the failed and discarded
    /// flushes roll back. Returns the number of flushes applied.
    ///
    /// The transaction can be reused afterwards.
    pub fn commit(&self) -> CoreResult<usize> {
        let enlisted = std::mem::take(&mut self.inner.lock().enlisted);
        let mut applied = 0;
        let mut pending = enlisted.into_iter();
        while let Some(Enlistment { session, flushes }) = pending.next() {
            for flush in flushes {
                debug!(
                    session = %session.id(),
                    entity_type = %flush.entity_type(),
                    writes = flush.write_count(),
                    "applying enlisted flush"
                );
                if let Err(e) = flush.apply() {
                    session.discard();
                    let skipped: usize = pending
                        .by_ref()
                        .map(|rest| {
                            rest.session.discard();
                            rest.flushes.len()
                        })
                        .sum();
                    warn!(session = %session.id(), error = %e, skipped, "ambient commit failed");
                    return Err(e);
                }
                applied += 1;
            }
        }
        self.inner.lock().commits += 1;
        Ok(applied)
    }

    /// Discards every enlisted flush and rolls back the sessions that
    /// enlisted them. Returns how many flushes were discarded.
    pub fn abort(&self) -> usize {
        let enlisted = std::mem::take(&mut self.inner.lock().enlisted);
        for enlistment in &enlisted {
            enlistment.session.discard();
        }
        let discarded = enlisted.iter().map(|e| e.flushes.len()).sum();
        debug!(discarded, "ambient transaction aborted");
        discarded
    }
}

impl CommitBoundary for AmbientTransaction {
    fn finalize(
        &self,
        session: &SessionTicket,
        flushes: Vec<Box<dyn PendingFlush>>,
    ) -> CoreResult<()> {
        debug!(session = %session.id(), flushes = flushes.len(), "enlisting session commit");
        self.inner.lock().enlisted.push(Enlistment {
            session: session.clone(),
            flushes,
        });
        Ok(())
    }

    fn is_joined(&self) -> bool {
        true
    }
}

impl fmt::Debug for AmbientTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmbientTransaction")
            .field("pending", &self.pending_count())
            .field("commits", &self.commit_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::boundary::tests::recording;

    fn ticket() -> SessionTicket {
        SessionTicket::new(SessionId::new())
    }

    #[test]
    fn enlisted_flushes_wait_for_commit() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let txn = AmbientTransaction::new();
        let session = ticket();

        txn.finalize(&session, vec![recording("a", &log, false)])
            .unwrap();
        assert!(log.lock().is_empty());
        assert_eq!(txn.pending_count(), 1);
        assert_eq!(txn.participants(), vec![session.id()]);

        assert_eq!(txn.commit().unwrap(), 1);
        assert_eq!(*log.lock(), vec!["a"]);
        assert!(txn.is_empty());
        assert_eq!(txn.commit_count(), 1);
    }

    #[test]
    fn commit_spans_sessions_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let txn = AmbientTransaction::new();
        let first = ticket();
        let second = ticket();

        txn.finalize(&first, vec![recording("first", &log, false)])
            .unwrap();
        txn.finalize(&second, vec![recording("second", &log, false)])
            .unwrap();
        txn.finalize(&first, vec![recording("first-again", &log, false)])
            .unwrap();

        assert_eq!(txn.participants(), vec![first.id(), second.id()]);
        assert_eq!(txn.commit().unwrap(), 3);
        assert_eq!(*log.lock(), vec!["first", "second", "first-again"]);
    }

    #[test]
    fn abort_discards() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let txn = AmbientTransaction::new();
        let session = ticket();
        txn.finalize(&session, vec![recording("a", &log, false)])
            .unwrap();

        assert_eq!(txn.abort(), 1);
        assert!(session.is_discarded());
        assert_eq!(txn.commit().unwrap(), 0);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn failure_discards_the_rest() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let txn = AmbientTransaction::new();
        txn.finalize(
            &ticket(),
            vec![
                recording("a", &log, false),
                recording("b", &log, true),
                recording("c", &log, false),
            ],
        )
        .unwrap();

        assert!(txn.commit().is_err());
        assert_eq!(*log.lock(), vec!["a"]);
        assert!(txn.is_empty());
    }

    #[test]
    fn failure_flags_failed_and_skipped_sessions() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let txn = AmbientTransaction::new();
        let applied = ticket();
        let failed = ticket();
        let skipped = ticket();
        txn.finalize(&applied, vec![recording("a", &log, false)])
            .unwrap();
        txn.finalize(&failed, vec![recording("b", &log, true)])
            .unwrap();
        txn.finalize(&skipped, vec![recording("c", &log, false)])
            .unwrap();

        assert!(txn.commit().is_err());
        assert_eq!(*log.lock(), vec!["a"]);
        assert!(!applied.is_discarded());
        assert!(failed.is_discarded());
        assert!(skipped.is_discarded());
    }

    #[test]
    fn dropping_with_pending_changes_flags_sessions() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let session = ticket();
        {
            let txn = AmbientTransaction::new();
            txn.finalize(&session, vec![recording("a", &log, false)])
                .unwrap();
        }
        assert!(session.is_discarded());
        assert!(log.lock().is_empty());
    }

    #[test]
    fn clones_share_state() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let txn = AmbientTransaction::new();
        let other = txn.clone();
        other
            .finalize(&ticket(), vec![recording("a", &log, false)])
            .unwrap();
        assert_eq!(txn.pending_count(), 1);
        assert!(txn.is_joined());
    }
}
