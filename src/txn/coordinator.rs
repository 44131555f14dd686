//! In-process transaction coordinator.
//!
//! [`Transaction`] drives enlisted participants through two-phase commit.
//! [`TransactionScope`] pairs a transaction with the ambient context of the
//! current thread, the usual way callers bracket a unit of work:
//!
//! ```no_run
//! # use txfile::{FileManager, TransactionScope};
//! # fn example() -> txfile::Result<()> {
//! let files = FileManager::new();
//! let scope = TransactionScope::begin();
//!
//! files.write_text("settings.ini", "[core]\nmode = fast\n")?;
//! files.delete("settings.ini.old")?;
//!
//! scope.commit()?; // dropping the scope instead rolls both changes back
//! # Ok(())
//! # }
//! ```

use super::ambient::{self, AmbientGuard};
use super::{Participant, TransactionContext, TransactionId, Vote};
use crate::error::{Result, TxError};

use std::sync::{Arc, Mutex, MutexGuard};

/// Lifecycle of a [`Transaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Active,
    Committed,
    Aborted,
    InDoubt,
}

struct Inner {
    status: TransactionStatus,
    participants: Vec<Arc<dyn Participant>>,
}

/// A unit of work that volatile participants can enlist into.
///
/// Completion may be triggered from any thread. Participant callbacks run
/// outside the transaction's own lock.
pub struct Transaction {
    id: TransactionId,
    inner: Mutex<Inner>,
}

impl Transaction {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: TransactionId::new(),
            inner: Mutex::new(Inner {
                status: TransactionStatus::Active,
                participants: Vec::new(),
            }),
        })
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn status(&self) -> TransactionStatus {
        self.lock().status
    }

    pub fn participant_count(&self) -> usize {
        self.lock().participants.len()
    }

    /// Runs prepare on every participant, then commit.
    ///
    /// A [`Vote::ForceRollback`] rolls everyone back and yields
    /// [`TxError::Aborted`]. Commit-phase failures are logged; the outcome is
    /// already decided by then.
    pub fn commit(&self) -> Result<()> {
        let participants = self.finish(TransactionStatus::Committed)?;

        let refused = participants
            .iter()
            .any(|p| p.prepare() == Vote::ForceRollback);
        if refused {
            log::warn!("Transaction {} refused by a participant, rolling back", self.id);
            self.lock().status = TransactionStatus::Aborted;
            notify_all(&participants, |p| p.rollback())?;
            return Err(TxError::Aborted(self.id));
        }

        for participant in &participants {
            if let Err(e) = participant.commit() {
                log::warn!("Commit notification failed in {}: {}", self.id, e);
            }
        }

        log::debug!(
            "Transaction {} committed ({} participants)",
            self.id,
            participants.len()
        );
        Ok(())
    }

    /// Aborts the transaction, asking every participant to undo its work.
    pub fn rollback(&self) -> Result<()> {
        let participants = self.finish(TransactionStatus::Aborted)?;
        log::debug!(
            "Transaction {} rolling back ({} participants)",
            self.id,
            participants.len()
        );
        notify_all(&participants, |p| p.rollback())
    }

    /// Reports an unknown outcome to every participant.
    pub fn in_doubt(&self) -> Result<()> {
        let participants = self.finish(TransactionStatus::InDoubt)?;
        notify_all(&participants, |p| p.in_doubt())
    }

    fn finish(&self, status: TransactionStatus) -> Result<Vec<Arc<dyn Participant>>> {
        let mut inner = self.lock();
        if inner.status != TransactionStatus::Active {
            return Err(TxError::TransactionInactive(self.id));
        }
        inner.status = status;
        Ok(std::mem::take(&mut inner.participants))
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking participant must not wedge the coordinator.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TransactionContext for Transaction {
    fn id(&self) -> TransactionId {
        self.id
    }

    fn enlist_volatile(&self, participant: Arc<dyn Participant>) -> Result<()> {
        let mut inner = self.lock();
        if inner.status != TransactionStatus::Active {
            return Err(TxError::TransactionInactive(self.id));
        }
        inner.participants.push(participant);
        Ok(())
    }
}

/// Notifies every participant and reports all failures together. A single
/// failure is returned as is.
fn notify_all<F>(participants: &[Arc<dyn Participant>], notify: F) -> Result<()>
where
    F: Fn(&dyn Participant) -> Result<()>,
{
    let mut errors: Vec<TxError> = participants
        .iter()
        .filter_map(|p| notify(p.as_ref()).err())
        .collect();

    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => {
            let messages: Vec<String> = errors
                .into_iter()
                .map(|e| match e {
                    TxError::RollbackFailed(message) => message,
                    other => other.to_string(),
                })
                .collect();
            Err(TxError::RollbackFailed(messages.join("; ")))
        }
    }
}

/// A [`Transaction`] that is ambient on the current thread while the scope
/// lives.
///
/// Must be explicitly committed. Dropping the scope without a decision rolls
/// the transaction back.
#[must_use = "TransactionScope must be committed or rolled back"]
pub struct TransactionScope {
    transaction: Arc<Transaction>,
    guard: Option<AmbientGuard>,
}

impl TransactionScope {
    /// Starts a transaction and makes it ambient.
    pub fn begin() -> Self {
        let transaction = Transaction::new();
        let guard = ambient::enter(transaction.clone());
        Self {
            transaction,
            guard: Some(guard),
        }
    }

    pub fn transaction(&self) -> Arc<Transaction> {
        Arc::clone(&self.transaction)
    }

    pub fn id(&self) -> TransactionId {
        self.transaction.id()
    }

    pub fn commit(mut self) -> Result<()> {
        self.guard.take();
        self.transaction.commit()
    }

    pub fn rollback(mut self) -> Result<()> {
        self.guard.take();
        self.transaction.rollback()
    }
}

impl Drop for TransactionScope {
    fn drop(&mut self) {
        self.guard.take();
        if self.transaction.status() == TransactionStatus::Active {
            log::warn!(
                "Transaction {} dropped without commit, rolling back",
                self.transaction.id()
            );
            if let Err(e) = self.transaction.rollback() {
                log::error!("{}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recorder {
        vote_rollback: bool,
        fail_rollback: bool,
        prepared: AtomicUsize,
        committed: AtomicUsize,
        rolled_back: AtomicUsize,
        in_doubt: AtomicUsize,
    }

    impl Participant for Recorder {
        fn prepare(&self) -> Vote {
            self.prepared.fetch_add(1, Ordering::SeqCst);
            if self.vote_rollback {
                Vote::ForceRollback
            } else {
                Vote::Prepared
            }
        }

        fn commit(&self) -> Result<()> {
            self.committed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn rollback(&self) -> Result<()> {
            self.rolled_back.fetch_add(1, Ordering::SeqCst);
            if self.fail_rollback {
                return Err(TxError::RollbackFailed("boom".to_string()));
            }
            Ok(())
        }

        fn in_doubt(&self) -> Result<()> {
            self.in_doubt.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_commit_prepares_then_commits() {
        let txn = Transaction::new();
        let recorder = Arc::new(Recorder::default());
        txn.enlist_volatile(recorder.clone()).unwrap();

        txn.commit().unwrap();

        assert_eq!(recorder.prepared.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.committed.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.rolled_back.load(Ordering::SeqCst), 0);
        assert_eq!(txn.status(), TransactionStatus::Committed);
    }

    #[test]
    fn test_refused_vote_rolls_back_everyone() {
        let txn = Transaction::new();
        let ok = Arc::new(Recorder::default());
        let refuser = Arc::new(Recorder {
            vote_rollback: true,
            ..Default::default()
        });
        txn.enlist_volatile(ok.clone()).unwrap();
        txn.enlist_volatile(refuser.clone()).unwrap();

        let result = txn.commit();

        assert!(matches!(result, Err(TxError::Aborted(_))));
        assert_eq!(ok.rolled_back.load(Ordering::SeqCst), 1);
        assert_eq!(refuser.rolled_back.load(Ordering::SeqCst), 1);
        assert_eq!(ok.committed.load(Ordering::SeqCst), 0);
        assert_eq!(txn.status(), TransactionStatus::Aborted);
    }

    #[test]
    fn test_rollback_reports_failures_after_notifying_all() {
        let txn = Transaction::new();
        let failing = Arc::new(Recorder {
            fail_rollback: true,
            ..Default::default()
        });
        let ok = Arc::new(Recorder::default());
        txn.enlist_volatile(failing.clone()).unwrap();
        txn.enlist_volatile(ok.clone()).unwrap();

        let result = txn.rollback();

        assert!(matches!(&result, Err(TxError::RollbackFailed(msg)) if msg == "boom"));
        assert_eq!(ok.rolled_back.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_several_rollback_failures_are_joined_once() {
        let txn = Transaction::new();
        for _ in 0..2 {
            txn.enlist_volatile(Arc::new(Recorder {
                fail_rollback: true,
                ..Default::default()
            }))
            .unwrap();
        }

        let message = txn.rollback().unwrap_err().to_string();

        assert_eq!(message, "Rollback failed: boom; boom");
    }

    #[test]
    fn test_in_doubt_notifies() {
        let txn = Transaction::new();
        let recorder = Arc::new(Recorder::default());
        txn.enlist_volatile(recorder.clone()).unwrap();

        txn.in_doubt().unwrap();

        assert_eq!(recorder.in_doubt.load(Ordering::SeqCst), 1);
        assert_eq!(txn.status(), TransactionStatus::InDoubt);
    }

    #[test]
    fn test_completed_transaction_rejects_enlistment() {
        let txn = Transaction::new();
        txn.commit().unwrap();

        let result = txn.enlist_volatile(Arc::new(Recorder::default()));

        assert!(matches!(result, Err(TxError::TransactionInactive(_))));
        assert!(matches!(txn.rollback(), Err(TxError::TransactionInactive(_))));
    }

    #[test]
    fn test_dropped_scope_rolls_back() {
        let recorder = Arc::new(Recorder::default());
        let txn = {
            let scope = TransactionScope::begin();
            scope
                .transaction()
                .enlist_volatile(recorder.clone())
                .unwrap();
            scope.transaction()
        };

        assert_eq!(txn.status(), TransactionStatus::Aborted);
        assert_eq!(recorder.rolled_back.load(Ordering::SeqCst), 1);
        assert!(ambient::current().is_none());
    }

    #[test]
    fn test_outer_scope_completed_first_keeps_inner_ambient() {
        let outer = TransactionScope::begin();
        let inner = TransactionScope::begin();
        let inner_id = inner.id();

        outer.commit().unwrap();
        assert_eq!(ambient::current().unwrap().id(), inner_id);

        inner.rollback().unwrap();
        assert!(ambient::current().is_none());
    }

    #[test]
    fn test_scope_leaves_ambient_on_commit() {
        let scope = TransactionScope::begin();
        assert_eq!(ambient::current().unwrap().id(), scope.id());

        scope.commit().unwrap();

        assert!(ambient::current().is_none());
    }
}
