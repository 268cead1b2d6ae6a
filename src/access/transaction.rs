use tracing::{debug, error, info, warn};

use crate::observe::{AccessObserver, NOOP};
use crate::source::Connection;
use crate::types::{AccessError, Result};

/// The state of a transaction.
///
/// Transactions start `Active` and end in exactly one terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    /// Transaction is open and accepting statements.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been rolled back.
    RolledBack,
}

/// An open transaction on a borrowed connection.
///
/// Call [`commit`](Self::commit) or [`rollback`](Self::rollback) to finish
/// it. A transaction dropped while still active is rolled back, which covers
/// early returns through `?` and panics.
#[derive(Debug)]
pub struct Transaction<'c, C: Connection> {
    conn: &'c mut C,
    state: TxState,
}

impl<'c, C: Connection> Transaction<'c, C> {
    /// Begins a transaction on `conn`.
    pub fn begin(conn: &'c mut C) -> Result<Self> {
        conn.begin()?;
        debug!("transaction started");
        Ok(Self {
            conn,
            state: TxState::Active,
        })
    }

    /// Returns the current state.
    pub fn state(&self) -> TxState {
        self.state
    }

    /// Connection the transaction runs on.
    pub fn connection(&mut self) -> &mut C {
        &mut *self.conn
    }

    /// Commits the transaction.
    ///
    /// If the commit itself fails, a rollback is attempted and the commit
    /// error is returned.
    pub fn commit(mut self) -> Result<()> {
        match self.conn.commit() {
            Ok(()) => {
                self.state = TxState::Committed;
                info!("transaction committed");
                Ok(())
            }
            Err(err) => {
                self.abort(&err);
                Err(err)
            }
        }
    }

    /// Rolls the transaction back and reports rollback failures.
    pub fn rollback(mut self) -> Result<()> {
        self.state = TxState::RolledBack;
        self.conn.rollback()?;
        info!("transaction rolled back");
        Ok(())
    }

    fn abort(&mut self, cause: &AccessError) {
        self.state = TxState::RolledBack;
        match self.conn.rollback() {
            Ok(()) => info!(error = %cause, "transaction rolled back due to error"),
            Err(rollback_err) => error!(
                error = %rollback_err,
                cause = %cause,
                "rollback failed; surfacing original error"
            ),
        }
    }
}

impl<C: Connection> Drop for Transaction<'_, C> {
    fn drop(&mut self) {
        if self.state != TxState::Active {
            return;
        }
        self.state = TxState::RolledBack;
        match self.conn.rollback() {
            Ok(()) => warn!("active transaction dropped; rolled back"),
            Err(err) => error!(error = %err, "rollback of dropped transaction failed"),
        }
    }
}

/// Runs `op` inside a transaction on `conn`.
///
/// Commits when `op` returns `Ok`. When `op` fails, rolls back and returns
/// the original error unchanged; a failing rollback is logged and never
/// replaces that error.
pub fn with_transaction<C, T, F>(conn: &mut C, op: F) -> Result<T>
where
    C: Connection,
    F: FnOnce(&mut C) -> Result<T>,
{
    with_transaction_observed(conn, &NOOP, op)
}

/// [`with_transaction`] reporting the final state to `observer`.
pub fn with_transaction_observed<C, T, F>(
    conn: &mut C,
    observer: &dyn AccessObserver,
    op: F,
) -> Result<T>
where
    C: Connection,
    F: FnOnce(&mut C) -> Result<T>,
{
    let mut tx = Transaction::begin(conn)?;
    match op(tx.connection()) {
        Ok(value) => {
            let committed = tx.commit();
            observer.transaction_finished(if committed.is_ok() {
                TxState::Committed
            } else {
                TxState::RolledBack
            });
            committed.map(|()| value)
        }
        Err(err) => {
            tx.abort(&err);
            drop(tx);
            observer.transaction_finished(TxState::RolledBack);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::DataSource;
    use crate::testkit::{FakeSource, ObservedEvent, RecordingObserver};
    use crate::types::{Query, Value};

    #[test]
    fn commits_on_success() -> Result<()> {
        let source = FakeSource::with_ages(&[]);
        let mut conn = source.connect()?;
        let observer = RecordingObserver::new();
        let affected = with_transaction_observed(&mut conn, &observer, |conn| {
            conn.execute(&Query::with_params(
                "UPDATE users SET email = ? WHERE id = ?",
                [Value::from("a@b.c"), Value::Integer(1)],
            ))
        })?;
        assert_eq!(affected, 1);
        let stats = source.stats();
        assert_eq!((stats.begins, stats.commits, stats.rollbacks), (1, 1, 0));
        assert_eq!(
            observer.events(),
            vec![ObservedEvent::TransactionFinished(TxState::Committed)]
        );
        Ok(())
    }

    #[test]
    fn rolls_back_and_reraises_unchanged() -> Result<()> {
        let source = FakeSource::with_ages(&[]);
        let mut conn = source.connect()?;
        let observer = RecordingObserver::new();
        let original = AccessError::Fatal("UNIQUE constraint failed".into());
        let err = with_transaction_observed(&mut conn, &observer, |_| -> Result<()> {
            Err(original.clone())
        })
        .expect_err("operation fails");
        assert_eq!(err, original);
        let stats = source.stats();
        assert_eq!((stats.commits, stats.rollbacks), (0, 1));
        assert_eq!(
            observer.events(),
            vec![ObservedEvent::TransactionFinished(TxState::RolledBack)]
        );
        Ok(())
    }

    #[test]
    fn rollback_failure_does_not_mask_original_error() -> Result<()> {
        let source = FakeSource::with_ages(&[]);
        source.fail_rollback(AccessError::Connection("link lost".into()));
        let mut conn = source.connect()?;
        let err = with_transaction(&mut conn, |_| -> Result<()> {
            Err(AccessError::Transient("lock timeout".into()))
        })
        .expect_err("operation fails");
        assert_eq!(err, AccessError::Transient("lock timeout".into()));
        assert_eq!(source.stats().rollbacks, 1);
        Ok(())
    }

    #[test]
    fn failed_commit_rolls_back_and_surfaces_commit_error() -> Result<()> {
        let source = FakeSource::with_ages(&[]);
        source.fail_commit(AccessError::Transient("database is locked".into()));
        let mut conn = source.connect()?;
        let err = with_transaction(&mut conn, |_| Ok(())).expect_err("commit fails");
        assert_eq!(err, AccessError::Transient("database is locked".into()));
        assert_eq!(source.stats().rollbacks, 1);
        Ok(())
    }

    #[test]
    fn dropped_transaction_rolls_back_once() -> Result<()> {
        let source = FakeSource::with_ages(&[]);
        let mut conn = source.connect()?;
        {
            let tx = Transaction::begin(&mut conn)?;
            assert_eq!(tx.state(), TxState::Active);
        }
        let tx = Transaction::begin(&mut conn)?;
        tx.commit()?;
        let stats = source.stats();
        assert_eq!((stats.begins, stats.commits, stats.rollbacks), (2, 1, 1));
        Ok(())
    }
}
