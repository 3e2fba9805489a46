//! Async transaction coordinator.
//!
//! Each repository operation acquires a [`TxHandle`]: the transaction already
//! active in the current task (inside [`TransactionCoordinator::run_in_transaction`])
//! or a fresh one it owns. [`TransactionCoordinator::finish`] commits or rolls
//! back owned handles. A joined handle that finishes with an error marks the
//! shared transaction rollback-only, so its owner never commits it.

use std::any::Any;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use graphmap_core::error::{DriverError, RepositoryError, Result};
use graphmap_core::statement::Statement;
use graphmap_core::translate::translate;
use graphmap_core::types::Row;

use crate::backend::{GraphBackend, GraphTransaction};

/// A transaction shared between handles.
struct Slot<T> {
    tx: Mutex<Option<T>>,
    rollback_only: AtomicBool,
}

impl<T> Slot<T> {
    fn new(tx: T) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
            rollback_only: AtomicBool::new(false),
        }
    }

    fn mark_rollback_only(&self) {
        self.rollback_only.store(true, Ordering::SeqCst);
    }

    fn is_rollback_only(&self) -> bool {
        self.rollback_only.load(Ordering::SeqCst)
    }
}

tokio::task_local! {
    static ACTIVE_TX: Arc<dyn Any + Send + Sync>;
}

/// One operation's view of a transaction.
pub struct TxHandle<B: GraphBackend> {
    slot: Arc<Slot<B::Tx>>,
    owned: bool,
}

impl<B: GraphBackend> TxHandle<B> {
    /// Whether this handle opened the transaction and must finish it.
    pub fn is_owned(&self) -> bool {
        self.owned
    }

    pub async fn execute(&self, statement: &Statement) -> std::result::Result<Vec<Row>, DriverError> {
        let mut slot = self.slot.tx.lock().await;
        let tx = slot
            .as_mut()
            .ok_or_else(|| DriverError::new("transaction already finished"))?;
        tx.execute(statement).await
    }
}

/// Provides, shares and finishes transactions for one backend.
pub struct TransactionCoordinator<B: GraphBackend> {
    backend: Arc<B>,
}

impl<B: GraphBackend> Clone for TransactionCoordinator<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
        }
    }
}

impl<B: GraphBackend> TransactionCoordinator<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Whether the current task is inside `run_in_transaction` for this backend.
    pub fn in_transaction(&self) -> bool {
        Self::active().is_some()
    }

    fn active() -> Option<Arc<Slot<B::Tx>>> {
        ACTIVE_TX
            .try_with(|any| any.clone().downcast::<Slot<B::Tx>>().ok())
            .ok()
            .flatten()
    }

    async fn begin(&self) -> Result<Arc<Slot<B::Tx>>> {
        let tx = self
            .backend
            .begin()
            .await
            .map_err(|e| translate("begin transaction", e))?;
        Ok(Arc::new(Slot::new(tx)))
    }

    /// Join the active transaction, or open one owned by the caller.
    pub async fn acquire(&self) -> Result<TxHandle<B>> {
        if let Some(slot) = Self::active() {
            return Ok(TxHandle { slot, owned: false });
        }
        Ok(TxHandle {
            slot: self.begin().await?,
            owned: true,
        })
    }

    /// Commit on success, roll back on failure, for owned handles only.
    ///
    /// A failed joined handle marks the transaction rollback-only; the owner
    /// then rolls back even when its own result is `Ok`. A failed commit
    /// forces a rollback before the commit error is returned.
    pub async fn finish<T>(&self, handle: TxHandle<B>, result: Result<T>) -> Result<T> {
        if !handle.owned {
            if result.is_err() {
                handle.slot.mark_rollback_only();
            }
            return result;
        }
        let Some(mut tx) = handle.slot.tx.lock().await.take() else {
            return result;
        };
        let result = match result {
            Ok(_) if handle.slot.is_rollback_only() => Err(rollback_only()),
            other => other,
        };
        match result {
            Ok(value) => match tx.commit().await {
                Ok(()) => Ok(value),
                Err(commit_err) => {
                    tracing::warn!(error = %commit_err, "Commit failed, forcing rollback");
                    if let Err(rollback_err) = tx.rollback().await {
                        tracing::warn!(error = %rollback_err, "Forced rollback failed");
                    }
                    Err(translate("commit transaction", commit_err))
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, "Rolling back transaction");
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Run `f` with one transaction shared by every repository call it makes
    /// on this task. Nested calls join the outer transaction.
    pub async fn run_in_transaction<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(slot) = Self::active() {
            let result = f().await;
            if result.is_err() {
                slot.mark_rollback_only();
            }
            return result;
        }
        let slot = self.begin().await?;
        let shared: Arc<dyn Any + Send + Sync> = slot.clone();
        let result = ACTIVE_TX.scope(shared, f()).await;
        self.finish(TxHandle { slot, owned: true }, result).await
    }
}

impl<B: GraphBackend> std::fmt::Debug for TransactionCoordinator<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionCoordinator").finish_non_exhaustive()
    }
}

fn rollback_only() -> RepositoryError {
    RepositoryError::repository(
        "commit transaction",
        "transaction is rollback-only after a failed operation",
    )
}

/// Map a driver failure on `context` into the repository taxonomy.
pub(crate) fn driver_failure(context: &str) -> impl FnOnce(DriverError) -> RepositoryError + '_ {
    move |err| translate(context, err)
}
