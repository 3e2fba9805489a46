//! Blocking transaction coordinator.
//!
//! The shared transaction of [`BlockingTransactionCoordinator::run_in_transaction`]
//! lives on the calling thread and is detached when the closure returns or
//! unwinds. A joined operation that fails marks it rollback-only.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use graphmap_core::error::{DriverError, RepositoryError, Result};
use graphmap_core::statement::Statement;
use graphmap_core::translate::translate;
use graphmap_core::types::Row;

use crate::backend::{BlockingBackend, BlockingTransaction};

struct Slot<T> {
    tx: RefCell<Option<T>>,
    rollback_only: Cell<bool>,
}

impl<T> Slot<T> {
    fn new(tx: T) -> Self {
        Self {
            tx: RefCell::new(Some(tx)),
            rollback_only: Cell::new(false),
        }
    }
}

thread_local! {
    static ACTIVE_TX: RefCell<Option<Rc<dyn Any>>> = const { RefCell::new(None) };
}

/// Clears the thread's active transaction on drop.
struct ActiveScope;

impl ActiveScope {
    fn enter(slot: Rc<dyn Any>) -> Self {
        ACTIVE_TX.with(|active| *active.borrow_mut() = Some(slot));
        ActiveScope
    }
}

impl Drop for ActiveScope {
    fn drop(&mut self) {
        ACTIVE_TX.with(|active| active.borrow_mut().take());
    }
}

/// One blocking operation's view of a transaction.
pub struct BlockingTxHandle<B: BlockingBackend> {
    slot: Rc<Slot<B::Tx>>,
    owned: bool,
}

impl<B: BlockingBackend> BlockingTxHandle<B> {
    pub fn is_owned(&self) -> bool {
        self.owned
    }

    pub fn execute(&self, statement: &Statement) -> std::result::Result<Vec<Row>, DriverError> {
        let mut slot = self.slot.tx.borrow_mut();
        let tx = slot
            .as_mut()
            .ok_or_else(|| DriverError::new("transaction already finished"))?;
        tx.execute(statement)
    }
}

/// Provides, shares and finishes blocking transactions.
pub struct BlockingTransactionCoordinator<B: BlockingBackend> {
    backend: Arc<B>,
}

impl<B: BlockingBackend> Clone for BlockingTransactionCoordinator<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
        }
    }
}

impl<B: BlockingBackend> BlockingTransactionCoordinator<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn in_transaction(&self) -> bool {
        Self::active().is_some()
    }

    fn active() -> Option<Rc<Slot<B::Tx>>> {
        ACTIVE_TX.with(|active| {
            active
                .borrow()
                .as_ref()
                .and_then(|any| any.clone().downcast::<Slot<B::Tx>>().ok())
        })
    }

    fn begin(&self) -> Result<Rc<Slot<B::Tx>>> {
        let tx = self
            .backend
            .begin()
            .map_err(|e| translate("begin transaction", e))?;
        Ok(Rc::new(Slot::new(tx)))
    }

    pub fn acquire(&self) -> Result<BlockingTxHandle<B>> {
        if let Some(slot) = Self::active() {
            return Ok(BlockingTxHandle { slot, owned: false });
        }
        Ok(BlockingTxHandle {
            slot: self.begin()?,
            owned: true,
        })
    }

    /// Commit on success, roll back on failure, for owned handles only.
    ///
    /// A failed joined handle marks the transaction rollback-only.
    pub fn finish<T>(&self, handle: BlockingTxHandle<B>, result: Result<T>) -> Result<T> {
        if !handle.owned {
            if result.is_err() {
                handle.slot.rollback_only.set(true);
            }
            return result;
        }
        let Some(mut tx) = handle.slot.tx.borrow_mut().take() else {
            return result;
        };
        let result = match result {
            Ok(_) if handle.slot.rollback_only.get() => Err(RepositoryError::repository(
                "commit transaction",
                "transaction is rollback-only after a failed operation",
            )),
            other => other,
        };
        match result {
            Ok(value) => match tx.commit() {
                Ok(()) => Ok(value),
                Err(commit_err) => {
                    tracing::warn!(error = %commit_err, "Commit failed, forcing rollback");
                    if let Err(rollback_err) = tx.rollback() {
                        tracing::warn!(error = %rollback_err, "Forced rollback failed");
                    }
                    Err(translate("commit transaction", commit_err))
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, "Rolling back transaction");
                if let Err(rollback_err) = tx.rollback() {
                    tracing::warn!(error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Run `f` with one transaction shared by every blocking repository call
    /// it makes on this thread. Nested calls join the outer transaction.
    pub fn run_in_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        if let Some(slot) = Self::active() {
            let result = f();
            if result.is_err() {
                slot.rollback_only.set(true);
            }
            return result;
        }
        let slot = self.begin()?;
        let result = {
            let shared: Rc<dyn Any> = slot.clone();
            let _scope = ActiveScope::enter(shared);
            f()
        };
        self.finish(BlockingTxHandle { slot, owned: true }, result)
    }
}

impl<B: BlockingBackend> std::fmt::Debug for BlockingTransactionCoordinator<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingTransactionCoordinator").finish_non_exhaustive()
    }
}
