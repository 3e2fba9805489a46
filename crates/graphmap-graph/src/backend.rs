//! Backend seams: where statements meet a graph.
//!
//! A backend hands out transactions; everything the repositories run goes
//! through one. The async pair is used by [`crate::AsyncRepository`], the
//! blocking pair by [`crate::blocking::BlockingRepository`].

use async_trait::async_trait;

use graphmap_core::error::DriverError;
use graphmap_core::statement::Statement;
use graphmap_core::types::Row;

/// A graph that can open transactions.
#[async_trait]
pub trait GraphBackend: Send + Sync + 'static {
    type Tx: GraphTransaction + 'static;

    async fn begin(&self) -> Result<Self::Tx, DriverError>;
}

/// One open transaction.
///
/// Dropping a transaction that was neither committed nor rolled back
/// discards its work.
#[async_trait]
pub trait GraphTransaction: Send {
    async fn execute(&mut self, statement: &Statement) -> Result<Vec<Row>, DriverError>;

    async fn commit(&mut self) -> Result<(), DriverError>;

    /// Roll back. A no-op once the transaction is finished.
    async fn rollback(&mut self) -> Result<(), DriverError>;
}

/// Blocking counterpart of [`GraphBackend`].
pub trait BlockingBackend: Send + Sync + 'static {
    type Tx: BlockingTransaction + 'static;

    fn begin(&self) -> Result<Self::Tx, DriverError>;
}

/// Blocking counterpart of [`GraphTransaction`].
pub trait BlockingTransaction {
    fn execute(&mut self, statement: &Statement) -> Result<Vec<Row>, DriverError>;

    fn commit(&mut self) -> Result<(), DriverError>;

    fn rollback(&mut self) -> Result<(), DriverError>;
}
