//! Blocking forms of the backend, coordinator and repository.
//!
//! For synchronous callers. Traversal state and the shared transaction are
//! bound to the calling thread for the length of one public call, so these
//! types must not be driven from inside an async runtime.

mod client;
mod repository;
mod transaction;

pub use client::{BlockingGraphClient, BlockingNeo4jTransaction};
pub use repository::BlockingRepository;
pub use transaction::{BlockingTransactionCoordinator, BlockingTxHandle};
