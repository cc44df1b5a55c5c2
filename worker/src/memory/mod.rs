//! In-memory collaborators.
//!
//! Reference implementations of the store, log and remote contracts. They
//! back the test suite and suit applications that keep state elsewhere and
//! only need the worker's scheduling.

mod local;
mod log;
mod remote;

pub use local::*;
pub use log::*;
pub use remote::*;
