//! Worker Skeleton (C3): the generic ack/nack/requeue driver (§4.3) plus
//! the concrete stage handlers that ride on it.

pub mod driver;
pub mod handlers;
pub mod local_store;

#[cfg(test)]
pub(crate) mod test_support;

pub use driver::{run_worker, run_worker_once, NextMessage, Outcome, WorkerHandler};
pub use local_store::{LocalObjectStore, NoopReencryptor};
