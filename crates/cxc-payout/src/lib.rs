//! Asynchronous bet settlement: durable queue, worker, retry/dead-letter,
//! and sweeper, kept off the request path entirely.

pub mod backoff;
pub mod queue;
pub mod sweeper;
pub mod worker;

pub use queue::PayoutQueue;
pub use worker::{process_one, run, PayoutError};
