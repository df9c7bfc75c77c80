//! Bounded-concurrency work pool.
//!
//! The walker produces into it, the encoder driver consumes from it. A
//! single scheduler task owns the pending queue, the active set, and the
//! counters; the public handle is a thin command sender. The pool also
//! implements the two-level shutdown protocol: graceful (drain running
//! jobs) and immediate (kill children, delete partial outputs).

mod observer;
mod queue;
mod types;

pub use observer::{NullObserver, PoolObserver};
pub use queue::WorkPool;
pub use types::{Job, JobState, PoolConfig, PoolSnapshot, QueueSummary};
