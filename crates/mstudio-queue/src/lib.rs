//! Job record storage and the in-process task queue.
//!
//! This crate provides:
//! - The `JobStore` seam with in-memory and Redis backends
//! - Retention sweeping of finished and abandoned records
//! - A bounded task queue with reserve-then-commit submission

pub mod error;
pub mod queue;
pub mod store;

pub use error::{QueueError, QueueResult};
pub use queue::{task_queue, TaskReceiver, TaskReservation, TaskSender};
pub use store::{InMemoryJobStore, JobStore, RedisJobStore, RedisStoreConfig};
