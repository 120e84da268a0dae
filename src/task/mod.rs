//! Server-side task bookkeeping.
//!
//! A task is one invocation of `reply` scheduled on the server, identified by
//! a monotonically increasing [`TaskId`]. Results live in the bounded,
//! expiring [`result_pool::ResultPool`] until they are fetched or evicted.

/// Bounded, expiring store of task results.
pub mod result_pool;

use std::sync::Arc;

use tokio::sync::Notify;

use crate::message::Message;

/// Identifier of a scheduled reply task, unique per server.
pub type TaskId = u64;

/// State of a task in the result pool.
#[derive(Debug, Clone)]
pub enum TaskState {
    /// The reply is still being computed; waiters park on the notifier.
    Pending(Arc<Notify>),
    /// The reply (or an error-tagged message) is available.
    Done(Message),
}
