//! Bounded, expiring map from task ids to pending waits or finished replies.
//!
//! Capacity policy: inserting past `max_len` evicts the oldest entry by
//! insertion time (entries are re-stamped on completion, never on read).
//! Age policy: entries older than `max_age` are treated as absent on read.
//! Evicting a pending entry wakes its waiters so a `_get` caller is never
//! stranded; waiters additionally poll on a bounded interval.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lru::LruCache;
use tokio::sync::Notify;
use tracing::debug;

use super::{TaskId, TaskState};
use crate::message::Message;

/// Upper bound between wake-ups of a parked `_get` caller.
pub const WAKE_INTERVAL: Duration = Duration::from_secs(1);

struct PoolEntry {
    inserted_at: Instant,
    state: TaskState,
}

/// Outcome of a point lookup in the pool.
#[derive(Debug)]
pub enum Lookup {
    /// The task finished; the stored reply.
    Done(Message),
    /// The task is still running; park on the notifier and retry.
    Pending(Arc<Notify>),
    /// The task is unknown, expired, or was evicted.
    Absent,
}

/// Thread-safe result store shared by RPC handlers and reply workers.
#[derive(Clone)]
pub struct ResultPool {
    entries: Arc<Mutex<LruCache<TaskId, PoolEntry>>>,
    max_age: Duration,
}

impl ResultPool {
    /// Creates a pool holding at most `max_len` entries for at most `max_age`.
    pub fn new(max_len: usize, max_age: Duration) -> Self {
        let cap = NonZeroUsize::new(max_len).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Arc::new(Mutex::new(LruCache::new(cap))),
            max_age,
        }
    }

    /// Registers a freshly scheduled task as pending.
    pub fn insert_pending(&self, task_id: TaskId) {
        self.push(task_id, TaskState::Pending(Arc::new(Notify::new())));
    }

    /// Stores the finished reply for a task and wakes its waiters.
    ///
    /// Re-inserts unconditionally: a task whose pending entry was already
    /// evicted still gets its result stored, with a fresh age stamp.
    pub fn complete(&self, task_id: TaskId, result: Message) {
        self.push(task_id, TaskState::Done(result));
    }

    fn push(&self, task_id: TaskId, state: TaskState) {
        let entry = PoolEntry {
            inserted_at: Instant::now(),
            state,
        };
        let (replaced, evicted) = {
            let mut entries = self.entries.lock().unwrap();
            let replaced = entries.pop(&task_id);
            let evicted = entries.push(task_id, entry);
            (replaced, evicted)
        };
        if let Some(PoolEntry {
            state: TaskState::Pending(notify),
            ..
        }) = replaced
        {
            notify.notify_waiters();
        }
        if let Some((evicted_id, entry)) = evicted {
            debug!("result pool full, evicting task [{evicted_id}]");
            if let TaskState::Pending(notify) = entry.state {
                notify.notify_waiters();
            }
        }
    }

    /// Looks up a task, applying the age policy.
    pub fn lookup(&self, task_id: TaskId) -> Lookup {
        let mut entries = self.entries.lock().unwrap();
        let expired = match entries.peek(&task_id) {
            None => return Lookup::Absent,
            Some(entry) => entry.inserted_at.elapsed() > self.max_age,
        };
        if expired {
            let removed = entries.pop(&task_id);
            drop(entries);
            debug!("task [{task_id}] expired");
            if let Some(PoolEntry {
                state: TaskState::Pending(notify),
                ..
            }) = removed
            {
                notify.notify_waiters();
            }
            return Lookup::Absent;
        }
        match entries.peek(&task_id).map(|entry| &entry.state) {
            Some(TaskState::Done(msg)) => Lookup::Done(msg.clone()),
            Some(TaskState::Pending(notify)) => Lookup::Pending(Arc::clone(notify)),
            None => Lookup::Absent,
        }
    }

    /// Blocks until the task finishes, expires, or is evicted.
    ///
    /// Returns `None` for unknown, expired, or evicted tasks.
    pub async fn wait(&self, task_id: TaskId) -> Option<Message> {
        loop {
            match self.lookup(task_id) {
                Lookup::Done(msg) => return Some(msg),
                Lookup::Absent => return None,
                Lookup::Pending(notify) => {
                    let _ = tokio::time::timeout(WAKE_INTERVAL, notify.notified()).await;
                }
            }
        }
    }

    /// Number of live entries, counting expired ones not yet collected.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Whether the pool holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Msg;

    fn done(text: &str) -> Message {
        Message::Msg(Msg::new("agent", text))
    }

    #[tokio::test]
    async fn test_complete_wakes_waiter() {
        let pool = ResultPool::new(16, Duration::from_secs(60));
        pool.insert_pending(1);

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.wait(1).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.complete(1, done("finished"));

        let result = waiter.await.unwrap();
        assert_eq!(result.unwrap().as_msg().unwrap().content, "finished");
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let pool = ResultPool::new(2, Duration::from_secs(60));
        pool.complete(1, done("one"));
        pool.complete(2, done("two"));
        pool.complete(3, done("three"));

        assert!(matches!(pool.lookup(1), Lookup::Absent));
        assert!(matches!(pool.lookup(2), Lookup::Done(_)));
        assert!(matches!(pool.lookup(3), Lookup::Done(_)));
    }

    #[tokio::test]
    async fn test_evicting_pending_wakes_waiter() {
        let pool = ResultPool::new(1, Duration::from_secs(60));
        pool.insert_pending(1);

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.wait(1).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        // Pushes task 1 out of the single slot.
        pool.insert_pending(2);

        let result = tokio::time::timeout(Duration::from_millis(200), waiter)
            .await
            .expect("waiter should wake promptly after eviction")
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_is_absent() {
        let pool = ResultPool::new(16, Duration::from_millis(30));
        pool.complete(1, done("short-lived"));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(matches!(pool.lookup(1), Lookup::Absent));
    }

    #[tokio::test]
    async fn test_completion_restamps_age() {
        let pool = ResultPool::new(16, Duration::from_millis(80));
        pool.insert_pending(1);
        tokio::time::sleep(Duration::from_millis(50)).await;
        pool.complete(1, done("late"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        // 100ms after insert but only 50ms after completion.
        assert!(matches!(pool.lookup(1), Lookup::Done(_)));
    }

    #[tokio::test]
    async fn test_wait_on_unknown_task_returns_none() {
        let pool = ResultPool::new(16, Duration::from_secs(60));
        assert!(pool.wait(999).await.is_none());
    }
}
