//! Priority task queue with bounded concurrency.
//!
//! Tasks are ordered by priority (higher first), ties broken by enqueue
//! order. At most `max_concurrency` tasks run at once; the rest wait in the
//! queue. Dispatch is deferred to the runtime, so a batch of synchronous
//! enqueues is fully ordered before the first task starts.

use crate::error::{SyncError, SyncResult};
use crate::events::{EventBus, SyncEvent};
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::oneshot;

type Task = Pin<Box<dyn Future<Output = SyncResult<()>> + Send>>;

struct Pending {
    label: String,
    priority: i64,
    seq: u64,
    task: Task,
    tx: oneshot::Sender<SyncResult<()>>,
}

struct QueueState {
    pending: Vec<Pending>,
    active: usize,
    next_seq: u64,
}

struct Inner {
    state: Mutex<QueueState>,
    max_concurrency: usize,
    events: EventBus,
}

impl Inner {
    /// Starts queued tasks until the concurrency cap is hit or the queue is
    /// empty. Never blocks: each started task runs on its own tokio task and
    /// re-enters dispatch when it finishes.
    fn dispatch(self: &Arc<Self>) {
        loop {
            let next = {
                let mut state = self.state.lock();
                if state.active >= self.max_concurrency || state.pending.is_empty() {
                    return;
                }
                let mut best = 0;
                for (i, item) in state.pending.iter().enumerate() {
                    let b = &state.pending[best];
                    if item.priority > b.priority
                        || (item.priority == b.priority && item.seq < b.seq)
                    {
                        best = i;
                    }
                }
                state.active += 1;
                state.pending.remove(best)
            };

            let inner = Arc::clone(self);
            tokio::spawn(async move {
                let Pending {
                    label, task, tx, ..
                } = next;
                let result = task.await;
                match &result {
                    Ok(()) => inner.events.emit(SyncEvent::TaskCompleted {
                        label: label.clone(),
                    }),
                    Err(err) => inner.events.emit(SyncEvent::TaskFailed {
                        label: label.clone(),
                        message: err.to_string(),
                    }),
                }
                let _ = tx.send(result);
                inner.state.lock().active -= 1;
                inner.dispatch();
            });
        }
    }
}

/// A priority-ordered task scheduler with a concurrency cap.
#[derive(Clone)]
pub struct SyncQueue {
    inner: Arc<Inner>,
}

impl SyncQueue {
    /// Creates a queue that runs at most `max_concurrency` tasks at once.
    pub fn new(max_concurrency: usize, events: EventBus) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState {
                    pending: Vec::new(),
                    active: 0,
                    next_seq: 0,
                }),
                max_concurrency: max_concurrency.max(1),
                events,
            }),
        }
    }

    /// Enqueues a task. Higher priority runs first; ties run in enqueue
    /// order. The returned receiver settles with the task's result, or with
    /// [`SyncError::Cancelled`] if the queue is cleared first.
    pub fn enqueue<F>(
        &self,
        label: impl Into<String>,
        priority: i64,
        task: F,
    ) -> oneshot::Receiver<SyncResult<()>>
    where
        F: Future<Output = SyncResult<()>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.inner.state.lock();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.pending.push(Pending {
                label: label.into(),
                priority,
                seq,
                task: Box::pin(task),
                tx,
            });
        }

        // Deferred so that a synchronous run of enqueues is ordered as a
        // whole before anything starts.
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.dispatch();
        });

        rx
    }

    /// Cancels every task that has not started, settling each receiver with
    /// [`SyncError::Cancelled`]. Running tasks are unaffected. Returns the
    /// number of tasks cancelled.
    pub fn clear(&self) -> usize {
        let drained: Vec<Pending> = {
            let mut state = self.inner.state.lock();
            state.pending.drain(..).collect()
        };
        let count = drained.len();
        for item in drained {
            let _ = item.tx.send(Err(SyncError::Cancelled));
        }
        count
    }

    /// Number of tasks waiting to start.
    pub fn len(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// True when no tasks are waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of tasks currently running.
    pub fn active(&self) -> usize {
        self.inner.state.lock().active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn priority_orders_a_synchronous_batch() {
        let queue = SyncQueue::new(1, EventBus::default());
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut receivers = Vec::new();
        for priority in [1i64, 5, 3] {
            let order = Arc::clone(&order);
            receivers.push(queue.enqueue(format!("p{priority}"), priority, async move {
                order.lock().push(priority);
                Ok(())
            }));
        }
        for rx in receivers {
            rx.await.unwrap().unwrap();
        }

        assert_eq!(*order.lock(), vec![5, 3, 1]);
    }

    #[tokio::test]
    async fn ties_run_in_enqueue_order() {
        let queue = SyncQueue::new(1, EventBus::default());
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut receivers = Vec::new();
        for label in ["a", "b", "c"] {
            let order = Arc::clone(&order);
            receivers.push(queue.enqueue(label, 0, async move {
                order.lock().push(label);
                Ok(())
            }));
        }
        for rx in receivers {
            rx.await.unwrap().unwrap();
        }

        assert_eq!(*order.lock(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_cap() {
        let queue = SyncQueue::new(2, EventBus::default());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut receivers = Vec::new();
        for i in 0..6 {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            receivers.push(queue.enqueue(format!("t{i}"), 0, async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }));
        }
        for rx in receivers {
            rx.await.unwrap().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(queue.active(), 0);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn clear_cancels_pending_but_not_running() {
        let queue = SyncQueue::new(1, EventBus::default());
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let running = queue.enqueue("long", 10, async move {
            let _ = release_rx.await;
            Ok(())
        });
        // Let the first task start before piling on.
        tokio::task::yield_now().await;

        let waiting_a = queue.enqueue("a", 0, async { Ok(()) });
        let waiting_b = queue.enqueue("b", 0, async { Ok(()) });

        assert_eq!(queue.clear(), 2);
        assert!(matches!(waiting_a.await.unwrap(), Err(SyncError::Cancelled)));
        assert!(matches!(waiting_b.await.unwrap(), Err(SyncError::Cancelled)));

        let _ = release_tx.send(());
        running.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn failures_emit_task_failed() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let queue = SyncQueue::new(1, bus);

        let result = queue
            .enqueue("doomed", 0, async {
                Err(SyncError::Network("offline".into()))
            })
            .await
            .unwrap();
        assert!(matches!(result, Err(SyncError::Network(_))));

        match rx.recv().await.unwrap() {
            SyncEvent::TaskFailed { label, message } => {
                assert_eq!(label, "doomed");
                assert!(message.contains("offline"));
            }
            other => panic!("expected TaskFailed, got {other:?}"),
        }
    }
}
