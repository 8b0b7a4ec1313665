//! Single priority queue keyed by `(−priority, enqueue_seq)` (spec §4.4):
//! higher priority runs first, FIFO breaks ties. `enqueue_seq` is a plain
//! counter rather than a timestamp — total order without depending on
//! clock resolution.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use parking_lot::Mutex;
use tokio::sync::Notify;
use ymera_types::{TaskId, TaskPriority};

#[derive(Debug, Clone, Eq, PartialEq)]
struct QueueEntry {
    priority: TaskPriority,
    enqueue_seq: u64,
    task_id: TaskId,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.enqueue_seq.cmp(&self.enqueue_seq))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub struct TaskQueue {
    heap: Mutex<BinaryHeap<QueueEntry>>,
    notify: Notify,
    seq: AtomicU64,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
            seq: AtomicU64::new(0),
        }
    }

    pub fn push(&self, task_id: TaskId, priority: TaskPriority) {
        let enqueue_seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);
        self.heap.lock().push(QueueEntry {
            priority,
            enqueue_seq,
            task_id,
        });
        self.notify.notify_one();
    }

    pub fn try_pop(&self) -> Option<TaskId> {
        self.heap.lock().pop().map(|entry| entry.task_id)
    }

    pub async fn notified(&self) {
        self.notify.notified().await;
    }

    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }
}
