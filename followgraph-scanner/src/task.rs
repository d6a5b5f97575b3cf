use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Follower,
    Following,
}

impl Direction {
    /// Path segment of the friendships endpoint.
    pub fn as_path(&self) -> &'static str {
        match self {
            Direction::Follower => "followers",
            Direction::Following => "following",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_path())
    }
}

/// One user+direction pagination chain. `cursor` is where the next page
/// starts; `None` asks for the first page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub user: u64,
    pub direction: Direction,
    pub cursor: Option<String>,
}

impl Task {
    pub fn new(user: u64, direction: Direction) -> Self {
        Self {
            user,
            direction,
            cursor: None,
        }
    }

    pub fn continue_at(self, cursor: String) -> Self {
        Self {
            cursor: Some(cursor),
            ..self
        }
    }
}

#[derive(Default)]
struct QueueState {
    tasks: VecDeque<Task>,
    in_flight: usize,
}

/// Work queue shared by one generation's workers.
///
/// A popped task counts as in flight until it is either requeued with its
/// continuation or finished. The queue is drained once it is empty and
/// nothing is in flight, because only in-flight tasks can add work.
pub struct TaskQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl TaskQueue {
    pub fn new(tasks: impl IntoIterator<Item = Task>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                tasks: tasks.into_iter().collect(),
                in_flight: 0,
            }),
            notify: Notify::new(),
        }
    }

    /// Next task to work on, waiting for in-flight continuations when the
    /// queue is momentarily empty. `None` once drained or cancelled.
    pub async fn next(&self, cancel: &CancellationToken) -> Option<Task> {
        loop {
            let notified = self.notify.notified();

            {
                let mut state = self.state.lock().await;
                if cancel.is_cancelled() {
                    return None;
                }
                if let Some(task) = state.tasks.pop_front() {
                    state.in_flight += 1;
                    return Some(task);
                }
                if state.in_flight == 0 {
                    return None;
                }
            }

            tokio::select! {
                _ = notified => {}
                _ = cancel.cancelled() => return None,
            }
        }
    }

    /// Hand back a popped task's continuation. It goes to the back so other
    /// users' chains get a turn.
    pub async fn requeue(&self, task: Task) {
        let mut state = self.state.lock().await;
        state.tasks.push_back(task);
        state.in_flight = state.in_flight.saturating_sub(1);
        drop(state);
        self.notify.notify_waiters();
    }

    /// Mark a popped task as finished.
    pub async fn finish(&self) {
        let mut state = self.state.lock().await;
        state.in_flight = state.in_flight.saturating_sub(1);
        drop(state);
        self.notify.notify_waiters();
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.tasks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_next_pops_in_order_then_drains() {
        let cancel = CancellationToken::new();
        let queue = TaskQueue::new(vec![
            Task::new(1, Direction::Follower),
            Task::new(1, Direction::Following),
        ]);

        assert_eq!(queue.next(&cancel).await, Some(Task::new(1, Direction::Follower)));
        queue.finish().await;
        assert_eq!(queue.next(&cancel).await, Some(Task::new(1, Direction::Following)));
        queue.finish().await;
        assert_eq!(queue.next(&cancel).await, None);
    }

    #[tokio::test]
    async fn test_requeued_task_goes_to_back() {
        let cancel = CancellationToken::new();
        let queue = TaskQueue::new(vec![
            Task::new(1, Direction::Follower),
            Task::new(2, Direction::Follower),
        ]);

        let first = queue.next(&cancel).await.unwrap();
        queue.requeue(first.continue_at("c1".to_string())).await;

        assert_eq!(queue.next(&cancel).await.unwrap().user, 2);
        queue.finish().await;

        let resumed = queue.next(&cancel).await.unwrap();
        assert_eq!(resumed.user, 1);
        assert_eq!(resumed.cursor.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn test_idle_worker_waits_for_continuation() {
        let cancel = CancellationToken::new();
        let queue = Arc::new(TaskQueue::new(vec![Task::new(7, Direction::Follower)]));

        let task = queue.next(&cancel).await.unwrap();

        let waiter = {
            let queue = queue.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { queue.next(&cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished(), "worker should wait while a task is in flight");

        queue.requeue(task.continue_at("next".to_string())).await;
        let resumed = waiter.await.unwrap().unwrap();
        assert_eq!(resumed.cursor.as_deref(), Some("next"));
    }

    #[tokio::test]
    async fn test_idle_worker_exits_when_last_task_finishes() {
        let cancel = CancellationToken::new();
        let queue = Arc::new(TaskQueue::new(vec![Task::new(7, Direction::Follower)]));
        let _task = queue.next(&cancel).await.unwrap();

        let waiter = {
            let queue = queue.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { queue.next(&cancel).await })
        };

        queue.finish().await;
        assert_eq!(waiter.await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cancelled_queue_yields_nothing() {
        let cancel = CancellationToken::new();
        let queue = TaskQueue::new(vec![Task::new(1, Direction::Follower)]);
        cancel.cancel();
        assert_eq!(queue.next(&cancel).await, None);
        assert_eq!(queue.len().await, 1);
    }
}
