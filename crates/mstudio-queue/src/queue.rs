//! Bounded in-process task queue.
//!
//! Submission is two-phase: [`TaskSender::try_reserve`] claims a slot or
//! fails immediately with [`QueueError::Full`], the caller records the job,
//! then [`TaskReservation::send`] commits. A rejected submission therefore
//! never leaves a record behind.

use tokio::sync::mpsc;

use crate::error::{QueueError, QueueResult};

/// Create a queue holding at most `capacity` pending tasks.
pub fn task_queue<T: Send>(capacity: usize) -> (TaskSender<T>, TaskReceiver<T>) {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    (TaskSender { tx, capacity }, TaskReceiver { rx })
}

/// Producer half. Cheap to clone.
#[derive(Debug)]
pub struct TaskSender<T> {
    tx: mpsc::Sender<T>,
    capacity: usize,
}

impl<T> Clone for TaskSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            capacity: self.capacity,
        }
    }
}

impl<T: Send> TaskSender<T> {
    /// Claim a slot without waiting.
    pub fn try_reserve(&self) -> QueueResult<TaskReservation<T>> {
        match self.tx.clone().try_reserve_owned() {
            Ok(permit) => Ok(TaskReservation { permit }),
            Err(mpsc::error::TrySendError::Full(_)) => Err(QueueError::Full {
                capacity: self.capacity,
            }),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(QueueError::Closed),
        }
    }

    /// Tasks waiting to be picked up.
    pub fn pending(&self) -> usize {
        self.capacity.saturating_sub(self.tx.capacity())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A claimed slot. Dropping it without sending releases the slot.
#[derive(Debug)]
pub struct TaskReservation<T> {
    permit: mpsc::OwnedPermit<T>,
}

impl<T> TaskReservation<T> {
    pub fn send(self, task: T) {
        self.permit.send(task);
    }
}

/// Consumer half.
#[derive(Debug)]
pub struct TaskReceiver<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> TaskReceiver<T> {
    /// Next task, or `None` once every sender is gone and the queue drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Next task if one is already queued.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Stop accepting new tasks; queued ones can still be received.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reserve_send_receive() {
        let (tx, mut rx) = task_queue::<u32>(2);
        tx.try_reserve().unwrap().send(7);
        assert_eq!(tx.pending(), 1);
        assert_eq!(rx.recv().await, Some(7));
        assert_eq!(tx.pending(), 0);
    }

    #[tokio::test]
    async fn test_full_queue_is_busy() {
        let (tx, _rx) = task_queue::<u32>(2);
        tx.try_reserve().unwrap().send(1);
        let held = tx.try_reserve().unwrap();

        let err = tx.try_reserve().unwrap_err();
        assert!(err.is_busy());
        assert!(matches!(err, QueueError::Full { capacity: 2 }));

        // Releasing an unused reservation frees the slot.
        drop(held);
        assert!(tx.try_reserve().is_ok());
    }

    #[tokio::test]
    async fn test_drain_after_close() {
        let (tx, mut rx) = task_queue::<u32>(4);
        tx.try_reserve().unwrap().send(1);
        tx.try_reserve().unwrap().send(2);
        rx.close();

        assert!(tx.try_reserve().is_err());
        assert_eq!(rx.try_recv(), Some(1));
        assert_eq!(rx.try_recv(), Some(2));
        assert_eq!(rx.try_recv(), None);
    }

    #[tokio::test]
    async fn test_closed_queue() {
        let (tx, mut rx) = task_queue::<u32>(1);
        rx.close();
        assert!(matches!(tx.try_reserve(), Err(QueueError::Closed)));
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn test_receiver_ends_when_senders_drop() {
        let (tx, mut rx) = task_queue::<u32>(4);
        tx.try_reserve().unwrap().send(1);
        drop(tx);
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, None);
    }
}
