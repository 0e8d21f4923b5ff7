use crossbeam_channel::{Receiver, Sender, TrySendError};

/// Creates a bounded single-producer/single-consumer hand-off queue.
///
/// Neither side ever blocks: a full queue drops the incoming task and an
/// empty queue returns `None`. Capacity is clamped to at least 1.
pub fn task_queue<T>(capacity: usize) -> (TaskSender<T>, TaskReceiver<T>) {
    let capacity = capacity.max(1);
    let (tx, rx) = crossbeam_channel::bounded(capacity);
    (TaskSender { tx, capacity }, TaskReceiver { rx })
}

/// Producer half of the task queue.
pub struct TaskSender<T> {
    tx: Sender<T>,
    capacity: usize,
}

impl<T> TaskSender<T> {
    /// Enqueues `task` unless the queue is full, in which case the task
    /// is dropped and the buffered tasks are left as they were.
    pub fn try_enqueue(&self, task: T) -> bool {
        match self.tx.try_send(task) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> Clone for TaskSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            capacity: self.capacity,
        }
    }
}

/// Consumer half of the task queue.
pub struct TaskReceiver<T> {
    rx: Receiver<T>,
}

impl<T> TaskReceiver<T> {
    pub fn try_dequeue(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Discards everything currently buffered, returning how many tasks
    /// were dropped.
    pub fn clear(&self) -> usize {
        self.rx.try_iter().count()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::thread;

    fn drain<T>(rx: &TaskReceiver<T>) -> Vec<T> {
        std::iter::from_fn(|| rx.try_dequeue()).collect()
    }

    #[rstest]
    #[case(1)]
    #[case(4)]
    #[case(16)]
    fn test_fifo_order_without_drops(#[case] n: usize) {
        let (tx, rx) = task_queue(n);
        for i in 0..n {
            assert!(tx.try_enqueue(i));
        }
        assert_eq!(drain(&rx), (0..n).collect::<Vec<_>>());
    }

    #[test]
    fn test_full_queue_drops_incoming_task() {
        let (tx, rx) = task_queue(2);

        assert!(tx.try_enqueue("T1"));
        assert!(tx.try_enqueue("T2"));
        assert!(!tx.try_enqueue("T3"));

        assert_eq!(drain(&rx), vec!["T1", "T2"]);
    }

    #[rstest]
    #[case(1, 5)]
    #[case(2, 10)]
    #[case(3, 3)]
    fn test_len_never_exceeds_capacity(#[case] capacity: usize, #[case] pushes: usize) {
        let (tx, rx) = task_queue(capacity);
        let mut accepted = 0;
        for i in 0..pushes {
            if tx.try_enqueue(i) {
                accepted += 1;
            }
            assert!(rx.len() <= capacity);
        }
        assert_eq!(accepted, capacity.min(pushes));
        assert_eq!(drain(&rx), (0..accepted).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_queue_dequeues_none() {
        let (_tx, rx) = task_queue::<u32>(2);
        assert!(rx.try_dequeue().is_none());
        assert!(rx.is_empty());
    }

    #[test]
    fn test_zero_capacity_is_clamped_to_one() {
        let (tx, rx) = task_queue(0);
        assert_eq!(tx.capacity(), 1);
        assert!(tx.try_enqueue(1));
        assert!(!tx.try_enqueue(2));
        assert_eq!(rx.try_dequeue(), Some(1));
    }

    #[test]
    fn test_dequeue_frees_a_slot() {
        let (tx, rx) = task_queue(1);
        assert!(tx.try_enqueue(1));
        assert_eq!(rx.try_dequeue(), Some(1));
        assert!(tx.try_enqueue(2));
    }

    #[test]
    fn test_enqueue_after_receiver_dropped_fails() {
        let (tx, rx) = task_queue(2);
        drop(rx);
        assert!(!tx.try_enqueue(1));
    }

    #[test]
    fn test_clear_discards_buffered_tasks() {
        let (tx, rx) = task_queue(3);
        tx.try_enqueue(1);
        tx.try_enqueue(2);
        assert_eq!(rx.clear(), 2);
        assert!(rx.is_empty());
    }

    #[test]
    fn test_concurrent_producer_preserves_order_of_accepted_tasks() {
        let (tx, rx) = task_queue(4);
        let producer = thread::spawn(move || {
            let mut accepted = Vec::new();
            for i in 0..10_000u32 {
                if tx.try_enqueue(i) {
                    accepted.push(i);
                }
            }
            accepted
        });

        let mut received = Vec::new();
        while !producer.is_finished() || !rx.is_empty() {
            if let Some(task) = rx.try_dequeue() {
                received.push(task);
            }
        }
        let accepted = producer.join().unwrap();
        received.extend(drain(&rx));

        assert_eq!(received, accepted);
    }
}
