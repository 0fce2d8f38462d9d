//! Bounded record queues
//!
//! Producers never block: a record offered to a full queue is dropped and
//! logged and counted.

use crate::error::{PodiumError, PodiumResult};
use crate::observability::PodiumMetrics;
use std::fmt::Debug;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::error;

/// Create a bounded queue named `name` holding at most `capacity` records
pub fn bounded<T>(name: &'static str, capacity: usize) -> (RecordSender<T>, RecordReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let metrics = PodiumMetrics::new();
    (
        RecordSender {
            name,
            tx,
            metrics: metrics.clone(),
        },
        RecordReceiver { name, rx, metrics },
    )
}

/// Producer handle; cheap to clone
pub struct RecordSender<T> {
    name: &'static str,
    tx: mpsc::Sender<T>,
    metrics: PodiumMetrics,
}

impl<T> Clone for RecordSender<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: self.tx.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<T: Debug> RecordSender<T> {
    /// Enqueue without waiting; a full queue drops the record
    pub fn offer(&self, record: T) -> PodiumResult<()> {
        match self.tx.try_send(record) {
            Ok(()) => {
                self.metrics.inc_enqueued(self.name);
                self.metrics.set_queue_depth(self.name, self.len());
                Ok(())
            }
            Err(TrySendError::Full(record)) => {
                self.metrics.inc_dropped(self.name);
                error!(event = "record_dropped", queue = self.name, record = ?record, "Can't put record into the queue, dropping it");
                Err(PodiumError::QueueFull {
                    queue: self.name,
                    record: format!("{record:?}"),
                })
            }
            Err(TrySendError::Closed(record)) => {
                self.metrics.inc_dropped(self.name);
                error!(event = "record_dropped", queue = self.name, record = ?record, "Queue consumer is gone, dropping record");
                Err(PodiumError::QueueFull {
                    queue: self.name,
                    record: format!("{record:?}"),
                })
            }
        }
    }
}

impl<T> RecordSender<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Records currently waiting
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Consumer handle
pub struct RecordReceiver<T> {
    name: &'static str,
    rx: mpsc::Receiver<T>,
    metrics: PodiumMetrics,
}

impl<T> RecordReceiver<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Wait for the next record; `None` once every producer is gone
    pub async fn recv(&mut self) -> Option<T> {
        let record = self.rx.recv().await;
        if record.is_some() {
            self.metrics.set_queue_depth(self.name, self.rx.len());
        }
        record
    }

    /// Take a record if one is waiting
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_offer_drops_excess_records() {
        let (tx, mut rx) = bounded::<u32>("test", 5);

        let outcomes: Vec<bool> = (0..8).map(|i| tx.offer(i).is_ok()).collect();

        assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 5);
        assert_eq!(&outcomes[5..], &[false, false, false]);
        assert_eq!(tx.len(), 5);

        let mut received = Vec::new();
        while let Some(record) = rx.try_recv() {
            received.push(record);
        }
        assert_eq!(received, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_full_queue_reports_queue_name() {
        let (tx, _rx) = bounded::<&str>("traffic", 1);
        tx.offer("first").unwrap();

        let err = tx.offer("second").unwrap_err();
        match err {
            PodiumError::QueueFull { queue, record } => {
                assert_eq!(queue, "traffic");
                assert!(record.contains("second"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_space_frees_after_consumption() {
        let (tx, mut rx) = bounded::<u32>("test", 1);
        assert_ok!(tx.offer(1));
        assert_err!(tx.offer(2));

        assert_eq!(rx.try_recv(), Some(1));
        assert_ok!(tx.offer(3));
        assert_eq!(tx.capacity(), 1);
    }

    fn dropped_total(queue: &str) -> f64 {
        prometheus::gather()
            .iter()
            .filter(|family| family.get_name() == "podium_records_dropped_total")
            .flat_map(|family| family.get_metric().iter())
            .filter(|metric| {
                metric
                    .get_label()
                    .iter()
                    .any(|label| label.get_name() == "queue" && label.get_value() == queue)
            })
            .map(|metric| metric.get_counter().get_value())
            .sum()
    }

    #[tokio::test]
    async fn test_every_drop_is_counted_once() {
        let (tx, _rx) = bounded::<u32>("overflow-count", 2);
        let before = dropped_total("overflow-count");

        for i in 0..6 {
            let _ = tx.offer(i);
        }

        assert_eq!(dropped_total("overflow-count") - before, 4.0);
    }

    #[tokio::test]
    async fn test_recv_reports_closed_queue() {
        let (tx, mut rx) = bounded::<u32>("test", 2);
        assert_ok!(tx.offer(4));
        drop(tx);

        assert_eq!(rx.recv().await, Some(4));
        assert_eq!(rx.recv().await, None);
    }
}
