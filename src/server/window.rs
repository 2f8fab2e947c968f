// ABOUTME: Gateway-wide receive window bounding in-flight submissions
// ABOUTME: Admission is non-blocking so a full window turns into a flow-control response

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Snapshot for monitoring and debugging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowStatistics {
    pub capacity: usize,
    pub in_flight: usize,
    /// Submissions admitted since start
    pub admitted: u64,
    /// Submissions answered with flow control since start
    pub rejected: u64,
}

#[derive(Debug)]
pub struct ReceiveWindow {
    permits: Arc<Semaphore>,
    capacity: usize,
    admitted: AtomicU64,
    rejected: AtomicU64,
}

impl ReceiveWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            admitted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Take a slot if one is free. The slot is released when the permit drops.
    pub fn try_admit(&self) -> Option<OwnedSemaphorePermit> {
        match self.permits.clone().try_acquire_owned() {
            Ok(permit) => {
                self.admitted.fetch_add(1, Ordering::Relaxed);
                Some(permit)
            }
            Err(_) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn is_full(&self) -> bool {
        self.permits.available_permits() == 0
    }

    pub fn in_flight(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }

    pub fn statistics(&self) -> WindowStatistics {
        WindowStatistics {
            capacity: self.capacity,
            in_flight: self.in_flight(),
            admitted: self.admitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_capacity_then_rejects() {
        let window = ReceiveWindow::new(2);
        let first = window.try_admit();
        let second = window.try_admit();
        assert!(first.is_some() && second.is_some());
        assert!(window.is_full());
        assert!(window.try_admit().is_none());

        drop(first);
        assert!(!window.is_full());
        assert!(window.try_admit().is_some());

        let stats = window.statistics();
        assert_eq!(stats.capacity, 2);
        assert_eq!(stats.admitted, 3);
        assert_eq!(stats.rejected, 1);
    }

    #[test]
    fn in_flight_tracks_held_permits() {
        let window = ReceiveWindow::new(4);
        let held: Vec<_> = (0..3).filter_map(|_| window.try_admit()).collect();
        assert_eq!(window.in_flight(), 3);
        drop(held);
        assert_eq!(window.in_flight(), 0);
    }
}
