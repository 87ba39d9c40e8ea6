use std::future::Future;
use std::sync::{Mutex, PoisonError};

use tokio::sync::watch;

type Slot<T> = Option<watch::Receiver<Option<T>>>;

/// Coalesces concurrent callers onto one in-flight operation.
///
/// The first caller runs the operation; callers arriving while it is pending
/// wait for and receive a clone of its result. Once the result is published
/// the slot is cleared so the next call starts a fresh operation.
pub struct SingleFlight<T> {
    slot: Mutex<Slot<T>>,
}

enum Role<T> {
    Leader(watch::Sender<Option<T>>),
    Follower(watch::Receiver<Option<T>>),
}

/// Clears the slot when the leader finishes or is dropped mid-flight.
struct SlotReset<'a, T> {
    slot: &'a Mutex<Slot<T>>,
}

impl<T> Drop for SlotReset<'_, T> {
    fn drop(&mut self) {
        let mut guard = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = None;
    }
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_flight(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn claim(&self) -> Role<T> {
        let mut guard = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(receiver) => Role::Follower(receiver.clone()),
            None => {
                let (sender, receiver) = watch::channel(None);
                *guard = Some(receiver);
                Role::Leader(sender)
            }
        }
    }

    /// Runs `operation` unless one is already in flight, in which case its
    /// result is shared. `None` means the leader was dropped before finishing.
    pub async fn run<F, Fut>(&self, operation: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        match self.claim() {
            Role::Leader(sender) => {
                let _reset = SlotReset { slot: &self.slot };
                let value = operation().await;
                sender.send_replace(Some(value.clone()));
                Some(value)
            }
            Role::Follower(mut receiver) => {
                let published = receiver.wait_for(Option::is_some).await;
                published.ok().and_then(|value| (*value).clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn concurrent_callers_share_one_run() {
        let flight = SingleFlight::<u32>::new();
        let counter = AtomicUsize::new(0);
        let runs = &counter;

        let operation = move || async move {
            runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            7
        };

        let (a, b, c) = tokio::join!(flight.run(operation), flight.run(operation), flight.run(operation));

        assert_eq!((a, b, c), (Some(7), Some(7), Some(7)));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!flight.in_flight());
    }

    #[tokio::test]
    async fn sequential_calls_run_again() {
        let flight = SingleFlight::<u32>::new();
        let counter = AtomicUsize::new(0);
        let runs = &counter;

        for expected in 1..=3 {
            let value = flight
                .run(move || async move { runs.fetch_add(1, Ordering::SeqCst) as u32 + 1 })
                .await;
            assert_eq!(value, Some(expected));
        }
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn abandoned_leader_releases_followers() {
        let flight = SingleFlight::<u32>::new();

        let leader = flight.run(|| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            1
        });
        let follower = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            flight.run(|| async { 2 }).await
        };

        let (leader_result, follower_result) = tokio::join!(
            tokio::time::timeout(Duration::from_millis(50), leader),
            follower
        );

        assert!(leader_result.is_err());
        assert_eq!(follower_result, None);
        assert!(!flight.in_flight());
    }
}
