//! Status fan-out with per-listener failure isolation.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};

use crate::types::TrackedStatus;

pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Receives every accepted status, synchronously, on the delivery path.
///
/// Implementations must not feed fixes back into the tracker from inside
/// `on_status`.
pub trait StatusListener: Send + Sync {
    fn on_status(&self, status: &TrackedStatus) -> Result<(), ListenerError>;
}

impl<F> StatusListener for F
where
    F: Fn(&TrackedStatus) -> Result<(), ListenerError> + Send + Sync,
{
    fn on_status(&self, status: &TrackedStatus) -> Result<(), ListenerError> {
        self(status)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ListenerOutcome {
    Delivered,
    Failed(String),
    Panicked,
}

/// One outcome per registered listener, in registration order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeliveryReport {
    pub outcomes: Vec<ListenerOutcome>,
}

impl DeliveryReport {
    pub fn failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| !matches!(o, ListenerOutcome::Delivered))
            .count()
    }

    pub fn all_delivered(&self) -> bool {
        self.failures() == 0
    }
}

/// Ordered set of listeners, de-duplicated by identity.
#[derive(Default)]
pub struct ListenerSet {
    listeners: Vec<Arc<dyn StatusListener>>,
}

fn same_listener(a: &Arc<dyn StatusListener>, b: &Arc<dyn StatusListener>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if this exact listener is already registered.
    pub fn add(&mut self, listener: Arc<dyn StatusListener>) -> bool {
        if self.listeners.iter().any(|l| same_listener(l, &listener)) {
            return false;
        }
        self.listeners.push(listener);
        true
    }

    pub fn remove(&mut self, listener: &Arc<dyn StatusListener>) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| !same_listener(l, listener));
        self.listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn notify(&self, status: &TrackedStatus) -> DeliveryReport {
        let outcomes = self
            .listeners
            .iter()
            .enumerate()
            .map(|(idx, listener)| {
                match catch_unwind(AssertUnwindSafe(|| listener.on_status(status))) {
                    Ok(Ok(())) => ListenerOutcome::Delivered,
                    Ok(Err(e)) => {
                        log::warn!("status listener #{} failed: {}", idx, e);
                        ListenerOutcome::Failed(e.to_string())
                    }
                    Err(_) => {
                        log::warn!("status listener #{} panicked", idx);
                        ListenerOutcome::Panicked
                    }
                }
            })
            .collect();
        DeliveryReport { outcomes }
    }
}

/// Forwards statuses into a channel so hosts can consume them as messages.
pub struct ChannelListener {
    tx: Sender<TrackedStatus>,
}

impl ChannelListener {
    pub fn new() -> (Arc<Self>, Receiver<TrackedStatus>) {
        let (tx, rx) = channel::unbounded();
        (Arc::new(Self { tx }), rx)
    }

    pub fn bounded(capacity: usize) -> (Arc<Self>, Receiver<TrackedStatus>) {
        let (tx, rx) = channel::bounded(capacity);
        (Arc::new(Self { tx }), rx)
    }
}

impl StatusListener for ChannelListener {
    fn on_status(&self, status: &TrackedStatus) -> Result<(), ListenerError> {
        self.tx
            .try_send(status.clone())
            .map_err(|e| format!("status channel: {e}").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Direction;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn status() -> TrackedStatus {
        TrackedStatus {
            latitude: 30.0,
            longitude: 120.0,
            speed_mps: 0.0,
            accuracy_m: 5.0,
            satellites: 8,
            stake: "1+000".to_string(),
            direction: Direction::Increasing,
            timestamp_ms: 1000,
        }
    }

    #[test]
    fn test_duplicate_listener_ignored() {
        let mut set = ListenerSet::new();
        let listener: Arc<dyn StatusListener> =
            Arc::new(|_: &TrackedStatus| -> Result<(), ListenerError> { Ok(()) });
        assert!(set.add(listener.clone()));
        assert!(!set.add(listener.clone()));
        assert_eq!(set.len(), 1);
        assert!(set.remove(&listener));
        assert!(set.is_empty());
        assert!(!set.remove(&listener));
    }

    #[test]
    fn test_failures_are_isolated() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut set = ListenerSet::new();

        set.add(Arc::new(|_: &TrackedStatus| -> Result<(), ListenerError> {
            Err("boom".into())
        }));
        set.add(Arc::new(|_: &TrackedStatus| -> Result<(), ListenerError> {
            panic!("listener bug")
        }));
        let counter = calls.clone();
        set.add(Arc::new(move |_: &TrackedStatus| -> Result<(), ListenerError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        let report = set.notify(&status());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.outcomes[0], ListenerOutcome::Failed("boom".to_string()));
        assert_eq!(report.outcomes[1], ListenerOutcome::Panicked);
        assert_eq!(report.outcomes[2], ListenerOutcome::Delivered);
        assert_eq!(report.failures(), 2);
    }

    #[test]
    fn test_channel_listener_forwards() {
        let (listener, rx) = ChannelListener::new();
        let mut set = ListenerSet::new();
        set.add(listener);
        let report = set.notify(&status());
        assert!(report.all_delivered());
        assert_eq!(rx.try_recv().unwrap().stake, "1+000");
    }

    #[test]
    fn test_channel_listener_reports_disconnect() {
        let (listener, rx) = ChannelListener::new();
        drop(rx);
        let mut set = ListenerSet::new();
        set.add(listener);
        assert_eq!(set.notify(&status()).failures(), 1);
    }
}
