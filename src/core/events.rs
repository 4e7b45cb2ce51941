//! Observer registration for the rendering side.
//!
//! The poller and the history store publish [`MonitorEvent`]s on a shared
//! [`EventBus`]. Consumers register an [`EventListener`]; closures qualify,
//! and [`ChannelListener`] bridges into async code.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;

use super::models::{JobHistoryEntry, JobSnapshot};

/// Events that the rendering collaborator observes
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// A fresh status poll for the tracked job.
    Snapshot(JobSnapshot),
    /// The tracked job reached a terminal status. Emitted once per job.
    JobCompleted(JobHistoryEntry),
    /// The visible history collection changed; carries the new ordering.
    HistoryChanged(Vec<JobHistoryEntry>),
}

pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &MonitorEvent);
}

impl<F> EventListener for F
where
    F: Fn(&MonitorEvent) + Send + Sync,
{
    fn on_event(&self, event: &MonitorEvent) {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<RwLock<Vec<(ListenerId, Arc<dyn EventListener>)>>>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn EventListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, listener));
        id
    }

    /// Returns false if the listener was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn emit(&self, event: &MonitorEvent) {
        // Snapshot the list so listeners may (un)subscribe from inside a callback.
        let listeners: Vec<Arc<dyn EventListener>> = self
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        for listener in listeners {
            listener.on_event(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Forwards every event into an unbounded channel.
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<MonitorEvent>,
}

impl ChannelListener {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MonitorEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl EventListener for ChannelListener {
    fn on_event(&self, event: &MonitorEvent) {
        // Receiver gone means nobody is watching anymore
        let _ = self.tx.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn closures_receive_events_until_unsubscribed() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&seen);
        let id = bus.subscribe(Arc::new(move |_: &MonitorEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        bus.emit(&MonitorEvent::HistoryChanged(Vec::new()));
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(&MonitorEvent::HistoryChanged(Vec::new()));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count(), 0);
    }

    #[tokio::test]
    async fn channel_listener_forwards() {
        let bus = EventBus::new();
        let (listener, mut rx) = ChannelListener::new();
        bus.subscribe(listener);

        let entry = JobHistoryEntry {
            job_id: "1".into(),
            ..Default::default()
        };
        bus.emit(&MonitorEvent::JobCompleted(entry));

        match rx.recv().await {
            Some(MonitorEvent::JobCompleted(e)) => assert_eq!(e.job_id, "1"),
            other => panic!("expected JobCompleted, got {:?}", other),
        }
    }

    #[test]
    fn clones_share_listeners() {
        let bus = EventBus::new();
        let other = bus.clone();
        other.subscribe(Arc::new(|_: &MonitorEvent| {}));
        assert_eq!(bus.listener_count(), 1);
    }
}
