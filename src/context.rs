use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::{EventBus, HistoryStore, KeyValueStore, PollingController, StatusSource};

/// Everything the monitor runs on, constructed once and passed explicitly to
/// whoever renders or drives it.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub events: EventBus,
    pub history: HistoryStore,
    pub tracker: PollingController,
}

impl AppContext {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn KeyValueStore>,
        source: Arc<dyn StatusSource>,
    ) -> Self {
        let events = EventBus::new();
        let history = HistoryStore::with_limit(store, events.clone(), config.history_limit);
        let tracker = PollingController::with_interval(
            source,
            history.clone(),
            events.clone(),
            config.poll_interval(),
        );

        Self {
            config: Arc::new(config),
            events,
            history,
            tracker,
        }
    }
}
