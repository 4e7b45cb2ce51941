pub mod duration;
pub mod events;
pub mod history;
pub mod lenient;
pub mod metrics;
pub mod models;
pub mod normalizer;
pub mod poller;
pub mod source;
pub mod storage;

pub use duration::format_duration;
pub use events::{ChannelListener, EventBus, EventListener, ListenerId, MonitorEvent};
pub use history::HistoryStore;
pub use metrics::StepCounts;
pub use models::{JobHistoryEntry, JobSnapshot, JobStatus, StepReport};
pub use poller::{PollOutcome, PollingController, TrackerState};
pub use source::StatusSource;
pub use storage::KeyValueStore;
