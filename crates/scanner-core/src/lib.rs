pub mod error;
pub mod event;
pub mod query;
pub mod log_buffer;
pub mod render;
pub mod scheduler;
pub mod lifecycle;
pub mod store;
pub mod ingest;

pub use error::{Result, ScannerError};
pub use event::{normalize, normalize_str, Event, EventId, FieldPath, DEFAULT_SEARCH_FIELDS};
pub use query::{
    evaluate, parse_limit, parse_strict, Filter, GroupResult, Query, ResultSet, ScoredEvent,
    SortKey,
};
pub use log_buffer::{LogBuffer, Snapshot, DEFAULT_MAX_LINES};
pub use render::{Frame, Redraw, RenderTracker};
pub use scheduler::{cancel_pair, CancelToken, Canceller, Scheduler, Worker, WorkerOutcome};
pub use lifecycle::{Lifecycle, LifecycleState, Shell, ShutdownReport};
pub use store::EventStore;
pub use ingest::{EventFeed, Refresher};
