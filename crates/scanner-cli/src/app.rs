use crate::config::ScannerConfig;
use scanner_core::{EventFeed, EventStore, Lifecycle, LogBuffer, Refresher, Scheduler, Shell};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;

/// Everything a command or worker needs, built once at startup.
pub struct AppContext {
    pub config: ScannerConfig,
    pub config_path: PathBuf,
    pub buffer: Arc<LogBuffer>,
    pub scheduler: Arc<Scheduler>,
    pub lifecycle: Arc<Lifecycle>,
    pub refresher: Arc<Refresher>,
    /// Raised by every command so the next frame jumps to the bottom.
    pub force_scroll: Arc<AtomicBool>,
    /// False when running a single command from the command line.
    pub interactive: bool,
}

impl AppContext {
    pub fn new(
        config: ScannerConfig,
        config_path: PathBuf,
        buffer: Arc<LogBuffer>,
        runtime: Handle,
        feed: Arc<dyn EventFeed>,
        shell: Arc<dyn Shell>,
        interactive: bool,
    ) -> Self {
        let scheduler = Arc::new(Scheduler::new(runtime));
        let lifecycle = Arc::new(Lifecycle::new(scheduler.clone(), shell));
        let store = Arc::new(EventStore::new(config.events_file(), config.state_file()));
        let refresher = Arc::new(Refresher::new(feed, store));

        Self {
            config,
            config_path,
            buffer,
            scheduler,
            lifecycle,
            refresher,
            force_scroll: Arc::new(AtomicBool::new(false)),
            interactive,
        }
    }

    pub fn store(&self) -> &Arc<EventStore> {
        self.refresher.store()
    }
}

/// Close signal for the host loop, raised by the lifecycle once every
/// worker has drained.
#[derive(Debug, Default)]
pub struct HostShell {
    closed: AtomicBool,
}

impl HostShell {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Shell for HostShell {
    fn close(&self) {
        tracing::debug!("Host shell closing");
        self.closed.store(true, Ordering::Release);
    }
}
