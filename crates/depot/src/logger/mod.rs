mod once;
mod watch;

use std::sync::Arc;

use anyhow::Result;

pub use once::OnceLogger;
pub use watch::{PANES, WatchLogger};

use crate::workspace::process;

/// Two variants over one capability set (`start`/`log`/`end`), selected once at
/// construction and never switched at runtime: once-mode collects and dumps after the
/// command succeeds, watch-mode drives a live multi-pane TUI.
#[derive(Clone)]
pub enum Logger {
    Once(Arc<OnceLogger>),
    Watch(Arc<WatchLogger>),
}

impl Logger {
    pub fn once() -> Self {
        Logger::Once(Arc::new(OnceLogger::new()))
    }

    pub fn watch(packages: Vec<String>, initial: Option<&str>) -> Self {
        Logger::Watch(Arc::new(WatchLogger::new(packages, initial)))
    }

    pub fn is_watch(&self) -> bool {
        matches!(self, Logger::Watch(_))
    }

    /// Registers every fixed pane name for `pkg` up front. The build orchestrator calls
    /// this before spawning any subordinate so a producer never logs to an unregistered
    /// pane.
    pub fn register_package(&self, pkg: &str) {
        for pane in PANES {
            self.register_pane(pkg, pane);
        }
    }

    pub fn register_pane(&self, pkg: &str, pane: &'static str) {
        match self {
            Logger::Once(l) => l.register_pane(pkg, pane),
            Logger::Watch(l) => l.register_pane(pkg, pane),
        }
    }

    pub fn log(&self, pkg: &str, pane: &'static str, data: &[u8]) {
        match self {
            Logger::Once(l) => l.log(pkg, pane, data),
            Logger::Watch(l) => l.log(pkg, pane, data),
        }
    }

    /// Builds the `on_data` sink a [`Process`](process::Process) forwards chunks to,
    /// tagging every chunk with `(pkg, pane)` before it reaches this logger.
    pub fn sink(&self, pkg: String, pane: &'static str) -> process::OnData {
        let logger = self.clone();
        Box::new(move |data: &[u8]| logger.log(&pkg, pane, data))
    }

    /// Starts the watch-mode TUI on a dedicated thread. A no-op for once-mode, which has
    /// nothing to render until `end`.
    pub fn start(&self) -> Option<std::thread::JoinHandle<Result<()>>> {
        match self {
            Logger::Once(_) => None,
            Logger::Watch(l) => Some(watch::spawn_watch_ui(l.clone())),
        }
    }

    /// Dumps the collected once-mode output. Watch-mode panes are already on screen, so
    /// this is a no-op there — the user quits the TUI explicitly instead.
    pub fn end(&self) {
        if let Logger::Once(l) = self {
            l.end();
        }
    }

    pub fn is_shutdown(&self) -> bool {
        match self {
            Logger::Once(_) => false,
            Logger::Watch(l) => l.is_shutdown(),
        }
    }
}
