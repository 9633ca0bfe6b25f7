use std::{
    io::{self, Write},
    sync::Mutex,
};

use indexmap::IndexMap;

/// A pane identity: which package, which subordinate process. The fixed pane names are
/// `build`, `check`, `lint`, `script`; `serve` never gets one because it doesn't block
/// and has nothing the user waits on.
pub type PaneKey = (String, &'static str);

/// Collects subordinate-process output in memory and dumps it all at the end, grouped by
/// pane, once the overall command has finished. Used whenever depot is not in `--watch`
/// mode, so the terminal only ever shows one settled report instead of interleaved
/// concurrent chatter.
pub struct OnceLogger {
    panes: Mutex<IndexMap<PaneKey, Vec<u8>>>,
}

impl OnceLogger {
    pub fn new() -> Self {
        OnceLogger {
            panes: Mutex::new(IndexMap::new()),
        }
    }

    /// Must be called for every pane a package's command may emit to before any
    /// subordinate starts. `log` panics on an unregistered pane rather than silently
    /// dropping output — a quiet fallback would mask the bug of a subordinate writing to
    /// a pane nobody declared.
    pub fn register_pane(&self, pkg: &str, pane: &'static str) {
        self.panes
            .lock()
            .unwrap()
            .entry((pkg.to_string(), pane))
            .or_default();
    }

    pub fn log(&self, pkg: &str, pane: &'static str, data: &[u8]) {
        let mut panes = self.panes.lock().unwrap();
        let buf = panes.get_mut(&(pkg.to_string(), pane)).unwrap_or_else(|| {
            panic!(
                "OnceLogger::log called for unregistered pane ({pkg}, {pane}); \
                 register_pane must be called before the subordinate process starts"
            )
        });
        buf.extend_from_slice(data);
    }

    /// Dumps every pane, in registration order, each preceded by a bold header and
    /// followed by a rule of dots. Threadsafe under concurrent `log` calls throughout the
    /// command's lifetime; `end` is only ever called once, after every subordinate has
    /// finished.
    pub fn end(&self) {
        let panes = self.panes.lock().unwrap();
        let mut stdout = io::stdout().lock();
        for ((pkg, pane), data) in panes.iter() {
            if data.is_empty() {
                continue;
            }
            let _ = writeln!(stdout, "\x1b[1m{pkg} :: {pane}\x1b[0m");
            let _ = stdout.write_all(data);
            if !data.ends_with(b"\n") {
                let _ = writeln!(stdout);
            }
            let _ = writeln!(stdout, "{}", ".".repeat(40));
        }
        let _ = stdout.flush();
    }
}

impl Default for OnceLogger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn preserves_insertion_order_per_pane() {
        let logger = OnceLogger::new();
        logger.register_pane("foo", "build");
        logger.log("foo", "build", b"first ");
        logger.log("foo", "build", b"second");

        let panes = logger.panes.lock().unwrap();
        let buf = panes.get(&("foo".to_string(), "build")).unwrap();
        assert_eq!(buf, b"first second");
    }

    #[test]
    #[should_panic(expected = "unregistered pane")]
    fn panics_on_unregistered_pane() {
        let logger = OnceLogger::new();
        logger.log("foo", "build", b"data");
    }
}
