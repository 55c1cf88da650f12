//! Polling file watchers.
//!
//! Used for the debugger side-channel file (every change is a new stop location) and for the
//! configuration file (every change recomputes the debugger command terminator).

use crate::config::Settings;
use crate::port::LineTerminator;
use crate::state::{DebugLocation, DebugStateStack};
use crate::weak_error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct Stamp {
    modified: Option<SystemTime>,
    len: u64,
}

impl Stamp {
    fn of(path: &Path) -> Option<Self> {
        let meta = fs::metadata(path).ok()?;
        Some(Self {
            modified: meta.modified().ok(),
            len: meta.len(),
        })
    }
}

/// Watch a file for changes in a background thread, stops when dropped.
pub struct FileWatcher {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FileWatcher {
    /// Start watching. The callback receives new file content on every change.
    ///
    /// A file existing at start is considered as already seen.
    pub fn spawn(
        path: impl Into<PathBuf>,
        interval: Duration,
        mut on_change: impl FnMut(&str) + Send + 'static,
    ) -> std::io::Result<Self> {
        let path = path.into();
        let stop = Arc::new(AtomicBool::new(false));
        // taken before the thread starts, a write right after `spawn` is never missed
        let mut last = Stamp::of(&path);

        let handle = thread::Builder::new()
            .name(format!("watch {}", path.display()))
            .spawn({
                let path = path.clone();
                let stop = stop.clone();
                move || {
                    while !stop.load(Ordering::Acquire) {
                        thread::sleep(interval);
                        let current = Stamp::of(&path);
                        if current == last {
                            continue;
                        }
                        last = current;
                        if current.is_none() {
                            continue;
                        }
                        if let Some(content) = weak_error!(fs::read_to_string(&path), "read watched file:") {
                            on_change(&content);
                        }
                    }
                }
            })?;
        log::debug!(target: "dap", "watching {}", path.display());
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            _ = handle.join();
        }
    }
}

/// Push a new location into the stack every time the debugger rewrites the side-channel file.
pub fn watch_debug_info(
    path: impl Into<PathBuf>,
    interval: Duration,
    stack: Arc<DebugStateStack>,
) -> std::io::Result<FileWatcher> {
    FileWatcher::spawn(path, interval, move |content| {
        if let Some(location) = weak_error!(DebugLocation::parse_notification(content)) {
            stack.push(location);
        }
    })
}

/// Recompute debugger command terminator every time the configuration file changes.
pub fn watch_settings(
    path: impl Into<PathBuf>,
    interval: Duration,
    terminator: LineTerminator,
) -> std::io::Result<FileWatcher> {
    FileWatcher::spawn(path, interval, move |content| {
        if let Some(settings) = weak_error!(Settings::from_toml(content), "reload settings:") {
            log::info!(target: "dap", "configuration changed, backend: {}", settings.backend);
            terminator.apply_settings(&settings);
        }
    })
}
