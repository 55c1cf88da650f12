//! Debugger stop locations.
//!
//! The terminal debugger reports nothing but the place where it stopped, so the stack is a
//! log of stops during a single run. There is no pop: the side-channel never tells that a
//! call returned, the log is reset as a whole by [`DebugStateStack::clear`].

use crate::error::Error;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;

/// A place where the debugger stopped at a port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugLocation {
    pub file: PathBuf,
    /// 1-based line number.
    pub line: u32,
    /// Clause head as reported by the debugger (with bound arguments).
    pub head: String,
}

impl DebugLocation {
    pub fn new(file: impl Into<PathBuf>, line: u32, head: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            head: head.into(),
        }
    }

    /// Parse the debugger side-channel notification.
    ///
    /// Expected format is `File:<path>;Line:<digits>;Head:<text>`, the last non-empty line
    /// of the text is used.
    pub fn parse_notification(text: &str) -> Result<Self, Error> {
        static RE: OnceLock<Regex> = OnceLock::new();
        let re = RE.get_or_init(|| {
            Regex::new(r"^File:(?P<file>.+?);Line:(?P<line>\d+);Head:(?P<head>.*)$")
                .expect("valid regex")
        });

        let line = text
            .lines()
            .map(str::trim_end)
            .filter(|l| !l.is_empty())
            .last()
            .ok_or_else(|| Error::BadNotification(text.to_string()))?;

        let caps = re
            .captures(line)
            .ok_or_else(|| Error::BadNotification(line.to_string()))?;
        let line_num = caps["line"]
            .parse::<u32>()
            .map_err(|_| Error::BadNotification(line.to_string()))?;

        Ok(Self {
            file: PathBuf::from(normalize_path(&caps["file"], cfg!(windows))),
            line: line_num,
            head: caps["head"].trim().to_string(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.file
    }
}

/// Normalize a path reported by the debugger.
///
/// Backslash separators (escaped or not) become forward slashes. On windows a leading
/// double slash before a drive letter (`//C:/...`) loses the extra slash.
pub fn normalize_path(path: &str, windows: bool) -> String {
    let path = path.replace("\\\\", "/").replace('\\', "/");
    if windows {
        let mut chars = path.chars();
        let is_unc_drive = chars.next() == Some('/')
            && chars.next() == Some('/')
            && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
            && chars.next() == Some(':');
        if is_unc_drive {
            return path[1..].to_string();
        }
    }
    path
}

/// Stack change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackChange {
    Pushed(DebugLocation),
    Cleared,
}

#[derive(Default)]
struct StackInner {
    locations: Vec<DebugLocation>,
    subscribers: Vec<(u64, Sender<StackChange>)>,
    next_subscriber_id: u64,
}

/// Observable stack of debugger stop locations, most recent last.
///
/// Shared between the side-channel watcher (single writer) and debug sessions.
#[derive(Default)]
pub struct DebugStateStack {
    inner: Mutex<StackInner>,
}

impl DebugStateStack {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Append a location and notify subscribers.
    pub fn push(&self, location: DebugLocation) {
        log::debug!(
            target: "dap",
            "debugger stopped at {}:{} {}",
            location.file.display(),
            location.line,
            location.head
        );
        if let Ok(mut inner) = self.inner.lock() {
            inner.locations.push(location.clone());
            Self::notify(&mut inner, StackChange::Pushed(location));
        }
    }

    /// Remove all locations and notify subscribers.
    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.locations.clear();
            Self::notify(&mut inner, StackChange::Cleared);
        }
    }

    /// Most recent location.
    pub fn top(&self) -> Option<DebugLocation> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.locations.last().cloned())
    }

    /// All locations, most recent last.
    pub fn all(&self) -> Vec<DebugLocation> {
        self.inner
            .lock()
            .map(|inner| inner.locations.clone())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.inner
            .lock()
            .map(|inner| inner.locations.is_empty())
            .unwrap_or(true)
    }

    /// Subscribe to stack changes. Subscription is detached when dropped.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let (tx, rx) = mpsc::channel();
        let mut id = 0;
        if let Ok(mut inner) = self.inner.lock() {
            id = inner.next_subscriber_id;
            inner.next_subscriber_id += 1;
            inner.subscribers.push((id, tx));
        }
        Subscription {
            id,
            rx,
            stack: Arc::downgrade(self),
        }
    }

    pub fn subscribers_count(&self) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.subscribers.len())
            .unwrap_or_default()
    }

    fn unsubscribe(&self, id: u64) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.subscribers.retain(|(sub_id, _)| *sub_id != id);
        }
    }

    fn notify(inner: &mut StackInner, change: StackChange) {
        inner
            .subscribers
            .retain(|(_, tx)| tx.send(change.clone()).is_ok());
    }
}

/// Receiving side of a stack subscription.
pub struct Subscription {
    id: u64,
    rx: Receiver<StackChange>,
    stack: Weak<DebugStateStack>,
}

impl Subscription {
    pub fn recv_timeout(&self, timeout: Duration) -> Result<StackChange, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    pub fn try_recv(&self) -> Option<StackChange> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(stack) = self.stack.upgrade() {
            stack.unsubscribe(self.id);
        }
    }
}
