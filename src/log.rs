use log::{LevelFilter, Log, Metadata, Record};
use std::sync::RwLock;

/// Global logger that may be switched at runtime.
///
/// The adapter starts logging through `env_logger`. Once a client is attached over stdio
/// the stdout stream belongs to the protocol, so the logger is switched to one that wraps
/// records into DAP `output` events.
pub struct LoggerSwitcher {
    inner: RwLock<Option<Box<dyn Log>>>,
}

pub static LOGGER_SWITCHER: LoggerSwitcher = LoggerSwitcher {
    inner: RwLock::new(None),
};

impl LoggerSwitcher {
    /// Replace current logger with a new one. Installs the switcher as a global logger
    /// on first call.
    pub fn switch(&'static self, logger: impl Log + 'static, filter: LevelFilter) {
        if let Ok(mut inner) = self.inner.write() {
            *inner = Some(Box::new(logger));
        }
        // error means that the switcher is already installed
        _ = log::set_logger(self);
        log::set_max_level(filter);
    }
}

impl Log for LoggerSwitcher {
    fn enabled(&self, metadata: &Metadata) -> bool {
        match self.inner.read() {
            Ok(inner) => inner.as_ref().is_some_and(|l| l.enabled(metadata)),
            Err(_) => false,
        }
    }

    fn log(&self, record: &Record) {
        if let Ok(inner) = self.inner.read() {
            if let Some(logger) = inner.as_ref() {
                logger.log(record)
            }
        }
    }

    fn flush(&self) {
        if let Ok(inner) = self.inner.read() {
            if let Some(logger) = inner.as_ref() {
                logger.flush()
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serial_test::serial;
    use std::sync::{Arc, Mutex};

    struct Capture(Arc<Mutex<Vec<String>>>);

    impl Log for Capture {
        fn enabled(&self, _: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            self.0.lock().unwrap().push(record.args().to_string());
        }

        fn flush(&self) {}
    }

    #[test]
    #[serial]
    fn test_switch_logger() {
        let first = Arc::new(Mutex::new(vec![]));
        let second = Arc::new(Mutex::new(vec![]));

        LOGGER_SWITCHER.switch(Capture(first.clone()), LevelFilter::Info);
        log::info!(target: "dap", "first record");
        LOGGER_SWITCHER.switch(Capture(second.clone()), LevelFilter::Info);
        log::info!(target: "dap", "second record");

        let first = first.lock().unwrap();
        let second = second.lock().unwrap();
        assert!(first.iter().any(|r| r == "first record"));
        assert!(!first.iter().any(|r| r == "second record"));
        assert!(second.iter().any(|r| r == "second record"));
        assert!(!second.iter().any(|r| r == "first record"));
    }
}
