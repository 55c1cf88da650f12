use crate::dap::outbox::Outbox;
use crate::dap::protocol::OutputEventBody;
use log::LevelFilter;
use std::fmt::Write as _;

/// Logger that forwards log records to the DAP client as `output` events.
///
/// Used in stdio mode, where stdout is the protocol channel.
pub struct DapLogger {
    inner: env_logger::Logger,
    outbox: Outbox,
}

impl DapLogger {
    pub fn new(outbox: Outbox) -> Self {
        Self {
            inner: env_logger::Logger::from_default_env(),
            outbox,
        }
    }

    pub fn filter(&self) -> LevelFilter {
        self.inner.filter()
    }
}

impl log::Log for DapLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if !self.inner.matches(record) {
            return;
        }

        let mut output = String::new();
        _ = write!(output, "[{}] ", record.level());
        if let Some(module) = record.module_path() {
            _ = write!(output, "{module} ");
        }
        _ = writeln!(output, "{}", record.args());

        // nothing to do if the client is gone
        _ = self.outbox.send_event_body(
            "output",
            OutputEventBody {
                category: "console",
                output,
            },
        );
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod test {
    use super::*;
    use log::Log;
    use serde_json::json;
    use std::sync::mpsc;

    #[test]
    fn test_records_become_output_events() {
        let (tx, rx) = mpsc::channel();
        let logger = DapLogger::new(Outbox::new(tx));

        logger.log(
            &log::Record::builder()
                .level(log::Level::Error)
                .module_path(Some("logtalk_dap::watcher"))
                .args(format_args!("oops"))
                .build(),
        );

        let event = rx.try_recv().unwrap();
        assert_eq!(event["event"], json!("output"));
        assert_eq!(
            event["body"],
            json!({"category": "console", "output": "[ERROR] logtalk_dap::watcher oops\n"})
        );
    }
}
