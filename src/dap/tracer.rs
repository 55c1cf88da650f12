use crate::error::Error;
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

/// Traffic direction of a traced DAP message.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    /// From the client to the adapter.
    Incoming,
    /// From the adapter to the client.
    Outgoing,
}

impl Direction {
    fn arrow(self) -> &'static str {
        match self {
            Direction::Incoming => "<-",
            Direction::Outgoing => "->",
        }
    }
}

/// Append-only diagnostics file shared by the transport and the session loop.
#[derive(Clone)]
pub struct FileTracer {
    file: Arc<Mutex<File>>,
}

impl FileTracer {
    pub fn new(path: &Path) -> Result<Self, Error> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }

    /// Write a free-form line prefixed with a unix timestamp (in milliseconds).
    pub fn line(&self, text: &str) {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        if let Ok(mut file) = self.file.lock() {
            _ = writeln!(file, "[{millis}] {text}");
        }
    }

    /// Write a DAP message on a single line.
    pub fn message(&self, direction: Direction, message: &Value) {
        self.line(&format!("{} {message}", direction.arrow()));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;
    use std::fs;

    #[test]
    fn test_trace_messages() {
        let path = std::env::temp_dir().join(format!("logtalk-dap-trace-{}", std::process::id()));
        _ = fs::remove_file(&path);

        let tracer = FileTracer::new(&path).unwrap();
        tracer.message(Direction::Incoming, &json!({"seq": 1}));
        tracer.clone().message(Direction::Outgoing, &json!({"seq": 2}));
        tracer.line("session finished OK");

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text
            .lines()
            .map(|l| l.split_once("] ").unwrap().1)
            .collect();
        assert_eq!(
            lines,
            vec![r#"<- {"seq":1}"#, r#"-> {"seq":2}"#, "session finished OK"]
        );

        _ = fs::remove_file(&path);
    }
}
