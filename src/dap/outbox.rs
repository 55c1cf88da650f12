use crate::dap::protocol::{DapEvent, DapRequest, DapResponse};
use crate::dap::transport::MessageSink;
use crate::error::Error;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex};

struct Sequencer {
    next_seq: i64,
    sink: Option<Box<dyn MessageSink>>,
}

impl Sequencer {
    fn write<T: Serialize>(&mut self, make: impl FnOnce(i64) -> T) -> Result<(), Error> {
        let sink = self.sink.as_mut().ok_or(Error::ConnectionClosed)?;
        let message = serde_json::to_value(make(self.next_seq))?;
        sink.write_message(&message)?;
        self.next_seq += 1;
        Ok(())
    }
}

/// Outgoing message queue of a single debug session.
///
/// The outbox owns the protocol sequence counter: a sequence number is assigned and a message
/// is written in a single critical section, so numbers on the wire are strictly increasing
/// (starting from 1) whichever thread sends a message.
#[derive(Clone)]
pub struct Outbox {
    inner: Arc<Mutex<Sequencer>>,
}

impl Outbox {
    pub fn new(sink: impl MessageSink + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Sequencer {
                next_seq: 1,
                sink: Some(Box::new(sink)),
            })),
        }
    }

    fn write<T: Serialize>(&self, make: impl FnOnce(i64) -> T) -> Result<(), Error> {
        let mut inner = self.inner.lock().map_err(|_| Error::ConnectionClosed)?;
        inner.write(make)
    }

    /// Send a successful response without body.
    pub fn respond(&self, req: &DapRequest) -> Result<(), Error> {
        self.respond_raw(req, true, None, None)
    }

    /// Send a successful response with a body.
    pub fn respond_body<T: Serialize>(&self, req: &DapRequest, body: T) -> Result<(), Error> {
        let body = serde_json::to_value(body)?;
        self.respond_raw(req, true, None, Some(body))
    }

    /// Send a failure response.
    pub fn respond_err(&self, req: &DapRequest, message: impl ToString) -> Result<(), Error> {
        self.respond_raw(req, false, Some(message.to_string()), None)
    }

    fn respond_raw(
        &self,
        req: &DapRequest,
        success: bool,
        message: Option<String>,
        body: Option<Value>,
    ) -> Result<(), Error> {
        self.write(|seq| DapResponse {
            seq,
            r#type: "response",
            request_seq: req.seq,
            success,
            command: req.command.clone(),
            message,
            body,
        })
    }

    /// Send an event without body.
    pub fn send_event(&self, event: &'static str) -> Result<(), Error> {
        self.write(|seq| DapEvent {
            seq,
            r#type: "event",
            event,
            body: None,
        })
    }

    /// Send an event with a body.
    pub fn send_event_body<T: Serialize>(&self, event: &'static str, body: T) -> Result<(), Error> {
        let body = serde_json::to_value(body)?;
        self.write(|seq| DapEvent {
            seq,
            r#type: "event",
            event,
            body: Some(body),
        })
    }

    /// Release the sink. Every message sent after is rejected.
    pub fn close(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.sink = None;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner
            .lock()
            .map(|inner| inner.sink.is_none())
            .unwrap_or(true)
    }
}
