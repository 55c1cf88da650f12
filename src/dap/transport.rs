//! DAP transport layer.
//! Supports both stdio (default, the editor spawns the adapter) and TCP (server mode).

use crate::dap::tracer::{Direction, FileTracer};
use crate::error::Error;
use serde_json::Value;
use std::io::{self, BufRead, BufReader, Stdin, Stdout, Write};
use std::net::TcpStream;
use std::sync::mpsc::Sender;

/// Upper bound of an incoming message body.
const MAX_CONTENT_LENGTH: usize = 16 * 1024 * 1024;

/// Sink for outgoing DAP messages.
pub trait MessageSink: Send {
    /// Write a single DAP message (with Content-Length framing).
    fn write_message(&mut self, message: &Value) -> Result<(), Error>;
}

/// Reading half of a DAP connection.
pub struct DapReader<R: BufRead> {
    reader: R,
    tracer: Option<FileTracer>,
}

impl<R: BufRead> DapReader<R> {
    pub fn new(reader: R, tracer: Option<FileTracer>) -> Self {
        Self { reader, tracer }
    }

    /// Read a single DAP message (with Content-Length framing).
    pub fn read_message(&mut self) -> Result<Value, Error> {
        let mut content_length: Option<usize> = None;
        loop {
            let mut line = String::new();
            let read_n = self.reader.read_line(&mut line)?;
            if read_n == 0 {
                return Err(Error::ConnectionClosed);
            }
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                if content_length.is_some() {
                    break;
                }
                continue;
            }
            if let Some(v) = line.strip_prefix("Content-Length:") {
                content_length = Some(v.trim().parse().map_err(|_| {
                    Error::Protocol(format!("invalid Content-Length header: {line:?}"))
                })?);
            }
        }

        let len = content_length
            .ok_or_else(|| Error::Protocol("missing Content-Length header".to_string()))?;
        if len > MAX_CONTENT_LENGTH {
            return Err(Error::Protocol(format!(
                "Content-Length {len} exceeds limit of {MAX_CONTENT_LENGTH} bytes"
            )));
        }
        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf)?;
        let msg: Value = serde_json::from_slice(&buf)?;
        if let Some(tracer) = &self.tracer {
            tracer.message(Direction::Incoming, &msg);
        }
        Ok(msg)
    }
}

/// Writing half of a DAP connection.
pub struct DapWriter<W: Write> {
    writer: W,
    tracer: Option<FileTracer>,
}

impl<W: Write> DapWriter<W> {
    pub fn new(writer: W, tracer: Option<FileTracer>) -> Self {
        Self { writer, tracer }
    }
}

impl<W: Write + Send> MessageSink for DapWriter<W> {
    fn write_message(&mut self, message: &Value) -> Result<(), Error> {
        let payload = serde_json::to_vec(message)?;
        if let Some(tracer) = &self.tracer {
            tracer.message(Direction::Outgoing, message);
        }
        write!(self.writer, "Content-Length: {}\r\n\r\n", payload.len())?;
        self.writer.write_all(&payload)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// In-process sink, every message goes into a channel.
impl MessageSink for Sender<Value> {
    fn write_message(&mut self, message: &Value) -> Result<(), Error> {
        self.send(message.clone())
            .map_err(|_| Error::ConnectionClosed)
    }
}

/// Stdio-based transport.
pub fn stdio(tracer: Option<FileTracer>) -> (DapReader<BufReader<Stdin>>, DapWriter<Stdout>) {
    (
        DapReader::new(BufReader::new(io::stdin()), tracer.clone()),
        DapWriter::new(io::stdout(), tracer),
    )
}

/// TCP-based transport.
pub fn tcp(
    stream: TcpStream,
    tracer: Option<FileTracer>,
) -> Result<(DapReader<BufReader<TcpStream>>, DapWriter<TcpStream>), Error> {
    stream.set_nodelay(true)?;
    let reader = BufReader::new(stream.try_clone()?);
    Ok((
        DapReader::new(reader, tracer.clone()),
        DapWriter::new(stream, tracer),
    ))
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    #[test]
    fn test_framing() {
        let mut buf = vec![];
        {
            let mut writer = DapWriter::new(&mut buf, None);
            writer.write_message(&json!({"seq": 1})).unwrap();
            writer.write_message(&json!({"seq": 2, "type": "event"})).unwrap();
        }
        assert!(buf.starts_with(b"Content-Length: 9\r\n\r\n{\"seq\":1}"));

        let mut reader = DapReader::new(Cursor::new(buf), None);
        assert_eq!(reader.read_message().unwrap(), json!({"seq": 1}));
        assert_eq!(
            reader.read_message().unwrap(),
            json!({"seq": 2, "type": "event"})
        );
        assert!(matches!(
            reader.read_message(),
            Err(Error::ConnectionClosed)
        ));
    }

    #[test]
    fn test_bad_header() {
        let mut reader = DapReader::new(Cursor::new(b"Content-Length: x\r\n\r\n{}".to_vec()), None);
        assert!(matches!(reader.read_message(), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_oversized_message() {
        let header = format!("Content-Length: {}\r\n\r\n{{}}", MAX_CONTENT_LENGTH + 1);
        let mut reader = DapReader::new(Cursor::new(header.into_bytes()), None);
        assert!(matches!(reader.read_message(), Err(Error::Protocol(_))));
    }
}
