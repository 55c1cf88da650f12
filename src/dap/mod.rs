//! Debug Adapter Protocol server.

pub mod logger;
pub mod outbox;
pub mod protocol;
pub mod session;
pub mod tracer;
pub mod transport;
