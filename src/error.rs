use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- generic errors --------------------------------------------
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    // --------------------------------- configuration errors --------------------------------------
    #[error("invalid configuration file {0}: {1}")]
    Toml(PathBuf, toml::de::Error),
    #[error("unknown logtalk backend `{0}`")]
    UnknownBackend(String),
    #[error("logtalk executable `{0}` not found")]
    ExecutableNotFound(String),

    // --------------------------------- side-channel errors ---------------------------------------
    #[error("malformed debug notification: {0:?}")]
    BadNotification(String),

    // --------------------------------- terminal errors -------------------------------------------
    #[error("logtalk terminal is not running")]
    TerminalNotRunning,

    // --------------------------------- protocol errors -------------------------------------------
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("DAP connection closed")]
    ConnectionClosed,
}

#[macro_export]
macro_rules! _error {
    ($log_fn: path, $res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "dap", "{:#}", e);
                None
            }
        }
    };
    ($log_fn: path, $res: expr, $msg: tt) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "dap", concat!($msg, " {:#}"), e);
                None
            }
        }
    };
}

/// Transforms `Result` into `Option` and logs an error if it occurs.
#[macro_export]
macro_rules! weak_error {
    ($res: expr) => {
        $crate::_error!(log::warn, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::warn, $res, $msg)
    };
}

/// Transforms `Result` into `Option` and put error into debug logs if it occurs.
#[macro_export]
macro_rules! muted_error {
    ($res: expr) => {
        $crate::_error!(log::debug, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::debug, $res, $msg)
    };
}
