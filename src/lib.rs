pub mod clause;
pub mod config;
pub mod dap;
pub mod error;
pub mod log;
pub mod port;
pub mod state;
pub mod terminal;
pub mod watcher;

pub use error::Error;
