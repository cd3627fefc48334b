//! TCP listener for the command server.
//!
//! The transport module binds the configured endpoint, accepts connections in
//! a background thread and hands each one to a [`ConnectionHandler`] on its
//! own thread.

mod errors;
mod handler;
mod listener;
mod response;
#[cfg(test)]
mod test_utils;

pub use self::errors::ListenerError;
#[cfg(test)]
pub(crate) use self::handler::MAX_LINE_BYTES;
pub(crate) use self::handler::{ConnectionHandler, LineReader};
pub(crate) use self::listener::{ListenerHandle, SocketListener};
pub(crate) use self::response::ResponseWriter;
#[cfg(test)]
pub(crate) use self::test_utils::{CountingHandler, wait_for};

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
