//! Behavioural test suites for the daemon.

mod session_behaviour;
pub(crate) mod support;
