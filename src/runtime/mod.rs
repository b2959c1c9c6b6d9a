//! Thread-per-connection runtime.
//!
//! - `Server`: listening socket and acceptor loop
//! - `ConnectionHandler`: one thread per client
//! - `ShutdownFlag`: cooperative stop signal shared by every loop
//!
//! Both loops block only in readiness polling with a short timeout, so a
//! shutdown request is seen within one poll interval.

mod acceptor;
mod connection;
mod handoff;
mod registry;
mod shutdown;

pub use acceptor::Server;
pub use shutdown::{ShutdownFlag, ShutdownReason};
