//! Line protocol implementation.
//!
//! A telnet-style command prompt:
//! - Server sends the prompt `>>` on connect.
//! - Printable characters typed by the client are echoed back.
//! - `\r` or `\n` ends a line; its whitespace-separated tokens are looked up
//!   case-insensitively and executed in order.
//! - Server answers with `\r\n`, any command output, and a fresh prompt.
//!
//! ## Protocol Format
//!
//! ```text
//! Server:  >>
//! Client:  dir\r
//! Server:  dir\r\nDirectory...\r\n>>
//! ```
//!
//! Commands:
//! - `EX` - Stop the whole service
//! - `DIR` - Placeholder listing

pub mod command;
pub mod framer;

pub use command::{CommandContext, CommandTable};
pub use framer::{Frame, LineFramer};

/// Prompt sent after connecting and after every line.
pub const PROMPT: &[u8] = b">>";

/// Separator sent when a line terminator is received.
pub const LINE_SEPARATOR: &[u8] = b"\r\n";
