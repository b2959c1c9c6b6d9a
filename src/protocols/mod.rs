//! Protocol implementations.
//!
//! - `line`: the line-oriented command prompt served on every connection

pub mod line;
