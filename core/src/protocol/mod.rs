//! Wire protocol for the auditing peripheral.
//!
//! The link speaks a line-oriented text protocol in both directions:
//! outbound operator commands (`command`) and inbound notification frames
//! (`event`). Payloads are UTF-8 and pipe-delimited; see each submodule for
//! the exact grammar.

pub mod command;
pub mod event;

pub use command::Command;
pub use event::{parse, Event};
