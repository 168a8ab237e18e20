//! Command-line interface

pub mod commands;

pub use commands::{Command, NoteArg, Opt};
