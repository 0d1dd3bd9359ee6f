//! CLI-related shared utilities.

mod color;

pub use color::{ColorWhen, TerminalEnv};
