//! CLI module for reviewrag
//!
//! Argument parsing, terminal output and the interactive prompt.

pub mod args;
pub mod display;
pub mod input;

pub use args::{Args, Commands, FilterArgs, Verbosity};
pub use display::DisplayManager;
pub use input::{InputHandler, InputLine};
