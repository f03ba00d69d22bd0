//! Crate implementing the CLI commands.

mod cli;
mod config;
mod editor;
mod repl;
mod run;

pub use self::cli::{CliAction, CliOpts};
pub use self::config::{DlvimConfig, ServerNode, TimeoutsNode};
pub use self::editor::TerminalEditor;
pub use self::repl::{ReplCommand, run as run_repl};
pub use self::run::evaluate;
