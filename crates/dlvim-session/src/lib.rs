//! This crate provides the debugging sessions of an editor integration of
//! [Delve](https://github.com/go-delve/delve), the Go debugger.
//!
//! A [SessionController] opens sessions in one of four ways:
//! - [start](SessionController::start) builds and debugs the main package
//!   of the Go module containing a directory,
//! - [debug](SessionController::debug) builds and debugs the package of a
//!   source checkout,
//! - [attach](SessionController::attach) attaches to a running process,
//! - [connect](SessionController::connect) connects to an already running
//!   headless server.
//!
//! The first three spawn a headless `dlv` server, owned by the session.
//!
//! A [Session] then drives the target (breakpoints, continue, next,
//! restart) and mirrors its state into the editor through the [Editor]
//! trait: breakpoint and program counter markers, cursor moves, and a
//! session log echoing every command the way the Delve terminal does.
//!
//! # Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use dlvim_session::{CursorLocation, Editor, SessionConfig, SessionController};
//! # async fn run(editor: Arc<dyn Editor>) -> dlvim_session::Result<()> {
//! let controller = SessionController::new(
//!     dlvim_rpc::TcpDialer,
//!     editor,
//!     SessionConfig::default(),
//! );
//!
//! let session = controller.start("/src/hello".as_ref(), &[]).await?;
//!
//! session.set_breakpoint(&["main.main"], &CursorLocation::new("main.go", 1)).await?;
//! session.continue_execution().await?;
//!
//! controller.stop().await;
//! # Ok(())
//! # }
//! ```

/// Module containing the breakpoint registry of a session.
pub mod breakpoint;

mod config;
mod controller;
mod editor;
mod error;

/// Module containing the execution state of a session.
pub mod execution;

mod format;

/// Module containing the debug server launcher.
pub mod launcher;

mod relay;
mod session;
mod state;

pub use self::breakpoint::{Breakpoint, BreakpointSpec, BreakpointSpecError};
pub use self::config::{DEFAULT_ADDR, ServerConfig, SessionConfig, Timeouts};
pub use self::controller::{READY_BANNER, SessionController};
pub use self::editor::{CursorLocation, Editor, EditorError, MarkerKind};
pub use self::error::{Error, Result};
pub use self::execution::{ExecutionSnapshot, StopOutcome};
pub use self::format::short_path;
pub use self::relay::{PROMPT, split_command};
pub use self::session::Session;
pub use self::state::{Lifecycle, SessionState};
