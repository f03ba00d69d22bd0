//! This crate provides the client side of the Delve headless server API
//! (`dlv --headless --api-version=2`).
//!
//! Two main components are provided:
//! - The [DebugClient](self::client::DebugClient) and
//!   [Dialer](self::client::Dialer) traits, describing the narrow set of
//!   remote calls an editor integration needs (breakpoints, continue, step,
//!   restart, state, goroutines, functions, process ID).
//! - A default implementation of these traits speaking Go's
//!   `net/rpc/jsonrpc` framing over TCP, see [JsonRpcClient].
//!
//! # Example
//!
//! ```no_run
//! use dlvim_rpc::client::{DebugClient, Dialer};
//! use dlvim_rpc::{Breakpoint, TcpDialer};
//!
//! #[tokio::main]
//! async fn main() -> dlvim_rpc::Result<()> {
//!     let client = TcpDialer::default().dial("localhost:41222").await?;
//!
//!     let bp = client
//!         .create_breakpoint(Breakpoint::at_function("main.main"))
//!         .await?;
//!
//!     // blocks until the target stops (or exits)
//!     let state = client.continue_execution().await?;
//!
//!     println!("breakpoint {} hit: {:?}", bp.id, state.current_thread);
//!     Ok(())
//! }
//! ```
//!
//! The adapter does not impose any deadline on its calls. A caller that
//! needs bounded waiting is expected to race the returned futures against
//! its own timer or cancellation signal.

/// Module containing wire types of the server API.
pub mod api;

/// Module containing the capability traits implemented by RPC clients.
pub mod client;

mod error;
mod jsonrpc;

pub use self::api::{Breakpoint, DebuggerState, Function, Goroutine, Location, Thread};
pub use self::error::{Error, Result};
pub use self::jsonrpc::{JsonRpcClient, TcpDialer};
