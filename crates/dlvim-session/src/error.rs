use std::time::Duration;

use crate::breakpoint::BreakpointSpecError;
use crate::editor::EditorError;
use crate::state::SessionState;

/// Error type of this crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The debug server could not be launched, or never reported a process.
    #[error("cannot start the debug server: {0}")]
    ServerStart(String),

    /// The connection to the debug server failed.
    #[error("{op}: {source}")]
    Connection {
        /// Operation during which the connection failed.
        op: &'static str,

        /// Transport error.
        #[source]
        source: dlvim_rpc::Error,
    },

    /// The operation requires a connected session.
    #[error("{op}: no connection to the debug server (session is {state})")]
    NotConnected {
        /// Rejected operation.
        op: &'static str,

        /// State of the session when the operation was attempted.
        state: SessionState,
    },

    /// Malformed breakpoint arguments.
    #[error(transparent)]
    BreakpointSpec(#[from] BreakpointSpecError),

    /// The debug server reported a failure.
    #[error("{op}: {source}")]
    ServerCall {
        /// Failed operation.
        op: &'static str,

        /// Error reported by the server.
        #[source]
        source: dlvim_rpc::Error,
    },

    /// The debug server did not answer in time.
    #[error("{op}: no answer from the debug server after {after:?}")]
    Timeout {
        /// Operation which timed out.
        op: &'static str,

        /// Deadline of the operation.
        after: Duration,
    },

    /// The operation was abandoned because the session stopped.
    #[error("{op}: cancelled")]
    Cancelled {
        /// Abandoned operation.
        op: &'static str,
    },

    /// Another continue/next/restart is in progress.
    #[error("{op}: the target is already being resumed")]
    Busy {
        /// Rejected operation.
        op: &'static str,
    },

    /// The session state machine forbids the transition.
    #[error("invalid session transition: {from} -> {to}")]
    InvalidTransition {
        /// Current state.
        from: SessionState,

        /// Requested state.
        to: SessionState,
    },

    /// The server assigned an ID already used in this session.
    #[error("breakpoint ID {0} was already used in this session")]
    ReusedBreakpointId(u32),

    /// The server stopped the target without reporting a thread.
    #[error("{op}: the debug server reported no stopped thread")]
    NoCurrentThread {
        /// Resuming operation.
        op: &'static str,
    },

    /// The breakpoint is not known to the session.
    #[error("unknown breakpoint: {0}")]
    UnknownBreakpoint(u32),

    /// The process ID to attach to is not a number.
    #[error("invalid process ID: {0:?}")]
    InvalidPid(String),

    /// No session is active.
    #[error("no active debugging session")]
    NoSession,

    /// Editor collaborator error.
    #[error(transparent)]
    Editor(#[from] EditorError),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Maps an RPC error to the corresponding error kind.
    pub(crate) fn from_rpc(op: &'static str, source: dlvim_rpc::Error) -> Self {
        if source.is_transport() {
            Self::Connection { op, source }
        } else {
            Self::ServerCall { op, source }
        }
    }

    /// Whether the error leaves the session unusable.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::ServerStart(_) | Self::Connection { .. })
    }
}

/// Result type of this crate.
pub type Result<T> = core::result::Result<T, Error>;
