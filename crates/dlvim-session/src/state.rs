use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::Error;

/// Lifecycle state of a debugging session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Created, nothing started yet.
    Idle,

    /// The debug server process is being spawned.
    Launching,

    /// Waiting for the debug server to accept a connection.
    Connecting,

    /// Connected, the target is stopped.
    Ready,

    /// A continue/next/restart is in flight.
    Stepping,

    /// Stopped on request.
    Terminated,

    /// Stopped on a fatal error.
    Errored,
}

impl SessionState {
    /// Whether the state machine allows moving from `self` to `next`.
    pub const fn can_transition_to(self, next: Self) -> bool {
        use SessionState::*;

        match (self, next) {
            (Idle, Launching | Connecting)
            | (Launching, Connecting)
            | (Connecting, Ready)
            | (Ready, Stepping)
            | (Stepping, Ready) => true,
            (Terminated | Errored, _) => false,
            (_, Terminated | Errored) => true,
            _ => false,
        }
    }

    /// Whether no further transition is possible.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated | Self::Errored)
    }

    /// Whether the debug server connection is usable.
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Ready | Self::Stepping)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Launching => "launching",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Stepping => "stepping",
            Self::Terminated => "terminated",
            Self::Errored => "errored",
        };

        f.write_str(s)
    }
}

/// Shared lifecycle of a session.
///
/// Every transition is checked against [SessionState::can_transition_to],
/// atomically with respect to concurrent transitions.
#[derive(Debug)]
pub struct Lifecycle {
    tx: watch::Sender<SessionState>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// Creates an idle lifecycle.
    pub fn new() -> Self {
        Self {
            tx: watch::Sender::new(SessionState::Idle),
        }
    }

    /// Current state.
    pub fn current(&self) -> SessionState {
        *self.tx.borrow()
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    /// Moves to `next`, returning the previous state.
    pub fn transition(&self, next: SessionState) -> crate::Result<SessionState> {
        self.transition_if(next, |_| Ok(()))
    }

    /// Moves to [Errored](SessionState::Errored), unless already terminal.
    ///
    /// Returns whether the state changed.
    pub fn fail(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if state.is_terminal() {
                return false;
            }

            tracing::debug!(from = %state, "session errored");
            *state = SessionState::Errored;
            true
        })
    }

    /// Checks that remote calls can be issued.
    pub fn ensure_connected(&self, op: &'static str) -> crate::Result<()> {
        match self.current() {
            state if state.is_connected() => Ok(()),
            state => Err(Error::NotConnected { op, state }),
        }
    }

    /// Moves from [Ready](SessionState::Ready) to
    /// [Stepping](SessionState::Stepping).
    ///
    /// Fails with [Busy](Error::Busy) if another resume is in flight.
    pub fn begin_resume(&self, op: &'static str) -> crate::Result<()> {
        self.transition_if(SessionState::Stepping, |state| match state {
            SessionState::Ready => Ok(()),
            SessionState::Stepping => Err(Error::Busy { op }),
            state => Err(Error::NotConnected { op, state }),
        })
        .map(|_| ())
    }

    /// Moves back from [Stepping](SessionState::Stepping) to
    /// [Ready](SessionState::Ready).
    ///
    /// Does nothing if the session stopped meanwhile.
    pub fn end_resume(&self) {
        self.tx.send_if_modified(|state| {
            if *state != SessionState::Stepping {
                return false;
            }

            *state = SessionState::Ready;
            true
        });
    }

    /// Begins a resume, ended once the returned guard is dropped.
    pub(crate) fn resuming(self: &Arc<Self>, op: &'static str) -> crate::Result<Resuming> {
        self.begin_resume(op)?;
        Ok(Resuming(self.clone()))
    }

    fn transition_if(
        &self,
        next: SessionState,
        check: impl FnOnce(SessionState) -> crate::Result<()>,
    ) -> crate::Result<SessionState> {
        let mut res = Ok(next);

        self.tx.send_if_modified(|state| {
            let from = *state;

            res = check(from).and_then(|()| {
                if from.can_transition_to(next) {
                    Ok(from)
                } else {
                    Err(Error::InvalidTransition { from, to: next })
                }
            });

            if res.is_ok() {
                tracing::debug!(%from, to = %next, "session transition");
                *state = next;
            }

            res.is_ok()
        });

        res
    }
}

/// Resume in flight, keeping the session [Stepping](SessionState::Stepping)
/// until dropped.
#[must_use]
#[derive(Debug)]
pub(crate) struct Resuming(Arc<Lifecycle>);

impl Drop for Resuming {
    fn drop(&mut self) {
        self.0.end_resume();
    }
}
