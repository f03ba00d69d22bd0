use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use dlvim_rpc::DebuggerState;
use dlvim_rpc::client::DebugClient;
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;

use crate::breakpoint::{Breakpoint, BreakpointManager, BreakpointSpec};
use crate::config::Timeouts;
use crate::editor::{CursorLocation, Editor};
use crate::error::Error;
use crate::execution::{
    ExecutionSnapshot, ExecutionState, StopOutcome, exit_notice, format_goroutines,
    move_cursor, move_pc_marker,
};
use crate::launcher::ServerProcess;
use crate::state::{Lifecycle, Resuming, SessionState};

/// Races a remote call against the session cancellation and a deadline.
pub(crate) async fn guarded<T, F>(
    op: &'static str,
    cancel: &CancellationToken,
    deadline: Option<Duration>,
    fut: F,
) -> crate::Result<T>
where
    F: Future<Output = dlvim_rpc::Result<T>>,
{
    let bounded = async move {
        let res = match deadline {
            Some(after) => match tokio::time::timeout(after, fut).await {
                Ok(res) => res,
                Err(_) => return Err(Error::Timeout { op, after }),
            },
            None => fut.await,
        };

        res.map_err(|e| Error::from_rpc(op, e))
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled { op }),
        res = bounded => res,
    }
}

/// Result of a session command, with what to echo in the session log.
pub(crate) struct Reply<T> {
    pub(crate) value: T,
    pub(crate) echo: String,
    pub(crate) output: String,
    pub(crate) transition: Option<Transition>,
}

impl<T> Reply<T> {
    fn new(value: T, echo: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            value,
            echo: echo.into(),
            output: output.into(),
            transition: None,
        }
    }
}

/// Stop whose side-effects are still to be run.
///
/// The session stays [Stepping](SessionState::Stepping) until they are
/// spawned.
pub(crate) struct Transition {
    snapshot: Arc<ExecutionSnapshot>,
    previous_pc: Option<i64>,
    resuming: Resuming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resume {
    Continue,
    Next,
}

impl Resume {
    const fn op(self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Next => "next",
        }
    }
}

/// Everything a session is made of, once the server is reachable.
pub(crate) struct SessionParts<C> {
    pub(crate) client: C,
    pub(crate) editor: Arc<dyn Editor>,
    pub(crate) lifecycle: Arc<Lifecycle>,
    pub(crate) timeouts: Timeouts,
    pub(crate) addr: String,
    pub(crate) dir: String,
    pub(crate) server: Option<ServerProcess>,
    pub(crate) pid: u32,
    pub(crate) cancel: CancellationToken,
}

/// A debugging session, connected to a debug server.
///
/// Sessions are shared behind an [Arc], every operation taking `&self`.
/// Each remote call is bounded by the session [Timeouts] and abandoned once
/// the session stops.
pub struct Session<C: DebugClient> {
    client: Arc<C>,
    editor: Arc<dyn Editor>,
    lifecycle: Arc<Lifecycle>,
    timeouts: Timeouts,
    addr: String,
    dir: Arc<str>,
    server: Mutex<Option<ServerProcess>>,
    server_pid: Option<u32>,
    pid: AtomicU32,
    breakpoints: BreakpointManager,
    execution: ExecutionState,
    cancel: CancellationToken,
    torn_down: AtomicBool,
}

impl<C: DebugClient> fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("addr", &self.addr)
            .field("dir", &self.dir)
            .field("pid", &self.pid())
            .field("server_pid", &self.server_pid)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<C: DebugClient> Session<C> {
    pub(crate) fn new(parts: SessionParts<C>) -> Self {
        Self {
            client: Arc::new(parts.client),
            editor: parts.editor,
            lifecycle: parts.lifecycle,
            timeouts: parts.timeouts,
            addr: parts.addr,
            dir: parts.dir.into(),
            server_pid: parts.server.as_ref().and_then(ServerProcess::pid),
            server: Mutex::new(parts.server),
            pid: AtomicU32::new(parts.pid),
            breakpoints: BreakpointManager::default(),
            execution: ExecutionState::default(),
            cancel: parts.cancel,
            torn_down: AtomicBool::new(false),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.lifecycle.current()
    }

    /// Subscribes to lifecycle changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.lifecycle.subscribe()
    }

    /// Process ID of the target.
    pub fn pid(&self) -> u32 {
        self.pid.load(Ordering::Relaxed)
    }

    /// Address of the debug server.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Working directory of the session, against which paths are shortened.
    pub fn dir(&self) -> &str {
        &self.dir
    }

    /// OS process ID of the debug server, if spawned by the session.
    pub const fn server_pid(&self) -> Option<u32> {
        self.server_pid
    }

    pub(crate) fn editor(&self) -> &dyn Editor {
        &*self.editor
    }

    /// Last execution snapshot.
    pub fn snapshot(&self) -> Option<Arc<ExecutionSnapshot>> {
        self.execution.snapshot()
    }

    /// Breakpoints of the session, in creation order.
    pub async fn breakpoints(&self) -> Vec<Breakpoint> {
        self.breakpoints.list().await
    }

    /// Waits for the side-effects of the last continue/next (marker and
    /// cursor moves, goroutine listing).
    ///
    /// The session is torn down if one of them lost the server.
    pub async fn settle(&self) {
        if let Err(e) = self.execution.settle(&*self.editor).await {
            self.fail(e).await;
        }
    }

    /// Sets a breakpoint at the cursor (no argument) or at the entry of a
    /// function (`pkg.Func`).
    #[tracing::instrument(name = "SetBreakpoint", skip_all)]
    pub async fn set_breakpoint<S: AsRef<str>>(
        &self,
        args: &[S],
        cursor: &CursorLocation,
    ) -> crate::Result<Breakpoint> {
        let res = match BreakpointSpec::parse(args, cursor) {
            Ok(spec) => self.add_breakpoint(spec).await,
            Err(e) => Err(e.into()),
        };

        self.conclude(res).await
    }

    /// Clears a breakpoint of the session.
    #[tracing::instrument(name = "ClearBreakpoint", skip(self))]
    pub async fn clear_breakpoint(&self, id: u32) -> crate::Result<Breakpoint> {
        let res = self.remove_breakpoint(id).await;
        self.conclude(res).await
    }

    /// Resumes the target until it stops or exits.
    #[tracing::instrument(name = "Continue", skip_all)]
    pub async fn continue_execution(&self) -> crate::Result<StopOutcome> {
        let res = self.resume(Resume::Continue).await;
        self.conclude(res).await
    }

    /// Steps over to the next source line.
    #[tracing::instrument(name = "Next", skip_all)]
    pub async fn step(&self) -> crate::Result<StopOutcome> {
        let res = self.resume(Resume::Next).await;
        self.conclude(res).await
    }

    /// Restarts the target, keeping the breakpoints.
    ///
    /// Returns the new process ID.
    #[tracing::instrument(name = "Restart", skip_all)]
    pub async fn restart(&self) -> crate::Result<u32> {
        let res = self.restart_target().await;
        self.conclude(res).await
    }

    /// Retrieves the debugger state, logging a summary of it.
    #[tracing::instrument(name = "GetState", skip_all)]
    pub async fn get_state(&self) -> crate::Result<DebuggerState> {
        let res = self.fetch_state().await;
        self.conclude(res).await
    }

    /// Lists the functions of the target matching `filter`.
    pub async fn list_functions(&self, filter: &str) -> crate::Result<Vec<String>> {
        match self.list_functions_raw(filter).await {
            Ok(funcs) => Ok(funcs),
            Err(e) => Err(self.fail(e).await),
        }
    }

    /// Function names offered for completion.
    pub async fn functions_completion(&self) -> crate::Result<Vec<String>> {
        self.list_functions("main").await
    }

    /// Stops the session, releasing the debug server.
    ///
    /// Stopping an already stopped session does nothing.
    #[tracing::instrument(name = "StopSession", skip_all, fields(addr = %self.addr))]
    pub async fn stop(&self) {
        self.shutdown(false).await;
    }

    pub(crate) async fn add_breakpoint(&self, spec: BreakpointSpec) -> crate::Result<Reply<Breakpoint>> {
        let created = self
            .call(
                "break",
                Some(self.timeouts.call),
                self.client.create_breakpoint(spec.to_request()),
            )
            .await?;

        let bp = self
            .breakpoints
            .register(
                created,
                spec.display_name().map(str::to_owned),
                &*self.editor,
            )
            .await?;

        let echo = format!("break {}", bp.function_name);
        let output = format!("Breakpoint {} set at {}", bp.id, bp.describe(&self.dir));

        Ok(Reply::new(bp, echo, output))
    }

    pub(crate) async fn remove_breakpoint(&self, id: u32) -> crate::Result<Reply<Breakpoint>> {
        if !self.breakpoints.contains(id).await {
            return Err(Error::UnknownBreakpoint(id));
        }

        self.call(
            "clear",
            Some(self.timeouts.call),
            self.client.clear_breakpoint(id),
        )
        .await?;

        let bp = self.breakpoints.unregister(id, &*self.editor).await?;
        let output = format!("Breakpoint {} cleared at {}", bp.id, bp.describe(&self.dir));

        Ok(Reply::new(bp, format!("clear {id}"), output))
    }

    pub(crate) async fn resume(&self, kind: Resume) -> crate::Result<Reply<StopOutcome>> {
        let op = kind.op();
        let resuming = self.lifecycle.resuming(op)?;

        let res = match kind {
            Resume::Continue => {
                self.call(op, self.timeouts.resume, self.client.continue_execution())
                    .await
            }
            Resume::Next => self.call(op, self.timeouts.resume, self.client.next()).await,
        };

        self.flush_server_stderr().await;

        let state = res?;

        if state.exited {
            let pid = match state.pid {
                0 => self.pid(),
                pid => pid,
            };

            self.execution.mark_exited(state.exit_status);

            let outcome = StopOutcome::Exited {
                pid,
                status: state.exit_status,
            };
            return Ok(Reply::new(outcome, op, exit_notice(pid, state.exit_status)));
        }

        let thread = state
            .current_thread
            .ok_or(Error::NoCurrentThread { op })?;

        let snapshot = Arc::new(ExecutionSnapshot::from_thread(&thread));

        // groups of consecutive stops never interleave
        self.execution.settle(&*self.editor).await?;

        if let Some(bp) = &thread.breakpoint {
            self.breakpoints.record_hits(bp).await;
        }

        let previous_pc = self.execution.publish(snapshot.clone());

        let output = snapshot.status_line(&self.dir);

        Ok(Reply {
            value: StopOutcome::Stopped(snapshot.clone()),
            echo: op.to_owned(),
            output,
            transition: Some(Transition {
                snapshot,
                previous_pc,
                resuming,
            }),
        })
    }

    pub(crate) async fn restart_target(&self) -> crate::Result<Reply<u32>> {
        let resuming = self.lifecycle.resuming("restart")?;

        self.call("restart", self.timeouts.resume, self.client.restart())
            .await?;

        self.execution.settle(&*self.editor).await?;
        self.execution.reset(&*self.editor);
        drop(resuming);

        let pid = self
            .call("pid", Some(self.timeouts.call), self.client.process_pid())
            .await?;
        self.pid.store(pid, Ordering::Relaxed);

        // hit counts start over, and locations may move with a rebuild
        let listed = self
            .call(
                "breakpoints",
                Some(self.timeouts.call),
                self.client.list_breakpoints(),
            )
            .await?;
        self.breakpoints.refresh(&listed, &*self.editor).await?;

        tracing::debug!(pid, "target restarted");

        Ok(Reply::new(
            pid,
            "restart",
            format!("Process restarted with PID {pid}"),
        ))
    }

    pub(crate) async fn fetch_state(&self) -> crate::Result<Reply<DebuggerState>> {
        let state = self
            .call("state", Some(self.timeouts.call), self.client.state())
            .await?;

        let pid = match state.pid {
            0 => self.pid(),
            pid => pid,
        };

        let summary = if state.exited {
            exit_notice(pid, state.exit_status)
        } else if state.running {
            format!("Process {pid} is running")
        } else if let Some(thread) = &state.current_thread {
            ExecutionSnapshot::from_thread(thread).status_line(&self.dir)
        } else {
            format!("Process {pid} is stopped")
        };

        Ok(Reply::new(state, "state", summary))
    }

    pub(crate) async fn list_functions_raw(&self, filter: &str) -> crate::Result<Vec<String>> {
        self.call(
            "funcs",
            Some(self.timeouts.call),
            self.client.list_functions(filter),
        )
        .await
    }

    pub(crate) async fn goroutines(&self) -> crate::Result<String> {
        let goroutines = self
            .call(
                "goroutines",
                Some(self.timeouts.call),
                self.client.list_goroutines(),
            )
            .await?;

        let current = self.snapshot().map_or(0, |s| s.goroutine_id);
        Ok(format_goroutines(&goroutines, current, &self.dir))
    }

    /// Issues a remote call, provided the session is connected.
    pub(crate) async fn call<T>(
        &self,
        op: &'static str,
        deadline: Option<Duration>,
        fut: impl Future<Output = dlvim_rpc::Result<T>>,
    ) -> crate::Result<T> {
        self.lifecycle.ensure_connected(op)?;
        guarded(op, &self.cancel, deadline, fut).await
    }

    /// Logs the outcome of a command, and runs the side-effects of a stop.
    pub(crate) async fn conclude<T>(&self, res: crate::Result<Reply<T>>) -> crate::Result<T> {
        match res {
            Ok(reply) => {
                self.log(&format!("(dlv) {}\n{}", reply.echo, reply.output));

                if let Some(transition) = reply.transition {
                    self.run_effects(transition).await;
                }

                Ok(reply.value)
            }
            Err(e) => Err(self.fail(e).await),
        }
    }

    pub(crate) async fn run_effects(&self, transition: Transition) {
        let Transition {
            snapshot,
            previous_pc,
            resuming,
        } = transition;

        self.execution
            .spawn(move_pc_marker(
                self.editor.clone(),
                snapshot.clone(),
                previous_pc,
            ))
            .await;

        self.execution
            .spawn(move_cursor(self.editor.clone(), snapshot.clone()))
            .await;

        let client = self.client.clone();
        let editor = self.editor.clone();
        let cancel = self.cancel.clone();
        let deadline = self.timeouts.call;
        let dir = self.dir.clone();

        self.execution
            .spawn(async move {
                let goroutines = guarded(
                    "goroutines",
                    &cancel,
                    Some(deadline),
                    client.list_goroutines(),
                )
                .await?;

                editor.append_log(&format_goroutines(
                    &goroutines,
                    snapshot.goroutine_id,
                    &dir,
                ))?;

                Ok::<_, Error>(())
            })
            .await;

        drop(resuming);
    }

    /// Reports an error to the user, tearing down the session if fatal.
    pub(crate) async fn fail(&self, e: Error) -> Error {
        tracing::error!(error = %e, "session command failed");
        self.log(&format!("[dlvim] error: {e}"));

        if e.is_fatal() {
            self.shutdown(true).await;
        }

        e
    }

    /// Appends text to the session log.
    ///
    /// The editor being the reporting channel, its failures are traced only.
    pub(crate) fn log(&self, text: &str) {
        if let Err(e) = self.editor.append_log(text) {
            tracing::warn!(error = %e, "append log");
        }
    }

    async fn flush_server_stderr(&self) {
        let stderr = match self.server.lock().await.as_ref() {
            Some(server) => server.stderr().take_new(),
            None => return,
        };

        let stderr = stderr.trim_end();
        if !stderr.is_empty() {
            self.log(stderr);
        }
    }

    /// Tears the session down, leaving it [Errored](SessionState::Errored)
    /// if `errored` is set.
    pub(crate) async fn shutdown(&self, errored: bool) {
        if errored {
            self.lifecycle.fail();
        }

        if self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }

        tracing::debug!(errored, "tearing down session");

        self.cancel.cancel();
        self.execution.abort().await;

        let server = self.server.lock().await.take();

        if server.is_some() && !errored {
            let detach = tokio::time::timeout(self.timeouts.call, self.client.detach(true)).await;

            match detach {
                Ok(Ok(())) => tracing::debug!("detached from target"),
                Ok(Err(e)) => tracing::debug!(error = %e, "detach"),
                Err(_) => tracing::debug!("detach timed out"),
            }
        }

        self.client.close();

        if let Some(server) = server {
            server.terminate(self.timeouts.stop_grace).await;
        }

        self.execution.reset(&*self.editor);
        self.breakpoints.clear(&*self.editor).await;

        if !errored {
            if let Err(e) = self.lifecycle.transition(SessionState::Terminated) {
                tracing::debug!(error = %e, "session already stopped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use super::guarded;
    use crate::Error;

    #[tokio::test]
    async fn guarded_call_times_out() {
        let cancel = CancellationToken::new();

        let err = guarded(
            "state",
            &cancel,
            Some(Duration::from_millis(20)),
            std::future::pending::<dlvim_rpc::Result<()>>(),
        )
        .await
        .expect_err("wedged");

        assert!(matches!(err, Error::Timeout { op: "state", .. }));
    }

    #[tokio::test]
    async fn guarded_call_is_cancelled() {
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                cancel.cancel();
            })
        };

        let err = guarded(
            "continue",
            &cancel,
            None,
            std::future::pending::<dlvim_rpc::Result<()>>(),
        )
        .await
        .expect_err("cancelled");

        assert!(matches!(err, Error::Cancelled { op: "continue" }));
        canceller.await.expect("canceller");
    }

    #[tokio::test]
    async fn guarded_call_maps_errors() {
        let cancel = CancellationToken::new();

        let err = guarded("pid", &cancel, None, async {
            Err::<(), _>(dlvim_rpc::Error::ConnectionClosed)
        })
        .await
        .expect_err("closed");
        assert!(err.is_fatal());

        let err = guarded("break", &cancel, None, async {
            Err::<(), _>(dlvim_rpc::Error::Server("no such function".into()))
        })
        .await
        .expect_err("server");
        assert!(matches!(err, Error::ServerCall { op: "break", .. }));
    }
}
