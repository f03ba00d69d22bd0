use std::fmt::Write;
use std::future::Future;
use std::sync::Arc;

use dlvim_rpc::{Goroutine, Thread};
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use crate::editor::{Editor, MarkerKind};
use crate::format::short_path;

/// Hit counts of the breakpoint a thread is stopped at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointHits {
    /// Breakpoint ID.
    pub id: u32,

    /// Hits recorded for the stopped goroutine, if any.
    pub goroutine: Option<u64>,

    /// Hits over all goroutines.
    pub total: u64,
}

/// Where the target stopped after a continue/next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionSnapshot {
    /// Stopped thread.
    pub thread_id: i64,

    /// Goroutine running on the stopped thread.
    pub goroutine_id: i64,

    /// Source file.
    pub file: String,

    /// Source line.
    pub line: u32,

    /// Current function.
    pub function: String,

    /// Program counter.
    pub pc: u64,

    /// Breakpoint the thread is stopped at, if any.
    pub breakpoint: Option<BreakpointHits>,

    /// Exit status, once the target has exited.
    pub exit_status: Option<i32>,
}

impl ExecutionSnapshot {
    /// Snapshot of a stopped thread.
    pub fn from_thread(thread: &Thread) -> Self {
        Self {
            thread_id: thread.id,
            goroutine_id: thread.goroutine_id,
            file: thread.file.clone(),
            line: thread.line,
            function: thread.function_name().to_owned(),
            pc: thread.pc,
            breakpoint: thread.breakpoint.as_ref().map(|bp| BreakpointHits {
                id: bp.id,
                goroutine: bp.hits_of_goroutine(thread.goroutine_id),
                total: bp.total_hit_count,
            }),
            exit_status: None,
        }
    }

    /// Whether the target has exited.
    pub const fn exited(&self) -> bool {
        self.exit_status.is_some()
    }

    /// Status line, with paths relative to `dir`.
    pub fn status_line(&self, dir: &str) -> String {
        let mut line = format!(
            "> {}() {}:{} ",
            self.function,
            short_path(&self.file, dir),
            self.line
        );

        let _ = match &self.breakpoint {
            Some(BreakpointHits {
                goroutine: Some(hits),
                total,
                ..
            }) => write!(
                line,
                "(hits goroutine({}):{hits} total:{total})",
                self.goroutine_id
            ),
            Some(BreakpointHits { total, .. }) => write!(line, "(hits total:{total})"),
            None => write!(line, "goroutine({})", self.goroutine_id),
        };

        let _ = write!(line, " (PC: {:#x})", self.pc);
        line
    }
}

/// Outcome of a continue/next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// The target stopped.
    Stopped(Arc<ExecutionSnapshot>),

    /// The target exited.
    Exited {
        /// Process ID of the target.
        pid: u32,

        /// Exit status.
        status: i32,
    },
}

/// Notice logged when the target exits.
pub fn exit_notice(pid: u32, status: i32) -> String {
    format!("Process {pid} has exited with status {status}")
}

/// Goroutine listing, the selected one being starred.
pub fn format_goroutines(goroutines: &[Goroutine], current: i64, dir: &str) -> String {
    let mut out = String::new();

    for g in goroutines {
        let loc = &g.user_current_loc;
        let mark = if g.id == current { '*' } else { ' ' };

        let _ = writeln!(
            out,
            "{mark} Goroutine {} - User: {}:{} {} ({:#x})",
            g.id,
            short_path(&loc.file, dir),
            loc.line,
            loc.function_name(),
            loc.pc
        );
    }

    let _ = write!(out, "[{} goroutines]", goroutines.len());
    out
}

#[derive(Default)]
struct Current {
    snapshot: Option<Arc<ExecutionSnapshot>>,

    /// ID of the placed PC marker.
    pc_marker: Option<i64>,
}

/// Execution state of a session: the last snapshot, the PC marker, and the
/// task group running the side-effects of the last transition.
#[derive(Default)]
pub struct ExecutionState {
    current: std::sync::Mutex<Current>,
    effects: Mutex<JoinSet<crate::Result<()>>>,
}

impl ExecutionState {
    fn current(&self) -> std::sync::MutexGuard<'_, Current> {
        self.current
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Last snapshot.
    pub fn snapshot(&self) -> Option<Arc<ExecutionSnapshot>> {
        self.current().snapshot.clone()
    }

    /// Publishes a new snapshot, returning the PC marker to replace.
    pub fn publish(&self, snapshot: Arc<ExecutionSnapshot>) -> Option<i64> {
        let mut current = self.current();

        let previous = if snapshot.exited() {
            current.pc_marker
        } else {
            current.pc_marker.replace(snapshot.thread_id)
        };

        current.snapshot = Some(snapshot);
        previous
    }

    /// Marks the last snapshot as exited.
    pub fn mark_exited(&self, status: i32) {
        let mut current = self.current();

        if let Some(snapshot) = &current.snapshot {
            let mut exited = ExecutionSnapshot::clone(snapshot);
            exited.exit_status = Some(status);
            current.snapshot = Some(Arc::new(exited));
        }
    }

    /// Forgets the snapshot, removing the PC marker.
    pub fn reset(&self, editor: &dyn Editor) {
        let pc_marker = {
            let mut current = self.current();
            current.snapshot = None;
            current.pc_marker.take()
        };

        if let Some(id) = pc_marker {
            if let Err(e) = editor.unplace_marker(MarkerKind::ProgramCounter, id) {
                tracing::warn!(id, error = %e, "unplace pc marker");
            }
        }
    }

    /// Spawns a side-effect task in the current group.
    pub async fn spawn<F>(&self, task: F)
    where
        F: Future<Output = crate::Result<()>> + Send + 'static,
    {
        self.effects.lock().await.spawn(task);
    }

    /// Waits for the side-effects of the last transition.
    ///
    /// Failed tasks are reported to `editor`, except for fatal failures: the
    /// first one is returned instead.
    pub async fn settle(&self, editor: &dyn Editor) -> crate::Result<()> {
        let mut effects = self.effects.lock().await;
        let mut fatal = None;

        while let Some(res) = effects.join_next().await {
            let err = match res {
                Ok(Ok(())) => continue,
                Ok(Err(e)) if e.is_fatal() => {
                    tracing::warn!(error = %e, "transition side-effect lost the server");
                    fatal.get_or_insert(e);
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(e) if e.is_cancelled() => continue,
                Err(e) => e.to_string(),
            };

            tracing::warn!(error = err, "transition side-effect failed");

            if let Err(e) = editor.append_log(&format!("[dlvim] error: {err}")) {
                tracing::warn!(error = %e, "append log");
            }
        }

        fatal.map_or(Ok(()), Err)
    }

    /// Aborts the side-effects of the last transition.
    pub async fn abort(&self) {
        let mut effects = self.effects.lock().await;
        effects.abort_all();
        while effects.join_next().await.is_some() {}
    }
}

/// Moves the PC marker to the snapshot location.
pub(crate) async fn move_pc_marker(
    editor: Arc<dyn Editor>,
    snapshot: Arc<ExecutionSnapshot>,
    previous: Option<i64>,
) -> crate::Result<()> {
    if let Some(id) = previous.filter(|id| *id != snapshot.thread_id) {
        editor.unplace_marker(MarkerKind::ProgramCounter, id)?;
    }

    editor.place_marker(
        MarkerKind::ProgramCounter,
        snapshot.thread_id,
        &snapshot.file,
        snapshot.line,
    )?;

    Ok(())
}

/// Moves the cursor to the snapshot location.
pub(crate) async fn move_cursor(
    editor: Arc<dyn Editor>,
    snapshot: Arc<ExecutionSnapshot>,
) -> crate::Result<()> {
    editor.move_cursor(&snapshot.file, snapshot.line)?;
    Ok(())
}
