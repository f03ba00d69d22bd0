use std::process::ExitStatus;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::task::JoinHandle;

use super::ServerCommand;

/// Bytes of output kept per stream, older output being dropped first.
const OUTPUT_LIMIT: usize = 64 * 1024;

/// Text output of a debug server stream.
///
/// Lines are accumulated by a background task, up to the last
/// [OUTPUT_LIMIT] bytes. Consumers take what has been written since their
/// last read.
#[derive(Debug, Clone)]
pub struct ServerOutput {
    text: Arc<Mutex<String>>,
    limit: usize,
}

impl Default for ServerOutput {
    fn default() -> Self {
        Self::with_limit(OUTPUT_LIMIT)
    }
}

impl ServerOutput {
    fn with_limit(limit: usize) -> Self {
        Self {
            text: Arc::default(),
            limit,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, String> {
        self.text.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push_line(&self, line: &str) {
        let mut text = self.lock();
        text.push_str(line);
        text.push('\n');

        if text.len() > self.limit {
            let mut cut = text.len() - self.limit;
            while !text.is_char_boundary(cut) {
                cut += 1;
            }

            text.drain(..cut);
        }
    }

    /// Output kept so far, left in place.
    pub fn contents(&self) -> String {
        self.lock().clone()
    }

    /// Output written since the previous call.
    pub fn take_new(&self) -> String {
        std::mem::take(&mut *self.lock())
    }

    /// Drops everything written so far.
    pub fn discard(&self) {
        self.lock().clear();
    }

    fn capture<R>(&self, stream: R, name: &'static str) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let output = self.clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(stream).lines();

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        tracing::trace!(stream = name, "{line}");
                        output.push_line(&line);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(stream = name, error = %e, "read server output");
                        break;
                    }
                }
            }
        })
    }
}

/// Handle of a spawned debug server.
///
/// The process is killed when the handle is dropped.
#[derive(Debug)]
pub struct ServerProcess {
    child: Child,
    pid: Option<u32>,
    stdout: ServerOutput,
    stderr: ServerOutput,
    stderr_task: Option<JoinHandle<()>>,
}

impl ServerProcess {
    /// Spawns the debug server described by `command`.
    #[tracing::instrument(name = "SpawnServer", skip_all, fields(program = %command.program.display()))]
    pub fn spawn(command: &ServerCommand) -> std::io::Result<Self> {
        tracing::debug!(%command, dir = ?command.current_dir, "spawning");

        let mut child = command.to_tokio().spawn()?;
        let pid = child.id();

        let stdout = ServerOutput::default();
        let stderr = ServerOutput::default();

        if let Some(out) = child.stdout.take() {
            stdout.capture(out, "stdout");
        }

        let stderr_task = child.stderr.take().map(|err| stderr.capture(err, "stderr"));

        tracing::debug!(pid, "server spawned");

        Ok(Self {
            child,
            pid,
            stdout,
            stderr,
            stderr_task,
        })
    }

    /// OS process ID of the server, unless already reaped.
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Standard output of the server.
    pub const fn stdout(&self) -> &ServerOutput {
        &self.stdout
    }

    /// Standard error of the server.
    pub const fn stderr(&self) -> &ServerOutput {
        &self.stderr
    }

    /// Exit status and error output of the server, if it has exited.
    pub async fn exit_report(&mut self) -> std::io::Result<Option<(ExitStatus, String)>> {
        let Some(status) = self.child.try_wait()? else {
            return Ok(None);
        };

        // the pipe may outlive the server if it forked
        if let Some(task) = self.stderr_task.take() {
            let _ = tokio::time::timeout(Duration::from_secs(1), task).await;
        }

        Ok(Some((status, self.stderr.contents())))
    }

    /// Asks the server to terminate, and kills it after `grace`.
    pub async fn terminate(mut self, grace: Duration) {
        if let Ok(Some(status)) = self.child.try_wait() {
            tracing::debug!(%status, "server already exited");
            return;
        }

        self.request_termination();

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => tracing::debug!(%status, "server terminated"),
            Ok(Err(e)) => tracing::error!(error = %e, "wait server"),
            Err(_) => {
                tracing::debug!(?grace, "server still alive, killing it");

                if let Err(e) = self.child.kill().await {
                    tracing::error!(error = %e, "kill server");
                }
            }
        }
    }

    #[cfg(unix)]
    fn request_termination(&self) {
        use nix::errno::Errno;
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let Some(pid) = self.pid.and_then(|pid| i32::try_from(pid).ok()) else {
            return;
        };

        match kill(Pid::from_raw(pid), Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => (),
            Err(e) => tracing::error!(error = %e, pid, "kill(SIGTERM)"),
        }
    }

    #[cfg(not(unix))]
    fn request_termination(&mut self) {
        if let Err(e) = self.child.start_kill() {
            tracing::error!(error = %e, "kill server");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ServerOutput;

    #[tokio::test]
    async fn captured_output_is_taken_once() {
        let output = ServerOutput::default();

        output
            .capture(&b"API server listening at: 127.0.0.1:41222\nwarning\n"[..], "stderr")
            .await
            .expect("capture");

        assert_eq!(
            output.take_new(),
            "API server listening at: 127.0.0.1:41222\nwarning\n"
        );
        assert_eq!(output.take_new(), "");
        assert_eq!(output.contents(), "");
    }

    #[test]
    fn output_keeps_the_most_recent_bytes() {
        let output = ServerOutput::with_limit(8);

        output.push_line("first");
        output.push_line("second");
        assert_eq!(output.contents(), "\nsecond\n");

        let output = ServerOutput::with_limit(4);

        // the cut falls inside 'é' and moves past it
        output.push_line("aé");
        output.push_line("b");
        assert_eq!(output.take_new(), "\nb\n");
    }
}
