use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dlvim_rpc::client::{DebugClient, Dialer};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::SessionConfig;
use crate::editor::Editor;
use crate::error::Error;
use crate::launcher::{self, LaunchTarget, ServerProcess};
use crate::session::{Session, SessionParts, guarded};
use crate::state::{Lifecycle, SessionState};

const DIAL_RETRY_MIN: Duration = Duration::from_millis(50);
const DIAL_RETRY_MAX: Duration = Duration::from_millis(500);

/// Banner logged once a session is ready.
pub const READY_BANNER: &str = "Type 'help' for list of commands.";

struct Plan {
    target: Option<LaunchTarget>,
    addr: String,
    dir: PathBuf,
    flags: Vec<String>,
}

/// Entry point of debugging sessions.
///
/// At most one session is live at a time: opening a session stops the
/// previous one first.
pub struct SessionController<D: Dialer> {
    dialer: D,
    editor: Arc<dyn Editor>,
    config: SessionConfig,
    current: Mutex<Option<Arc<Session<D::Client>>>>,
}

impl<D: Dialer> SessionController<D> {
    /// Creates a controller without any session.
    pub fn new(dialer: D, editor: Arc<dyn Editor>, config: SessionConfig) -> Self {
        Self {
            dialer,
            editor,
            config,
            current: Mutex::new(None),
        }
    }

    /// Configuration of the sessions.
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Builds and debugs the main package of the Go module containing `dir`.
    #[tracing::instrument(name = "StartSession", skip(self, flags))]
    pub async fn start(
        &self,
        dir: &Path,
        flags: &[String],
    ) -> crate::Result<Arc<Session<D::Client>>> {
        let root = launcher::find_project_root(dir);

        self.open(Plan {
            target: Some(LaunchTarget::Start { root: root.clone() }),
            addr: self.config.server.addr.clone(),
            dir: root,
            flags: flags.to_vec(),
        })
        .await
    }

    /// Builds and debugs the package of the source checkout containing
    /// `dir`.
    #[tracing::instrument(name = "DebugSession", skip(self, flags))]
    pub async fn debug(
        &self,
        dir: &Path,
        flags: &[String],
    ) -> crate::Result<Arc<Session<D::Client>>> {
        let root = launcher::find_vcs_root(dir);
        let package = launcher::gopath().and_then(|gopath| launcher::import_path(&root, &gopath));

        self.open(Plan {
            target: Some(LaunchTarget::Debug {
                root: root.clone(),
                package,
            }),
            addr: self.config.server.addr.clone(),
            dir: root,
            flags: flags.to_vec(),
        })
        .await
    }

    /// Attaches to a running process.
    #[tracing::instrument(name = "AttachSession", skip(self, flags))]
    pub async fn attach(
        &self,
        pid: &str,
        flags: &[String],
        dir: &Path,
    ) -> crate::Result<Arc<Session<D::Client>>> {
        let pid = match pid.trim().parse() {
            Ok(pid) => pid,
            Err(_) => return Err(self.report(Error::InvalidPid(pid.to_owned()))),
        };

        self.open(Plan {
            target: Some(LaunchTarget::Attach {
                pid,
                dir: dir.to_path_buf(),
            }),
            addr: self.config.server.addr.clone(),
            dir: dir.to_path_buf(),
            flags: flags.to_vec(),
        })
        .await
    }

    /// Connects to an already running debug server (`host:port`, or a bare
    /// port on `localhost`).
    #[tracing::instrument(name = "ConnectSession", skip(self))]
    pub async fn connect(&self, addr: &str, dir: &Path) -> crate::Result<Arc<Session<D::Client>>> {
        self.open(Plan {
            target: None,
            addr: launcher::normalize_addr(addr),
            dir: dir.to_path_buf(),
            flags: Vec::new(),
        })
        .await
    }

    /// The live session.
    pub async fn session(&self) -> crate::Result<Arc<Session<D::Client>>> {
        self.current.lock().await.clone().ok_or(Error::NoSession)
    }

    /// Stops the live session, if any.
    pub async fn stop(&self) {
        if let Some(session) = self.current.lock().await.take() {
            session.stop().await;
        }
    }

    async fn open(&self, plan: Plan) -> crate::Result<Arc<Session<D::Client>>> {
        let mut current = self.current.lock().await;

        if let Some(previous) = current.take() {
            tracing::debug!(addr = previous.addr(), "stopping previous session");
            previous.stop().await;
        }

        let lifecycle = Arc::new(Lifecycle::new());

        match self.establish(plan, &lifecycle).await {
            Ok(session) => {
                *current = Some(session.clone());
                Ok(session)
            }
            Err(e) => {
                lifecycle.fail();
                Err(self.report(e))
            }
        }
    }

    async fn establish(
        &self,
        plan: Plan,
        lifecycle: &Arc<Lifecycle>,
    ) -> crate::Result<Arc<Session<D::Client>>> {
        let timeouts = self.config.timeouts;

        let mut server = match &plan.target {
            Some(target) => {
                lifecycle.transition(SessionState::Launching)?;

                let command = target.command(&self.config, &plan.flags);
                let server = ServerProcess::spawn(&command).map_err(|e| {
                    Error::ServerStart(format!("{}: {e}", command.program.display()))
                })?;

                Some(server)
            }
            None => None,
        };

        lifecycle.transition(SessionState::Connecting)?;

        let client = self.dial(&plan.addr, server.as_mut()).await?;
        let cancel = CancellationToken::new();

        let pid = match guarded("pid", &cancel, Some(timeouts.call), client.process_pid()).await {
            Ok(0) => Err(Error::ServerStart(
                "the debug server reported no target process".to_owned(),
            )),
            res => res,
        };

        let pid = match pid {
            Ok(pid) => pid,
            Err(e) => {
                client.close();

                if let Some(server) = server {
                    server.terminate(timeouts.stop_grace).await;
                }

                return Err(e);
            }
        };

        if let Some(server) = &server {
            server.stdout().discard();
            server.stderr().discard();
        }

        let session = Arc::new(Session::new(SessionParts {
            client,
            editor: self.editor.clone(),
            lifecycle: lifecycle.clone(),
            timeouts,
            addr: plan.addr,
            dir: plan.dir.to_string_lossy().into_owned(),
            server,
            pid,
            cancel,
        }));

        lifecycle.transition(SessionState::Ready)?;

        if let Err(e) = self.editor.create_session_buffers() {
            session.shutdown(true).await;
            return Err(e.into());
        }

        session.log(READY_BANNER);

        tracing::info!(pid, addr = session.addr(), "session ready");

        Ok(session)
    }

    /// Dials the debug server until it answers, gives up or exits.
    async fn dial(
        &self,
        addr: &str,
        mut server: Option<&mut ServerProcess>,
    ) -> crate::Result<D::Client> {
        let timeout = self.config.timeouts.connect;
        let deadline = Instant::now() + timeout;
        let mut delay = DIAL_RETRY_MIN;

        loop {
            let err = match tokio::time::timeout_at(deadline, self.dialer.dial(addr)).await {
                Ok(Ok(client)) => return Ok(client),
                Ok(Err(e)) => Some(e),
                Err(_) => None,
            };

            if let Some(server) = server.as_deref_mut() {
                if let Some((status, stderr)) = server.exit_report().await? {
                    return Err(Error::ServerStart(format!(
                        "debug server exited ({status}): {}",
                        stderr.trim_end()
                    )));
                }
            }

            if Instant::now() + delay >= deadline {
                return Err(match err {
                    Some(source) => Error::Connection { op: "dial", source },
                    None => Error::Timeout {
                        op: "dial",
                        after: timeout,
                    },
                });
            }

            tracing::trace!(addr, ?delay, "debug server not reachable yet");

            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(DIAL_RETRY_MAX);
        }
    }

    fn report(&self, e: Error) -> Error {
        tracing::error!(error = %e, "cannot open session");

        if let Err(log_err) = self.editor.append_log(&format!("[dlvim] error: {e}")) {
            tracing::warn!(error = %log_err, "append log");
        }

        e
    }
}
