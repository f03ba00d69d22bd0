use std::path::PathBuf;
use std::time::Duration;

/// Default listening address of a spawned debug server.
pub const DEFAULT_ADDR: &str = "localhost:41222";

/// Configuration of debugging sessions.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Debug server settings.
    pub server: ServerConfig,

    /// Deadlines of the session operations.
    pub timeouts: Timeouts,

    /// Extra flags appended to every spawned debug server.
    pub flags: Vec<String>,
}

/// Settings of a spawned debug server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Debug server executable.
    pub program: PathBuf,

    /// Address the server listens on.
    pub addr: String,

    /// Binary built by the server in `start` mode (relative to the project
    /// root).
    pub output: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("dlv"),
            addr: DEFAULT_ADDR.to_owned(),
            output: PathBuf::from("__debug_bin"),
        }
    }
}

/// Deadlines of the session operations.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// Deadline of a single remote call (except resuming ones).
    pub call: Duration,

    /// Deadline for reaching the debug server.
    pub connect: Duration,

    /// Deadline of a continue/next/restart call, if any.
    ///
    /// Resuming calls block until the target stops, which is unbounded.
    pub resume: Option<Duration>,

    /// Grace period between terminating and killing the debug server.
    pub stop_grace: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            call: Duration::from_secs(10),
            connect: Duration::from_secs(10),
            resume: None,
            stop_grace: Duration::from_secs(2),
        }
    }
}
