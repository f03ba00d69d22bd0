use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dlvim_session::SessionConfig;
use miette::IntoDiagnostic;

/// Configuration of debugging sessions.
#[derive(Debug, Default, PartialEq, knus::Decode)]
pub struct DlvimConfig {
    /// Debug server settings.
    #[knus(child)]
    pub server: Option<ServerNode>,

    /// Deadlines of the session operations.
    #[knus(child)]
    pub timeouts: Option<TimeoutsNode>,

    /// Extra flags appended to every spawned debug server.
    #[knus(child, unwrap(arguments), default)]
    pub flags: Vec<String>,
}

/// Configuration of the spawned debug server.
#[derive(Debug, PartialEq, knus::Decode)]
pub struct ServerNode {
    /// Debug server executable.
    #[knus(property)]
    pub program: Option<String>,

    /// Address the server listens on.
    #[knus(property)]
    pub addr: Option<String>,

    /// Binary built by the server in `start` mode.
    #[knus(property)]
    pub output: Option<String>,
}

/// Deadlines, in milliseconds.
#[derive(Debug, PartialEq, knus::Decode)]
pub struct TimeoutsNode {
    /// Deadline of a single remote call.
    #[knus(property)]
    pub call_ms: Option<u64>,

    /// Deadline for reaching the debug server.
    #[knus(property)]
    pub connect_ms: Option<u64>,

    /// Deadline of resuming calls (`0` means none).
    #[knus(property)]
    pub resume_ms: Option<u64>,

    /// Grace period before killing the debug server.
    #[knus(property)]
    pub stop_grace_ms: Option<u64>,
}

impl DlvimConfig {
    /// Parses the configuration, either inline or from a `.kdl` file.
    pub fn parse(config: &str) -> miette::Result<Self> {
        let path = Path::new(config);

        let config = if let Some((filename, "kdl")) = path
            .file_name()
            .and_then(OsStr::to_str)
            .zip(path.extension().and_then(OsStr::to_str))
        {
            let content = std::fs::read_to_string(path).into_diagnostic()?;
            knus::parse(filename, &content)?
        } else {
            knus::parse("<content>", config)?
        };

        Ok(config)
    }

    /// Applies the configuration over the session defaults.
    pub fn into_session_config(self) -> SessionConfig {
        let mut config = SessionConfig::default();

        if let Some(server) = self.server {
            if let Some(program) = server.program {
                config.server.program = PathBuf::from(program);
            }
            if let Some(addr) = server.addr {
                config.server.addr = addr;
            }
            if let Some(output) = server.output {
                config.server.output = PathBuf::from(output);
            }
        }

        if let Some(timeouts) = self.timeouts {
            let t = &mut config.timeouts;

            if let Some(ms) = timeouts.call_ms {
                t.call = Duration::from_millis(ms);
            }
            if let Some(ms) = timeouts.connect_ms {
                t.connect = Duration::from_millis(ms);
            }
            if let Some(ms) = timeouts.resume_ms {
                t.resume = (ms > 0).then(|| Duration::from_millis(ms));
            }
            if let Some(ms) = timeouts.stop_grace_ms {
                t.stop_grace = Duration::from_millis(ms);
            }
        }

        config.flags = self.flags;
        config
    }
}
