mod command;
mod process;
mod root;

use std::path::PathBuf;

pub use self::command::ServerCommand;
pub use self::process::{ServerOutput, ServerProcess};
pub use self::root::{find_project_root, find_vcs_root, gopath, import_path, normalize_addr};
use crate::config::SessionConfig;

/// What a spawned debug server debugs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchTarget {
    /// Builds and debugs the main package at the given project root.
    Start {
        /// Project root.
        root: PathBuf,
    },

    /// Builds and debugs a package of a source checkout.
    Debug {
        /// Checkout root, used as working directory.
        root: PathBuf,

        /// Import path of the package, when inside a `GOPATH`.
        package: Option<String>,
    },

    /// Attaches to a running process.
    Attach {
        /// Process ID of the target.
        pid: u32,

        /// Working directory of the server.
        dir: PathBuf,
    },
}

impl LaunchTarget {
    /// Command spawning a headless debug server for this target.
    pub fn command(&self, config: &SessionConfig, flags: &[String]) -> ServerCommand {
        let server = &config.server;
        let cmd = ServerCommand::new(&server.program);

        let cmd = match self {
            Self::Start { root } => cmd
                .arg("debug")
                .args(headless_args(&server.addr))
                .arg("--output")
                .arg(root.join(&server.output).to_string_lossy())
                .current_dir(root),
            Self::Debug { root, package } => cmd
                .arg("debug")
                .args(package.iter().cloned())
                .args(headless_args(&server.addr))
                .current_dir(root),
            Self::Attach { pid, dir } => cmd
                .arg("attach")
                .arg(pid.to_string())
                .args(headless_args(&server.addr))
                .current_dir(dir),
        };

        cmd.args(config.flags.iter().cloned())
            .args(flags.iter().cloned())
    }
}

fn headless_args(addr: &str) -> [String; 3] {
    [
        "--headless".to_owned(),
        "--api-version=2".to_owned(),
        format!("--listen={addr}"),
    ]
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::LaunchTarget;
    use crate::config::SessionConfig;

    #[test]
    fn start_command() {
        let config = SessionConfig {
            flags: vec!["--check-go-version=false".into()],
            ..SessionConfig::default()
        };

        let cmd = LaunchTarget::Start {
            root: PathBuf::from("/src/hello"),
        }
        .command(&config, &[]);

        assert_eq!(cmd.program, PathBuf::from("dlv"));
        assert_eq!(
            cmd.args,
            [
                "debug",
                "--headless",
                "--api-version=2",
                "--listen=localhost:41222",
                "--output",
                "/src/hello/__debug_bin",
                "--check-go-version=false",
            ]
        );
        assert_eq!(cmd.current_dir, Some(PathBuf::from("/src/hello")));
    }

    #[test]
    fn debug_command_with_import_path() {
        let cmd = LaunchTarget::Debug {
            root: PathBuf::from("/home/go/src/github.com/user/hello"),
            package: Some("github.com/user/hello".into()),
        }
        .command(&SessionConfig::default(), &["--build-flags=-race".into()]);

        assert_eq!(
            cmd.to_string(),
            "dlv debug github.com/user/hello --headless --api-version=2 \
             --listen=localhost:41222 --build-flags=-race"
        );
    }

    #[test]
    fn attach_command() {
        let cmd = LaunchTarget::Attach {
            pid: 4242,
            dir: PathBuf::from("/tmp"),
        }
        .command(&SessionConfig::default(), &[]);

        assert_eq!(&cmd.args[..2], ["attach", "4242"]);
        assert_eq!(cmd.current_dir, Some(PathBuf::from("/tmp")));
    }
}
