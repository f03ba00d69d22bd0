use std::path::PathBuf;

/// Terminal front-end of dlvim, driving a Delve headless server.
#[derive(clap::Parser)]
pub struct CliOpts {
    /// Session configuration (KDL format).
    ///
    /// If it ends with `.kdl`, it is treated as a path to a configuration
    /// file. Otherwise it is directly parsed as inline KDL-formatted
    /// configuration.
    #[clap(short, long, value_name = "CONTENT/PATH")]
    pub config: Option<String>,

    /// How to open the debugging session.
    #[clap(subcommand)]
    pub action: CliAction,
}

/// How to open the debugging session.
#[derive(clap::Subcommand)]
pub enum CliAction {
    /// Build and debug the main package of the Go module containing a
    /// directory.
    Start {
        /// Directory inside the Go module (defaults to the current one).
        dir: Option<PathBuf>,

        /// Extra flags given to the debug server (after the directory).
        #[clap(trailing_var_arg = true, allow_hyphen_values = true)]
        flags: Vec<String>,
    },

    /// Build and debug the package of the source checkout containing a
    /// directory.
    Debug {
        /// Directory inside the source checkout (defaults to the current
        /// one).
        dir: Option<PathBuf>,

        /// Extra flags given to the debug server (after the directory).
        #[clap(trailing_var_arg = true, allow_hyphen_values = true)]
        flags: Vec<String>,
    },

    /// Attach to a running process.
    Attach {
        /// ID of the process.
        pid: String,

        /// Extra flags given to the debug server.
        #[clap(trailing_var_arg = true, allow_hyphen_values = true)]
        flags: Vec<String>,
    },

    /// Connect to an already running headless server.
    Connect {
        /// Address of the server (`host:port`, or a bare port on
        /// `localhost`).
        addr: String,

        /// Directory used to shorten source paths (defaults to the current
        /// one).
        #[clap(short, long, value_name = "PATH")]
        dir: Option<PathBuf>,
    },
}

impl CliOpts {
    /// Parses the CLI from the command-line.
    ///
    /// # Warning
    ///
    /// Exits on error.
    pub fn parse_from_cmdline() -> Self {
        <Self as clap::Parser>::parse()
    }
}
