use std::path::PathBuf;
use std::process::Stdio;

/// A debug server process builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCommand {
    /// Program to spawn.
    pub program: PathBuf,

    /// Program arguments.
    pub args: Vec<String>,

    /// Working directory of the spawned process.
    pub current_dir: Option<PathBuf>,
}

impl ServerCommand {
    /// Constructs a new `ServerCommand` for launching the program at path
    /// `program`, with no arguments, in the current working directory.
    ///
    /// The environment is inherited as is.
    ///
    /// If `program` is not an absolute path, the `PATH` will be searched in
    /// an OS-defined way.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    /// Adds an argument to pass to the program.
    ///
    /// To pass multiple arguments see [`args`](Self::args).
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Adds multiple arguments to pass to the program.
    pub fn args<I, S>(self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        args.into_iter().fold(self, |cmd, arg| cmd.arg(arg))
    }

    /// Sets the working directory for the process to spawn.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Converts into a spawnable command, with piped output and no input.
    pub(crate) fn to_tokio(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);

        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }

        cmd
    }
}

impl std::fmt::Display for ServerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.display())?;

        for arg in &self.args {
            write!(f, " {arg}")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsStr;
    use std::path::Path;

    use super::ServerCommand;

    #[test]
    fn spawnable_command() {
        let command = ServerCommand::new("dlv")
            .args(["debug", "--headless"])
            .current_dir("/src/hello");

        assert_eq!(command.to_string(), "dlv debug --headless");

        let spawnable = command.to_tokio();
        let cmd = spawnable.as_std();

        assert_eq!(cmd.get_program(), "dlv");
        assert_eq!(
            cmd.get_args().collect::<Vec<_>>(),
            [OsStr::new("debug"), OsStr::new("--headless")]
        );
        assert_eq!(cmd.get_current_dir(), Some(Path::new("/src/hello")));
        assert_eq!(cmd.get_envs().count(), 0);
    }
}
