use std::fmt::Write;

use dlvim_rpc::client::DebugClient;

use crate::breakpoint::BreakpointSpec;
use crate::session::{Reply, Resume, Session, Transition};

/// Prompt of the debugger terminal.
pub const PROMPT: &str = "(dlv) ";

const HELP: &str = "\
The following commands are available:
    break (alias: b) ------- Sets a breakpoint (<file>:<line> or <pkg>.<func>).
    breakpoints (alias: bp)  Prints out active breakpoints.
    clear ------------------ Deletes a breakpoint.
    continue (alias: c) ---- Run until breakpoint or program termination.
    funcs ------------------ Print list of functions.
    goroutines (alias: grs)  List program goroutines.
    help ------------------- Prints the help message.
    next (alias: n) -------- Step over to next source line.
    pid -------------------- Print the PID of the current debugging session.
    restart (alias: r) ----- Restart process.
    state ------------------ Print the state of the debugger.";

/// Splits a terminal line into its command and the (possibly empty)
/// remaining argument string.
pub fn split_command(line: &str) -> (&str, &str) {
    let line = line.trim();

    match line.split_once(char::is_whitespace) {
        Some((cmd, args)) => (cmd, args.trim_start()),
        None => (line, ""),
    }
}

impl<C: DebugClient> Session<C> {
    /// Runs a debugger terminal command, returning its output.
    ///
    /// The command is echoed with its output in the session log.
    #[tracing::instrument(name = "RelayCommand", skip(self))]
    pub async fn send_raw_command(&self, line: &str) -> crate::Result<String> {
        let mut out = String::new();

        match self.interpret(line, &mut out).await {
            Ok(transition) => {
                self.log(&format!("{PROMPT}{line}\n{}", out.trim_end()));

                if let Some(transition) = transition {
                    self.run_effects(transition).await;
                }

                Ok(out)
            }
            Err(e) => {
                self.log(&format!("{PROMPT}{line}"));
                Err(self.fail(e).await)
            }
        }
    }

    /// Prompts the user for a terminal command and runs it.
    ///
    /// Returns `None` if the user entered nothing.
    pub async fn prompt_and_relay(&self) -> crate::Result<Option<String>> {
        let line = self.editor_prompt()?;

        if line.trim().is_empty() {
            return Ok(None);
        }

        self.send_raw_command(&line).await.map(Some)
    }

    async fn interpret<W>(&self, line: &str, out: &mut W) -> crate::Result<Option<Transition>>
    where
        W: Write + Send,
    {
        let (cmd, args) = split_command(line);

        let reply = match cmd {
            "help" | "h" => return write_out(out, HELP),
            "break" | "b" => {
                let spec = BreakpointSpec::parse_location(args)?;
                self.add_breakpoint(spec).await?.discard()
            }
            "clear" => match args.parse() {
                Ok(id) => self.remove_breakpoint(id).await?.discard(),
                Err(_) => return write_out(out, "usage: clear <breakpoint ID>"),
            },
            "breakpoints" | "bp" => {
                let bps = self.breakpoints().await;

                if bps.is_empty() {
                    return write_out(out, "No breakpoints.");
                }

                for bp in bps {
                    let name = bp.name.as_deref().map(|n| format!(" {n}")).unwrap_or_default();
                    let _ = writeln!(
                        out,
                        "Breakpoint {}{name} at {} ({})",
                        bp.id,
                        bp.describe(self.dir()),
                        bp.total_hit_count
                    );
                }

                return Ok(None);
            }
            "continue" | "c" => self.resume(Resume::Continue).await?.discard(),
            "next" | "n" => self.resume(Resume::Next).await?.discard(),
            "restart" | "r" => self.restart_target().await?.discard(),
            "state" => self.fetch_state().await?.discard(),
            "goroutines" | "grs" => {
                let listing = self.goroutines().await?;
                return write_out(out, &listing);
            }
            "funcs" => {
                let funcs = self.list_functions_raw(args).await?;

                for f in funcs {
                    let _ = writeln!(out, "{f}");
                }

                return Ok(None);
            }
            "pid" => return write_out(out, &self.pid().to_string()),
            _ => return write_out(out, "Command not available"),
        };

        let _ = writeln!(out, "{}", reply.output);
        Ok(reply.transition)
    }

    fn editor_prompt(&self) -> crate::Result<String> {
        self.editor().prompt_input(PROMPT).map_err(Into::into)
    }
}

impl<T> Reply<T> {
    fn discard(self) -> Reply<()> {
        Reply {
            value: (),
            echo: self.echo,
            output: self.output,
            transition: self.transition,
        }
    }
}

fn write_out<W: Write>(out: &mut W, text: &str) -> crate::Result<Option<Transition>> {
    let _ = writeln!(out, "{text}");
    Ok(None)
}
