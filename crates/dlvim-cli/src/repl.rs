use dlvim_rpc::client::Dialer;
use dlvim_session::{CursorLocation, Editor, PROMPT, Session, SessionController, SessionState};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::sync::watch;

use crate::TerminalEditor;

const USAGE: &str = "\
dlvim commands:
    :break [<pkg>.<func>]  Sets a breakpoint (at the current line without argument).
    :clear <id>            Deletes a breakpoint.
    :continue              Runs until breakpoint or program termination.
    :next                  Steps over to the next source line.
    :restart               Restarts the process, keeping breakpoints.
    :state                 Prints the state of the debugger.
    :funcs [<regex>]       Prints the functions (of package main by default).
    :dlv                   Prompts for a debugger command.
    :stop                  Stops the session.
Any other line is sent to the debugger terminal.";

/// Command entered on the terminal.
#[derive(Debug, PartialEq, Eq)]
pub enum ReplCommand<'a> {
    /// Sets a breakpoint.
    Break(Vec<&'a str>),

    /// Deletes a breakpoint.
    Clear(&'a str),

    /// Resumes the target.
    Continue,

    /// Steps over.
    Next,

    /// Restarts the target.
    Restart,

    /// Prints the debugger state.
    State,

    /// Lists functions matching a filter.
    Funcs(&'a str),

    /// Prompts for a debugger command.
    Dlv,

    /// Stops the session.
    Stop,

    /// Unknown `:` command.
    Unknown(&'a str),

    /// Line sent to the debugger terminal.
    Raw(&'a str),
}

impl<'a> ReplCommand<'a> {
    /// Parses a terminal line, `None` if it is blank.
    pub fn parse(line: &'a str) -> Option<Self> {
        let line = line.trim();

        if line.is_empty() {
            return None;
        }

        let Some(command) = line.strip_prefix(':') else {
            return Some(Self::Raw(line));
        };

        let (keyword, args) = dlvim_session::split_command(command);

        let command = match keyword {
            "break" | "b" => Self::Break(args.split_whitespace().collect()),
            "clear" => Self::Clear(args),
            "continue" | "c" => Self::Continue,
            "next" | "n" => Self::Next,
            "restart" | "r" => Self::Restart,
            "state" => Self::State,
            "funcs" => Self::Funcs(args),
            "dlv" => Self::Dlv,
            "stop" | "q" => Self::Stop,
            _ => Self::Unknown(keyword),
        };

        Some(command)
    }
}

/// Reads commands from `input` until the session ends, the input is
/// exhausted, or `ctrl-c` is pressed.
///
/// Answers to `:dlv` prompts are read from `input` as well.
///
/// The live session is stopped before returning.
pub async fn run<D, R>(
    controller: &SessionController<D>,
    editor: &TerminalEditor,
    input: R,
) -> miette::Result<()>
where
    D: Dialer,
    R: AsyncBufRead + Unpin,
{
    let session = match controller.session().await {
        Ok(session) => session,
        Err(_) => return Ok(()),
    };

    let mut state = session.subscribe();
    let mut lines = input.lines();

    while let Some(line) = next_line(&mut lines, &mut state).await {
        let Some(command) = ReplCommand::parse(&line) else {
            continue;
        };

        match command {
            ReplCommand::Stop => break,
            ReplCommand::Dlv => {
                if !read_answer(editor, &mut lines, &mut state).await {
                    break;
                }

                if let Err(e) = session.prompt_and_relay().await {
                    tracing::debug!(error = %e, "command failed");
                }
            }
            command => evaluate(&session, editor, command).await,
        }
    }

    controller.stop().await;

    Ok(())
}

/// Next input line, `None` once there is nothing more to run.
async fn next_line<R>(
    lines: &mut Lines<R>,
    state: &mut watch::Receiver<SessionState>,
) -> Option<String>
where
    R: AsyncBufRead + Unpin,
{
    tokio::select! {
        line = lines.next_line() => match line {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(error = %e, "read command");
                None
            }
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
            None
        }
        res = state.wait_for(|s| s.is_terminal()) => {
            if let Ok(s) = res {
                tracing::info!(state = %*s, "session ended");
            }
            None
        }
    }
}

/// Prompts for a debugger command, handing the answer to `editor`.
///
/// Returns `false` if the input ended first.
async fn read_answer<R>(
    editor: &TerminalEditor,
    lines: &mut Lines<R>,
    state: &mut watch::Receiver<SessionState>,
) -> bool
where
    R: AsyncBufRead + Unpin,
{
    if let Err(e) = editor.show_prompt(PROMPT) {
        tracing::warn!(error = %e, "show prompt");
    }

    match next_line(lines, state).await {
        Some(answer) => {
            editor.supply_input(answer);
            true
        }
        None => false,
    }
}

async fn evaluate<C>(session: &Session<C>, editor: &dyn Editor, command: ReplCommand<'_>)
where
    C: dlvim_rpc::client::DebugClient,
{
    // failures are already reported in the session log
    let res = match command {
        ReplCommand::Break(args) => {
            let cursor = match session.snapshot() {
                Some(snapshot) => CursorLocation::new(&snapshot.file, snapshot.line),
                None if !args.is_empty() => CursorLocation::new(session.dir(), 0),
                None => {
                    print(editor, "no current location, use `:break <pkg>.<func>`");
                    return;
                }
            };

            session.set_breakpoint(args.as_slice(), &cursor).await.map(drop)
        }
        ReplCommand::Clear(id) => match id.parse() {
            Ok(id) => session.clear_breakpoint(id).await.map(drop),
            Err(_) => {
                print(editor, "usage: :clear <id>");
                return;
            }
        },
        ReplCommand::Continue => session.continue_execution().await.map(drop),
        ReplCommand::Next => session.step().await.map(drop),
        ReplCommand::Restart => session.restart().await.map(drop),
        ReplCommand::State => session.get_state().await.map(drop),
        ReplCommand::Funcs(filter) => {
            let funcs = if filter.is_empty() {
                session.functions_completion().await
            } else {
                session.list_functions(filter).await
            };

            funcs.map(|funcs| print(editor, &funcs.join("\n")))
        }
        ReplCommand::Raw(line) => session.send_raw_command(line).await.map(drop),
        ReplCommand::Unknown(_) => {
            print(editor, USAGE);
            return;
        }
        // handled by the command loop
        ReplCommand::Dlv | ReplCommand::Stop => return,
    };

    if let Err(e) = res {
        tracing::debug!(error = %e, "command failed");
    }
}

fn print(editor: &dyn Editor, text: &str) {
    if let Err(e) = editor.append_log(text) {
        tracing::warn!(error = %e, "append log");
    }
}
