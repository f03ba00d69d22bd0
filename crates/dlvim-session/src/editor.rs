use std::fmt;

/// Kind of gutter marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MarkerKind {
    /// Breakpoint marker, identified by the breakpoint ID.
    Breakpoint,

    /// Program counter marker, identified by the stopped thread ID.
    ProgramCounter,
}

impl fmt::Display for MarkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Breakpoint => f.write_str("breakpoint"),
            Self::ProgramCounter => f.write_str("pc"),
        }
    }
}

/// Position of the cursor in the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorLocation {
    /// File of the current buffer.
    pub file: String,

    /// Line of the cursor (1-based).
    pub line: u32,
}

impl CursorLocation {
    /// Creates a cursor location.
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

/// Error reported by the editor collaborator.
#[derive(thiserror::Error, Debug)]
#[error("editor: {0}")]
pub struct EditorError(pub String);

impl EditorError {
    /// Creates an editor error from any displayable message.
    pub fn new(msg: impl fmt::Display) -> Self {
        Self(msg.to_string())
    }
}

/// Trait implementing the editor primitives used by a debugging session.
///
/// The session calls these synchronously, possibly from several tasks at
/// once.
pub trait Editor: Send + Sync + 'static {
    /// Creates the buffers/windows hosting the session log and signs.
    ///
    /// Called once, when the session becomes ready.
    fn create_session_buffers(&self) -> Result<(), EditorError>;

    /// Places a marker at the given location.
    ///
    /// Placing a marker with an already placed `(kind, id)` moves it.
    fn place_marker(
        &self,
        kind: MarkerKind,
        id: i64,
        file: &str,
        line: u32,
    ) -> Result<(), EditorError>;

    /// Removes a previously placed marker.
    fn unplace_marker(&self, kind: MarkerKind, id: i64) -> Result<(), EditorError>;

    /// Moves the cursor to the given location.
    fn move_cursor(&self, file: &str, line: u32) -> Result<(), EditorError>;

    /// Appends text (possibly multi-line) to the session log.
    fn append_log(&self, text: &str) -> Result<(), EditorError>;

    /// Asks the user for a line of input.
    fn prompt_input(&self, message: &str) -> Result<String, EditorError>;
}
