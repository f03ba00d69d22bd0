use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use tokio::sync::Mutex;

use crate::editor::{CursorLocation, Editor, MarkerKind};
use crate::format::short_path;

/// Malformed breakpoint arguments.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BreakpointSpecError {
    /// More than one argument was given.
    #[error("too many arguments: expected at most 1, got {0}")]
    TooManyArguments(usize),

    /// The function is not qualified by its package (`pkg.Func`).
    #[error("{0:?}: missing package qualifier (expected `pkg.Func`)")]
    MissingPackage(String),

    /// The function name has an empty segment (`main.`, `.foo`).
    #[error("{0:?}: empty name segment")]
    EmptySegment(String),

    /// The location is neither a function nor `file:line`.
    #[error("{0:?}: invalid location")]
    InvalidLocation(String),
}

/// Where to place a breakpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakpointSpec {
    /// Source location.
    Line {
        /// Source file.
        file: String,

        /// Source line.
        line: u32,
    },

    /// Function entry.
    Function {
        /// Qualified function name (`pkg.Func`).
        function: String,

        /// Name derived from the function (`PkgFunc`).
        display_name: String,
    },
}

impl BreakpointSpec {
    /// Parses user arguments: none means the cursor location, one is a
    /// qualified function name.
    pub fn parse<S: AsRef<str>>(
        args: &[S],
        cursor: &CursorLocation,
    ) -> Result<Self, BreakpointSpecError> {
        match args {
            [] => Ok(Self::Line {
                file: cursor.file.clone(),
                line: cursor.line,
            }),
            [function] => Self::function(function.as_ref()),
            _ => Err(BreakpointSpecError::TooManyArguments(args.len())),
        }
    }

    /// Parses a location of the terminal `break` command: `file:line` or
    /// a qualified function name.
    pub fn parse_location(loc: &str) -> Result<Self, BreakpointSpecError> {
        match loc.rsplit_once(':') {
            Some((file, line)) if !file.is_empty() => match line.parse() {
                Ok(line) => Ok(Self::Line {
                    file: file.to_owned(),
                    line,
                }),
                Err(_) => Err(BreakpointSpecError::InvalidLocation(loc.to_owned())),
            },
            Some(_) => Err(BreakpointSpecError::InvalidLocation(loc.to_owned())),
            None => Self::function(loc),
        }
    }

    fn function(function: &str) -> Result<Self, BreakpointSpecError> {
        Ok(Self::Function {
            function: function.to_owned(),
            display_name: display_name(function)?,
        })
    }

    /// Request sent to the debug server.
    pub fn to_request(&self) -> dlvim_rpc::Breakpoint {
        match self {
            Self::Line { file, line } => dlvim_rpc::Breakpoint::at_line(file, *line),
            Self::Function {
                function,
                display_name,
            } => dlvim_rpc::Breakpoint::at_function(function).with_name(display_name),
        }
    }

    /// Display name of function breakpoints.
    pub fn display_name(&self) -> Option<&str> {
        match self {
            Self::Line { .. } => None,
            Self::Function { display_name, .. } => Some(display_name),
        }
    }
}

/// Derives a breakpoint name from a qualified function name, by upper-casing
/// the first character of each dot-separated segment (`main.foo` gives
/// `MainFoo`).
pub fn display_name(function: &str) -> Result<String, BreakpointSpecError> {
    if !function.contains('.') {
        return Err(BreakpointSpecError::MissingPackage(function.to_owned()));
    }

    function
        .split('.')
        .map(|segment| {
            let mut chars = segment.chars();
            let first = chars
                .next()
                .ok_or_else(|| BreakpointSpecError::EmptySegment(function.to_owned()))?;

            Ok(first.to_uppercase().chain(chars).collect::<String>())
        })
        .collect()
}

/// Breakpoint tracked by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    /// Server-assigned ID.
    pub id: u32,

    /// Display name (function breakpoints only).
    pub name: Option<String>,

    /// Resolved address.
    pub addr: u64,

    /// Resolved source file.
    pub file: String,

    /// Resolved source line.
    pub line: u32,

    /// Resolved function.
    pub function_name: String,

    /// Hits per goroutine ID.
    pub hit_count: HashMap<i64, u64>,

    /// Hits over all goroutines.
    pub total_hit_count: u64,
}

impl Breakpoint {
    fn new(bp: dlvim_rpc::Breakpoint, name: Option<String>) -> Self {
        Self {
            id: bp.id,
            name: name.or_else(|| Some(bp.name).filter(|n| !n.is_empty())),
            addr: bp.addr,
            file: bp.file,
            line: bp.line,
            function_name: bp.function_name,
            hit_count: goroutine_hits(&bp.hit_count),
            total_hit_count: bp.total_hit_count,
        }
    }

    fn record_hits(&mut self, bp: &dlvim_rpc::Breakpoint) {
        self.hit_count = goroutine_hits(&bp.hit_count);
        self.total_hit_count = bp.total_hit_count;
    }

    /// One-line description, with paths relative to `dir`.
    pub fn describe(&self, dir: &str) -> String {
        format!(
            "{:#x} for {}() {}:{}",
            self.addr,
            self.function_name,
            short_path(&self.file, dir),
            self.line
        )
    }
}

// goroutine IDs are sent as JSON object keys
fn goroutine_hits(hits: &HashMap<String, u64>) -> HashMap<i64, u64> {
    hits.iter()
        .filter_map(|(id, n)| Some((id.parse().ok()?, *n)))
        .collect()
}

#[derive(Default)]
struct Registry {
    breakpoints: IndexMap<u32, Breakpoint>,

    /// IDs of cleared breakpoints, never handed out again.
    retired: HashSet<u32>,
}

/// Registry of the breakpoints of a session, mirroring them as editor
/// markers.
///
/// The registry and the markers are updated under the same lock, so that
/// concurrent requests never leave them out of sync.
#[derive(Default)]
pub struct BreakpointManager {
    registry: Mutex<Registry>,
}

impl BreakpointManager {
    /// Tracks a breakpoint created by the server, and places its marker.
    pub async fn register(
        &self,
        bp: dlvim_rpc::Breakpoint,
        name: Option<String>,
        editor: &dyn Editor,
    ) -> crate::Result<Breakpoint> {
        let mut registry = self.registry.lock().await;

        if registry.retired.contains(&bp.id) || registry.breakpoints.contains_key(&bp.id) {
            return Err(crate::Error::ReusedBreakpointId(bp.id));
        }

        let bp = Breakpoint::new(bp, name);
        registry.breakpoints.insert(bp.id, bp.clone());

        tracing::debug!(id = bp.id, file = bp.file, line = bp.line, "breakpoint registered");

        editor.place_marker(MarkerKind::Breakpoint, bp.id.into(), &bp.file, bp.line)?;

        Ok(bp)
    }

    /// Whether a breakpoint is tracked.
    pub async fn contains(&self, id: u32) -> bool {
        self.registry.lock().await.breakpoints.contains_key(&id)
    }

    /// Stops tracking a breakpoint, and removes its marker.
    pub async fn unregister(&self, id: u32, editor: &dyn Editor) -> crate::Result<Breakpoint> {
        let mut registry = self.registry.lock().await;

        let bp = registry
            .breakpoints
            .shift_remove(&id)
            .ok_or(crate::Error::UnknownBreakpoint(id))?;
        registry.retired.insert(id);

        editor.unplace_marker(MarkerKind::Breakpoint, id.into())?;

        Ok(bp)
    }

    /// Records the hit counts of a breakpoint the target stopped at.
    ///
    /// Breakpoints unknown to the session are ignored.
    pub async fn record_hits(&self, bp: &dlvim_rpc::Breakpoint) {
        if let Some(tracked) = self.registry.lock().await.breakpoints.get_mut(&bp.id) {
            tracked.record_hits(bp);
        }
    }

    /// Updates the tracked breakpoints from a server listing, moving the
    /// markers of those whose location changed.
    pub async fn refresh(
        &self,
        listed: &[dlvim_rpc::Breakpoint],
        editor: &dyn Editor,
    ) -> crate::Result<()> {
        let mut registry = self.registry.lock().await;

        for bp in listed {
            let Some(tracked) = registry.breakpoints.get_mut(&bp.id) else {
                continue;
            };

            tracked.record_hits(bp);
            tracked.addr = bp.addr;

            if (tracked.file.as_str(), tracked.line) != (bp.file.as_str(), bp.line) {
                tracing::debug!(id = bp.id, file = bp.file, line = bp.line, "breakpoint moved");

                tracked.file.clone_from(&bp.file);
                tracked.line = bp.line;

                editor.unplace_marker(MarkerKind::Breakpoint, bp.id.into())?;
                editor.place_marker(MarkerKind::Breakpoint, bp.id.into(), &bp.file, bp.line)?;
            }
        }

        Ok(())
    }

    /// Tracked breakpoints, in creation order.
    pub async fn list(&self) -> Vec<Breakpoint> {
        self.registry.lock().await.breakpoints.values().cloned().collect()
    }

    /// Stops tracking every breakpoint, removing all markers.
    pub async fn clear(&self, editor: &dyn Editor) {
        let mut registry = self.registry.lock().await;
        let Registry {
            breakpoints,
            retired,
        } = &mut *registry;

        for (id, _) in breakpoints.drain(..) {
            retired.insert(id);

            if let Err(e) = editor.unplace_marker(MarkerKind::Breakpoint, id.into()) {
                tracing::warn!(id, error = %e, "unplace breakpoint marker");
            }
        }
    }
}
