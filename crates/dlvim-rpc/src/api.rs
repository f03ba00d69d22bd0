use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Breakpoint as described by the server.
///
/// The same structure is used for creating a breakpoint: either `file` and
/// `line`, or `function_name` must be set. The `id` of a created breakpoint
/// is assigned by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Breakpoint {
    /// Server-assigned ID.
    pub id: u32,

    /// User-defined name.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Address of the breakpoint in the target.
    pub addr: u64,

    /// Source file of the breakpoint.
    pub file: String,

    /// Source line of the breakpoint.
    pub line: u32,

    /// Function the breakpoint belongs to.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub function_name: String,

    /// Hit counts, keyed by goroutine ID (in decimal).
    pub hit_count: HashMap<String, u64>,

    /// Total number of hits.
    pub total_hit_count: u64,
}

impl Breakpoint {
    /// Breakpoint request for the given source location.
    pub fn at_line(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
            ..Self::default()
        }
    }

    /// Breakpoint request for the entry of the given function.
    pub fn at_function(function_name: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            ..Self::default()
        }
    }

    /// Sets the user-defined name of a breakpoint request.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Hit count recorded for the given goroutine, if any.
    pub fn hits_of_goroutine(&self, goroutine_id: i64) -> Option<u64> {
        self.hit_count.get(&goroutine_id.to_string()).copied()
    }
}

/// State of the debugger (and of the target process).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebuggerState {
    /// Process ID of the target.
    #[serde(rename = "Pid")]
    pub pid: u32,

    /// Whether the target is currently running.
    #[serde(rename = "Running")]
    pub running: bool,

    /// Thread which stopped the target.
    #[serde(rename = "currentThread", skip_serializing_if = "Option::is_none")]
    pub current_thread: Option<Thread>,

    /// Goroutine currently selected.
    #[serde(rename = "currentGoroutine", skip_serializing_if = "Option::is_none")]
    pub current_goroutine: Option<Goroutine>,

    /// Whether the target has exited.
    #[serde(rename = "exited")]
    pub exited: bool,

    /// Exit status of the target, meaningful when `exited` is set.
    #[serde(rename = "exitStatus")]
    pub exit_status: i32,
}

/// Thread of the target process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thread {
    /// Thread ID.
    pub id: i64,

    /// Program counter.
    pub pc: u64,

    /// Current source file.
    pub file: String,

    /// Current source line.
    pub line: u32,

    /// Current function.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<Function>,

    /// ID of the goroutine running on this thread (0 if none).
    #[serde(rename = "goroutineID")]
    pub goroutine_id: i64,

    /// Breakpoint this thread is stopped at, if any.
    #[serde(rename = "breakPoint", skip_serializing_if = "Option::is_none")]
    pub breakpoint: Option<Breakpoint>,
}

impl Thread {
    /// Name of the current function, or `?` if unknown.
    pub fn function_name(&self) -> &str {
        self.function.as_ref().map_or("?", |f| f.name.as_str())
    }
}

/// Function of the target process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Function {
    /// Fully qualified name.
    pub name: String,

    /// Entry address.
    pub value: u64,
}

/// Goroutine of the target process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Goroutine {
    /// Goroutine ID.
    pub id: i64,

    /// Current location (may be inside the runtime).
    pub current_loc: Location,

    /// Topmost location which is not inside the runtime.
    pub user_current_loc: Location,

    /// Location of the `go` statement which created the goroutine.
    pub go_statement_loc: Location,

    /// ID of the thread running the goroutine (0 if parked).
    #[serde(rename = "threadID")]
    pub thread_id: i64,
}

/// Source location in the target process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Location {
    /// Program counter.
    pub pc: u64,

    /// Source file.
    pub file: String,

    /// Source line.
    pub line: u32,

    /// Function at this location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<Function>,
}

impl Location {
    /// Name of the function at this location, or `?` if unknown.
    pub fn function_name(&self) -> &str {
        self.function.as_ref().map_or("?", |f| f.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::{Breakpoint, DebuggerState};

    #[test]
    fn decode_stopped_state() {
        let state: DebuggerState = serde_json::from_str(
            r#"{
                "Pid": 4242,
                "Running": false,
                "currentThread": {
                    "id": 7,
                    "pc": 4735920,
                    "file": "/home/go/src/hello/main.go",
                    "line": 10,
                    "function": {"name": "main.main", "value": 4735872, "type": 0},
                    "goroutineID": 1,
                    "breakPoint": {
                        "id": 1,
                        "addr": 4735920,
                        "file": "/home/go/src/hello/main.go",
                        "line": 10,
                        "functionName": "main.main",
                        "hitCount": {"1": 2},
                        "totalHitCount": 2
                    }
                },
                "exited": false,
                "exitStatus": 0
            }"#,
        )
        .expect("decode");

        assert_eq!(state.pid, 4242);

        let thread = state.current_thread.expect("thread");
        assert_eq!(thread.function_name(), "main.main");
        assert_eq!(thread.goroutine_id, 1);

        let bp = thread.breakpoint.expect("breakpoint");
        assert_eq!(bp.hits_of_goroutine(1), Some(2));
        assert_eq!(bp.hits_of_goroutine(2), None);
        assert_eq!(bp.total_hit_count, 2);
    }

    #[test]
    fn encode_function_breakpoint_request() {
        let req = Breakpoint::at_function("main.foo").with_name("MainFoo");
        let json = serde_json::to_value(&req).expect("encode");

        assert_eq!(json["functionName"], "main.foo");
        assert_eq!(json["name"], "MainFoo");
        assert_eq!(json["id"], 0);
    }
}
