#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use dlvim_rpc::client::{DebugClient, Dialer};
use dlvim_rpc::{Breakpoint, DebuggerState, Function, Goroutine, Location, Thread};
use dlvim_session::{
    CursorLocation, Editor, EditorError, MarkerKind, Session, SessionConfig, SessionController,
};

/// Scripted reply of a continue/next call.
pub enum Scripted {
    /// The target stops with this state.
    State(DebuggerState),

    /// The call fails.
    Fail(dlvim_rpc::Error),

    /// The call never returns.
    Hang,
}

/// In-memory debug server, handing out sequential breakpoint IDs.
pub struct FakeServer {
    pub pid: AtomicU32,
    next_bp_id: AtomicU32,
    calls: Mutex<Vec<&'static str>>,
    requests: Mutex<Vec<Breakpoint>>,
    created: Mutex<Vec<Breakpoint>>,
    resumes: Mutex<VecDeque<Scripted>>,
    create_yields: Mutex<VecDeque<u32>>,
    pub hang_state: AtomicBool,
    pub closed: AtomicBool,

    /// Unscripted stops happen on a new thread each time.
    pub hop_threads: AtomicBool,
    next_thread: AtomicI64,

    /// Goroutine listings fail as if the connection dropped.
    pub drop_goroutines: AtomicBool,

    /// Number of upcoming dials to refuse.
    pub refusals: AtomicU32,
    dialed: Mutex<Vec<String>>,
}

impl FakeServer {
    pub fn new(pid: u32) -> Arc<Self> {
        Arc::new(Self {
            pid: AtomicU32::new(pid),
            next_bp_id: AtomicU32::new(0),
            calls: Mutex::default(),
            requests: Mutex::default(),
            created: Mutex::default(),
            resumes: Mutex::default(),
            create_yields: Mutex::default(),
            hang_state: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            hop_threads: AtomicBool::new(false),
            next_thread: AtomicI64::new(1),
            drop_goroutines: AtomicBool::new(false),
            refusals: AtomicU32::new(0),
            dialed: Mutex::default(),
        })
    }

    /// Scripts the reply of the next continue/next call.
    pub fn script(&self, reply: Scripted) {
        self.resumes.lock().unwrap().push_back(reply);
    }

    /// Scripts how many times each upcoming breakpoint creation yields to
    /// the scheduler before being answered.
    pub fn script_create_yields(&self, yields: impl IntoIterator<Item = u32>) {
        self.create_yields.lock().unwrap().extend(yields);
    }

    /// Makes the server hand out already used breakpoint IDs.
    pub fn reset_ids(&self) {
        self.next_bp_id.store(0, Ordering::SeqCst);
    }

    /// Applies `f` to every breakpoint the server holds.
    pub fn edit_breakpoints(&self, f: impl FnMut(&mut Breakpoint)) {
        self.created.lock().unwrap().iter_mut().for_each(f);
    }

    /// Number of calls of the given method.
    pub fn count(&self, method: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|m| **m == method).count()
    }

    /// Addresses dialed so far.
    pub fn dialed(&self) -> Vec<String> {
        self.dialed.lock().unwrap().clone()
    }

    /// Breakpoint requests received so far.
    pub fn requests(&self) -> Vec<Breakpoint> {
        self.requests.lock().unwrap().clone()
    }

    fn record(&self, method: &'static str) {
        self.calls.lock().unwrap().push(method);
    }

    fn next_resume(&self) -> Option<Scripted> {
        self.resumes.lock().unwrap().pop_front()
    }
}

/// Thread stopped at `main.go:10`, on breakpoint 1.
pub fn stopped_state(pid: u32) -> DebuggerState {
    DebuggerState {
        pid,
        current_thread: Some(Thread {
            id: 1,
            pc: 0x49_4f20,
            file: "main.go".into(),
            line: 10,
            function: Some(Function {
                name: "main".into(),
                value: 0x49_4f00,
            }),
            goroutine_id: 1,
            breakpoint: Some(Breakpoint {
                id: 1,
                total_hit_count: 1,
                ..Breakpoint::default()
            }),
        }),
        ..DebuggerState::default()
    }
}

/// Thread stepped to `main.go:<line>`, outside any breakpoint.
pub fn stepped_state(pid: u32, line: u32) -> DebuggerState {
    let mut state = stopped_state(pid);

    if let Some(thread) = state.current_thread.as_mut() {
        thread.line = line;
        thread.pc += 8;
        thread.breakpoint = None;
    }

    state
}

pub fn exited_state(pid: u32, status: i32) -> DebuggerState {
    DebuggerState {
        pid,
        exited: true,
        exit_status: status,
        ..DebuggerState::default()
    }
}

#[derive(Clone)]
pub struct FakeClient(pub Arc<FakeServer>);

impl FakeClient {
    async fn resume(&self) -> dlvim_rpc::Result<DebuggerState> {
        match self.0.next_resume() {
            Some(Scripted::State(state)) => Ok(state),
            Some(Scripted::Fail(e)) => Err(e),
            Some(Scripted::Hang) => std::future::pending().await,
            None => {
                let mut state = stopped_state(self.0.pid.load(Ordering::SeqCst));

                if self.0.hop_threads.load(Ordering::SeqCst) {
                    let id = self.0.next_thread.fetch_add(1, Ordering::SeqCst);
                    if let Some(thread) = state.current_thread.as_mut() {
                        thread.id = id;
                    }
                }

                Ok(state)
            }
        }
    }
}

impl DebugClient for FakeClient {
    async fn create_breakpoint(&self, req: Breakpoint) -> dlvim_rpc::Result<Breakpoint> {
        self.0.record("CreateBreakpoint");
        self.0.requests.lock().unwrap().push(req.clone());

        let yields = self.0.create_yields.lock().unwrap().pop_front().unwrap_or(0);
        for _ in 0..yields {
            tokio::task::yield_now().await;
        }

        let id = self.0.next_bp_id.fetch_add(1, Ordering::SeqCst) + 1;

        let created = Breakpoint {
            id,
            addr: 0x49_4f20 + u64::from(id),
            file: if req.file.is_empty() {
                "main.go".into()
            } else {
                req.file
            },
            line: if req.line == 0 { 10 } else { req.line },
            function_name: if req.function_name.is_empty() {
                "main".into()
            } else {
                req.function_name
            },
            name: req.name,
            hit_count: HashMap::new(),
            total_hit_count: 0,
        };

        self.0.created.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn clear_breakpoint(&self, id: u32) -> dlvim_rpc::Result<Breakpoint> {
        self.0.record("ClearBreakpoint");
        self.0.created.lock().unwrap().retain(|bp| bp.id != id);

        Ok(Breakpoint {
            id,
            ..Breakpoint::default()
        })
    }

    async fn list_breakpoints(&self) -> dlvim_rpc::Result<Vec<Breakpoint>> {
        self.0.record("ListBreakpoints");
        Ok(self.0.created.lock().unwrap().clone())
    }

    async fn continue_execution(&self) -> dlvim_rpc::Result<DebuggerState> {
        self.0.record("Continue");
        self.resume().await
    }

    async fn next(&self) -> dlvim_rpc::Result<DebuggerState> {
        self.0.record("Next");
        self.resume().await
    }

    async fn restart(&self) -> dlvim_rpc::Result<()> {
        self.0.record("Restart");
        self.0.pid.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn state(&self) -> dlvim_rpc::Result<DebuggerState> {
        self.0.record("State");

        if self.0.hang_state.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        Ok(stopped_state(self.0.pid.load(Ordering::SeqCst)))
    }

    async fn list_goroutines(&self) -> dlvim_rpc::Result<Vec<Goroutine>> {
        self.0.record("ListGoroutines");

        if self.0.drop_goroutines.load(Ordering::SeqCst) {
            return Err(dlvim_rpc::Error::ConnectionClosed);
        }

        let loc = Location {
            pc: 0x49_4f20,
            file: "main.go".into(),
            line: 10,
            function: Some(Function {
                name: "main.main".into(),
                value: 0x49_4f00,
            }),
        };

        Ok(vec![Goroutine {
            id: 1,
            current_loc: loc.clone(),
            user_current_loc: loc,
            thread_id: 1,
            ..Goroutine::default()
        }])
    }

    async fn list_functions(&self, filter: &str) -> dlvim_rpc::Result<Vec<String>> {
        self.0.record("ListFunctions");

        Ok(["main.main", "main.foo", "fmt.Println"]
            .into_iter()
            .filter(|f| f.starts_with(filter))
            .map(str::to_owned)
            .collect())
    }

    async fn process_pid(&self) -> dlvim_rpc::Result<u32> {
        self.0.record("ProcessPid");
        Ok(self.0.pid.load(Ordering::SeqCst))
    }

    async fn detach(&self, _kill: bool) -> dlvim_rpc::Result<()> {
        self.0.record("Detach");
        Ok(())
    }

    fn close(&self) {
        self.0.closed.store(true, Ordering::SeqCst);
    }
}

/// Dialer of a [FakeServer].
pub struct FakeDialer {
    server: Arc<FakeServer>,
}

impl FakeDialer {
    pub fn new(server: Arc<FakeServer>) -> Self {
        Self { server }
    }
}

impl Dialer for FakeDialer {
    type Client = FakeClient;

    async fn dial(&self, addr: &str) -> dlvim_rpc::Result<FakeClient> {
        self.server.dialed.lock().unwrap().push(addr.to_owned());

        let refused = self
            .server
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        if refused {
            return Err(std::io::Error::from(std::io::ErrorKind::ConnectionRefused).into());
        }

        Ok(FakeClient(self.server.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorEvent {
    Buffers,
    Place(MarkerKind, i64, String, u32),
    Unplace(MarkerKind, i64),
    Cursor(String, u32),
    Log(String),
}

/// Editor recording every primitive call.
#[derive(Default)]
pub struct RecordingEditor {
    events: Mutex<Vec<EditorEvent>>,
    input: Mutex<VecDeque<String>>,
}

impl RecordingEditor {
    pub fn events(&self) -> Vec<EditorEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Whole session log.
    pub fn log(&self) -> String {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                EditorEvent::Log(text) => Some(text),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// IDs of the markers of the given kind currently placed.
    pub fn markers(&self, kind: MarkerKind) -> BTreeSet<i64> {
        let mut placed = BTreeSet::new();

        for event in self.events() {
            match event {
                EditorEvent::Place(k, id, ..) if k == kind => {
                    placed.insert(id);
                }
                EditorEvent::Unplace(k, id) if k == kind => {
                    placed.remove(&id);
                }
                _ => (),
            }
        }

        placed
    }

    pub fn count(&self, pred: impl Fn(&EditorEvent) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }

    pub fn push_input(&self, line: &str) {
        self.input.lock().unwrap().push_back(line.to_owned());
    }

    fn push(&self, event: EditorEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl Editor for RecordingEditor {
    fn create_session_buffers(&self) -> Result<(), EditorError> {
        self.push(EditorEvent::Buffers);
        Ok(())
    }

    fn place_marker(
        &self,
        kind: MarkerKind,
        id: i64,
        file: &str,
        line: u32,
    ) -> Result<(), EditorError> {
        self.push(EditorEvent::Place(kind, id, file.to_owned(), line));
        Ok(())
    }

    fn unplace_marker(&self, kind: MarkerKind, id: i64) -> Result<(), EditorError> {
        self.push(EditorEvent::Unplace(kind, id));
        Ok(())
    }

    fn move_cursor(&self, file: &str, line: u32) -> Result<(), EditorError> {
        self.push(EditorEvent::Cursor(file.to_owned(), line));
        Ok(())
    }

    fn append_log(&self, text: &str) -> Result<(), EditorError> {
        self.push(EditorEvent::Log(text.to_owned()));
        Ok(())
    }

    fn prompt_input(&self, _message: &str) -> Result<String, EditorError> {
        Ok(self.input.lock().unwrap().pop_front().unwrap_or_default())
    }
}

pub const PROJECT_DIR: &str = "/src/hello";

pub fn cursor(line: u32) -> CursorLocation {
    CursorLocation::new("main.go", line)
}

pub struct Fixture {
    pub server: Arc<FakeServer>,
    pub editor: Arc<RecordingEditor>,
    pub controller: SessionController<FakeDialer>,
}

impl Fixture {
    pub fn new(pid: u32) -> Self {
        Self::with_config(pid, SessionConfig::default())
    }

    pub fn with_config(pid: u32, config: SessionConfig) -> Self {
        let server = FakeServer::new(pid);
        let editor = Arc::new(RecordingEditor::default());

        let controller =
            SessionController::new(FakeDialer::new(server.clone()), editor.clone(), config);

        Self {
            server,
            editor,
            controller,
        }
    }

    /// Connects a session to the fake server.
    pub async fn connect(&self) -> Arc<Session<FakeClient>> {
        self.controller
            .connect("41222", Path::new(PROJECT_DIR))
            .await
            .expect("connect")
    }
}
