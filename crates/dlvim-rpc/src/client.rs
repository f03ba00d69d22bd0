use std::future::Future;

use crate::api::{Breakpoint, DebuggerState, Goroutine};

/// Trait implementing the remote call surface of a debug server.
///
/// Implementors must be safe for concurrent use: an editor integration
/// typically lists functions (for command completion) while a `continue`
/// call is still waiting for the target to stop.
pub trait DebugClient: Send + Sync + 'static {
    /// Creates a breakpoint.
    ///
    /// On success, the breakpoint as registered by the server is returned,
    /// with its server-assigned ID.
    fn create_breakpoint(
        &self,
        breakpoint: Breakpoint,
    ) -> impl Future<Output = crate::Result<Breakpoint>> + Send;

    /// Removes the breakpoint with the given ID.
    fn clear_breakpoint(&self, id: u32) -> impl Future<Output = crate::Result<Breakpoint>> + Send;

    /// Lists the breakpoints registered by the server.
    fn list_breakpoints(&self) -> impl Future<Output = crate::Result<Vec<Breakpoint>>> + Send;

    /// Resumes the target.
    ///
    /// The returned future resolves once the target stops again (or exits).
    fn continue_execution(&self) -> impl Future<Output = crate::Result<DebuggerState>> + Send;

    /// Steps over to the next source line.
    fn next(&self) -> impl Future<Output = crate::Result<DebuggerState>> + Send;

    /// Restarts the target process.
    fn restart(&self) -> impl Future<Output = crate::Result<()>> + Send;

    /// Retrieves the current debugger state.
    fn state(&self) -> impl Future<Output = crate::Result<DebuggerState>> + Send;

    /// Lists the goroutines of the target.
    fn list_goroutines(&self) -> impl Future<Output = crate::Result<Vec<Goroutine>>> + Send;

    /// Lists the functions of the target matching the given regular
    /// expression.
    fn list_functions(
        &self,
        filter: &str,
    ) -> impl Future<Output = crate::Result<Vec<String>>> + Send;

    /// Retrieves the process ID of the target.
    fn process_pid(&self) -> impl Future<Output = crate::Result<u32>> + Send;

    /// Detaches the server from the target, optionally killing the target.
    ///
    /// A headless server exits once detached.
    fn detach(&self, kill: bool) -> impl Future<Output = crate::Result<()>> + Send;

    /// Closes the connection.
    ///
    /// Every pending call fails with [ConnectionClosed](crate::Error::ConnectionClosed).
    fn close(&self);
}

/// Trait implementing the connection logic of a debug client.
pub trait Dialer: Send + Sync + 'static {
    /// Client returned by this dialer.
    type Client: DebugClient;

    /// Connects to the debug server listening at `addr` (`host:port`).
    fn dial(&self, addr: &str) -> impl Future<Output = crate::Result<Self::Client>> + Send;
}
