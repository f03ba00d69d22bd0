mod message;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, oneshot};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;

use self::message::*;
use crate::api::{Breakpoint, DebuggerState, Goroutine};
use crate::client::{DebugClient, Dialer};

/// Maximum length of a single reply line.
///
/// Function listings of large binaries easily exceed a few megabytes.
const MAX_LINE_LENGTH: usize = 64 * 1024 * 1024;

type PendingReply = oneshot::Sender<crate::Result<Value>>;

struct Inner {
    writer: Mutex<FramedWrite<OwnedWriteHalf, LinesCodec>>,
    pending: Mutex<HashMap<u64, PendingReply>>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
}

/// JSON-RPC client of a Delve headless server (API version 2).
///
/// Calls may be issued concurrently: each one is tagged with a unique ID and
/// a background task routes the replies back to their caller.
#[derive(Clone)]
pub struct JsonRpcClient {
    inner: Arc<Inner>,
}

impl JsonRpcClient {
    /// Connects to the server listening at `addr`.
    #[tracing::instrument(name = "RpcConnect")]
    pub async fn connect(addr: &str) -> crate::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let _ = stream.set_nodelay(true);

        tracing::debug!("connected");

        Ok(Self::from_stream(stream))
    }

    fn from_stream(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();

        let inner = Arc::new(Inner {
            writer: Mutex::new(FramedWrite::new(writer, LinesCodec::new())),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        });

        let reader = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
        tokio::spawn(read_loop(reader, inner.clone()));

        Self { inner }
    }

    /// A token that is cancelled once the connection is closed, either
    /// explicitly via [close](DebugClient::close) or because the server
    /// went away.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    async fn call<P, R>(&self, method: &str, params: P) -> crate::Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        if self.inner.shutdown.is_cancelled() {
            return Err(crate::Error::ConnectionClosed);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let line = serde_json::to_string(&Request::new(method, params, id))?;

        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().await.insert(id, tx);

        tracing::trace!(id, method, "call");

        let sent = self.inner.writer.lock().await.send(line).await;
        if let Err(e) = sent {
            self.inner.pending.lock().await.remove(&id);
            return Err(e.into());
        }

        let value = tokio::select! {
            _ = self.inner.shutdown.cancelled() => {
                self.inner.pending.lock().await.remove(&id);
                return Err(crate::Error::ConnectionClosed);
            }
            reply = rx => reply.map_err(|_| crate::Error::ConnectionClosed)??,
        };

        serde_json::from_value(value).map_err(Into::into)
    }

    async fn command(&self, name: &str) -> crate::Result<DebuggerState> {
        match self.call::<_, StateOut>("Command", CommandIn { name }).await {
            Ok(out) => Ok(out.state),
            Err(crate::Error::Server(msg)) => match parse_exit(&msg) {
                Some((pid, exit_status)) => Ok(DebuggerState {
                    pid,
                    exited: true,
                    exit_status,
                    ..DebuggerState::default()
                }),
                None => Err(crate::Error::Server(msg)),
            },
            Err(e) => Err(e),
        }
    }
}

async fn read_loop(mut reader: FramedRead<OwnedReadHalf, LinesCodec>, inner: Arc<Inner>) {
    loop {
        let line = tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            line = reader.next() => line,
        };

        let line = match line {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                tracing::error!(error = %e, "read reply");
                break;
            }
            None => {
                tracing::debug!("server closed the connection");
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Response>(&line) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "malformed reply");
                continue;
            }
        };

        let id = response.id;
        match inner.pending.lock().await.remove(&id) {
            Some(tx) => {
                let _ = tx.send(response.into_result());
            }
            None => tracing::warn!(error = %crate::Error::UnexpectedReply(id)),
        }
    }

    inner.shutdown.cancel();

    for (_, tx) in inner.pending.lock().await.drain() {
        let _ = tx.send(Err(crate::Error::ConnectionClosed));
    }
}

impl DebugClient for JsonRpcClient {
    async fn create_breakpoint(&self, breakpoint: Breakpoint) -> crate::Result<Breakpoint> {
        let out: BreakpointOut = self
            .call("CreateBreakpoint", CreateBreakpointIn { breakpoint })
            .await?;
        Ok(out.breakpoint)
    }

    async fn clear_breakpoint(&self, id: u32) -> crate::Result<Breakpoint> {
        let out: BreakpointOut = self.call("ClearBreakpoint", ClearBreakpointIn { id }).await?;
        Ok(out.breakpoint)
    }

    async fn list_breakpoints(&self) -> crate::Result<Vec<Breakpoint>> {
        let out: ListBreakpointsOut = self.call("ListBreakpoints", Empty {}).await?;
        Ok(out.breakpoints)
    }

    async fn continue_execution(&self) -> crate::Result<DebuggerState> {
        self.command("continue").await
    }

    async fn next(&self) -> crate::Result<DebuggerState> {
        self.command("next").await
    }

    async fn restart(&self) -> crate::Result<()> {
        let _: Value = self.call("Restart", Empty {}).await?;
        Ok(())
    }

    async fn state(&self) -> crate::Result<DebuggerState> {
        let out: StateOut = self
            .call("State", StateIn { non_blocking: true })
            .await?;
        Ok(out.state)
    }

    async fn list_goroutines(&self) -> crate::Result<Vec<Goroutine>> {
        let out: ListGoroutinesOut = self.call("ListGoroutines", Empty {}).await?;
        Ok(out.goroutines)
    }

    async fn list_functions(&self, filter: &str) -> crate::Result<Vec<String>> {
        let out: ListFunctionsOut = self.call("ListFunctions", ListFunctionsIn { filter }).await?;
        Ok(out.funcs)
    }

    async fn process_pid(&self) -> crate::Result<u32> {
        let out: ProcessPidOut = self.call("ProcessPid", Empty {}).await?;
        Ok(out.pid)
    }

    async fn detach(&self, kill: bool) -> crate::Result<()> {
        let _: Value = self.call("Detach", DetachIn { kill }).await?;
        Ok(())
    }

    fn close(&self) {
        self.inner.shutdown.cancel();
    }
}

/// Default dialer, connecting a [JsonRpcClient] over TCP.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpDialer;

impl Dialer for TcpDialer {
    type Client = JsonRpcClient;

    async fn dial(&self, addr: &str) -> crate::Result<Self::Client> {
        JsonRpcClient::connect(addr).await
    }
}

/// Parses the error the server returns when resuming a target which exits
/// (`Process 4242 has exited with status 0`).
fn parse_exit(msg: &str) -> Option<(u32, i32)> {
    let (pid, status) = msg
        .strip_prefix("Process ")?
        .split_once(" has exited with status ")?;

    Some((pid.parse().ok()?, status.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::parse_exit;

    #[test]
    fn exit_message() {
        assert_eq!(
            parse_exit("Process 4242 has exited with status 0"),
            Some((4242, 0))
        );
        assert_eq!(
            parse_exit("Process 7 has exited with status -1"),
            Some((7, -1))
        );
        assert_eq!(parse_exit("could not find function main.nope"), None);
        assert_eq!(parse_exit("Process x has exited with status 0"), None);
    }
}
