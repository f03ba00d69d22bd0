use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

/// Reply of the mock server to a single call.
pub enum Reply {
    /// Successful call, with its result.
    Ok(Value),

    /// Successful call, replied after some delay.
    Delayed(Duration, Value),

    /// Failed call, with its error message.
    Err(&'static str),

    /// No reply at all (the call stays pending forever).
    Never,

    /// The server drops the connection.
    Hangup,
}

/// Line-delimited JSON-RPC server mimicking a headless Delve server.
///
/// Each call is handled on its own task so that replies can be sent out of
/// order.
pub async fn spawn_mock_server<F>(handler: F) -> SocketAddr
where
    F: Fn(&str, &Value) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let (reader, writer) = stream.into_split();
        let writer = Arc::new(Mutex::new(Some(writer)));
        let mut lines = BufReader::new(reader).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            let request: Value = serde_json::from_str(&line).expect("request json");
            let id = request["id"].clone();
            let method = request["method"].as_str().expect("method").to_owned();
            let params = request["params"][0].clone();

            let reply = handler(&method, &params);
            let writer = writer.clone();

            tokio::spawn(async move {
                let response = match reply {
                    Reply::Ok(result) => json!({"id": id, "result": result, "error": null}),
                    Reply::Delayed(delay, result) => {
                        tokio::time::sleep(delay).await;
                        json!({"id": id, "result": result, "error": null})
                    }
                    Reply::Err(msg) => json!({"id": id, "result": null, "error": msg}),
                    Reply::Never => return,
                    Reply::Hangup => {
                        writer.lock().await.take();
                        return;
                    }
                };

                let mut guard = writer.lock().await;
                if let Some(w) = guard.as_mut() {
                    let mut line = response.to_string();
                    line.push('\n');
                    let _ = w.write_all(line.as_bytes()).await;
                }
            });
        }
    });

    addr
}

/// State reply of a thread stopped at `main.go:10`.
pub fn stopped_state() -> Value {
    json!({
        "State": {
            "Pid": 4242,
            "Running": false,
            "currentThread": {
                "id": 1,
                "pc": 0x49_4f20u64,
                "file": "/src/hello/main.go",
                "line": 10,
                "function": {"name": "main.main"},
                "goroutineID": 1,
                "breakPoint": {
                    "id": 1,
                    "addr": 0x49_4f20u64,
                    "file": "/src/hello/main.go",
                    "line": 10,
                    "functionName": "main.main",
                    "hitCount": {},
                    "totalHitCount": 1
                }
            },
            "exited": false,
            "exitStatus": 0
        }
    })
}
