use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::{Breakpoint, DebuggerState, Goroutine};

/// Call request, as framed by Go's `net/rpc/jsonrpc` codec.
#[derive(Debug, Serialize)]
pub struct Request<P> {
    pub method: String,
    pub params: [P; 1],
    pub id: u64,
}

impl<P: Serialize> Request<P> {
    pub fn new(service_method: &str, params: P, id: u64) -> Self {
        Self {
            method: format!("RPCServer.{service_method}"),
            params: [params],
            id,
        }
    }
}

/// Call reply.
///
/// `error` is `null` on success, a string otherwise.
#[derive(Debug, Deserialize)]
pub struct Response {
    pub id: u64,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl Response {
    pub fn into_result(self) -> crate::Result<Value> {
        match self.error {
            None | Some(Value::Null) => Ok(self.result.unwrap_or(Value::Null)),
            Some(Value::String(msg)) => Err(crate::Error::Server(msg)),
            Some(other) => Err(crate::Error::Server(other.to_string())),
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct Empty {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateBreakpointIn {
    pub breakpoint: Breakpoint,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BreakpointOut {
    pub breakpoint: Breakpoint,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClearBreakpointIn {
    pub id: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ListBreakpointsOut {
    pub breakpoints: Vec<Breakpoint>,
}

#[derive(Debug, Serialize)]
pub struct CommandIn<'a> {
    pub name: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StateOut {
    pub state: DebuggerState,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StateIn {
    pub non_blocking: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ListGoroutinesOut {
    pub goroutines: Vec<Goroutine>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListFunctionsIn<'a> {
    pub filter: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ListFunctionsOut {
    pub funcs: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProcessPidOut {
    pub pid: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DetachIn {
    pub kill: bool,
}

#[cfg(test)]
mod tests {
    use super::{CommandIn, Request, Response};

    #[test]
    fn request_framing() {
        let req = Request::new("Command", CommandIn { name: "continue" }, 3);
        let line = serde_json::to_string(&req).expect("encode");

        assert_eq!(
            line,
            r#"{"method":"RPCServer.Command","params":[{"name":"continue"}],"id":3}"#
        );
    }

    #[test]
    fn response_with_error_string() {
        let resp: Response =
            serde_json::from_str(r#"{"id":1,"result":null,"error":"Breakpoint exists"}"#)
                .expect("decode");

        match resp.into_result() {
            Err(crate::Error::Server(msg)) => assert_eq!(msg, "Breakpoint exists"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
