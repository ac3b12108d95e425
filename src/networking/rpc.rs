// Copyright (c) 2026 The tor-dam developers
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]

//! JSON-RPC 2.0 over raw TCP, one JSON value per line.
//!
//! Both the announce responder (server) and the initiator (client) speak
//! this codec. `params` and `result` are always arrays of strings; failures
//! use the standard error envelope with a human-readable message.

use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf},
    net::TcpListener,
    time::timeout,
};
use tracing::{debug, info, warn};

use crate::{networking::announce, node::Node};

/// Parse error per JSON-RPC 2.0.
pub const PARSE_ERROR: i64 = -32700;
/// Unknown method.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Invalid parameters.
pub const INVALID_PARAMS: i64 = -32602;
/// Internal server fault.
pub const INTERNAL_ERROR: i64 = -32603;
/// Application-level failure (revoke mismatch, bad signature, ...).
pub const SERVER_ERROR: i64 = -32000;

/// A JSON-RPC 2.0 request.
#[derive(Debug, Serialize, Deserialize)]
pub struct Request {
    /// Protocol version, always "2.0".
    pub jsonrpc: String,
    /// Request id echoed back in the response.
    pub id: Value,
    /// Method name, e.g. `ann.Init`.
    pub method: String,
    /// Positional string parameters.
    #[serde(default)]
    pub params: Vec<String>,
}

/// The JSON-RPC error envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorObject {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable reason.
    pub message: String,
}

/// A JSON-RPC 2.0 response.
#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    /// Protocol version, always "2.0".
    pub jsonrpc: String,
    /// Id of the request this answers.
    pub id: Value,
    /// Result payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Vec<String>>,
    /// Error envelope on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl Response {
    fn ok(id: Value, result: Vec<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn err(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(ErrorObject {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Client-side RPC errors.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("call timed out")]
    Timeout,
    #[error("protocol violation: {0}")]
    Protocol(String),
    #[error("remote error {code}: {message}")]
    Remote {
        /// Remote error code.
        code: i64,
        /// Remote error message.
        message: String,
    },
}

/// Serve announce RPCs on the given listener, one task per connection.
pub async fn serve(listener: TcpListener, node: Arc<Node>) {
    loop {
        let (stream, remote) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(err = %e, "accept failed");
                continue;
            }
        };
        debug!(remote = %remote, "rpc connection");

        let node = Arc::clone(&node);
        tokio::spawn(async move {
            serve_conn(stream, node).await;
        });
    }
}

async fn serve_conn<S>(stream: S, node: Arc<Node>)
where
    S: AsyncRead + AsyncWrite + Send,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) | Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<Request>(&line) {
            Ok(req) => dispatch(&node, req),
            Err(e) => {
                warn!(err = %e, "unparseable rpc request");
                Response::err(Value::Null, PARSE_ERROR, "parse error")
            }
        };

        let mut buf = match serde_json::to_vec(&resp) {
            Ok(buf) => buf,
            Err(e) => {
                warn!(err = %e, "failed to encode rpc response");
                break;
            }
        };
        buf.push(b'\n');
        if writer.write_all(&buf).await.is_err() {
            break;
        }
    }
}

fn dispatch(node: &Arc<Node>, req: Request) -> Response {
    node.metrics.rpc_requests_total.inc();

    let result = match req.method.as_str() {
        "ann.Init" => announce::init(node, &req.params),
        "ann.Validate" => announce::validate(node, &req.params),
        other => {
            info!(method = %other, "unknown rpc method");
            node.metrics.rpc_failures_total.inc();
            return Response::err(req.id, METHOD_NOT_FOUND, format!("unknown method {other}"));
        }
    };

    match result {
        Ok(vals) => Response::ok(req.id, vals),
        Err(e) => {
            node.metrics.rpc_failures_total.inc();
            Response::err(req.id, e.rpc_code(), e.to_string())
        }
    }
}

/// A sequential JSON-RPC client over any connected byte stream.
pub struct RpcClient<S> {
    reader: tokio::io::Lines<BufReader<ReadHalf<S>>>,
    writer: WriteHalf<S>,
    call_timeout: Duration,
    next_id: u64,
}

impl<S> RpcClient<S>
where
    S: AsyncRead + AsyncWrite + Send,
{
    /// Wrap a connected stream. `call_timeout` bounds each `call`.
    pub fn new(stream: S, call_timeout: Duration) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(reader).lines(),
            writer,
            call_timeout,
            next_id: 0,
        }
    }

    /// Issue one call and wait for its response.
    pub async fn call(&mut self, method: &str, params: Vec<String>) -> Result<Vec<String>, RpcError> {
        self.next_id += 1;
        let req = Request {
            jsonrpc: "2.0".to_string(),
            id: Value::from(self.next_id),
            method: method.to_string(),
            params,
        };
        let mut buf =
            serde_json::to_vec(&req).map_err(|e| RpcError::Protocol(format!("encode: {e}")))?;
        buf.push(b'\n');

        timeout(self.call_timeout, self.roundtrip(buf, Value::from(self.next_id)))
            .await
            .map_err(|_| RpcError::Timeout)?
    }

    async fn roundtrip(&mut self, buf: Vec<u8>, id: Value) -> Result<Vec<String>, RpcError> {
        self.writer.write_all(&buf).await?;

        loop {
            let line = match self.reader.next_line().await? {
                Some(line) => line,
                None => return Err(RpcError::Protocol("connection closed".to_string())),
            };
            if line.trim().is_empty() {
                continue;
            }

            let resp: Response = serde_json::from_str(&line)
                .map_err(|e| RpcError::Protocol(format!("decode: {e}")))?;
            if resp.id != id {
                return Err(RpcError::Protocol("response id mismatch".to_string()));
            }

            if let Some(err) = resp.error {
                return Err(RpcError::Remote {
                    code: err.code,
                    message: err.message,
                });
            }
            return resp
                .result
                .ok_or_else(|| RpcError::Protocol("response without result".to_string()));
        }
    }
}
