//! Control plane: Unix-socket request/response protocol.
//!
//! Newline-delimited JSON over a Unix domain socket. Textual key/action
//! syntax is parsed here into typed values, so the engine never has to
//! reject string syntax; mutations are serialized by the engine queue and
//! never block on transport I/O.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

use keydial_transport::DeviceAddress;

use crate::action::{keys, Action};
use crate::binding::BindingKey;
use crate::runtime::EngineHandle;
use crate::supervisor::SupervisorHandle;

/// One control request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Request {
    Bind { key: String, action: String },
    Unbind { key: String },
    ListBindings,
    ListSupportedKeys,
    SetDeviceAddress { address: String },
    ClearDeviceAddress,
}

/// One binding as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BindingEntry {
    pub key: String,
    pub action: String,
}

/// One control response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Ok {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bindings: Option<Vec<BindingEntry>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        keys: Option<Vec<String>>,
    },
    Error {
        reason: String,
    },
}

impl Response {
    pub fn ok() -> Self {
        Response::Ok {
            bindings: None,
            keys: None,
        }
    }

    pub fn bindings(bindings: Vec<BindingEntry>) -> Self {
        Response::Ok {
            bindings: Some(bindings),
            keys: None,
        }
    }

    pub fn keys(keys: Vec<String>) -> Self {
        Response::Ok {
            bindings: None,
            keys: Some(keys),
        }
    }

    pub fn error(reason: impl std::fmt::Display) -> Self {
        Response::Error {
            reason: reason.to_string(),
        }
    }
}

/// Default control socket path: `$XDG_RUNTIME_DIR/keydial/control.sock`,
/// falling back to `~/.local/share/keydial/control.sock`.
pub fn default_socket_path() -> PathBuf {
    if let Some(runtime) = std::env::var_os("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime).join("keydial").join("control.sock");
    }
    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join("keydial")
            .join("control.sock");
    }
    PathBuf::from("/tmp/keydial-control.sock")
}

/// Control socket server.
pub struct ControlServer {
    listener: UnixListener,
    engine: EngineHandle,
    supervisor: SupervisorHandle,
}

impl ControlServer {
    /// Bind the socket, replacing any stale file from a previous run.
    pub fn bind(
        path: &Path,
        engine: EngineHandle,
        supervisor: SupervisorHandle,
    ) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        let listener = UnixListener::bind(path)?;
        info!(path = %path.display(), "control socket listening");
        Ok(Self {
            listener,
            engine,
            supervisor,
        })
    }

    /// Accept loop. Each connection may issue any number of requests, one
    /// JSON object per line.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, _)) => {
                    let engine = self.engine.clone();
                    let supervisor = self.supervisor.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, engine, supervisor).await {
                            debug!("control client error: {e}");
                        }
                    });
                }
                Err(e) => {
                    warn!("control accept failed: {e}");
                    break;
                }
            }
        }
    }
}

async fn handle_client(
    stream: UnixStream,
    engine: EngineHandle,
    supervisor: SupervisorHandle,
) -> std::io::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                debug!(?request, "control request");
                dispatch(request, &engine, &supervisor).await
            }
            Err(e) => Response::error(format!("invalid request: {e}")),
        };
        let payload = serde_json::to_string(&response)
            .unwrap_or_else(|_| r#"{"status":"error","reason":"serialization failure"}"#.into());
        write.write_all(payload.as_bytes()).await?;
        write.write_all(b"\n").await?;
    }
    Ok(())
}

async fn dispatch(
    request: Request,
    engine: &EngineHandle,
    supervisor: &SupervisorHandle,
) -> Response {
    match request {
        Request::Bind { key, action } => {
            let key: BindingKey = match key.parse() {
                Ok(key) => key,
                Err(e) => return Response::error(e),
            };
            let action: Action = match action.parse() {
                Ok(action) => action,
                Err(e) => return Response::error(e),
            };
            match engine.bind(key, action).await {
                Ok(()) => Response::ok(),
                Err(e) => Response::error(e),
            }
        }
        Request::Unbind { key } => {
            let key: BindingKey = match key.parse() {
                Ok(key) => key,
                Err(e) => return Response::error(e),
            };
            match engine.unbind(key).await {
                Ok(Ok(())) => Response::ok(),
                Ok(Err(not_found)) => Response::error(not_found),
                Err(e) => Response::error(e),
            }
        }
        Request::ListBindings => match engine.snapshot().await {
            Ok(entries) => Response::bindings(
                entries
                    .into_iter()
                    .map(|(key, action)| BindingEntry {
                        key: key.to_string(),
                        action: action.to_string(),
                    })
                    .collect(),
            ),
            Err(e) => Response::error(e),
        },
        Request::ListSupportedKeys => Response::keys(keys::names().map(String::from).collect()),
        Request::SetDeviceAddress { address } => {
            let addr: DeviceAddress = match address.parse() {
                Ok(addr) => addr,
                Err(e) => return Response::error(e),
            };
            match supervisor.set_address(Some(addr)).await {
                Ok(()) => Response::ok(),
                Err(e) => Response::error(e),
            }
        }
        Request::ClearDeviceAddress => match supervisor.set_address(None).await {
            Ok(()) => Response::ok(),
            Err(e) => Response::error(e),
        },
    }
}

/// Client-side failure modes for the CLI.
#[derive(Error, Debug)]
pub enum ControlClientError {
    #[error("service not running ({0})")]
    Connect(std::io::Error),

    #[error("communication error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid response from service: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("no response from service")]
    Empty,
}

/// Send a single request to a running daemon and return its response.
pub async fn send_request(path: &Path, request: &Request) -> Result<Response, ControlClientError> {
    let mut stream = UnixStream::connect(path)
        .await
        .map_err(ControlClientError::Connect)?;

    let payload = serde_json::to_string(request)?;
    stream.write_all(payload.as_bytes()).await?;
    stream.write_all(b"\n").await?;

    let mut line = String::new();
    let mut reader = BufReader::new(stream);
    reader.read_line(&mut line).await?;
    if line.trim().is_empty() {
        return Err(ControlClientError::Empty);
    }
    Ok(serde_json::from_str(&line)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_wire_shapes() {
        let bind = Request::Bind {
            key: "BUTTON_1".into(),
            action: "KEY_F1".into(),
        };
        assert_eq!(
            serde_json::to_string(&bind).unwrap(),
            r#"{"command":"bind","key":"BUTTON_1","action":"KEY_F1"}"#
        );

        let list: Request = serde_json::from_str(r#"{"command":"list_bindings"}"#).unwrap();
        assert_eq!(list, Request::ListBindings);

        let set: Request =
            serde_json::from_str(r#"{"command":"set_device_address","address":"AA:BB:CC:DD:EE:FF"}"#)
                .unwrap();
        assert_eq!(
            set,
            Request::SetDeviceAddress {
                address: "AA:BB:CC:DD:EE:FF".into()
            }
        );
    }

    #[test]
    fn response_wire_shapes() {
        assert_eq!(
            serde_json::to_string(&Response::ok()).unwrap(),
            r#"{"status":"ok"}"#
        );
        assert_eq!(
            serde_json::to_string(&Response::error("no binding for BUTTON_1")).unwrap(),
            r#"{"status":"error","reason":"no binding for BUTTON_1"}"#
        );

        let listed = Response::bindings(vec![BindingEntry {
            key: "BUTTON_1".into(),
            action: "KEY_F1".into(),
        }]);
        let json = serde_json::to_string(&listed).unwrap();
        assert_eq!(
            json,
            r#"{"status":"ok","bindings":[{"key":"BUTTON_1","action":"KEY_F1"}]}"#
        );
        // And the client can read it back.
        assert_eq!(serde_json::from_str::<Response>(&json).unwrap(), listed);
    }

    #[test]
    fn plain_ok_parses_without_optional_fields() {
        let ok: Response = serde_json::from_str(r#"{"status":"ok"}"#).unwrap();
        assert_eq!(ok, Response::ok());
    }
}
