// Huion Keydial Mini Linux Driver - Shared Library
// Report decoding, keybind resolution, control plane, and connection
// supervision

pub mod action;
pub mod binding;
pub mod config;
pub mod control;
pub mod decoder;
pub mod engine;
pub mod protocol;
pub mod runtime;
pub mod sink;
pub mod supervisor;

pub use action::{Action, MouseButton, ScrollAxis, ValidationError};
pub use binding::BindingKey;
pub use config::{Config, ConfigError};
pub use control::{default_socket_path, ControlServer, Request, Response};
pub use decoder::{DecodeError, HardwareEvent, ReportDecoder};
pub use engine::{Engine, NotFound, OutputEvent};
pub use protocol::ButtonId;
pub use runtime::{spawn_engine, EngineHandle};
pub use sink::{OutputSink, SinkError, UinputSink};
pub use supervisor::{ConnectionState, Supervisor, SupervisorConfig, SupervisorHandle};
