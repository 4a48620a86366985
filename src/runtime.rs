//! Engine task: the single processing loop that owns the engine and sink.
//!
//! Three producers feed one ordered queue: the supervisor (hardware events
//! and attach/detach transitions), the control plane (table mutations and
//! queries, answered over oneshots), and the combo-window timer, which is a
//! cancellable `sleep_until` re-armed from the engine's own deadline. This
//! keeps all shared state behind a single writer with no locks on the hot
//! path.

use std::time::Instant;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep_until;
use tracing::{debug, error, info};

use crate::action::{Action, ValidationError};
use crate::binding::BindingKey;
use crate::decoder::HardwareEvent;
use crate::engine::{Engine, NotFound, OutputEvent};
use crate::sink::OutputSink;

/// Queue depth for the engine task.
const ENGINE_CHANNEL_SIZE: usize = 256;

/// Messages consumed by the engine task.
pub enum EngineMsg {
    Hardware(HardwareEvent),
    Attached,
    Detached,
    Bind {
        key: BindingKey,
        action: Action,
        resp: oneshot::Sender<()>,
    },
    Unbind {
        key: BindingKey,
        resp: oneshot::Sender<Result<(), NotFound>>,
    },
    Snapshot {
        resp: oneshot::Sender<Vec<(BindingKey, Action)>>,
    },
    SetSensitivity {
        value: f64,
        resp: oneshot::Sender<Result<(), ValidationError>>,
    },
    Shutdown,
}

/// The engine task has stopped; no further requests can be served.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("engine task stopped")]
pub struct EngineGone;

/// Cloneable handle for talking to the engine task.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineMsg>,
}

impl EngineHandle {
    pub async fn bind(&self, key: BindingKey, action: Action) -> Result<(), EngineGone> {
        let (resp, rx) = oneshot::channel();
        self.send(EngineMsg::Bind { key, action, resp }).await?;
        rx.await.map_err(|_| EngineGone)
    }

    pub async fn unbind(&self, key: BindingKey) -> Result<Result<(), NotFound>, EngineGone> {
        let (resp, rx) = oneshot::channel();
        self.send(EngineMsg::Unbind { key, resp }).await?;
        rx.await.map_err(|_| EngineGone)
    }

    pub async fn snapshot(&self) -> Result<Vec<(BindingKey, Action)>, EngineGone> {
        let (resp, rx) = oneshot::channel();
        self.send(EngineMsg::Snapshot { resp }).await?;
        rx.await.map_err(|_| EngineGone)
    }

    pub async fn set_sensitivity(
        &self,
        value: f64,
    ) -> Result<Result<(), ValidationError>, EngineGone> {
        let (resp, rx) = oneshot::channel();
        self.send(EngineMsg::SetSensitivity { value, resp }).await?;
        rx.await.map_err(|_| EngineGone)
    }

    pub async fn hardware(&self, event: HardwareEvent) -> Result<(), EngineGone> {
        self.send(EngineMsg::Hardware(event)).await
    }

    pub async fn attached(&self) -> Result<(), EngineGone> {
        self.send(EngineMsg::Attached).await
    }

    pub async fn detached(&self) -> Result<(), EngineGone> {
        self.send(EngineMsg::Detached).await
    }

    pub async fn shutdown(&self) {
        let _ = self.send(EngineMsg::Shutdown).await;
    }

    async fn send(&self, msg: EngineMsg) -> Result<(), EngineGone> {
        self.tx.send(msg).await.map_err(|_| EngineGone)
    }
}

/// Spawn the engine task. Returns the handle and the task's join handle.
pub fn spawn_engine(
    engine: Engine,
    sink: Box<dyn OutputSink>,
) -> (EngineHandle, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(ENGINE_CHANNEL_SIZE);
    let handle = EngineHandle { tx };
    let join = tokio::spawn(run_engine_loop(engine, sink, rx));
    (handle, join)
}

async fn run_engine_loop(
    mut engine: Engine,
    mut sink: Box<dyn OutputSink>,
    mut rx: mpsc::Receiver<EngineMsg>,
) {
    debug!("engine task started");

    loop {
        let deadline = engine
            .window_deadline()
            .map(tokio::time::Instant::from_std);

        let events = tokio::select! {
            biased;
            msg = rx.recv() => match msg {
                None | Some(EngineMsg::Shutdown) => break,
                Some(msg) => handle_msg(&mut engine, msg),
            },
            _ = maybe_sleep(deadline), if deadline.is_some() => {
                engine.handle_window_expiry(Instant::now())
            }
        };

        emit(sink.as_mut(), &events);
    }

    // Shutdown: the pending combo window is cancelled without firing;
    // anything already held is released so no virtual key stays stuck.
    let events = engine.detach();
    emit(sink.as_mut(), &events);
    debug!("engine task stopped");
}

async fn maybe_sleep(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn handle_msg(engine: &mut Engine, msg: EngineMsg) -> Vec<OutputEvent> {
    match msg {
        EngineMsg::Hardware(event) => engine.resolve(event),
        EngineMsg::Attached => {
            engine.attach();
            info!("engine attached, press state cleared");
            Vec::new()
        }
        EngineMsg::Detached => engine.detach(),
        EngineMsg::Bind { key, action, resp } => {
            engine.update_binding(key, action);
            let _ = resp.send(());
            Vec::new()
        }
        EngineMsg::Unbind { key, resp } => {
            let _ = resp.send(engine.remove_binding(&key));
            Vec::new()
        }
        EngineMsg::Snapshot { resp } => {
            let _ = resp.send(engine.snapshot());
            Vec::new()
        }
        EngineMsg::SetSensitivity { value, resp } => {
            let _ = resp.send(engine.set_sensitivity(value));
            Vec::new()
        }
        EngineMsg::Shutdown => Vec::new(),
    }
}

fn emit(sink: &mut dyn OutputSink, events: &[OutputEvent]) {
    if events.is_empty() {
        return;
    }
    if let Err(e) = sink.emit(events) {
        error!(error = %e, "output sink write failed");
    }
}
