//! Connection-lifecycle supervisor.
//!
//! Owns the attach/detach state machine, debounces presence flapping, and
//! wires the transport's report stream through the decoder into the engine
//! while the device is attached. Reconnect attempts back off independently
//! of the control plane, which stays responsive throughout.
//!
//! Presence handling is deliberately deferred: every presence event re-arms
//! a short quiet timer, and only when it elapses is the desired state
//! compared with the actual one. A lost/regained flap inside the window is
//! therefore a net no-op: no detach/attach pair, no decoder reset.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use keydial_transport::{DeviceAddress, PresenceEvent, RawReport, Transport};

use crate::decoder::ReportDecoder;
use crate::runtime::EngineHandle;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Attached,
    Detaching,
}

/// Supervisor tunables.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Quiet window for coalescing presence flapping.
    pub debounce: Duration,
    /// First reconnect delay after a failed attach.
    pub reconnect_initial: Duration,
    /// Backoff ceiling.
    pub reconnect_max: Duration,
    /// Only attach to this device, if set.
    pub target: Option<DeviceAddress>,
}

/// Commands accepted by the supervisor task.
pub enum SupervisorMsg {
    SetAddress(Option<DeviceAddress>),
    Shutdown,
}

/// The supervisor task has stopped.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("supervisor task stopped")]
pub struct SupervisorGone;

/// Cloneable handle for talking to the supervisor task.
#[derive(Clone)]
pub struct SupervisorHandle {
    tx: mpsc::Sender<SupervisorMsg>,
}

impl SupervisorHandle {
    pub async fn set_address(&self, addr: Option<DeviceAddress>) -> Result<(), SupervisorGone> {
        self.tx
            .send(SupervisorMsg::SetAddress(addr))
            .await
            .map_err(|_| SupervisorGone)
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(SupervisorMsg::Shutdown).await;
    }
}

enum Eval {
    Nothing,
    Attach,
    Detach,
}

pub struct Supervisor {
    config: SupervisorConfig,
    transport: Arc<dyn Transport>,
    engine: EngineHandle,
    decoder: ReportDecoder,
    state: ConnectionState,
    /// Latest presence reported by the watcher.
    present: bool,
    debounce_deadline: Option<Instant>,
    retry_deadline: Option<Instant>,
    retry_backoff: Duration,
}

impl Supervisor {
    /// Spawn the supervisor task consuming the given presence stream.
    pub fn spawn(
        config: SupervisorConfig,
        transport: Arc<dyn Transport>,
        engine: EngineHandle,
        presence: mpsc::Receiver<PresenceEvent>,
    ) -> SupervisorHandle {
        let (tx, rx) = mpsc::channel(16);
        let retry_backoff = config.reconnect_initial;
        let supervisor = Supervisor {
            config,
            transport,
            engine,
            decoder: ReportDecoder::new(),
            state: ConnectionState::Disconnected,
            present: false,
            debounce_deadline: None,
            retry_deadline: None,
            retry_backoff,
        };
        tokio::spawn(supervisor.run(presence, rx));
        SupervisorHandle { tx }
    }

    async fn run(
        mut self,
        mut presence: mpsc::Receiver<PresenceEvent>,
        mut cmds: mpsc::Receiver<SupervisorMsg>,
    ) {
        debug!("supervisor task started");
        let mut reports: Option<mpsc::Receiver<RawReport>> = None;
        let mut presence_open = true;

        loop {
            tokio::select! {
                biased;
                cmd = cmds.recv() => match cmd {
                    None | Some(SupervisorMsg::Shutdown) => break,
                    Some(SupervisorMsg::SetAddress(addr)) => {
                        if self.set_target(addr) {
                            reports = None;
                            self.detach().await;
                        }
                        self.debounce_deadline = Some(Instant::now() + self.config.debounce);
                    }
                },
                event = presence.recv(), if presence_open => match event {
                    Some(event) => self.on_presence(event),
                    None => {
                        warn!("presence source closed");
                        presence_open = false;
                    }
                },
                _ = maybe_sleep(self.debounce_deadline), if self.debounce_deadline.is_some() => {
                    self.debounce_deadline = None;
                    match self.evaluate() {
                        Eval::Attach => reports = self.try_attach().await,
                        Eval::Detach => {
                            reports = None;
                            self.detach().await;
                        }
                        Eval::Nothing => {}
                    }
                },
                _ = maybe_sleep(self.retry_deadline), if self.retry_deadline.is_some() => {
                    self.retry_deadline = None;
                    if self.present && self.state == ConnectionState::Disconnected {
                        reports = self.try_attach().await;
                    }
                },
                report = recv_report(&mut reports), if reports.is_some() => match report {
                    Some(report) => self.on_report(report).await,
                    None => {
                        reports = None;
                        self.on_link_lost().await;
                    }
                },
            }
        }

        if self.state == ConnectionState::Attached {
            self.detach().await;
        }
        debug!("supervisor task stopped");
    }

    /// Returns true when the change requires detaching from the current
    /// device.
    fn set_target(&mut self, addr: Option<DeviceAddress>) -> bool {
        if self.config.target == addr {
            return false;
        }
        info!(target = ?addr, "device address changed");
        self.config.target = addr;
        self.state == ConnectionState::Attached
    }

    fn on_presence(&mut self, event: PresenceEvent) {
        let relevant = match &self.config.target {
            Some(target) => event.address() == target,
            None => true,
        };
        if !relevant {
            return;
        }
        self.present = matches!(event, PresenceEvent::Connected(_));
        debug!(present = self.present, "presence changed, debouncing");
        self.debounce_deadline = Some(Instant::now() + self.config.debounce);
    }

    /// Compare desired presence with the actual state once the quiet
    /// window has elapsed.
    fn evaluate(&mut self) -> Eval {
        match (self.present, self.state) {
            (true, ConnectionState::Disconnected) => {
                self.retry_backoff = self.config.reconnect_initial;
                self.retry_deadline = None;
                Eval::Attach
            }
            (false, ConnectionState::Attached) => Eval::Detach,
            (false, _) => {
                // Device gone: stop any pending reconnect attempts.
                self.retry_deadline = None;
                Eval::Nothing
            }
            _ => Eval::Nothing,
        }
    }

    async fn try_attach(&mut self) -> Option<mpsc::Receiver<RawReport>> {
        if self.state == ConnectionState::Attached {
            return None;
        }
        self.state = ConnectionState::Connecting;
        info!(target = ?self.config.target, "connecting to device");

        match self.transport.attach(self.config.target.as_ref()).await {
            Ok(rx) => {
                self.state = ConnectionState::Attached;
                self.decoder.reset();
                let _ = self.engine.attached().await;
                self.retry_deadline = None;
                self.retry_backoff = self.config.reconnect_initial;
                info!("device attached");
                Some(rx)
            }
            Err(e) => {
                warn!(error = %e, backoff = ?self.retry_backoff, "attach failed");
                self.state = ConnectionState::Disconnected;
                self.retry_deadline = Some(Instant::now() + self.retry_backoff);
                self.retry_backoff = (self.retry_backoff * 2).min(self.config.reconnect_max);
                None
            }
        }
    }

    async fn detach(&mut self) {
        if self.state != ConnectionState::Attached {
            self.state = ConnectionState::Disconnected;
            return;
        }
        self.state = ConnectionState::Detaching;
        info!("device detaching");
        let _ = self.engine.detached().await;
        self.state = ConnectionState::Disconnected;
    }

    async fn on_link_lost(&mut self) {
        warn!("report stream closed, link lost");
        self.detach().await;
        if self.present {
            self.retry_deadline = Some(Instant::now() + self.retry_backoff);
            self.retry_backoff = (self.retry_backoff * 2).min(self.config.reconnect_max);
        }
    }

    async fn on_report(&mut self, report: RawReport) {
        for event in self.decoder.decode(&report) {
            if self.engine.hardware(event).await.is_err() {
                return;
            }
        }
    }
}

async fn maybe_sleep(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn recv_report(reports: &mut Option<mpsc::Receiver<RawReport>>) -> Option<RawReport> {
    match reports {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
