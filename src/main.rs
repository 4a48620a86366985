//! Keydial driver daemon and control CLI.
//!
//! `keydiald run` (or no subcommand) starts the daemon; the other
//! subcommands are thin clients of the daemon's control socket.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

mod cli;
use cli::{Cli, Commands};

use keydial_driver::control::{self, BindingEntry, Request, Response};
use keydial_driver::{
    Config, ControlServer, Engine, Supervisor, SupervisorConfig, UinputSink,
};
use keydial_transport::{HidReportTransport, PresenceWatcher, Transport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Cli {
        config,
        socket,
        command,
    } = Cli::parse();
    let config = config.as_deref();

    match command {
        None | Some(Commands::Run) => run_daemon(config, socket).await,
        Some(Commands::Bind { key, action }) => {
            request(config, socket, Request::Bind { key, action }).await
        }
        Some(Commands::Unbind { key }) => request(config, socket, Request::Unbind { key }).await,
        Some(Commands::Bindings) => request(config, socket, Request::ListBindings).await,
        Some(Commands::Keys) => request(config, socket, Request::ListSupportedKeys).await,
        Some(Commands::SetDevice { address }) => {
            request(config, socket, Request::SetDeviceAddress { address }).await
        }
        Some(Commands::ClearDevice) => {
            request(config, socket, Request::ClearDeviceAddress).await
        }
    }
}

async fn run_daemon(config_path: Option<&Path>, socket: Option<PathBuf>) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::load(config_path).context("loading configuration")?;

    // The virtual input device is the one unrecoverable resource: without
    // it the daemon has no useful function, so failure exits non-zero.
    let sink = UinputSink::create(&config.uinput.device_name)
        .context("creating virtual input device")?;

    let engine = Engine::new(config.combo_window());
    let (engine_handle, engine_task) = keydial_driver::spawn_engine(engine, Box::new(sink));

    // Startup bindings flow through the same update path the control plane
    // uses at runtime.
    for (key, action) in config.parsed_bindings().context("loading bindings")? {
        engine_handle
            .bind(key, action)
            .await
            .context("applying startup bindings")?;
    }
    if let Some(sensitivity) = config.dial.sensitivity {
        engine_handle
            .set_sensitivity(sensitivity)
            .await
            .context("applying dial sensitivity")?
            .map_err(|e| anyhow::anyhow!(e))?;
    }

    let target = config.target_address().context("loading device address")?;
    let presence_rx = PresenceWatcher::new(target.clone())
        .spawn()
        .await
        .context("starting Bluetooth presence watcher")?;

    let transport: Arc<dyn Transport> = Arc::new(HidReportTransport::new());
    let supervisor_handle = Supervisor::spawn(
        SupervisorConfig {
            debounce: config.presence_debounce(),
            reconnect_initial: config.reconnect_initial(),
            reconnect_max: config.reconnect_max(),
            target,
        },
        transport,
        engine_handle.clone(),
        presence_rx,
    );

    let socket_path = socket
        .or_else(|| config.daemon.socket_path.clone())
        .unwrap_or_else(control::default_socket_path);
    let server = ControlServer::bind(&socket_path, engine_handle.clone(), supervisor_handle.clone())
        .context("binding control socket")?;
    let server_task = tokio::spawn(server.run());

    info!("keydiald running");
    wait_for_shutdown().await?;
    info!("shutting down");

    supervisor_handle.shutdown().await;
    engine_handle.shutdown().await;
    server_task.abort();
    let _ = engine_task.await;
    let _ = std::fs::remove_file(&socket_path);

    info!("driver stopped");
    Ok(())
}

async fn wait_for_shutdown() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("waiting for ctrl-c")?,
        _ = sigterm.recv() => {}
    }
    Ok(())
}

/// Send one control request and render the response.
async fn request(
    config: Option<&Path>,
    socket: Option<PathBuf>,
    request: Request,
) -> anyhow::Result<()> {
    let socket_path = resolve_socket(config, socket)?;
    let response = control::send_request(&socket_path, &request)
        .await
        .with_context(|| format!("talking to daemon at {}", socket_path.display()))?;

    match response {
        Response::Ok { bindings, keys } => {
            if let Some(bindings) = bindings {
                print_bindings(&bindings);
            } else if let Some(keys) = keys {
                print_keys(&keys);
            } else {
                println!("ok");
            }
            Ok(())
        }
        Response::Error { reason } => {
            eprintln!("error: {reason}");
            std::process::exit(1);
        }
    }
}

/// Socket resolution order: --socket, then the config's override, then the
/// default location.
fn resolve_socket(config: Option<&Path>, socket: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(path) = socket {
        return Ok(path);
    }
    let config = Config::load(config).context("loading configuration")?;
    Ok(config
        .daemon
        .socket_path
        .unwrap_or_else(control::default_socket_path))
}

fn print_bindings(bindings: &[BindingEntry]) {
    if bindings.is_empty() {
        println!("no bindings");
        return;
    }
    for entry in bindings {
        println!("{:<28} {}", entry.key, entry.action);
    }
}

fn print_keys(keys: &[String]) {
    for row in keys.chunks(3) {
        let mut line = String::new();
        for key in row {
            line.push_str(&format!("{key:<20}"));
        }
        println!("{}", line.trim_end());
    }
}
