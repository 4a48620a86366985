//! BlueZ presence watching over the system D-Bus.
//!
//! Subscribes to `PropertiesChanged` signals from `org.bluez` and turns
//! `org.bluez.Device1.Connected` changes into [`PresenceEvent`]s. At startup
//! the currently-connected device set is swept once so an accessory that is
//! already connected attaches without waiting for a property change.

use std::collections::HashMap;

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use zbus::fdo::ObjectManagerProxy;
use zbus::zvariant::OwnedValue;
use zbus::{Connection, MatchRule, Message, MessageStream};

use crate::error::TransportError;
use crate::types::{DeviceAddress, PresenceEvent};

const BLUEZ_SERVICE: &str = "org.bluez";
const DEVICE_INTERFACE: &str = "org.bluez.Device1";

/// Presence channel depth
const PRESENCE_CHANNEL_SIZE: usize = 16;

/// Watches BlueZ for device connect/disconnect transitions.
pub struct PresenceWatcher {
    target: Option<DeviceAddress>,
}

impl PresenceWatcher {
    /// With a `target`, only that device's transitions are reported;
    /// without one, every device transition is forwarded and the transport
    /// decides what it can actually open.
    pub fn new(target: Option<DeviceAddress>) -> Self {
        Self { target }
    }

    /// Connect to the system bus, sweep the already-connected devices, and
    /// start the watch task. Returns the presence event channel.
    pub async fn spawn(self) -> Result<mpsc::Receiver<PresenceEvent>, TransportError> {
        let conn = Connection::system().await?;

        let rule = MatchRule::builder()
            .msg_type(zbus::message::Type::Signal)
            .sender(BLUEZ_SERVICE)?
            .interface("org.freedesktop.DBus.Properties")?
            .member("PropertiesChanged")?
            .build();
        let stream = MessageStream::for_match_rule(rule, &conn, None).await?;

        let (tx, rx) = mpsc::channel(PRESENCE_CHANNEL_SIZE);

        match connected_devices(&conn).await {
            Ok(addresses) => {
                for addr in addresses {
                    if self.matches(&addr) {
                        debug!(%addr, "device already connected at startup");
                        let _ = tx.send(PresenceEvent::Connected(addr)).await;
                    }
                }
            }
            Err(e) => warn!("initial connected-device sweep failed: {e}"),
        }

        let target = self.target;
        tokio::spawn(watch_loop(stream, target, tx));
        Ok(rx)
    }

    fn matches(&self, addr: &DeviceAddress) -> bool {
        self.target.as_ref().is_none_or(|t| t == addr)
    }
}

async fn watch_loop(
    mut stream: MessageStream,
    target: Option<DeviceAddress>,
    tx: mpsc::Sender<PresenceEvent>,
) {
    while let Some(msg) = stream.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                warn!("D-Bus stream error: {e}");
                continue;
            }
        };
        let Some(event) = presence_from_signal(&msg, target.as_ref()) else {
            continue;
        };
        debug!(?event, "presence change");
        if tx.send(event).await.is_err() {
            break;
        }
    }
    debug!("presence watch loop exiting");
}

/// `PropertiesChanged` signal body: interface, changed, invalidated.
type ChangedProps = (String, HashMap<String, OwnedValue>, Vec<String>);

fn presence_from_signal(msg: &Message, target: Option<&DeviceAddress>) -> Option<PresenceEvent> {
    let header = msg.header();
    let path = header.path()?;
    let addr = DeviceAddress::from_device_path(path.as_str())?;
    if let Some(t) = target {
        if *t != addr {
            return None;
        }
    }

    let (interface, changed, _invalidated): ChangedProps = msg.body().deserialize().ok()?;
    if interface != DEVICE_INTERFACE {
        return None;
    }

    let connected = changed.get("Connected")?.downcast_ref::<bool>().ok()?;
    Some(if connected {
        PresenceEvent::Connected(addr)
    } else {
        PresenceEvent::Disconnected(addr)
    })
}

/// Sweep BlueZ's managed objects for devices whose `Connected` property is
/// already true.
async fn connected_devices(conn: &Connection) -> Result<Vec<DeviceAddress>, TransportError> {
    let proxy = ObjectManagerProxy::builder(conn)
        .destination(BLUEZ_SERVICE)?
        .path("/")?
        .build()
        .await?;
    let objects = proxy
        .get_managed_objects()
        .await
        .map_err(zbus::Error::from)?;

    let mut out = Vec::new();
    for (path, interfaces) in objects {
        let Some(props) = interfaces
            .iter()
            .find(|(name, _)| name.as_str() == DEVICE_INTERFACE)
            .map(|(_, props)| props)
        else {
            continue;
        };
        let connected = props
            .get("Connected")
            .and_then(|v| v.downcast_ref::<bool>().ok())
            .unwrap_or(false);
        if !connected {
            continue;
        }
        if let Some(addr) = DeviceAddress::from_device_path(path.as_str()) {
            out.push(addr);
        }
    }
    Ok(out)
}
