//! Daemon configuration loading.
//!
//! TOML, with every section optional. Static bindings and the dial block
//! load through the same engine update path the control plane uses at
//! runtime; there is no separate "static" binding type. A config that
//! fails validation (unknown key name, malformed spec, non-positive
//! sensitivity) is rejected at startup.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use keydial_transport::DeviceAddress;

use crate::action::Action;
use crate::binding::BindingKey;
use crate::protocol::ButtonId;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub device: DeviceSection,
    pub daemon: DaemonSection,
    pub uinput: UinputSection,
    pub bindings: BTreeMap<String, String>,
    pub dial: DialSection,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DeviceSection {
    /// Bluetooth address to attach to; absent means first matching device.
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonSection {
    pub combo_window_ms: u64,
    pub presence_debounce_ms: u64,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
    pub socket_path: Option<PathBuf>,
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            combo_window_ms: 150,
            presence_debounce_ms: 300,
            reconnect_initial_ms: 1000,
            reconnect_max_ms: 30_000,
            socket_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UinputSection {
    pub device_name: String,
}

impl Default for UinputSection {
    fn default() -> Self {
        Self {
            device_name: "keydial-virtual".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DialSection {
    pub clockwise: Option<String>,
    pub counterclockwise: Option<String>,
    pub click: Option<String>,
    pub sensitivity: Option<f64>,
}

impl Config {
    /// Load from an explicit path, or the first existing default location.
    /// No config file at all is fine: everything has a default.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match default_config_path() {
                Some(path) => path,
                None => {
                    debug!("no config file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let config: Config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        config.validate()?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Parse from a TOML string (tests, stdin).
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(text).map_err(|source| ConfigError::Parse {
                path: PathBuf::from("<inline>"),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.daemon.combo_window_ms == 0 {
            return Err(ConfigError::Invalid(
                "daemon.combo_window_ms must be nonzero".into(),
            ));
        }
        if let Some(s) = self.dial.sensitivity {
            if !(s > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "dial.sensitivity must be positive, got {s}"
                )));
            }
        }
        self.target_address()?;
        self.parsed_bindings()?;
        Ok(())
    }

    /// The configured device address, parsed.
    pub fn target_address(&self) -> Result<Option<DeviceAddress>, ConfigError> {
        self.device
            .address
            .as_deref()
            .map(|s| {
                s.parse()
                    .map_err(|e| ConfigError::Invalid(format!("device.address: {e}")))
            })
            .transpose()
    }

    /// All startup bindings as typed pairs: the `[bindings]` table plus the
    /// dial block expressed as the dial pseudo-keys.
    pub fn parsed_bindings(&self) -> Result<Vec<(BindingKey, Action)>, ConfigError> {
        let mut out = Vec::new();
        for (key_spec, action_spec) in &self.bindings {
            out.push(parse_pair(key_spec, action_spec)?);
        }

        let dial = [
            (ButtonId::DialCw, self.dial.clockwise.as_deref()),
            (ButtonId::DialCcw, self.dial.counterclockwise.as_deref()),
            (ButtonId::DialClick, self.dial.click.as_deref()),
        ];
        for (id, spec) in dial {
            let Some(spec) = spec else { continue };
            let action = spec
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("dial binding {id}: {e}")))?;
            out.push((BindingKey::Single(id), action));
        }
        Ok(out)
    }

    pub fn combo_window(&self) -> Duration {
        Duration::from_millis(self.daemon.combo_window_ms)
    }

    pub fn presence_debounce(&self) -> Duration {
        Duration::from_millis(self.daemon.presence_debounce_ms)
    }

    pub fn reconnect_initial(&self) -> Duration {
        Duration::from_millis(self.daemon.reconnect_initial_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.daemon.reconnect_max_ms)
    }
}

fn parse_pair(key_spec: &str, action_spec: &str) -> Result<(BindingKey, Action), ConfigError> {
    let key = key_spec
        .parse()
        .map_err(|e| ConfigError::Invalid(format!("binding {key_spec:?}: {e}")))?;
    let action = action_spec
        .parse()
        .map_err(|e| ConfigError::Invalid(format!("binding {key_spec:?}: {e}")))?;
    Ok((key, action))
}

/// First existing config file among the standard locations.
fn default_config_path() -> Option<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(config_home) = std::env::var_os("XDG_CONFIG_HOME") {
        candidates.push(PathBuf::from(config_home).join("keydial").join("config.toml"));
    } else if let Some(home) = std::env::var_os("HOME") {
        candidates.push(
            PathBuf::from(home)
                .join(".config")
                .join("keydial")
                .join("config.toml"),
        );
    }
    candidates.push(PathBuf::from("/etc/keydial/config.toml"));
    candidates.into_iter().find(|p| p.exists())
}
