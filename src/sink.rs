//! Output sink: renders resolved actions to a virtual uinput device.
//!
//! The virtual device advertises every key in the capability set plus the
//! pointer buttons and relative axes, so any valid binding can fire without
//! recreating the device.

use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, EventType, InputEvent, Key, RelativeAxisType};
use thiserror::Error;
use tracing::info;

use crate::action::{keys, Action};
use crate::engine::OutputEvent;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("failed to create virtual input device: {0}")]
    Create(std::io::Error),

    #[error("failed to write input events: {0}")]
    Write(std::io::Error),
}

/// Consumer of resolved output actions.
pub trait OutputSink: Send {
    fn emit(&mut self, events: &[OutputEvent]) -> Result<(), SinkError>;
}

/// Sink backed by an evdev uinput virtual device.
pub struct UinputSink {
    device: VirtualDevice,
}

impl UinputSink {
    /// Create the virtual device. Failure here is the fatal error class:
    /// without the sink the daemon has no useful function, so the caller
    /// terminates the process.
    pub fn create(name: &str) -> Result<Self, SinkError> {
        let mut key_caps: AttributeSet<Key> = AttributeSet::new();
        for &(_, key) in keys::SUPPORTED {
            key_caps.insert(key);
        }
        for button in [Key::BTN_LEFT, Key::BTN_RIGHT, Key::BTN_MIDDLE] {
            key_caps.insert(button);
        }

        let mut rel_caps: AttributeSet<RelativeAxisType> = AttributeSet::new();
        for axis in [
            RelativeAxisType::REL_X,
            RelativeAxisType::REL_Y,
            RelativeAxisType::REL_WHEEL,
            RelativeAxisType::REL_HWHEEL,
        ] {
            rel_caps.insert(axis);
        }

        let device = VirtualDeviceBuilder::new()
            .map_err(SinkError::Create)?
            .name(name)
            .with_keys(&key_caps)
            .map_err(SinkError::Create)?
            .with_relative_axes(&rel_caps)
            .map_err(SinkError::Create)?
            .build()
            .map_err(SinkError::Create)?;

        info!(name, "virtual input device created");
        Ok(Self { device })
    }
}

impl OutputSink for UinputSink {
    fn emit(&mut self, events: &[OutputEvent]) -> Result<(), SinkError> {
        let mut batch = Vec::new();
        for event in events {
            match event {
                OutputEvent::Press(action) => push_half(action, true, &mut batch),
                OutputEvent::Release(action) => push_half(action, false, &mut batch),
            }
        }
        if batch.is_empty() {
            return Ok(());
        }
        batch.push(syn());
        self.device.emit(&batch).map_err(SinkError::Write)
    }
}

fn syn() -> InputEvent {
    InputEvent::new(EventType::SYNCHRONIZATION, 0, 0)
}

fn key_event(key: Key, value: i32) -> InputEvent {
    InputEvent::new(EventType::KEY, key.code(), value)
}

fn rel_event(axis: RelativeAxisType, value: i32) -> InputEvent {
    InputEvent::new(EventType::RELATIVE, axis.0, value)
}

/// Translate one half of an action into kernel input events.
///
/// Key combos press in input order and release in reverse, so a
/// `KEY_LEFTCTRL+KEY_C` binding holds the modifier around the key the way a
/// human would. Motion actions (scroll, move) have no release half.
fn push_half(action: &Action, press: bool, out: &mut Vec<InputEvent>) {
    match action {
        Action::KeyCombo(combo) => {
            if press {
                for key in combo {
                    out.push(key_event(*key, 1));
                }
            } else {
                for key in combo.iter().rev() {
                    out.push(key_event(*key, 0));
                }
            }
        }
        Action::MouseClick(button) => {
            out.push(key_event(button.key(), i32::from(press)));
        }
        Action::MouseScroll { axis, amount } => {
            if press {
                out.push(rel_event(axis.axis(), *amount));
            }
        }
        Action::MouseMove { dx, dy } => {
            if press {
                if *dx != 0 {
                    out.push(rel_event(RelativeAxisType::REL_X, *dx));
                }
                if *dy != 0 {
                    out.push(rel_event(RelativeAxisType::REL_Y, *dy));
                }
            }
        }
        // The engine resolves sticky bindings before emission; render the
        // inner action if one slips through.
        Action::Sticky(inner) => push_half(inner, press, out),
    }
}
