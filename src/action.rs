//! Output action representation.
//!
//! [`Action`] is the closed tagged union every binding resolves to. The
//! textual syntax is parsed once at the control-plane boundary (and at
//! config load), so the engine and sink only ever see well-typed values.
//!
//! # Parsing syntax
//!
//! ```text
//! KEY_F1                    → KeyCombo([KEY_F1])
//! KEY_LEFTCTRL+KEY_C        → KeyCombo([KEY_LEFTCTRL, KEY_C])
//! mouse:left_click          → MouseClick(Left)
//! mouse:scroll              → MouseScroll(vertical, 1)
//! mouse:scroll horizontal -2 → MouseScroll(horizontal, -2)
//! mouse:move 10 -5          → MouseMove { dx: 10, dy: -5 }
//! sticky:KEY_LEFTSHIFT      → Sticky(KeyCombo([KEY_LEFTSHIFT]))
//! ```

use std::fmt;
use std::str::FromStr;

use evdev::Key;
use thiserror::Error;

/// Control-plane validation failures. Returned synchronously to the caller;
/// the binding table is left unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unknown key name: {0}")]
    UnknownKeyName(String),

    #[error("malformed combo: {0}")]
    MalformedCombo(String),

    #[error("malformed action: {0}")]
    MalformedAction(String),
}

/// Supported key names and their evdev codes.
///
/// This doubles as the capability set: binding validation accepts exactly
/// these names, and the virtual device advertises exactly these keys.
pub mod keys {
    use evdev::Key;

    pub const SUPPORTED: &[(&str, Key)] = &[
        // Function keys
        ("KEY_F1", Key::KEY_F1),
        ("KEY_F2", Key::KEY_F2),
        ("KEY_F3", Key::KEY_F3),
        ("KEY_F4", Key::KEY_F4),
        ("KEY_F5", Key::KEY_F5),
        ("KEY_F6", Key::KEY_F6),
        ("KEY_F7", Key::KEY_F7),
        ("KEY_F8", Key::KEY_F8),
        ("KEY_F9", Key::KEY_F9),
        ("KEY_F10", Key::KEY_F10),
        ("KEY_F11", Key::KEY_F11),
        ("KEY_F12", Key::KEY_F12),
        // Letters
        ("KEY_A", Key::KEY_A),
        ("KEY_B", Key::KEY_B),
        ("KEY_C", Key::KEY_C),
        ("KEY_D", Key::KEY_D),
        ("KEY_E", Key::KEY_E),
        ("KEY_F", Key::KEY_F),
        ("KEY_G", Key::KEY_G),
        ("KEY_H", Key::KEY_H),
        ("KEY_I", Key::KEY_I),
        ("KEY_J", Key::KEY_J),
        ("KEY_K", Key::KEY_K),
        ("KEY_L", Key::KEY_L),
        ("KEY_M", Key::KEY_M),
        ("KEY_N", Key::KEY_N),
        ("KEY_O", Key::KEY_O),
        ("KEY_P", Key::KEY_P),
        ("KEY_Q", Key::KEY_Q),
        ("KEY_R", Key::KEY_R),
        ("KEY_S", Key::KEY_S),
        ("KEY_T", Key::KEY_T),
        ("KEY_U", Key::KEY_U),
        ("KEY_V", Key::KEY_V),
        ("KEY_W", Key::KEY_W),
        ("KEY_X", Key::KEY_X),
        ("KEY_Y", Key::KEY_Y),
        ("KEY_Z", Key::KEY_Z),
        // Digits
        ("KEY_1", Key::KEY_1),
        ("KEY_2", Key::KEY_2),
        ("KEY_3", Key::KEY_3),
        ("KEY_4", Key::KEY_4),
        ("KEY_5", Key::KEY_5),
        ("KEY_6", Key::KEY_6),
        ("KEY_7", Key::KEY_7),
        ("KEY_8", Key::KEY_8),
        ("KEY_9", Key::KEY_9),
        ("KEY_0", Key::KEY_0),
        // Editing / whitespace
        ("KEY_ENTER", Key::KEY_ENTER),
        ("KEY_SPACE", Key::KEY_SPACE),
        ("KEY_ESC", Key::KEY_ESC),
        ("KEY_TAB", Key::KEY_TAB),
        ("KEY_BACKSPACE", Key::KEY_BACKSPACE),
        ("KEY_DELETE", Key::KEY_DELETE),
        ("KEY_INSERT", Key::KEY_INSERT),
        // Navigation
        ("KEY_HOME", Key::KEY_HOME),
        ("KEY_END", Key::KEY_END),
        ("KEY_PAGEUP", Key::KEY_PAGEUP),
        ("KEY_PAGEDOWN", Key::KEY_PAGEDOWN),
        ("KEY_UP", Key::KEY_UP),
        ("KEY_DOWN", Key::KEY_DOWN),
        ("KEY_LEFT", Key::KEY_LEFT),
        ("KEY_RIGHT", Key::KEY_RIGHT),
        // Volume / media
        ("KEY_VOLUMEUP", Key::KEY_VOLUMEUP),
        ("KEY_VOLUMEDOWN", Key::KEY_VOLUMEDOWN),
        ("KEY_MUTE", Key::KEY_MUTE),
        ("KEY_PLAYPAUSE", Key::KEY_PLAYPAUSE),
        ("KEY_NEXTSONG", Key::KEY_NEXTSONG),
        ("KEY_PREVIOUSSONG", Key::KEY_PREVIOUSSONG),
        // Modifiers
        ("KEY_LEFTCTRL", Key::KEY_LEFTCTRL),
        ("KEY_RIGHTCTRL", Key::KEY_RIGHTCTRL),
        ("KEY_LEFTSHIFT", Key::KEY_LEFTSHIFT),
        ("KEY_RIGHTSHIFT", Key::KEY_RIGHTSHIFT),
        ("KEY_LEFTALT", Key::KEY_LEFTALT),
        ("KEY_RIGHTALT", Key::KEY_RIGHTALT),
        ("KEY_LEFTMETA", Key::KEY_LEFTMETA),
        ("KEY_RIGHTMETA", Key::KEY_RIGHTMETA),
    ];

    /// Look up a key by name, case-insensitive.
    pub fn from_name(name: &str) -> Option<Key> {
        SUPPORTED
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|&(_, key)| key)
    }

    /// Canonical name for a supported key.
    pub fn name(key: Key) -> Option<&'static str> {
        SUPPORTED
            .iter()
            .find(|&&(_, k)| k == key)
            .map(|&(n, _)| n)
    }

    /// All supported key names, in table order.
    pub fn names() -> impl Iterator<Item = &'static str> {
        SUPPORTED.iter().map(|&(n, _)| n)
    }
}

/// Pointer button for click actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub fn key(self) -> Key {
        match self {
            MouseButton::Left => Key::BTN_LEFT,
            MouseButton::Right => Key::BTN_RIGHT,
            MouseButton::Middle => Key::BTN_MIDDLE,
        }
    }

    fn token(self) -> &'static str {
        match self {
            MouseButton::Left => "left_click",
            MouseButton::Right => "right_click",
            MouseButton::Middle => "middle_click",
        }
    }
}

/// Scroll axis for wheel actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollAxis {
    Vertical,
    Horizontal,
}

impl ScrollAxis {
    pub fn axis(self) -> evdev::RelativeAxisType {
        match self {
            ScrollAxis::Vertical => evdev::RelativeAxisType::REL_WHEEL,
            ScrollAxis::Horizontal => evdev::RelativeAxisType::REL_HWHEEL,
        }
    }

    fn token(self) -> &'static str {
        match self {
            ScrollAxis::Vertical => "vertical",
            ScrollAxis::Horizontal => "horizontal",
        }
    }
}

/// What a binding does when it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Key codes pressed in input order and released in reverse order.
    KeyCombo(Vec<Key>),
    /// Pointer button click.
    MouseClick(MouseButton),
    /// Wheel movement. Fires on the press half only.
    MouseScroll { axis: ScrollAxis, amount: i32 },
    /// Relative pointer movement. Fires on the press half only.
    MouseMove { dx: i32, dy: i32 },
    /// Toggles a persistent hold of the inner action instead of pulsing.
    Sticky(Box<Action>),
}

impl FromStr for Action {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ValidationError::MalformedAction("empty action".into()));
        }

        if let Some(inner) = s.strip_prefix("sticky:") {
            let inner: Action = inner.parse()?;
            if matches!(inner, Action::Sticky(_)) {
                return Err(ValidationError::MalformedAction(
                    "sticky actions cannot nest".into(),
                ));
            }
            return Ok(Action::Sticky(Box::new(inner)));
        }

        if let Some(rest) = s.strip_prefix("mouse:") {
            return parse_mouse(rest);
        }

        let mut combo = Vec::new();
        for token in s.split('+') {
            let token = token.trim();
            if token.is_empty() {
                return Err(ValidationError::MalformedAction(format!(
                    "empty key token in {s:?}"
                )));
            }
            let key = keys::from_name(token)
                .ok_or_else(|| ValidationError::UnknownKeyName(token.to_string()))?;
            combo.push(key);
        }
        Ok(Action::KeyCombo(combo))
    }
}

fn parse_mouse(spec: &str) -> Result<Action, ValidationError> {
    let mut parts = spec.split_whitespace();
    let op = parts
        .next()
        .ok_or_else(|| ValidationError::MalformedAction("empty mouse action".into()))?;
    let args: Vec<&str> = parts.collect();

    let no_args = |action: Action| {
        if args.is_empty() {
            Ok(action)
        } else {
            Err(ValidationError::MalformedAction(format!(
                "mouse:{op} takes no arguments"
            )))
        }
    };

    match op {
        "left_click" => no_args(Action::MouseClick(MouseButton::Left)),
        "right_click" => no_args(Action::MouseClick(MouseButton::Right)),
        "middle_click" => no_args(Action::MouseClick(MouseButton::Middle)),
        "scroll" => parse_scroll(&args),
        "move" => parse_move(&args),
        other => Err(ValidationError::MalformedAction(format!(
            "unknown mouse action: {other}"
        ))),
    }
}

fn parse_scroll(args: &[&str]) -> Result<Action, ValidationError> {
    let parse_axis = |s: &str| match s {
        "vertical" | "v" => Some(ScrollAxis::Vertical),
        "horizontal" | "h" => Some(ScrollAxis::Horizontal),
        _ => None,
    };

    let (axis, amount) = match args {
        [] => (ScrollAxis::Vertical, 1),
        [one] => match parse_axis(one) {
            Some(axis) => (axis, 1),
            None => (
                ScrollAxis::Vertical,
                one.parse().map_err(|_| {
                    ValidationError::MalformedAction(format!("bad scroll amount: {one}"))
                })?,
            ),
        },
        [axis, amount] => {
            let axis = parse_axis(axis).ok_or_else(|| {
                ValidationError::MalformedAction(format!("bad scroll axis: {axis}"))
            })?;
            let amount = amount.parse().map_err(|_| {
                ValidationError::MalformedAction(format!("bad scroll amount: {amount}"))
            })?;
            (axis, amount)
        }
        _ => {
            return Err(ValidationError::MalformedAction(
                "mouse:scroll takes at most an axis and an amount".into(),
            ))
        }
    };

    if amount == 0 {
        return Err(ValidationError::MalformedAction(
            "scroll amount must be nonzero".into(),
        ));
    }
    Ok(Action::MouseScroll { axis, amount })
}

fn parse_move(args: &[&str]) -> Result<Action, ValidationError> {
    let [dx, dy] = args else {
        return Err(ValidationError::MalformedAction(
            "mouse:move requires dx and dy".into(),
        ));
    };
    let parse = |s: &str| {
        s.parse()
            .map_err(|_| ValidationError::MalformedAction(format!("bad move delta: {s}")))
    };
    Ok(Action::MouseMove {
        dx: parse(dx)?,
        dy: parse(dy)?,
    })
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::KeyCombo(combo) => {
                let mut first = true;
                for key in combo {
                    if !first {
                        write!(f, "+")?;
                    }
                    f.write_str(keys::name(*key).unwrap_or("KEY_?"))?;
                    first = false;
                }
                Ok(())
            }
            Action::MouseClick(button) => write!(f, "mouse:{}", button.token()),
            Action::MouseScroll { axis, amount } => {
                write!(f, "mouse:scroll {} {amount}", axis.token())
            }
            Action::MouseMove { dx, dy } => write!(f, "mouse:move {dx} {dy}"),
            Action::Sticky(inner) => write!(f, "sticky:{inner}"),
        }
    }
}
