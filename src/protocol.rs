// Huion Keydial Mini Protocol Definitions
// Report framing and button identifiers

/// Report framing constants.
///
/// Every report leads with a discriminator byte. Unknown discriminators are
/// dropped by the decoder without touching its state.
pub mod report {
    /// Button bitmap report: `[BUTTONS, b0, b1, b2]`
    pub const BUTTONS: u8 = 0xF0;
    /// Dial report: `[DIAL, click, delta_lo, delta_hi]`
    pub const DIAL: u8 = 0xF1;
    /// Combined report: `[COMBINED, b0, b1, b2, click, delta_lo, delta_hi]`
    pub const COMBINED: u8 = 0xF2;

    /// Button bitmap width in bytes (18 buttons, little-endian bit order)
    pub const BITMAP_LEN: usize = 3;
    /// Total length of a button report
    pub const BUTTONS_LEN: usize = 1 + BITMAP_LEN;
    /// Total length of a dial report
    pub const DIAL_LEN: usize = 4;
    /// Total length of a combined report
    pub const COMBINED_LEN: usize = BUTTONS_LEN + 3;
}

/// Number of physical buttons on the accessory.
pub const BUTTON_COUNT: u8 = 18;

/// One input source on the accessory: a physical button, or one of the
/// three dial pseudo-identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ButtonId {
    Button1,
    Button2,
    Button3,
    Button4,
    Button5,
    Button6,
    Button7,
    Button8,
    Button9,
    Button10,
    Button11,
    Button12,
    Button13,
    Button14,
    Button15,
    Button16,
    Button17,
    Button18,
    DialCw,
    DialCcw,
    DialClick,
}

impl ButtonId {
    /// Physical buttons in bitmap bit order (bit 0 = `Button1`).
    pub const PHYSICAL: [ButtonId; BUTTON_COUNT as usize] = [
        ButtonId::Button1,
        ButtonId::Button2,
        ButtonId::Button3,
        ButtonId::Button4,
        ButtonId::Button5,
        ButtonId::Button6,
        ButtonId::Button7,
        ButtonId::Button8,
        ButtonId::Button9,
        ButtonId::Button10,
        ButtonId::Button11,
        ButtonId::Button12,
        ButtonId::Button13,
        ButtonId::Button14,
        ButtonId::Button15,
        ButtonId::Button16,
        ButtonId::Button17,
        ButtonId::Button18,
    ];

    /// Button for a bitmap bit index.
    pub fn from_bit(bit: u8) -> Option<ButtonId> {
        Self::PHYSICAL.get(bit as usize).copied()
    }

    /// Bitmap bit index for a physical button.
    pub fn bit(self) -> Option<u8> {
        Self::PHYSICAL.iter().position(|&b| b == self).map(|i| i as u8)
    }

    /// True for physical buttons, false for the dial pseudo-identifiers.
    pub fn is_physical(self) -> bool {
        !matches!(
            self,
            ButtonId::DialCw | ButtonId::DialCcw | ButtonId::DialClick
        )
    }

    /// Parse a button token (`BUTTON_1`..`BUTTON_18`, `DIAL_CW`, `DIAL_CCW`,
    /// `DIAL_CLICK`), case-insensitive.
    pub fn parse(s: &str) -> Option<ButtonId> {
        let upper = s.trim().to_ascii_uppercase();
        match upper.as_str() {
            "DIAL_CW" => return Some(ButtonId::DialCw),
            "DIAL_CCW" => return Some(ButtonId::DialCcw),
            "DIAL_CLICK" => return Some(ButtonId::DialClick),
            _ => {}
        }
        let n: u8 = upper.strip_prefix("BUTTON_")?.parse().ok()?;
        if n == 0 {
            return None;
        }
        Self::from_bit(n - 1)
    }
}

impl std::fmt::Display for ButtonId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ButtonId::DialCw => f.write_str("DIAL_CW"),
            ButtonId::DialCcw => f.write_str("DIAL_CCW"),
            ButtonId::DialClick => f.write_str("DIAL_CLICK"),
            other => match other.bit() {
                Some(bit) => write!(f, "BUTTON_{}", bit + 1),
                None => f.write_str("BUTTON_?"),
            },
        }
    }
}
