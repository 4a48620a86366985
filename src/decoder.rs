//! Stateful report decoder: raw device bytes → hardware events.
//!
//! The decoder retains the last-seen button bitmap and dial-click flag so
//! that emitted events represent *transitions*, not snapshots. Malformed
//! input is logged and dropped; the retained state is never touched by a
//! report that fails validation.

use std::time::Instant;

use thiserror::Error;
use tracing::{debug, warn};

use keydial_transport::RawReport;

use crate::protocol::{report, ButtonId, BUTTON_COUNT};

/// Recoverable decode failures. These are logged and the offending report
/// is skipped; decoding continues with prior state intact.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unknown report discriminator 0x{0:02X}")]
    UnknownFormat(u8),

    #[error("truncated report: got {len} bytes, need {need}")]
    Truncated { len: usize, need: usize },
}

/// One decoded hardware event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareEvent {
    ButtonDown(ButtonId, Instant),
    ButtonUp(ButtonId, Instant),
    DialRotate { ticks: i32, ts: Instant },
    DialClick(Instant),
}

/// Stateful binary parser for accessory reports.
#[derive(Debug, Default)]
pub struct ReportDecoder {
    /// Button bitmap from the previous report.
    bitmap: u32,
    /// Dial click flag from the previous report.
    clicked: bool,
}

impl ReportDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear retained state. Called on every attach so no stale bitmap
    /// bleeds across reconnects.
    pub fn reset(&mut self) {
        self.bitmap = 0;
        self.clicked = false;
        debug!("decoder state reset");
    }

    /// Decode one report. Never fails: malformed input is logged and yields
    /// no events.
    pub fn decode(&mut self, raw: &RawReport) -> Vec<HardwareEvent> {
        match self.try_decode(raw) {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, len = raw.data.len(), "dropping malformed report");
                Vec::new()
            }
        }
    }

    fn try_decode(&mut self, raw: &RawReport) -> Result<Vec<HardwareEvent>, DecodeError> {
        let data = &raw.data;
        let ts = raw.ts;
        let Some(&discriminator) = data.first() else {
            return Err(DecodeError::Truncated { len: 0, need: 1 });
        };

        let need = match discriminator {
            report::BUTTONS => report::BUTTONS_LEN,
            report::DIAL => report::DIAL_LEN,
            report::COMBINED => report::COMBINED_LEN,
            other => return Err(DecodeError::UnknownFormat(other)),
        };
        if data.len() < need {
            return Err(DecodeError::Truncated {
                len: data.len(),
                need,
            });
        }

        let mut events = Vec::new();
        match discriminator {
            report::BUTTONS => {
                self.decode_buttons([data[1], data[2], data[3]], ts, &mut events);
            }
            report::DIAL => {
                self.decode_dial(data[1], [data[2], data[3]], ts, &mut events);
            }
            report::COMBINED => {
                self.decode_buttons([data[1], data[2], data[3]], ts, &mut events);
                self.decode_dial(data[4], [data[5], data[6]], ts, &mut events);
            }
            _ => unreachable!(),
        }
        Ok(events)
    }

    /// XOR the incoming bitmap against the stored one; each changed bit
    /// emits a down or up event, in ascending bit order.
    fn decode_buttons(&mut self, bytes: [u8; 3], ts: Instant, out: &mut Vec<HardwareEvent>) {
        let incoming =
            (bytes[0] as u32) | ((bytes[1] as u32) << 8) | ((bytes[2] as u32) << 16);
        let changed = incoming ^ self.bitmap;

        for bit in 0..BUTTON_COUNT {
            if changed & (1 << bit) == 0 {
                continue;
            }
            let Some(id) = ButtonId::from_bit(bit) else {
                continue;
            };
            if incoming & (1 << bit) != 0 {
                out.push(HardwareEvent::ButtonDown(id, ts));
            } else {
                out.push(HardwareEvent::ButtonUp(id, ts));
            }
        }

        self.bitmap = incoming;
    }

    /// Click flag is edge-triggered on the 0→nonzero transition only; the
    /// delta is a signed little-endian tick count collapsed into a single
    /// rotate event.
    fn decode_dial(&mut self, click: u8, delta: [u8; 2], ts: Instant, out: &mut Vec<HardwareEvent>) {
        if click != 0 && !self.clicked {
            out.push(HardwareEvent::DialClick(ts));
        }
        self.clicked = click != 0;

        let ticks = i16::from_le_bytes(delta) as i32;
        if ticks != 0 {
            out.push(HardwareEvent::DialRotate { ticks, ts });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(data: &[u8]) -> RawReport {
        RawReport::new(data.to_vec())
    }

    fn decode(decoder: &mut ReportDecoder, data: &[u8]) -> Vec<HardwareEvent> {
        decoder.decode(&raw(data))
    }

    #[test]
    fn malformed_input_never_panics_and_preserves_state() {
        let mut decoder = ReportDecoder::new();
        // Establish state: button 1 held.
        decode(&mut decoder, &[0xF0, 0x01, 0x00, 0x00]);

        for bad in [
            &[][..],
            &[0xF0],
            &[0xF0, 0x01],
            &[0xF1, 0x00],
            &[0xF2, 0x01, 0x00, 0x00, 0x00],
            &[0x00],
            &[0x42, 0x01, 0x02, 0x03],
            &[0xFF; 7],
        ] {
            assert!(decode(&mut decoder, bad).is_empty(), "input {bad:02X?}");
        }

        // State intact: releasing button 1 still emits the up transition.
        let events = decode(&mut decoder, &[0xF0, 0x00, 0x00, 0x00]);
        assert_eq!(
            events.iter().map(strip_ts).collect::<Vec<_>>(),
            vec![Ev::Up(ButtonId::Button1)]
        );
    }

    // Timestamp-free view for assertions.
    #[derive(Debug, PartialEq, Eq)]
    enum Ev {
        Down(ButtonId),
        Up(ButtonId),
        Rotate(i32),
        Click,
    }

    fn strip_ts(e: &HardwareEvent) -> Ev {
        match *e {
            HardwareEvent::ButtonDown(id, _) => Ev::Down(id),
            HardwareEvent::ButtonUp(id, _) => Ev::Up(id),
            HardwareEvent::DialRotate { ticks, .. } => Ev::Rotate(ticks),
            HardwareEvent::DialClick(_) => Ev::Click,
        }
    }

    fn stripped(events: Vec<HardwareEvent>) -> Vec<Ev> {
        events.iter().map(strip_ts).collect()
    }

    #[test]
    fn bitmap_transition_property() {
        let mut decoder = ReportDecoder::new();
        let down = decode(&mut decoder, &[0xF0, 0x01, 0x00, 0x00]);
        assert_eq!(stripped(down), vec![Ev::Down(ButtonId::Button1)]);

        let up = decode(&mut decoder, &[0xF0, 0x00, 0x00, 0x00]);
        assert_eq!(stripped(up), vec![Ev::Up(ButtonId::Button1)]);
    }

    #[test]
    fn identical_bitmap_is_silent() {
        let mut decoder = ReportDecoder::new();
        decode(&mut decoder, &[0xF0, 0x05, 0x00, 0x00]);
        assert!(decode(&mut decoder, &[0xF0, 0x05, 0x00, 0x00]).is_empty());
    }

    #[test]
    fn multiple_transitions_ascend_by_bit_index() {
        let mut decoder = ReportDecoder::new();
        // Buttons 2 and 10 down together (bits 1 and 9).
        let events = decode(&mut decoder, &[0xF0, 0x02, 0x02, 0x00]);
        assert_eq!(
            stripped(events),
            vec![Ev::Down(ButtonId::Button2), Ev::Down(ButtonId::Button10)]
        );

        // Button 2 up, button 18 down in one report.
        let events = decode(&mut decoder, &[0xF0, 0x00, 0x02, 0x02]);
        assert_eq!(
            stripped(events),
            vec![Ev::Up(ButtonId::Button2), Ev::Down(ButtonId::Button18)]
        );
    }

    #[test]
    fn dial_rotation_signed_delta() {
        let mut decoder = ReportDecoder::new();
        let cw = decode(&mut decoder, &[0xF1, 0x00, 0x03, 0x00]);
        assert_eq!(stripped(cw), vec![Ev::Rotate(3)]);

        // -1 as i16 little-endian
        let ccw = decode(&mut decoder, &[0xF1, 0x00, 0xFF, 0xFF]);
        assert_eq!(stripped(ccw), vec![Ev::Rotate(-1)]);

        let zero = decode(&mut decoder, &[0xF1, 0x00, 0x00, 0x00]);
        assert!(zero.is_empty());
    }

    #[test]
    fn dial_click_is_edge_triggered() {
        let mut decoder = ReportDecoder::new();
        let press = decode(&mut decoder, &[0xF1, 0x03, 0x00, 0x00]);
        assert_eq!(stripped(press), vec![Ev::Click]);

        // Held: no repeat.
        assert!(decode(&mut decoder, &[0xF1, 0x03, 0x00, 0x00]).is_empty());
        // Release: nothing.
        assert!(decode(&mut decoder, &[0xF1, 0x00, 0x00, 0x00]).is_empty());
        // Next press: a new click.
        let again = decode(&mut decoder, &[0xF1, 0x01, 0x00, 0x00]);
        assert_eq!(stripped(again), vec![Ev::Click]);
    }

    #[test]
    fn dial_click_while_rotating() {
        let mut decoder = ReportDecoder::new();
        let events = decode(&mut decoder, &[0xF1, 0x03, 0x02, 0x00]);
        assert_eq!(stripped(events), vec![Ev::Click, Ev::Rotate(2)]);
    }

    #[test]
    fn combined_report_buttons_then_dial() {
        let mut decoder = ReportDecoder::new();
        let events = decode(&mut decoder, &[0xF2, 0x01, 0x00, 0x00, 0x03, 0x01, 0x00]);
        assert_eq!(
            stripped(events),
            vec![Ev::Down(ButtonId::Button1), Ev::Click, Ev::Rotate(1)]
        );
    }

    #[test]
    fn reset_clears_retained_state() {
        let mut decoder = ReportDecoder::new();
        decode(&mut decoder, &[0xF0, 0x01, 0x00, 0x00]);
        decode(&mut decoder, &[0xF1, 0x03, 0x00, 0x00]);

        decoder.reset();

        // An all-zero bitmap after reset produces nothing (no phantom ups).
        assert!(decode(&mut decoder, &[0xF0, 0x00, 0x00, 0x00]).is_empty());
        // The same press reads as a fresh transition.
        let events = decode(&mut decoder, &[0xF0, 0x01, 0x00, 0x00]);
        assert_eq!(stripped(events), vec![Ev::Down(ButtonId::Button1)]);
        // Click flag was cleared too, so the held click fires again.
        let events = decode(&mut decoder, &[0xF1, 0x03, 0x00, 0x00]);
        assert_eq!(stripped(events), vec![Ev::Click]);
    }
}
