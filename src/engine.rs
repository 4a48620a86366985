//! Keybind resolution engine.
//!
//! Owns the live binding table and per-button press state, and decides what
//! output a hardware event produces: multi-button combos inside a bounded
//! combo window, single-button fallbacks, sticky toggles, and
//! dial-sensitivity scaling.
//!
//! The engine is a pure synchronous state machine. The async side
//! (queue, combo-window timer, sink) lives in [`crate::runtime`]; it calls
//! [`Engine::window_deadline`] after every interaction and arms a
//! cancellable sleep for [`Engine::handle_window_expiry`].

use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::action::Action;
use crate::binding::BindingKey;
use crate::decoder::HardwareEvent;
use crate::protocol::ButtonId;

/// One half of a synthesized output action.
///
/// The carried action is never `Sticky`: sticky toggling is resolved inside
/// the engine, which emits the inner action's halves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Press(Action),
    Release(Action),
}

/// Removal of a binding that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no binding for {0}")]
pub struct NotFound(pub BindingKey);

/// Per-button press phase.
///
/// `Idle → Candidate → (Consumed | Fired) → Idle`; the terminal phases
/// return to idle when the button is released and its entry removed.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PressPhase {
    /// Inside the combo window; still a combo candidate.
    Candidate,
    /// Consumed by a combo match; release is silent.
    Consumed,
    /// Single-button action fired (or nothing was bound). Holds the action
    /// instance whose release half is owed on button-up.
    Fired { pending_release: Option<Action> },
}

#[derive(Debug, Clone)]
struct PressedButton {
    id: ButtonId,
    pressed_at: Instant,
    phase: PressPhase,
}

/// The keybind engine. See module docs.
pub struct Engine {
    bindings: HashMap<BindingKey, Action>,
    /// Currently-held buttons, in press order.
    pressed: Vec<PressedButton>,
    combo_window: Duration,
    deadline: Option<Instant>,
    /// Asserted sticky bindings and the inner action instance each holds.
    sticky_on: HashMap<BindingKey, Action>,
    /// Dial repeat-rate factor. Always > 0.
    sensitivity: f64,
}

impl Engine {
    pub fn new(combo_window: Duration) -> Self {
        Self {
            bindings: HashMap::new(),
            pressed: Vec::new(),
            combo_window,
            deadline: None,
            sticky_on: HashMap::new(),
            sensitivity: 1.0,
        }
    }

    // ── binding table ──────────────────────────────────────────────────

    /// Insert or replace the binding for a canonical key. Visible to the
    /// next `resolve` call.
    pub fn update_binding(&mut self, key: BindingKey, action: Action) {
        debug!(%key, %action, "binding updated");
        self.bindings.insert(key, action);
    }

    pub fn remove_binding(&mut self, key: &BindingKey) -> Result<(), NotFound> {
        match self.bindings.remove(key) {
            Some(_) => {
                debug!(%key, "binding removed");
                Ok(())
            }
            None => Err(NotFound(key.clone())),
        }
    }

    /// Consistent point-in-time copy of the table, sorted by key.
    pub fn snapshot(&self) -> Vec<(BindingKey, Action)> {
        let mut entries: Vec<_> = self
            .bindings
            .iter()
            .map(|(k, a)| (k.clone(), a.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn set_sensitivity(&mut self, sensitivity: f64) -> Result<(), crate::action::ValidationError> {
        if !(sensitivity > 0.0) {
            return Err(crate::action::ValidationError::MalformedAction(format!(
                "sensitivity must be positive, got {sensitivity}"
            )));
        }
        self.sensitivity = sensitivity;
        Ok(())
    }

    pub fn sensitivity(&self) -> f64 {
        self.sensitivity
    }

    // ── hot path ───────────────────────────────────────────────────────

    /// Resolve one hardware event into output actions. Never fails;
    /// unbound events yield an empty sequence.
    pub fn resolve(&mut self, event: HardwareEvent) -> Vec<OutputEvent> {
        trace!(?event, "resolve");
        match event {
            HardwareEvent::ButtonDown(id, ts) if id.is_physical() => self.on_button_down(id, ts),
            HardwareEvent::ButtonUp(id, _) if id.is_physical() => self.on_button_up(id),
            HardwareEvent::DialRotate { ticks, .. } => self.on_dial_rotate(ticks),
            HardwareEvent::DialClick(_) => {
                self.fire_bound_pulse(&BindingKey::Single(ButtonId::DialClick))
            }
            // Dial pseudo-ids never arrive as button transitions.
            _ => Vec::new(),
        }
    }

    /// Deadline of the live combo window, if one is running.
    pub fn window_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The combo window elapsed with no exact match: every candidate's own
    /// single-button binding fires now, in press order, and those buttons
    /// stop being combo candidates until released.
    pub fn handle_window_expiry(&mut self, _now: Instant) -> Vec<OutputEvent> {
        self.deadline = None;
        let mut candidates: Vec<usize> = (0..self.pressed.len())
            .filter(|&i| self.pressed[i].phase == PressPhase::Candidate)
            .collect();
        // Fire in the order the buttons were originally pressed.
        candidates.sort_by_key(|&i| self.pressed[i].pressed_at);

        let mut out = Vec::new();
        for i in candidates {
            let key = BindingKey::Single(self.pressed[i].id);
            let pending = match self.bindings.get(&key).cloned() {
                Some(action) => {
                    let (events, pending) = self.fire_hold(&key, action);
                    out.extend(events);
                    pending
                }
                None => None,
            };
            self.pressed[i].phase = PressPhase::Fired {
                pending_release: pending,
            };
        }
        out
    }

    fn on_button_down(&mut self, id: ButtonId, ts: Instant) -> Vec<OutputEvent> {
        if self.pressed.iter().any(|p| p.id == id) {
            // Duplicate down without an up; the decoder's XOR normally
            // prevents this.
            return Vec::new();
        }
        self.pressed.push(PressedButton {
            id,
            pressed_at: ts,
            phase: PressPhase::Candidate,
        });
        self.deadline = Some(ts + self.combo_window);

        let candidates: BTreeSet<ButtonId> = self
            .pressed
            .iter()
            .filter(|p| p.phase == PressPhase::Candidate)
            .map(|p| p.id)
            .collect();
        if candidates.len() >= 2 {
            let key = BindingKey::Combo(candidates);
            if let Some(action) = self.bindings.get(&key).cloned() {
                debug!(%key, "combo matched");
                let out = self.fire_pulse(&key, action);
                for p in &mut self.pressed {
                    if p.phase == PressPhase::Candidate {
                        p.phase = PressPhase::Consumed;
                    }
                }
                self.deadline = None;
                return out;
            }
        }
        Vec::new()
    }

    fn on_button_up(&mut self, id: ButtonId) -> Vec<OutputEvent> {
        let Some(pos) = self.pressed.iter().position(|p| p.id == id) else {
            return Vec::new();
        };
        let entry = self.pressed.remove(pos);

        let out = match entry.phase {
            PressPhase::Consumed => Vec::new(),
            PressPhase::Fired { pending_release } => pending_release
                .map(|action| vec![OutputEvent::Release(action)])
                .unwrap_or_default(),
            // Released inside the window before any match: the single
            // binding fires as a full pulse now.
            PressPhase::Candidate => self.fire_bound_pulse(&BindingKey::Single(id)),
        };

        if !self.pressed.iter().any(|p| p.phase == PressPhase::Candidate) {
            self.deadline = None;
        }
        out
    }

    fn on_dial_rotate(&mut self, ticks: i32) -> Vec<OutputEvent> {
        if ticks == 0 {
            return Vec::new();
        }
        let key = if ticks > 0 {
            BindingKey::Single(ButtonId::DialCw)
        } else {
            BindingKey::Single(ButtonId::DialCcw)
        };
        let Some(action) = self.bindings.get(&key).cloned() else {
            return Vec::new();
        };

        // Sensitivity is a linear repeat-rate control; a physical detent
        // always produces at least one repetition.
        let reps = ((ticks.unsigned_abs() as f64) * self.sensitivity)
            .round()
            .max(1.0) as u32;
        let mut out = Vec::new();
        for _ in 0..reps {
            out.extend(self.fire_pulse(&key, action.clone()));
        }
        out
    }

    // ── firing ─────────────────────────────────────────────────────────

    fn fire_bound_pulse(&mut self, key: &BindingKey) -> Vec<OutputEvent> {
        match self.bindings.get(key).cloned() {
            Some(action) => self.fire_pulse(key, action),
            None => Vec::new(),
        }
    }

    /// Fire a binding as a complete down+up pulse. Sticky bindings toggle
    /// instead.
    fn fire_pulse(&mut self, key: &BindingKey, action: Action) -> Vec<OutputEvent> {
        match action {
            Action::Sticky(inner) => self.toggle_sticky(key, *inner),
            action => vec![
                OutputEvent::Press(action.clone()),
                OutputEvent::Release(action),
            ],
        }
    }

    /// Fire a binding's press half, returning the release half owed on
    /// button-up. Sticky bindings toggle and owe nothing.
    fn fire_hold(&mut self, key: &BindingKey, action: Action) -> (Vec<OutputEvent>, Option<Action>) {
        match action {
            Action::Sticky(inner) => (self.toggle_sticky(key, *inner), None),
            action => (
                vec![OutputEvent::Press(action.clone())],
                Some(action),
            ),
        }
    }

    fn toggle_sticky(&mut self, key: &BindingKey, inner: Action) -> Vec<OutputEvent> {
        if let Some(asserted) = self.sticky_on.remove(key) {
            debug!(%key, "sticky released");
            vec![OutputEvent::Release(asserted)]
        } else {
            debug!(%key, "sticky asserted");
            self.sticky_on.insert(key.clone(), inner.clone());
            vec![OutputEvent::Press(inner)]
        }
    }

    // ── lifecycle ──────────────────────────────────────────────────────

    /// Device detached (or daemon shutting down): cancel the combo window
    /// without firing, release anything still held so no virtual key is
    /// left stuck, and clear the press state.
    pub fn detach(&mut self) -> Vec<OutputEvent> {
        self.deadline = None;
        let mut out = Vec::new();
        for entry in self.pressed.drain(..) {
            if let PressPhase::Fired {
                pending_release: Some(action),
            } = entry.phase
            {
                out.push(OutputEvent::Release(action));
            }
        }
        let mut sticky: Vec<_> = self.sticky_on.drain().collect();
        sticky.sort_by(|a, b| a.0.cmp(&b.0));
        out.extend(sticky.into_iter().map(|(_, a)| OutputEvent::Release(a)));
        if !out.is_empty() {
            debug!(count = out.len(), "released held outputs on detach");
        }
        out
    }

    /// Device attached: start from a clean press state.
    pub fn attach(&mut self) {
        self.pressed.clear();
        self.deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::MouseButton;
    use evdev::Key;

    const WINDOW: Duration = Duration::from_millis(150);

    fn engine() -> Engine {
        Engine::new(WINDOW)
    }

    fn key_action(key: Key) -> Action {
        Action::KeyCombo(vec![key])
    }

    fn single(id: ButtonId) -> BindingKey {
        BindingKey::Single(id)
    }

    fn combo(ids: &[ButtonId]) -> BindingKey {
        BindingKey::from_buttons(ids.iter().copied()).unwrap()
    }

    fn down(engine: &mut Engine, id: ButtonId, t: Instant) -> Vec<OutputEvent> {
        engine.resolve(HardwareEvent::ButtonDown(id, t))
    }

    fn up(engine: &mut Engine, id: ButtonId, t: Instant) -> Vec<OutputEvent> {
        engine.resolve(HardwareEvent::ButtonUp(id, t))
    }

    fn press(action: Action) -> OutputEvent {
        OutputEvent::Press(action)
    }

    fn release(action: Action) -> OutputEvent {
        OutputEvent::Release(action)
    }

    // ── binding table ──

    #[test]
    fn bind_snapshot_remove_roundtrip() {
        let mut e = engine();
        let key = single(ButtonId::Button1);
        let action = key_action(Key::KEY_F1);

        e.update_binding(key.clone(), action.clone());
        assert_eq!(e.snapshot(), vec![(key.clone(), action.clone())]);

        e.remove_binding(&key).unwrap();
        assert!(e.snapshot().is_empty());
        assert_eq!(e.remove_binding(&key), Err(NotFound(key)));
    }

    #[test]
    fn repeated_update_keeps_one_entry() {
        let mut e = engine();
        let key = single(ButtonId::Button1);
        for _ in 0..3 {
            e.update_binding(key.clone(), key_action(Key::KEY_F1));
        }
        assert_eq!(e.snapshot().len(), 1);
    }

    #[test]
    fn update_replaces_existing_binding() {
        let mut e = engine();
        let key = single(ButtonId::Button1);
        e.update_binding(key.clone(), key_action(Key::KEY_F1));
        e.update_binding(key.clone(), key_action(Key::KEY_F2));
        assert_eq!(e.snapshot(), vec![(key, key_action(Key::KEY_F2))]);
    }

    #[test]
    fn sensitivity_must_be_positive() {
        let mut e = engine();
        assert!(e.set_sensitivity(2.0).is_ok());
        assert!(e.set_sensitivity(0.0).is_err());
        assert!(e.set_sensitivity(-1.0).is_err());
        assert_eq!(e.sensitivity(), 2.0);
    }

    // ── single-button resolution ──

    #[test]
    fn resolve_respects_bind_and_unbind() {
        let mut e = engine();
        let t = Instant::now();
        let key = single(ButtonId::Button1);
        let f1 = key_action(Key::KEY_F1);

        // Before bind: nothing.
        assert!(down(&mut e, ButtonId::Button1, t).is_empty());
        assert!(up(&mut e, ButtonId::Button1, t).is_empty());

        // Bound: quick press+release pulses inside the window.
        e.update_binding(key.clone(), f1.clone());
        assert!(down(&mut e, ButtonId::Button1, t).is_empty());
        assert_eq!(
            up(&mut e, ButtonId::Button1, t),
            vec![press(f1.clone()), release(f1.clone())]
        );

        // After unbind: nothing again.
        e.remove_binding(&key).unwrap();
        assert!(down(&mut e, ButtonId::Button1, t).is_empty());
        assert!(up(&mut e, ButtonId::Button1, t).is_empty());
    }

    #[test]
    fn fallback_fires_down_at_expiry_and_up_at_release() {
        let mut e = engine();
        let t = Instant::now();
        let f1 = key_action(Key::KEY_F1);
        e.update_binding(single(ButtonId::Button1), f1.clone());

        assert!(down(&mut e, ButtonId::Button1, t).is_empty());
        assert_eq!(e.window_deadline(), Some(t + WINDOW));

        let fired = e.handle_window_expiry(t + WINDOW);
        assert_eq!(fired, vec![press(f1.clone())]);
        assert_eq!(e.window_deadline(), None);

        assert_eq!(up(&mut e, ButtonId::Button1, t), vec![release(f1)]);
    }

    #[test]
    fn release_half_uses_the_fired_instance() {
        // Rebinding between press and release must not change what gets
        // released.
        let mut e = engine();
        let t = Instant::now();
        let f1 = key_action(Key::KEY_F1);
        e.update_binding(single(ButtonId::Button1), f1.clone());

        down(&mut e, ButtonId::Button1, t);
        e.handle_window_expiry(t + WINDOW);
        e.update_binding(single(ButtonId::Button1), key_action(Key::KEY_F2));

        assert_eq!(up(&mut e, ButtonId::Button1, t), vec![release(f1)]);
    }

    #[test]
    fn expiry_fires_singles_in_press_order() {
        let mut e = engine();
        let t = Instant::now();
        let f1 = key_action(Key::KEY_F1);
        let f2 = key_action(Key::KEY_F2);
        e.update_binding(single(ButtonId::Button2), f2.clone());
        e.update_binding(single(ButtonId::Button1), f1.clone());

        // Button 2 pressed first, then button 1; no combo bound.
        down(&mut e, ButtonId::Button2, t);
        down(&mut e, ButtonId::Button1, t);
        let fired = e.handle_window_expiry(t + WINDOW);
        assert_eq!(fired, vec![press(f2), press(f1)]);
    }

    // ── combos ──

    #[test]
    fn combo_determinism() {
        let mut e = engine();
        let t = Instant::now();
        let copy = Action::KeyCombo(vec![Key::KEY_LEFTCTRL, Key::KEY_C]);
        e.update_binding(combo(&[ButtonId::Button1, ButtonId::Button2]), copy.clone());

        assert!(down(&mut e, ButtonId::Button1, t).is_empty());
        let fired = down(&mut e, ButtonId::Button2, t);
        assert_eq!(fired, vec![press(copy.clone()), release(copy)]);
        assert_eq!(e.window_deadline(), None);

        // Subsequent releases fire nothing further.
        assert!(up(&mut e, ButtonId::Button1, t).is_empty());
        assert!(up(&mut e, ButtonId::Button2, t).is_empty());
    }

    #[test]
    fn combo_suppresses_member_single_bindings() {
        let mut e = engine();
        let t = Instant::now();
        let combo_action = key_action(Key::KEY_SPACE);
        e.update_binding(single(ButtonId::Button1), key_action(Key::KEY_F1));
        e.update_binding(single(ButtonId::Button2), key_action(Key::KEY_F2));
        e.update_binding(
            combo(&[ButtonId::Button1, ButtonId::Button2]),
            combo_action.clone(),
        );

        down(&mut e, ButtonId::Button1, t);
        let fired = down(&mut e, ButtonId::Button2, t);
        assert_eq!(fired, vec![press(combo_action.clone()), release(combo_action)]);
        assert!(up(&mut e, ButtonId::Button2, t).is_empty());
        assert!(up(&mut e, ButtonId::Button1, t).is_empty());
    }

    #[test]
    fn three_button_combo_matches_exactly() {
        let mut e = engine();
        let t = Instant::now();
        let action = key_action(Key::KEY_SPACE);
        e.update_binding(
            combo(&[ButtonId::Button1, ButtonId::Button2, ButtonId::Button3]),
            action.clone(),
        );

        down(&mut e, ButtonId::Button1, t);
        down(&mut e, ButtonId::Button2, t);
        let fired = down(&mut e, ButtonId::Button3, t);
        assert_eq!(fired, vec![press(action.clone()), release(action)]);
    }

    #[test]
    fn fired_buttons_are_not_combo_candidates() {
        // No retroactive participation: a button held past its window does
        // not join a later-forming combo.
        let mut e = engine();
        let t = Instant::now();
        let f2 = key_action(Key::KEY_F2);
        e.update_binding(
            combo(&[ButtonId::Button1, ButtonId::Button2]),
            key_action(Key::KEY_SPACE),
        );
        e.update_binding(single(ButtonId::Button2), f2.clone());

        down(&mut e, ButtonId::Button1, t);
        assert!(e.handle_window_expiry(t + WINDOW).is_empty());

        // Button 1 is Fired (unbound single); pressing button 2 must not
        // complete the combo.
        assert!(down(&mut e, ButtonId::Button2, t + WINDOW).is_empty());
        let fired = e.handle_window_expiry(t + WINDOW * 2);
        assert_eq!(fired, vec![press(f2)]);
    }

    #[test]
    fn early_release_inside_window_pulses_single() {
        let mut e = engine();
        let t = Instant::now();
        let f1 = key_action(Key::KEY_F1);
        e.update_binding(single(ButtonId::Button1), f1.clone());
        e.update_binding(
            combo(&[ButtonId::Button1, ButtonId::Button2]),
            key_action(Key::KEY_SPACE),
        );

        down(&mut e, ButtonId::Button1, t);
        // Released before the window expired and before any combo formed.
        assert_eq!(
            up(&mut e, ButtonId::Button1, t),
            vec![press(f1.clone()), release(f1)]
        );
        assert_eq!(e.window_deadline(), None);
    }

    // ── sticky ──

    #[test]
    fn sticky_single_toggles() {
        let mut e = engine();
        let t = Instant::now();
        let shift = key_action(Key::KEY_LEFTSHIFT);
        e.update_binding(
            single(ButtonId::Button1),
            Action::Sticky(Box::new(shift.clone())),
        );

        // First tap asserts.
        down(&mut e, ButtonId::Button1, t);
        assert_eq!(
            up(&mut e, ButtonId::Button1, t),
            vec![press(shift.clone())]
        );
        // Second tap releases.
        down(&mut e, ButtonId::Button1, t);
        assert_eq!(up(&mut e, ButtonId::Button1, t), vec![release(shift)]);
    }

    #[test]
    fn sticky_fired_at_expiry_owes_nothing_on_release() {
        let mut e = engine();
        let t = Instant::now();
        let shift = key_action(Key::KEY_LEFTSHIFT);
        e.update_binding(
            single(ButtonId::Button1),
            Action::Sticky(Box::new(shift.clone())),
        );

        down(&mut e, ButtonId::Button1, t);
        assert_eq!(e.handle_window_expiry(t + WINDOW), vec![press(shift)]);
        assert!(up(&mut e, ButtonId::Button1, t).is_empty());
    }

    #[test]
    fn sticky_combo_toggles() {
        let mut e = engine();
        let t = Instant::now();
        let ctrl = key_action(Key::KEY_LEFTCTRL);
        let key = combo(&[ButtonId::Button1, ButtonId::Button2]);
        e.update_binding(key, Action::Sticky(Box::new(ctrl.clone())));

        down(&mut e, ButtonId::Button1, t);
        assert_eq!(down(&mut e, ButtonId::Button2, t), vec![press(ctrl.clone())]);
        up(&mut e, ButtonId::Button1, t);
        up(&mut e, ButtonId::Button2, t);

        down(&mut e, ButtonId::Button1, t);
        assert_eq!(down(&mut e, ButtonId::Button2, t), vec![release(ctrl)]);
    }

    // ── dial ──

    #[test]
    fn dial_scaling_repeats_pulses() {
        let mut e = engine();
        let t = Instant::now();
        let vol = key_action(Key::KEY_VOLUMEUP);
        e.update_binding(single(ButtonId::DialCw), vol.clone());

        e.set_sensitivity(2.0).unwrap();
        let fired = e.resolve(HardwareEvent::DialRotate { ticks: 1, ts: t });
        assert_eq!(
            fired,
            vec![
                press(vol.clone()),
                release(vol.clone()),
                press(vol.clone()),
                release(vol.clone())
            ]
        );

        e.set_sensitivity(1.0).unwrap();
        let fired = e.resolve(HardwareEvent::DialRotate { ticks: 1, ts: t });
        assert_eq!(fired, vec![press(vol.clone()), release(vol)]);
    }

    #[test]
    fn dial_low_sensitivity_floors_at_one() {
        let mut e = engine();
        let t = Instant::now();
        let vol = key_action(Key::KEY_VOLUMEUP);
        e.update_binding(single(ButtonId::DialCw), vol.clone());
        e.set_sensitivity(0.1).unwrap();

        let fired = e.resolve(HardwareEvent::DialRotate { ticks: 1, ts: t });
        assert_eq!(fired, vec![press(vol.clone()), release(vol)]);
    }

    #[test]
    fn dial_direction_selects_binding() {
        let mut e = engine();
        let t = Instant::now();
        let vol_up = key_action(Key::KEY_VOLUMEUP);
        let vol_down = key_action(Key::KEY_VOLUMEDOWN);
        e.update_binding(single(ButtonId::DialCw), vol_up.clone());
        e.update_binding(single(ButtonId::DialCcw), vol_down.clone());

        let cw = e.resolve(HardwareEvent::DialRotate { ticks: 2, ts: t });
        assert_eq!(cw, vec![press(vol_up.clone()), release(vol_up.clone()), press(vol_up.clone()), release(vol_up)]);

        let ccw = e.resolve(HardwareEvent::DialRotate { ticks: -1, ts: t });
        assert_eq!(ccw, vec![press(vol_down.clone()), release(vol_down)]);
    }

    #[test]
    fn dial_click_pulses_binding() {
        let mut e = engine();
        let t = Instant::now();
        let play = key_action(Key::KEY_PLAYPAUSE);
        e.update_binding(single(ButtonId::DialClick), play.clone());

        let fired = e.resolve(HardwareEvent::DialClick(t));
        assert_eq!(fired, vec![press(play.clone()), release(play)]);
        // Unbound directions stay silent.
        assert!(e
            .resolve(HardwareEvent::DialRotate { ticks: 1, ts: t })
            .is_empty());
    }

    #[test]
    fn dial_mouse_scroll_binding() {
        let mut e = engine();
        let t = Instant::now();
        let scroll = Action::MouseScroll {
            axis: crate::action::ScrollAxis::Vertical,
            amount: 1,
        };
        e.update_binding(single(ButtonId::DialCw), scroll.clone());
        let fired = e.resolve(HardwareEvent::DialRotate { ticks: 1, ts: t });
        assert_eq!(fired, vec![press(scroll.clone()), release(scroll)]);
    }

    // ── lifecycle ──

    #[test]
    fn detach_releases_outstanding_holds() {
        let mut e = engine();
        let t = Instant::now();
        let f1 = key_action(Key::KEY_F1);
        let shift = key_action(Key::KEY_LEFTSHIFT);
        e.update_binding(single(ButtonId::Button1), f1.clone());
        e.update_binding(
            single(ButtonId::Button2),
            Action::Sticky(Box::new(shift.clone())),
        );

        // Button 1 held past expiry, button 2 sticky-asserted.
        down(&mut e, ButtonId::Button1, t);
        e.handle_window_expiry(t + WINDOW);
        down(&mut e, ButtonId::Button2, t);
        up(&mut e, ButtonId::Button2, t);

        let released = e.detach();
        assert_eq!(released, vec![release(f1), release(shift)]);
        assert_eq!(e.window_deadline(), None);

        // Press state is gone: the old button-up is silent.
        assert!(up(&mut e, ButtonId::Button1, t).is_empty());
    }

    #[test]
    fn detach_cancels_pending_window_without_firing() {
        let mut e = engine();
        let t = Instant::now();
        e.update_binding(single(ButtonId::Button1), key_action(Key::KEY_F1));

        down(&mut e, ButtonId::Button1, t);
        assert!(e.window_deadline().is_some());

        // Candidate never fired, so detach owes nothing.
        assert!(e.detach().is_empty());
        assert_eq!(e.window_deadline(), None);
    }

    #[test]
    fn mouse_click_binding_pulses() {
        let mut e = engine();
        let t = Instant::now();
        let click = Action::MouseClick(MouseButton::Left);
        e.update_binding(single(ButtonId::Button1), click.clone());

        down(&mut e, ButtonId::Button1, t);
        assert_eq!(
            up(&mut e, ButtonId::Button1, t),
            vec![press(click.clone()), release(click)]
        );
    }
}
