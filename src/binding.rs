//! Canonical binding keys.
//!
//! A binding key is either a single button (or dial pseudo-button) or a
//! combo: an order-independent, duplicate-free set of two or more physical
//! buttons. Two keys are equal iff their canonical forms are equal, so
//! `BUTTON_1+BUTTON_2` and `BUTTON_2+BUTTON_1` name the same binding.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::action::ValidationError;
use crate::protocol::ButtonId;

/// Canonical lookup key for the binding table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BindingKey {
    Single(ButtonId),
    Combo(BTreeSet<ButtonId>),
}

impl BindingKey {
    /// Canonicalize a set of buttons: deduplicate, order-normalize, and
    /// collapse singletons. Combos may only contain physical buttons.
    pub fn from_buttons(
        buttons: impl IntoIterator<Item = ButtonId>,
    ) -> Result<Self, ValidationError> {
        let set: BTreeSet<ButtonId> = buttons.into_iter().collect();
        match set.len() {
            0 => Err(ValidationError::MalformedCombo("empty key".into())),
            1 => Ok(BindingKey::Single(
                set.into_iter().next().expect("len checked"),
            )),
            _ => {
                if let Some(dial) = set.iter().find(|b| !b.is_physical()) {
                    return Err(ValidationError::MalformedCombo(format!(
                        "{dial} cannot be part of a combo"
                    )));
                }
                Ok(BindingKey::Combo(set))
            }
        }
    }
}

impl FromStr for BindingKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut buttons = Vec::new();
        for token in s.split('+') {
            let token = token.trim();
            if token.is_empty() {
                return Err(ValidationError::MalformedCombo(format!(
                    "empty button token in {s:?}"
                )));
            }
            let id = ButtonId::parse(token)
                .ok_or_else(|| ValidationError::UnknownKeyName(token.to_string()))?;
            buttons.push(id);
        }
        Self::from_buttons(buttons)
    }
}

impl fmt::Display for BindingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingKey::Single(id) => write!(f, "{id}"),
            BindingKey::Combo(set) => {
                let mut first = true;
                for id in set {
                    if !first {
                        write!(f, "+")?;
                    }
                    write!(f, "{id}")?;
                    first = false;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combo_is_order_independent() {
        let a: BindingKey = "BUTTON_1+BUTTON_2".parse().unwrap();
        let b: BindingKey = "BUTTON_2+BUTTON_1".parse().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn duplicate_buttons_collapse_to_single() {
        let key: BindingKey = "BUTTON_3+BUTTON_3".parse().unwrap();
        assert_eq!(key, BindingKey::Single(ButtonId::Button3));
    }

    #[test]
    fn dial_tokens_are_single_keys() {
        assert_eq!(
            "DIAL_CW".parse::<BindingKey>().unwrap(),
            BindingKey::Single(ButtonId::DialCw)
        );
    }

    #[test]
    fn dial_in_combo_is_rejected() {
        assert!(matches!(
            "BUTTON_1+DIAL_CW".parse::<BindingKey>(),
            Err(ValidationError::MalformedCombo(_))
        ));
    }

    #[test]
    fn unknown_token_is_rejected() {
        assert_eq!(
            "BUTTON_99".parse::<BindingKey>(),
            Err(ValidationError::UnknownKeyName("BUTTON_99".into()))
        );
    }

    #[test]
    fn empty_token_is_rejected() {
        assert!(matches!(
            "BUTTON_1+".parse::<BindingKey>(),
            Err(ValidationError::MalformedCombo(_))
        ));
        assert!(matches!(
            "".parse::<BindingKey>(),
            Err(ValidationError::MalformedCombo(_))
        ));
    }

    #[test]
    fn display_is_canonical() {
        let key: BindingKey = "BUTTON_2+BUTTON_1+BUTTON_2".parse().unwrap();
        assert_eq!(key.to_string(), "BUTTON_1+BUTTON_2");
    }
}
