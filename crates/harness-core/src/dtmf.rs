//! DTMF keypad digits

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};

/// Keys on the dial pad, in display order
pub const KEYPAD: [char; 12] = ['1', '2', '3', '4', '5', '6', '7', '8', '9', '*', '0', '#'];

/// A validated DTMF digit (`0-9`, `*`, `#`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "char", into = "char")]
pub struct DtmfDigit(char);

impl DtmfDigit {
    pub fn new(digit: char) -> HarnessResult<Self> {
        if KEYPAD.contains(&digit) {
            Ok(Self(digit))
        } else {
            Err(HarnessError::InvalidDigit { digit })
        }
    }

    pub fn as_char(&self) -> char {
        self.0
    }

    /// Low and high tone frequencies in Hz
    pub fn frequencies(&self) -> (u16, u16) {
        let low = match self.0 {
            '1' | '2' | '3' => 697,
            '4' | '5' | '6' => 770,
            '7' | '8' | '9' => 852,
            _ => 941,
        };
        let high = match self.0 {
            '1' | '4' | '7' | '*' => 1209,
            '2' | '5' | '8' | '0' => 1336,
            _ => 1477,
        };
        (low, high)
    }
}

impl TryFrom<char> for DtmfDigit {
    type Error = HarnessError;

    fn try_from(digit: char) -> Result<Self, Self::Error> {
        Self::new(digit)
    }
}

impl From<DtmfDigit> for char {
    fn from(digit: DtmfDigit) -> Self {
        digit.0
    }
}

impl fmt::Display for DtmfDigit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parse a digit string such as `"12#"`, rejecting the first invalid key
pub fn parse_digits(digits: &str) -> HarnessResult<Vec<DtmfDigit>> {
    digits.chars().map(DtmfDigit::new).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keypad_digits_are_accepted() {
        for key in KEYPAD {
            assert_eq!(DtmfDigit::new(key).unwrap().as_char(), key);
        }
    }

    #[test]
    fn tone_pairs_follow_the_keypad_grid() {
        assert_eq!(DtmfDigit::new('1').unwrap().frequencies(), (697, 1209));
        assert_eq!(DtmfDigit::new('0').unwrap().frequencies(), (941, 1336));
        assert_eq!(DtmfDigit::new('#').unwrap().frequencies(), (941, 1477));
        assert_eq!(DtmfDigit::new('8').unwrap().frequencies(), (852, 1336));
    }

    #[test]
    fn other_characters_are_rejected() {
        for key in ['a', 'A', ' ', '+', 'x'] {
            assert!(matches!(
                DtmfDigit::new(key),
                Err(HarnessError::InvalidDigit { digit }) if digit == key
            ));
        }
        assert!(parse_digits("12#4").is_ok());
        assert!(parse_digits("12p4").is_err());
    }
}
