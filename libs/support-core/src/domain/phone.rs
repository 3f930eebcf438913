use crate::CoreError;
use serde::Serialize;
use std::fmt;

/// Value the operator form starts with. Means nothing was typed yet; so
/// does any other run of zeros.
pub const NO_PHONE_SENTINEL: &str = "0";

const MAX_DIGITS: usize = 15;

/// A phone number as stored in the user profile table: digits only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Operator input for the phone field.
///
/// `NoInput` is distinct from a number that simply has no user behind it:
/// the former never reaches the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhoneInput {
    NoInput,
    Provided(PhoneNumber),
}

impl PhoneInput {
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let trimmed = raw.trim();
        if trimmed.trim_start_matches(NO_PHONE_SENTINEL).is_empty() {
            return Ok(PhoneInput::NoInput);
        }
        if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CoreError::Validation(format!(
                "phone number must contain digits only: {trimmed}"
            )));
        }
        if trimmed.len() > MAX_DIGITS {
            return Err(CoreError::Validation(format!(
                "phone number is longer than {MAX_DIGITS} digits"
            )));
        }
        Ok(PhoneInput::Provided(PhoneNumber(trimmed.to_string())))
    }

    pub fn number(&self) -> Option<&PhoneNumber> {
        match self {
            PhoneInput::NoInput => None,
            PhoneInput::Provided(number) => Some(number),
        }
    }
}
