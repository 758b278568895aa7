//! Internal helpers for input validation and conversion.
//!
//! These utilities are **not** part of the public API. They centralize
//! validation so every entry point enforces the same rules before touching
//! the store.

use chrono::{DateTime, Datelike, Utc};
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

use crate::{EngineError, ResultEngine};

const MIN_DISPLAY_NAME_CHARS: usize = 3;
const MIN_PASSWORD_CHARS: usize = 6;
const PIN_DIGITS: std::ops::RangeInclusive<usize> = 4..=6;
const CARD_DIGITS: std::ops::RangeInclusive<usize> = 12..=19;
const CVV_DIGITS: std::ops::RangeInclusive<usize> = 3..=4;

/// Parse a UUID from storage and return a labeled error on failure.
pub(crate) fn parse_uuid(value: &str, label: &str) -> ResultEngine<Uuid> {
    Uuid::parse_str(value).map_err(|_| EngineError::InvalidId(format!("invalid {label} id")))
}

/// Trim and lower-case an email address, rejecting anything that is not
/// shaped like `local@domain.tld`.
pub(crate) fn normalize_email(value: &str) -> ResultEngine<String> {
    let email = value.trim().to_lowercase();
    let invalid = || EngineError::Validation(format!("Email address {email} is invalid"));

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|label| label.is_empty()) {
        return Err(invalid());
    }
    Ok(email)
}

pub(crate) fn normalize_display_name(value: &str) -> ResultEngine<String> {
    let name: String = value.trim().nfc().collect();
    if name.chars().count() < MIN_DISPLAY_NAME_CHARS {
        return Err(EngineError::Validation(
            "Invalid fullname supplied".to_string(),
        ));
    }
    Ok(name)
}

pub(crate) fn validate_password(value: &str) -> ResultEngine<()> {
    if value.trim().chars().count() < MIN_PASSWORD_CHARS {
        return Err(EngineError::Validation(format!(
            "Invalid password. Too weak. Password length should be at least {MIN_PASSWORD_CHARS} characters"
        )));
    }
    Ok(())
}

pub(crate) fn validate_pin(value: &str) -> ResultEngine<()> {
    if !PIN_DIGITS.contains(&value.len()) || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(EngineError::Validation(format!(
            "Pin must be {} to {} digits",
            PIN_DIGITS.start(),
            PIN_DIGITS.end()
        )));
    }
    Ok(())
}

/// Check a card number (spaces and dashes allowed) against its length and
/// Luhn digit, returning it with all but the last four digits masked.
pub(crate) fn mask_card_number(value: &str) -> ResultEngine<String> {
    let invalid = || EngineError::Validation("Invalid card number".to_string());

    let digits: Vec<u32> = value
        .chars()
        .filter(|ch| !matches!(ch, ' ' | '-'))
        .map(|ch| ch.to_digit(10).ok_or_else(invalid))
        .collect::<ResultEngine<_>>()?;
    if !CARD_DIGITS.contains(&digits.len()) {
        return Err(invalid());
    }

    let checksum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| match (i % 2, d * 2) {
            (0, _) => d,
            (_, doubled) if doubled > 9 => doubled - 9,
            (_, doubled) => doubled,
        })
        .sum();
    if checksum % 10 != 0 {
        return Err(invalid());
    }

    let visible = digits.len() - 4;
    Ok(digits
        .iter()
        .enumerate()
        .map(|(i, d)| {
            if i < visible {
                '*'
            } else {
                char::from_digit(*d, 10).unwrap_or('*')
            }
        })
        .collect())
}

pub(crate) fn validate_cvv(value: &str) -> ResultEngine<()> {
    if !CVV_DIGITS.contains(&value.len()) || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(EngineError::Validation("Invalid cvv".to_string()));
    }
    Ok(())
}

/// Parse `MM` and `YY`/`YYYY` into a month and a full year, rejecting cards
/// whose expiry month has already passed at `now`.
pub(crate) fn parse_card_expiry(
    month: &str,
    year: &str,
    now: DateTime<Utc>,
) -> ResultEngine<(u32, i32)> {
    let invalid = || EngineError::Validation("Invalid card expiry".to_string());

    let month: u32 = month.trim().parse().map_err(|_| invalid())?;
    if !(1..=12).contains(&month) {
        return Err(invalid());
    }
    let year = year.trim();
    let parsed: i32 = year.parse().map_err(|_| invalid())?;
    let year = match year.len() {
        2 => 2000 + parsed,
        4 => parsed,
        _ => return Err(invalid()),
    };

    if (year, month) < (now.year(), now.month()) {
        return Err(EngineError::Validation("Card has expired".to_string()));
    }
    Ok((month, year))
}
