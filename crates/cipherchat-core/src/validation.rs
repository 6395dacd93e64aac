//! Input validation: checks applied to user-supplied text.
//!
//! Length bounds are counted in characters after trimming surrounding
//! whitespace. Validators return the trimmed value so callers send exactly
//! what was checked.

use crate::error::ValidationError;

/// Username length bounds.
pub const USERNAME_MAX: usize = 20;
/// Bounds for room names.
pub const ROOM_NAME_MAX: usize = 30;
/// Bounds for the personal-name fields of a signup.
pub const PERSON_NAME_MAX: usize = 100;
/// Minimum password length.
pub const PASSWORD_MIN: usize = 8;

fn bounded<'a>(
    field: &'static str,
    value: &'a str,
    min: usize,
    max: usize,
) -> Result<&'a str, ValidationError> {
    let trimmed = value.trim();
    let len = trimmed.chars().count();
    if len == 0 {
        return Err(ValidationError::Empty { field });
    }
    if len < min || len > max {
        return Err(ValidationError::Length {
            field,
            min,
            max,
            got: len,
        });
    }
    Ok(trimmed)
}

/// Validate a room name (1–30 characters).
pub fn validate_room_name(name: &str) -> Result<&str, ValidationError> {
    bounded("room name", name, 1, ROOM_NAME_MAX)
}

/// Validate a username (1–20 characters).
pub fn validate_username(name: &str) -> Result<&str, ValidationError> {
    bounded("username", name, 1, USERNAME_MAX)
}

/// Validate a name, surname or email field of a signup (1–100 characters).
pub fn validate_person_name<'a>(
    field: &'static str,
    value: &'a str,
) -> Result<&'a str, ValidationError> {
    bounded(field, value, 1, PERSON_NAME_MAX)
}

/// Validate a password. Passwords are not trimmed.
pub fn validate_password(password: &str) -> Result<&str, ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::Empty { field: "password" });
    }
    if password.chars().count() < PASSWORD_MIN {
        return Err(ValidationError::PasswordTooShort { min: PASSWORD_MIN });
    }
    Ok(password)
}

/// Validate the text of an outgoing message: anything but blank.
pub fn validate_message_text(text: &str) -> Result<&str, ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty { field: "message" });
    }
    Ok(trimmed)
}
