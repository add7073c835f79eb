//! Field rules shared by registration, admin edits and listing payloads.

use validator::ValidationError;

pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 32;
pub const PASSWORD_MIN: usize = 8;
pub const PASSWORD_MAX: usize = 128;

/// Letters of any script, digits, spaces, `-` and `_`; must start with a letter.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let len = username.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return Err(ValidationError::new("username_length"));
    }

    let mut chars = username.chars();
    if !chars.next().is_some_and(char::is_alphabetic) {
        return Err(ValidationError::new("username_start"));
    }
    if username.ends_with(' ') {
        return Err(ValidationError::new("username_trailing_space"));
    }
    if !chars.all(|c| c.is_alphanumeric() || c == ' ' || c == '-' || c == '_') {
        return Err(ValidationError::new("username_charset"));
    }

    Ok(())
}

/// Upper, lower, digit and special character required.
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    let len = password.chars().count();
    if !(PASSWORD_MIN..=PASSWORD_MAX).contains(&len) {
        return Err(ValidationError::new("password_length"));
    }

    let has_upper = password.chars().any(char::is_uppercase);
    let has_lower = password.chars().any(char::is_lowercase);
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password
        .chars()
        .any(|c| !c.is_alphanumeric() && !c.is_whitespace());

    if has_upper && has_lower && has_digit && has_special {
        Ok(())
    } else {
        Err(ValidationError::new("password_strength"))
    }
}

pub fn validate_image_url(url: &str) -> Result<(), ValidationError> {
    if url.is_empty() || url.starts_with("https://") || url.starts_with("http://") {
        Ok(())
    } else {
        Err(ValidationError::new("image_url_scheme"))
    }
}
