use crate::{CoreError, CoreResult};

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Minimal structural email check: one `@`, non-empty local part, a dot in the domain.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.contains(char::is_whitespace)
        && domain
            .split_once('.')
            .map(|(head, tail)| !head.is_empty() && !tail.is_empty() && !tail.ends_with('.'))
            .unwrap_or(false)
}

pub fn require_email(email: &str) -> CoreResult<()> {
    if is_valid_email(email) {
        Ok(())
    } else {
        Err(CoreError::ValidationError(format!("Invalid email address: {}", email)))
    }
}

pub fn require_non_empty(field: &str, value: &str) -> CoreResult<()> {
    if value.trim().is_empty() {
        return Err(CoreError::ValidationError(format!("Missing required field: {}", field)));
    }
    Ok(())
}

pub fn require_password(password: &str) -> CoreResult<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(CoreError::ValidationError(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}
