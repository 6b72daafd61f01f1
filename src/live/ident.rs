use crate::error::HubError;

/// MySQL caps identifiers at 64 characters.
pub const MAX_IDENTIFIER_LEN: usize = 64;

/// Identifiers cannot be bound as parameters, so anything interpolated into
/// a statement must pass this check first.
pub fn validate_identifier(name: &str) -> Result<&str, HubError> {
    if name.is_empty() {
        return Err(HubError::InvalidIdentifier("empty identifier".to_string()));
    }
    if name.chars().count() > MAX_IDENTIFIER_LEN {
        return Err(HubError::InvalidIdentifier(format!(
            "`{}...` exceeds {MAX_IDENTIFIER_LEN} characters",
            name.chars().take(16).collect::<String>()
        )));
    }
    if name.chars().any(|c| c == '`' || c == '\0') {
        return Err(HubError::InvalidIdentifier(format!(
            "{name:?} contains a backtick or NUL"
        )));
    }
    if name.ends_with(' ') {
        return Err(HubError::InvalidIdentifier(format!(
            "{name:?} ends with a space"
        )));
    }
    Ok(name)
}

/// Validated and wrapped in backticks.
pub fn quote_identifier(name: &str) -> Result<String, HubError> {
    validate_identifier(name).map(|n| format!("`{n}`"))
}
