//! Input checks run before any gateway mutation.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ConnectError;

/// Brazilian mobile/landline in E.164 digits without the plus sign.
const PHONE_PATTERN: &str = r"^55[0-9]{10,11}$";

const MAX_SESSION_NAME_LEN: usize = 64;

static PHONE_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(PHONE_PATTERN).ok());

/// Return the phone number unchanged if it matches the accepted format.
///
/// Blank input counts as missing; anything else is matched as given.
pub fn validate_phone(phone: Option<&str>) -> Result<String, ConnectError> {
    let phone = phone
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| ConnectError::validation("Phone number is required"))?;

    let valid = PHONE_RE.as_ref().is_some_and(|re| re.is_match(phone));
    if !valid {
        return Err(ConnectError::validation(format!(
            "Invalid phone number format. Expected 55 followed by 10 or 11 digits, got '{phone}'"
        )));
    }
    Ok(phone.to_string())
}

pub fn validate_session_name(name: &str) -> Result<&str, ConnectError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ConnectError::validation("Session name is required"));
    }
    if name.len() > MAX_SESSION_NAME_LEN {
        return Err(ConnectError::validation(format!(
            "Session name must be at most {MAX_SESSION_NAME_LEN} characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConnectError::validation(
            "Session name may only contain letters, digits, '-' and '_'",
        ));
    }
    Ok(name)
}
