//! Default resolution and timeout values.
//!
//! Every attribute that may be omitted by the caller resolves the same way:
//! the explicit value wins, then the registered type's default, otherwise the
//! call site's fault. [`resolve_default`] is the only implementation of that
//! chain.

use chrono::TimeDelta;

/// Timeout value meaning "no timeout".
pub const NO_TIMEOUT: &str = "NONE";

/// Resolve an attribute: explicit value, then type default, then `missing()`.
pub fn resolve_default<T, E>(
    explicit: Option<T>,
    default: Option<T>,
    missing: impl FnOnce() -> E,
) -> Result<T, E> {
    explicit.or(default).ok_or_else(missing)
}

/// Parse a duration string (decimal seconds, or `"NONE"`).
///
/// Returns `None` for `"NONE"`; unparsable values are treated as no timeout.
#[must_use]
pub fn parse_timeout(value: &str) -> Option<TimeDelta> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case(NO_TIMEOUT) {
        return None;
    }
    match trimmed.parse::<i64>() {
        Ok(secs) if secs >= 0 => Some(TimeDelta::seconds(secs)),
        _ => {
            tracing::warn!(value = %value, "Ignoring unparsable timeout value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SwfError;

    #[test]
    fn test_explicit_value_wins() {
        let resolved: Result<&str, SwfError> =
            resolve_default(Some("explicit"), Some("default"), || SwfError::DefaultUndefined {
                attribute: "task_list",
            });
        assert_eq!(resolved.unwrap(), "explicit");
    }

    #[test]
    fn test_falls_back_to_default() {
        let resolved: Result<&str, SwfError> =
            resolve_default(None, Some("default"), || SwfError::DefaultUndefined {
                attribute: "task_list",
            });
        assert_eq!(resolved.unwrap(), "default");
    }

    #[test]
    fn test_missing_raises_call_site_error() {
        let resolved: Result<&str, &str> = resolve_default(None, None, || "missing");
        assert_eq!(resolved.unwrap_err(), "missing");
    }

    #[test]
    fn test_parse_timeout() {
        assert_eq!(parse_timeout("300"), Some(TimeDelta::seconds(300)));
        assert_eq!(parse_timeout("NONE"), None);
        assert_eq!(parse_timeout("none"), None);
        assert_eq!(parse_timeout("soon"), None);
        assert_eq!(parse_timeout("-5"), None);
    }
}
