//! CAL-ADDRESS value data type (RFC 5545 §3.3.3): a URI, almost always
//! `mailto:`, identifying a calendar user (organizer/attendee).

/// Strips a leading `mailto:` (case-insensitively) and lowercases the
/// result, the canonicalization spec.md §4.4 requires for participant map
/// keys.
pub fn canonicalize_email(cal_address: &str) -> String {
    let stripped = cal_address
        .strip_prefix("mailto:")
        .or_else(|| cal_address.strip_prefix("MAILTO:"))
        .unwrap_or(cal_address);

    stripped.trim().to_lowercase()
}

pub fn to_cal_address(email: &str) -> String {
    if email.contains(':') {
        email.to_string()
    } else {
        format!("mailto:{email}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_prefix_and_lowercases() {
        assert_eq!(canonicalize_email("MAILTO:Jane.Doe@Example.COM"), "jane.doe@example.com");
    }

    #[test]
    fn round_trips_to_cal_address() {
        assert_eq!(to_cal_address("jane@example.com"), "mailto:jane@example.com");
    }
}
