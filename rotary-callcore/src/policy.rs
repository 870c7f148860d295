//! Destination resolution: turns a dialled digit buffer into either a
//! speed-dial expansion, an allow-listed destination, or a policy rejection.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    SpeedDial { destination: String, code: String },
    Allowed { destination: String },
    NotPermitted,
}

/// Resolve `buffer` against the speed-dial table and allow-list, in that
/// order:
/// 1. An exact speed-dial code match wins outright.
/// 2. Otherwise the buffer, with a single leading `+` trimmed, is compared
///    verbatim against each allow-list entry; a match, or the literal
///    wildcard entry `*`, permits the call with the *original* buffer as the
///    destination.
/// 3. Otherwise the destination is not permitted.
pub fn resolve_destination(
    buffer: &str,
    speed_dial: &HashMap<String, String>,
    allowlist: &[String],
) -> Resolution {
    if let Some(destination) = speed_dial.get(buffer) {
        return Resolution::SpeedDial {
            destination: destination.clone(),
            code: buffer.to_string(),
        };
    }

    let trimmed = buffer.strip_prefix('+').unwrap_or(buffer);
    let permitted = allowlist.iter().any(|entry| entry == "*" || entry == trimmed);
    if permitted {
        return Resolution::Allowed {
            destination: buffer.to_string(),
        };
    }

    Resolution::NotPermitted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speed_dial() -> HashMap<String, String> {
        HashMap::from([("1".to_string(), "+15551234567".to_string())])
    }

    #[test]
    fn speed_dial_code_expands_to_its_destination() {
        let resolution = resolve_destination("1", &speed_dial(), &[]);
        assert_eq!(
            resolution,
            Resolution::SpeedDial {
                destination: "+15551234567".into(),
                code: "1".into(),
            }
        );
    }

    #[test]
    fn allowlisted_destination_is_permitted_after_trimming_plus() {
        let allowlist = vec!["15551234567".to_string()];
        let resolution = resolve_destination("+15551234567", &HashMap::new(), &allowlist);
        assert_eq!(
            resolution,
            Resolution::Allowed {
                destination: "+15551234567".into(),
            }
        );
    }

    #[test]
    fn wildcard_allowlist_permits_anything() {
        let allowlist = vec!["*".to_string()];
        let resolution = resolve_destination("+15559999999", &HashMap::new(), &allowlist);
        assert!(matches!(resolution, Resolution::Allowed { .. }));
    }

    #[test]
    fn unmatched_destination_is_not_permitted() {
        let allowlist = vec!["15551234567".to_string()];
        let resolution = resolve_destination("+15559999999", &HashMap::new(), &allowlist);
        assert_eq!(resolution, Resolution::NotPermitted);
    }

    #[test]
    fn speed_dial_takes_priority_over_allowlist() {
        let allowlist = vec!["*".to_string()];
        let resolution = resolve_destination("1", &speed_dial(), &allowlist);
        assert!(matches!(resolution, Resolution::SpeedDial { .. }));
    }
}
