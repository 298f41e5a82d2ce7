//! Version extraction from release announcements.

use regex::Regex;
use std::sync::LazyLock;

use crate::slack::Message;

static VERSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"DUBBD v(\d+\.\d+\.\d+)").expect("valid version pattern"));

/// Pull the `major.minor.patch` token out of a `DUBBD vX.Y.Z` announcement.
pub fn version_in(text: &str) -> Option<&str> {
    VERSION_PATTERN
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// A match found in channel history.
#[derive(Debug, Clone)]
pub struct Announcement<'a> {
    pub version: String,
    pub message: &'a Message,
}

/// Scan `messages` in the order given and return the first announcement
/// posted by `author`. Later matches are ignored.
pub fn first_announcement<'a>(messages: &'a [Message], author: &str) -> Option<Announcement<'a>> {
    messages
        .iter()
        .filter(|m| !m.text.is_empty() && m.is_from(author))
        .find_map(|m| {
            version_in(&m.text).map(|v| Announcement {
                version: v.to_string(),
                message: m,
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(user: &str, text: &str) -> Message {
        Message {
            user: Some(user.to_string()),
            text: text.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn extracts_version_token() {
        assert_eq!(version_in("New release: DUBBD v0.12.3 :tada:"), Some("0.12.3"));
        assert_eq!(version_in("DUBBD v10.0.0"), Some("10.0.0"));
    }

    #[test]
    fn requires_exact_template() {
        assert_eq!(version_in("dubbd v1.2.3"), None);
        assert_eq!(version_in("DUBBD 1.2.3"), None);
        assert_eq!(version_in("DUBBD v1.2"), None);
        assert_eq!(version_in("UDS v1.2.3"), None);
    }

    #[test]
    fn pre_release_suffix_is_not_captured() {
        assert_eq!(version_in("DUBBD v1.2.3-rc.1"), Some("1.2.3"));
    }

    #[test]
    fn first_match_in_iteration_order_wins() {
        let messages = vec![
            msg("uds-new-release", "DUBBD v2.0.0"),
            msg("uds-new-release", "DUBBD v2.0.1"),
        ];
        let found = first_announcement(&messages, "uds-new-release").unwrap();
        assert_eq!(found.version, "2.0.0");
        assert!(std::ptr::eq(found.message, &messages[0]));
    }

    #[test]
    fn skips_other_authors_and_non_matching_text() {
        let messages = vec![
            msg("someone-else", "DUBBD v9.9.9"),
            msg("uds-new-release", "UDS Core v0.4.0 released"),
            msg("uds-new-release", ""),
            msg("uds-new-release", "DUBBD v1.4.2 released"),
        ];
        let found = first_announcement(&messages, "uds-new-release").unwrap();
        assert_eq!(found.version, "1.4.2");
    }

    #[test]
    fn nothing_from_author() {
        let messages = vec![msg("someone-else", "DUBBD v1.0.0")];
        assert!(first_announcement(&messages, "uds-new-release").is_none());
    }
}
