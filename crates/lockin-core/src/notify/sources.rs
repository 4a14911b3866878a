//! Source detection for ambient, background-observed events.

use url::Url;

/// URL fragments that mark a request as a possible notification.
const CANDIDATE_MARKERS: [&str; 5] = ["notifications", "mail/u", "calendar/event", "push", "alert"];

/// Maps a host to a source id and knows how to turn a tab title into a
/// message.
#[derive(Debug, Clone, Copy)]
pub struct SourceMatcher {
    pub source: &'static str,
    host: &'static str,
    title_prefix: Option<&'static str>,
}

pub const MATCHERS: [SourceMatcher; 2] = [
    SourceMatcher {
        source: "Gmail",
        host: "mail.google.com",
        title_prefix: None,
    },
    SourceMatcher {
        source: "Calendar",
        host: "calendar.google.com",
        title_prefix: Some("Google Calendar -"),
    },
];

impl SourceMatcher {
    pub fn matches(&self, url: &Url) -> bool {
        url.host_str() == Some(self.host)
    }

    /// Message for an event, from the title when one is available.
    pub fn message(&self, title: Option<&str>) -> String {
        let Some(title) = title.map(str::trim).filter(|t| !t.is_empty()) else {
            return format!("Potential {} notification", self.source);
        };
        let text = match self.title_prefix {
            Some(prefix) => title.replace(prefix, "").trim().to_string(),
            None => title.to_string(),
        };
        if text.is_empty() {
            format!("New {} notification", self.source)
        } else {
            text
        }
    }
}

/// An ambient event attributed to a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detected {
    pub source: String,
    pub message: String,
    pub link: String,
}

pub fn is_candidate(url: &str) -> bool {
    CANDIDATE_MARKERS.iter().any(|m| url.contains(m))
}

/// Attribute `url` to a known source, or `None` when it is not a candidate
/// or no matcher claims it.
pub fn detect(url: &str, title: Option<&str>) -> Option<Detected> {
    if !is_candidate(url) {
        return None;
    }
    let parsed = Url::parse(url).ok()?;
    let matcher = MATCHERS.iter().find(|m| m.matches(&parsed))?;
    Some(Detected {
        source: matcher.source.to_string(),
        message: matcher.message(title),
        link: url.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gmail_event_uses_tab_title() {
        let d = detect("https://mail.google.com/mail/u/0/#inbox", Some("Inbox (3) - me@example.com"))
            .unwrap();
        assert_eq!(d.source, "Gmail");
        assert_eq!(d.message, "Inbox (3) - me@example.com");
    }

    #[test]
    fn calendar_strips_prefix() {
        let d = detect(
            "https://calendar.google.com/calendar/event?eid=1",
            Some("Google Calendar - Standup at 10"),
        )
        .unwrap();
        assert_eq!(d.source, "Calendar");
        assert_eq!(d.message, "Standup at 10");
    }

    #[test]
    fn missing_title_falls_back() {
        let d = detect("https://mail.google.com/sync/push", None).unwrap();
        assert_eq!(d.message, "Potential Gmail notification");
    }

    #[test]
    fn non_candidate_urls_are_ignored() {
        assert!(detect("https://mail.google.com/settings", None).is_none());
        assert!(detect("https://example.com/notifications", None).is_none());
        assert!(!is_candidate("https://calendar.google.com/r/week"));
    }
}
