//! Field extraction from a post element.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Local, TimeZone, Utc};

use crate::dom::{NodeId, Page};
use crate::wait;
use crate::{Error, Result, ShareConfig, TimeZoneSetting};

/// Fields a card cannot be rendered without
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredField {
    AvatarUrl,
    AuthorName,
    BodyText,
}

impl fmt::Display for RequiredField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RequiredField::AvatarUrl => "avatar url",
            RequiredField::AuthorName => "author name",
            RequiredField::BodyText => "body text",
        })
    }
}

/// Structured content of one post, read once per share action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPost {
    pub avatar_url: String,
    pub author_name: String,
    /// Empty when the identity block carries no `@` token
    pub author_handle: String,
    pub body_text: String,
    /// Raw `datetime` attribute, empty when the post has no time element
    pub timestamp_iso: String,
    /// `YYYY/MM/DD`, empty without a timestamp
    pub posted_date: String,
    /// `HH:MM` (24-hour), empty without a timestamp
    pub posted_time: String,
}

impl ExtractedPost {
    /// Footer line, `date · time`
    pub fn posted_label(&self) -> String {
        match (self.posted_date.is_empty(), self.posted_time.is_empty()) {
            (true, true) => String::new(),
            (false, true) => self.posted_date.clone(),
            (true, false) => self.posted_time.clone(),
            (false, false) => format!("{} \u{00b7} {}", self.posted_date, self.posted_time),
        }
    }
}

/// Split an identity block's text into display name (first line) and handle
/// (first line starting with `@`).
pub fn parse_identity(text: &str) -> (String, String) {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    let name = lines.next().unwrap_or_default().to_string();
    let handle = text
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with('@'))
        .unwrap_or_default()
        .to_string();
    (name, handle)
}

/// Format an RFC 3339 timestamp as `(YYYY/MM/DD, HH:MM)` in the given zone.
/// Unparseable input yields two empty strings.
pub fn format_timestamp(iso: &str, zone: TimeZoneSetting) -> (String, String) {
    let Ok(parsed) = DateTime::parse_from_rfc3339(iso.trim()) else {
        if !iso.trim().is_empty() {
            log::debug!("ignoring unparseable timestamp {:?}", iso);
        }
        return (String::new(), String::new());
    };
    match zone {
        TimeZoneSetting::Local => format_in(parsed.with_timezone(&Local)),
        TimeZoneSetting::Fixed { offset_minutes } => {
            match FixedOffset::east_opt(offset_minutes.saturating_mul(60)) {
                Some(offset) => format_in(parsed.with_timezone(&offset)),
                None => format_in(parsed.with_timezone(&Utc)),
            }
        }
    }
}

fn format_in<Tz: TimeZone>(dt: DateTime<Tz>) -> (String, String)
where
    Tz::Offset: fmt::Display,
{
    (
        dt.format("%Y/%m/%d").to_string(),
        dt.format("%H:%M").to_string(),
    )
}

/// Expand truncated text, then read every field of `post`.
///
/// Fails with [`Error::ExtractionIncomplete`] when the avatar URL, author name
/// or body text is missing. A missing handle or timestamp is not an error.
pub async fn extract(page: &Page, post: NodeId, config: &ShareConfig) -> Result<ExtractedPost> {
    if !page.read(|d| d.contains(post)) {
        return Err(Error::Detached(post.raw()));
    }
    let sel = &config.selectors;

    if let Some(show_more) = page.query_selector(post, &sel.show_more)? {
        log::debug!("expanding truncated post {}", post);
        page.click(show_more)?;
        if config.expand_early_exit {
            let gone = wait::wait_for(
                || !page.is_connected(show_more),
                config.expand_settle(),
                Duration::from_millis(50),
            )
            .await;
            if !gone {
                log::debug!("show-more control still present after {:?}", config.expand_settle());
            }
        } else {
            wait::settle(config.expand_settle()).await;
        }
    }

    let avatar_url = page
        .query_selector(post, &sel.avatar)?
        .and_then(|img| page.attr(img, "src"))
        .map(|s| s.trim().to_string())
        .unwrap_or_default();

    let identity = page.query_selector(post, &sel.identity)?;
    let (mut author_name, author_handle) = identity
        .map(|block| parse_identity(&page.inner_text(block)))
        .unwrap_or_default();
    let mut identity_found = identity.is_some();
    if author_name.is_empty() {
        if let Some(node) = page.query_selector(post, &sel.identity_fallback)? {
            identity_found = true;
            author_name = page.inner_text(node).trim().to_string();
        }
    }
    if author_name.is_empty() && identity_found {
        author_name = config.labels.unknown_author.clone();
    }

    let body_text = page
        .query_selector(post, &sel.body_text)?
        .map(|node| page.inner_text(node))
        .unwrap_or_default();

    let timestamp_iso = page
        .query_selector(post, &sel.timestamp)?
        .and_then(|node| page.attr(node, "datetime"))
        .unwrap_or_default();
    let (posted_date, posted_time) = format_timestamp(&timestamp_iso, config.timezone);

    let mut missing = Vec::new();
    if avatar_url.is_empty() {
        missing.push(RequiredField::AvatarUrl);
    }
    if author_name.is_empty() {
        missing.push(RequiredField::AuthorName);
    }
    if body_text.trim().is_empty() {
        missing.push(RequiredField::BodyText);
    }
    if !missing.is_empty() {
        return Err(Error::ExtractionIncomplete { missing });
    }

    Ok(ExtractedPost {
        avatar_url,
        author_name,
        author_handle,
        body_text,
        timestamp_iso,
        posted_date,
        posted_time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_with_and_without_handle() {
        assert_eq!(
            parse_identity("Alice\n@alice\n·\n2h"),
            ("Alice".to_string(), "@alice".to_string())
        );
        assert_eq!(parse_identity("Bob"), ("Bob".to_string(), String::new()));
        assert_eq!(parse_identity(""), (String::new(), String::new()));
    }

    #[test]
    fn timestamp_formats_zero_padded() {
        let (d, t) = format_timestamp("2024-03-07T15:04:00Z", TimeZoneSetting::utc());
        assert_eq!(d, "2024/03/07");
        assert_eq!(t, "15:04");
        let (d, t) = format_timestamp(
            "2024-03-07T23:30:00.000Z",
            TimeZoneSetting::Fixed { offset_minutes: 60 },
        );
        assert_eq!(d, "2024/03/08");
        assert_eq!(t, "00:30");
    }

    #[test]
    fn timestamp_is_deterministic_and_tolerates_garbage() {
        let a = format_timestamp("2024-01-01T09:30:00Z", TimeZoneSetting::Local);
        let b = format_timestamp("2024-01-01T09:30:00Z", TimeZoneSetting::Local);
        assert_eq!(a, b);
        assert_eq!(a.1.len(), 5);
        assert_eq!(
            format_timestamp("yesterday", TimeZoneSetting::utc()),
            (String::new(), String::new())
        );
    }

    #[test]
    fn posted_label_joins_parts() {
        let mut p = ExtractedPost {
            avatar_url: "a".into(),
            author_name: "n".into(),
            author_handle: String::new(),
            body_text: "b".into(),
            timestamp_iso: String::new(),
            posted_date: String::new(),
            posted_time: String::new(),
        };
        assert_eq!(p.posted_label(), "");
        p.posted_date = "2024/01/01".into();
        p.posted_time = "09:30".into();
        assert_eq!(p.posted_label(), "2024/01/01 \u{00b7} 09:30");
    }
}
