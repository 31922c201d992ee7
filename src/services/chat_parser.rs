//! WhatsApp chat export parser.
//!
//! Parses plain-text exports with one message per line:
//!
//! ```text
//! [08/01/2023, 10:30:00] John Doe: Hello, how are you?
//! [08/01/2023, 10:31 PM] Jane Smith: <Media omitted>
//! [08/01/2023, 10:32:05] Messages and calls are end-to-end encrypted.
//! ```
//!
//! Lines with a sender become participant messages, lines with only the
//! bracketed prefix become system messages, and anything else is skipped
//! with a warning. A malformed line never fails the whole parse.
//!
//! # Known Limitations
//!
//! Two-digit years are read as `2000 + YY`. Dates before 2000 written with two
//! digits, and dates after 2099, are not representable in that form.

use crate::models::{
    ChatExportData, ChatMessage, ExportMetadata, MEDIA_OMITTED_MARKER,
};
use crate::{Error, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::{Captures, Regex};
use std::collections::BTreeSet;
use std::sync::LazyLock;
use std::time::Instant;
use tracing::instrument;

/// Bracketed `[D/M/Y, H:MM[:SS] [AM/PM]]` prefix shared by both line shapes.
const TIMESTAMP_PREFIX: &str = r"^\[(?P<date>\d{1,2}/\d{1,2}/(?:\d{4}|\d{2})),\s*(?P<time>\d{1,2}:\d{2}(?::\d{2})?)(?:\s*(?P<meridiem>[AaPp][Mm]))?\]\s*";

/// Header line WhatsApp writes at the top of some exports.
const EXPORT_HEADER: &str = "WhatsApp Chat with";

/// Encryption notice present in nearly every export.
const ENCRYPTION_NOTICE: &str = "Messages and calls are end-to-end encrypted";

/// iOS exports name attachments instead of omitting them.
const ATTACHMENT_PREFIX: &str = "<attached:";

/// Left-to-right mark iOS prepends to some lines and attachment markers.
const LEFT_TO_RIGHT_MARK: char = '\u{200e}';

static SHARED_PARSER: LazyLock<std::result::Result<ChatParser, String>> =
    LazyLock::new(|| ChatParser::new().map_err(|e| e.to_string()));

/// Parses a chat export with the shared parser instance.
///
/// # Errors
///
/// Returns [`Error::ParseFailure`] only if the parser itself could not be
/// built. Malformed lines are skipped, not reported as errors.
///
/// # Examples
///
/// ```
/// use chat_ingest::parse_chat_export;
///
/// let raw = "[08/01/2023, 10:30:00] John Doe: Hello, how are you?";
/// let data = parse_chat_export(raw).unwrap();
/// assert_eq!(data.messages.len(), 1);
/// assert_eq!(data.participants, vec!["John Doe"]);
/// ```
pub fn parse_chat_export(raw: &str) -> Result<ChatExportData> {
    shared_parser().map(|parser| parser.parse(raw))
}

/// Cheap heuristic: does this text look like a WhatsApp export at all?
///
/// Used to reject obviously wrong uploads before a full parse.
///
/// # Examples
///
/// ```
/// use chat_ingest::is_valid_whatsapp_export;
///
/// assert!(is_valid_whatsapp_export("[08/01/2023, 10:30:00] John: hi"));
/// assert!(!is_valid_whatsapp_export("just some notes"));
/// ```
#[must_use]
pub fn is_valid_whatsapp_export(text: &str) -> bool {
    shared_parser().is_ok_and(|parser| parser.is_valid_export(text))
}

fn shared_parser() -> Result<&'static ChatParser> {
    SHARED_PARSER
        .as_ref()
        .map_err(|cause| Error::ParseFailure(cause.clone()))
}

/// Parser for WhatsApp plain-text chat exports.
#[derive(Debug, Clone)]
pub struct ChatParser {
    message: Regex,
    system: Regex,
}

/// Outcome of matching a single line.
enum ParsedLine {
    Message(ChatMessage),
    Skipped(&'static str),
}

impl ChatParser {
    /// Builds a parser, compiling the line patterns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ParseFailure`] if a line pattern fails to compile.
    pub fn new() -> Result<Self> {
        let message = Regex::new(&format!(
            r"{TIMESTAMP_PREFIX}(?P<sender>[^:]+):\s?(?P<content>.*)$"
        ))
        .map_err(|e| Error::ParseFailure(format!("message pattern: {e}")))?;
        let system = Regex::new(&format!(r"{TIMESTAMP_PREFIX}(?P<content>.+)$"))
            .map_err(|e| Error::ParseFailure(format!("system pattern: {e}")))?;
        Ok(Self { message, system })
    }

    /// Parses raw export text into structured chat data.
    ///
    /// Never fails: lines that match neither the message nor the system shape,
    /// carry an impossible date, or have a blank sender are skipped and logged.
    #[instrument(skip(self, raw), fields(bytes = raw.len()))]
    pub fn parse(&self, raw: &str) -> ChatExportData {
        let start = Instant::now();
        let mut messages = Vec::new();
        let mut participants = BTreeSet::new();
        let mut total_lines = 0usize;
        let mut skipped_lines = 0usize;

        let lines = raw
            .lines()
            .map(|line| line.trim().trim_start_matches(LEFT_TO_RIGHT_MARK))
            .filter(|line| !line.is_empty());

        for (index, line) in lines.enumerate() {
            total_lines += 1;
            match self.parse_line(line) {
                ParsedLine::Message(message) => {
                    if !message.is_system() {
                        participants.insert(message.sender.clone());
                    }
                    messages.push(message);
                },
                ParsedLine::Skipped(reason) => {
                    skipped_lines += 1;
                    tracing::warn!(line = index + 1, reason, "Skipping chat export line");
                },
            }
        }

        // sort_by_key is stable, so equal timestamps keep input order
        messages.sort_by_key(|message| message.timestamp);

        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        metrics::histogram!("chat_parser_duration_ms").record(duration_ms);
        metrics::counter!("chat_parser_lines_total").increment(total_lines as u64);
        metrics::counter!("chat_parser_lines_skipped_total").increment(skipped_lines as u64);
        tracing::debug!(
            messages = messages.len(),
            participants = participants.len(),
            skipped_lines,
            duration_ms,
            "Parsed chat export"
        );

        ChatExportData {
            participants: participants.into_iter().collect(),
            messages,
            metadata: ExportMetadata::now(total_lines, skipped_lines),
        }
    }

    /// Returns true if any line matches the message shape, or the text carries
    /// the export header or the encryption notice.
    #[must_use]
    pub fn is_valid_export(&self, text: &str) -> bool {
        text.lines()
            .map(|line| line.trim().trim_start_matches(LEFT_TO_RIGHT_MARK))
            .any(|line| {
                self.message.is_match(line)
                    || line.starts_with(EXPORT_HEADER)
                    || line.contains(ENCRYPTION_NOTICE)
            })
    }

    fn parse_line(&self, line: &str) -> ParsedLine {
        if let Some(caps) = self.message.captures(line) {
            return Self::message_from(&caps);
        }
        if let Some(caps) = self.system.captures(line) {
            return Self::system_from(&caps);
        }
        ParsedLine::Skipped("unrecognized line format")
    }

    fn message_from(caps: &Captures<'_>) -> ParsedLine {
        let Some(timestamp) = timestamp_from(caps) else {
            return ParsedLine::Skipped("invalid date or time");
        };
        let sender = caps.name("sender").map_or("", |m| m.as_str().trim());
        if sender.is_empty() {
            return ParsedLine::Skipped("empty sender");
        }
        let content = caps.name("content").map_or("", |m| m.as_str()).trim();
        ParsedLine::Message(with_media_marker(ChatMessage::text(timestamp, sender, content)))
    }

    fn system_from(caps: &Captures<'_>) -> ParsedLine {
        let Some(timestamp) = timestamp_from(caps) else {
            return ParsedLine::Skipped("invalid date or time");
        };
        let content = caps.name("content").map_or("", |m| m.as_str()).trim();
        ParsedLine::Message(with_media_marker(ChatMessage::system(timestamp, content)))
    }
}

fn with_media_marker(message: ChatMessage) -> ChatMessage {
    match media_marker(&message.content) {
        Some(media_url) => message.with_media(media_url),
        None => message,
    }
}

/// Returns `Some(file name)` for a media placeholder, `None` for plain text.
fn media_marker(content: &str) -> Option<Option<String>> {
    let marker = content.trim_start_matches(LEFT_TO_RIGHT_MARK);
    if marker == MEDIA_OMITTED_MARKER {
        return Some(None);
    }
    let name = marker
        .strip_prefix(ATTACHMENT_PREFIX)?
        .strip_suffix('>')?
        .trim();
    Some((!name.is_empty()).then(|| name.to_string()))
}

fn timestamp_from(caps: &Captures<'_>) -> Option<NaiveDateTime> {
    let date = parse_date(caps.name("date")?.as_str())?;
    let time = parse_time(
        caps.name("time")?.as_str(),
        caps.name("meridiem").map(|m| m.as_str()),
    )?;
    Some(date.and_time(time))
}

/// Parses a `D/M/Y` date. Years below 100 are read as `2000 + YY`.
fn parse_date(date: &str) -> Option<NaiveDate> {
    let mut parts = date.split('/');
    let day: u32 = parts.next()?.trim().parse().ok()?;
    let month: u32 = parts.next()?.trim().parse().ok()?;
    let year = parts.next()?.trim();
    if parts.next().is_some() {
        return None;
    }
    // Two-digit years are read as 20YY; other widths are ambiguous.
    let year: i32 = match year.len() {
        2 => 2000 + year.parse::<i32>().ok()?,
        4 => year.parse().ok()?,
        _ => return None,
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Parses `H:MM[:SS]` with an optional, case-insensitive AM/PM suffix.
fn parse_time(time: &str, meridiem: Option<&str>) -> Option<NaiveTime> {
    let mut parts = time.split(':');
    let mut hour: u32 = parts.next()?.trim().parse().ok()?;
    let minute: u32 = parts.next()?.trim().parse().ok()?;
    let second: u32 = match parts.next() {
        Some(s) => s.trim().parse().ok()?,
        None => 0,
    };
    if parts.next().is_some() {
        return None;
    }

    match meridiem.map(str::to_ascii_uppercase).as_deref() {
        Some("AM") if hour == 12 => hour = 0,
        Some("PM") if hour < 12 => hour += 12,
        _ => {},
    }

    NaiveTime::from_hms_opt(hour, minute, second)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SYSTEM_SENDER;
    use test_case::test_case;

    fn parser() -> ChatParser {
        ChatParser::new().unwrap()
    }

    fn hms(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn test_parses_two_messages_in_order() {
        let raw = "[08/01/2023, 10:30:00] John Doe: Hello, how are you?\n\
                   [08/01/2023, 10:31:15] Jane Smith: I'm good, thanks!";
        let data = parser().parse(raw);

        assert_eq!(data.messages.len(), 2);
        assert_eq!(data.participants, vec!["Jane Smith", "John Doe"]);
        assert_eq!(data.messages[0].content, "Hello, how are you?");
        assert_eq!(data.messages[0].sender, "John Doe");
        assert_eq!(data.messages[1].content, "I'm good, thanks!");
        assert_eq!(data.metadata.total_lines, 2);
        assert_eq!(data.metadata.skipped_lines, 0);
    }

    #[test]
    fn test_day_month_year_order() {
        let data = parser().parse("[08/01/2023, 10:30:00] John: hi");
        let expected = NaiveDate::from_ymd_opt(2023, 1, 8).unwrap().and_time(hms(10, 30, 0));
        assert_eq!(data.messages[0].timestamp, expected);
    }

    #[test]
    fn test_empty_input() {
        let data = parser().parse("");
        assert!(data.participants.is_empty());
        assert!(data.messages.is_empty());
        assert_eq!(data.metadata.total_lines, 0);
    }

    #[test]
    fn test_blank_lines_ignored() {
        let data = parser().parse("\n\n   \n[08/01/2023, 10:30] John: hi\n\n");
        assert_eq!(data.messages.len(), 1);
        assert_eq!(data.metadata.total_lines, 1);
    }

    #[test]
    fn test_media_omitted() {
        let data = parser().parse(
            "[08/01/2023, 10:30:00] John: <Media omitted>\n[08/01/2023, 10:31:00] John: photo?",
        );
        assert!(data.messages[0].is_media);
        assert_eq!(data.messages[0].content, MEDIA_OMITTED_MARKER);
        assert!(!data.messages[1].is_media);
    }

    #[test]
    fn test_ios_attachment_records_file_name() {
        let data =
            parser().parse("[08/01/2023, 10:30:00] John: \u{200e}<attached: 00000012-PHOTO.jpg>");
        let msg = &data.messages[0];
        assert!(msg.is_media);
        assert_eq!(msg.media_url.as_deref(), Some("00000012-PHOTO.jpg"));
    }

    #[test]
    fn test_system_line_excluded_from_participants() {
        let raw = "[08/01/2023, 10:00:00] Messages and calls are end-to-end encrypted.\n\
                   [08/01/2023, 10:30:00] John: hi";
        let data = parser().parse(raw);

        assert_eq!(data.messages.len(), 2);
        assert_eq!(data.messages[0].sender, SYSTEM_SENDER);
        assert!(data.messages[0].is_system());
        assert_eq!(data.participants, vec!["John"]);
    }

    #[test]
    fn test_unrecognized_lines_skipped() {
        let raw = "WhatsApp Chat with Family\n\
                   [08/01/2023, 10:30:00] John: hi\n\
                   this is a continuation line";
        let data = parser().parse(raw);

        assert_eq!(data.messages.len(), 1);
        assert_eq!(data.metadata.total_lines, 3);
        assert_eq!(data.metadata.skipped_lines, 2);
    }

    #[test]
    fn test_invalid_date_skipped() {
        let raw = "[31/02/2023, 10:30:00] John: impossible\n[01/13/2023, 10:30:00] John: bad month";
        let data = parser().parse(raw);
        assert!(data.messages.is_empty());
        assert!(data.participants.is_empty());
        assert_eq!(data.metadata.skipped_lines, 2);
    }

    #[test]
    fn test_three_digit_year_skipped() {
        let data = parser().parse("[8/1/123, 10:30] John: typo in the year");
        assert!(data.messages.is_empty());
        assert_eq!(data.metadata.skipped_lines, 1);
    }

    #[test]
    fn test_blank_sender_skipped() {
        let data = parser().parse("[08/01/2023, 10:30:00]    : nobody");
        assert!(data.messages.is_empty());
        assert_eq!(data.metadata.skipped_lines, 1);
    }

    #[test]
    fn test_sender_and_content_trimmed() {
        let data = parser().parse("[08/01/2023, 10:30:00]   John   :    spaced out   ");
        assert_eq!(data.messages[0].sender, "John");
        assert_eq!(data.messages[0].content, "spaced out");
    }

    #[test]
    fn test_content_may_contain_colons() {
        let data = parser().parse("[08/01/2023, 10:30:00] John: meet at 10:45: lobby");
        assert_eq!(data.messages[0].sender, "John");
        assert_eq!(data.messages[0].content, "meet at 10:45: lobby");
    }

    #[test]
    fn test_messages_sorted_stably() {
        let raw = "[08/01/2023, 11:00:00] John: third\n\
                   [08/01/2023, 10:00:00] Jane: first\n\
                   [08/01/2023, 10:00:00] John: second";
        let data = parser().parse(raw);
        let contents: Vec<_> = data.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_two_digit_year() {
        let data = parser().parse("[08/01/23, 10:30] John: hi");
        let expected = NaiveDate::from_ymd_opt(2023, 1, 8).unwrap().and_time(hms(10, 30, 0));
        assert_eq!(data.messages[0].timestamp, expected);
    }

    #[test_case("10:30", None => Some(hms(10, 30, 0)); "seconds default to zero")]
    #[test_case("10:30:15", None => Some(hms(10, 30, 15)); "explicit seconds")]
    #[test_case("12:05", Some("AM") => Some(hms(0, 5, 0)); "midnight hour")]
    #[test_case("12:05", Some("PM") => Some(hms(12, 5, 0)); "noon stays noon")]
    #[test_case("3:15", Some("pm") => Some(hms(15, 15, 0)); "lowercase pm")]
    #[test_case("9:00", Some("Am") => Some(hms(9, 0, 0)); "mixed case am")]
    #[test_case("13:00", Some("PM") => Some(hms(13, 0, 0)); "pm already 24 hour")]
    #[test_case("24:00", None => None; "hour out of range")]
    #[test_case("10:61", None => None; "minute out of range")]
    #[test_case("10:30:00:00", None => None; "too many components")]
    fn test_parse_time(time: &str, meridiem: Option<&str>) -> Option<NaiveTime> {
        parse_time(time, meridiem)
    }

    #[test_case("08/01/2023" => NaiveDate::from_ymd_opt(2023, 1, 8); "four digit year")]
    #[test_case("8/1/23" => NaiveDate::from_ymd_opt(2023, 1, 8); "two digit year")]
    #[test_case("29/02/2024" => NaiveDate::from_ymd_opt(2024, 2, 29); "leap day")]
    #[test_case("29/02/2023" => None; "not a leap year")]
    #[test_case("aa/01/2023" => None; "non numeric day")]
    #[test_case("08/01" => None; "missing year")]
    #[test_case("8/1/123" => None; "three digit year")]
    #[test_case("8/1/02024" => None; "five digit year")]
    fn test_parse_date(date: &str) -> Option<NaiveDate> {
        parse_date(date)
    }

    #[test]
    fn test_pm_line_end_to_end() {
        let data = parser().parse("[08/01/2023, 10:31 PM] Jane: late");
        assert_eq!(data.messages[0].timestamp.time(), hms(22, 31, 0));
    }

    #[test]
    fn test_narrow_space_before_meridiem() {
        let data = parser().parse("[08/01/2023, 10:31\u{202f}PM] Jane: late");
        assert_eq!(data.messages[0].timestamp.time(), hms(22, 31, 0));
    }

    #[test]
    fn test_is_valid_export() {
        let p = parser();
        assert!(p.is_valid_export("[08/01/2023, 10:30:00] John: hi"));
        assert!(p.is_valid_export("WhatsApp Chat with Family\nnothing else"));
        assert!(p.is_valid_export(
            "garbage\n[08/01/2023, 10:00] Messages and calls are end-to-end encrypted."
        ));
        assert!(!p.is_valid_export("name,email\nJohn,john@example.com"));
        assert!(!p.is_valid_export(""));
    }

    #[test]
    fn test_shared_parser_functions() {
        let data = parse_chat_export("[08/01/2023, 10:30:00] John: hi").unwrap();
        assert_eq!(data.messages.len(), 1);
        assert!(is_valid_whatsapp_export("[08/01/2023, 10:30:00] John: hi"));
    }
}
