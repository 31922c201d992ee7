//! Chat message types and identifiers.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Sender name recorded for system lines (joins, encryption notices, subject changes).
pub const SYSTEM_SENDER: &str = "System";

/// Literal content WhatsApp writes in place of an attachment.
pub const MEDIA_OMITTED_MARKER: &str = "<Media omitted>";

/// Platform tag written to [`ExportMetadata::platform`].
pub const EXPORT_PLATFORM: &str = "whatsapp";

/// Version of the structured output format.
pub const EXPORT_FORMAT_VERSION: &str = "1.0";

/// Opaque identifier for a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Generates a fresh random message ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single parsed chat message.
///
/// Timestamps are naive: the export carries no timezone and none is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Unique identifier.
    pub id: MessageId,
    /// When the message was sent, in the exporting device's local time.
    pub timestamp: NaiveDateTime,
    /// Sender display name, or [`SYSTEM_SENDER`] for system lines.
    pub sender: String,
    /// Trimmed message content.
    pub content: String,
    /// Whether the message stands in for an attachment.
    pub is_media: bool,
    /// Attachment file name when the export names it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
}

impl ChatMessage {
    /// Creates a text message from a human sender.
    #[must_use]
    pub fn text(
        timestamp: NaiveDateTime,
        sender: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId::generate(),
            timestamp,
            sender: sender.into(),
            content: content.into(),
            is_media: false,
            media_url: None,
        }
    }

    /// Creates a system message.
    #[must_use]
    pub fn system(timestamp: NaiveDateTime, content: impl Into<String>) -> Self {
        Self::text(timestamp, SYSTEM_SENDER, content)
    }

    /// Marks the message as a media placeholder.
    #[must_use]
    pub fn with_media(mut self, media_url: Option<String>) -> Self {
        self.is_media = true;
        self.media_url = media_url;
        self
    }

    /// Returns true if this is a system line rather than a participant message.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.sender == SYSTEM_SENDER
    }
}

/// Metadata describing a single parse run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    /// When the export was processed (not when it was created on the device).
    pub export_date: DateTime<Utc>,
    /// Source platform, always [`EXPORT_PLATFORM`].
    pub platform: String,
    /// Output format version.
    pub format_version: String,
    /// Number of non-empty input lines.
    pub total_lines: usize,
    /// Lines that were skipped as malformed.
    pub skipped_lines: usize,
}

impl ExportMetadata {
    /// Creates metadata stamped with the current time.
    #[must_use]
    pub fn now(total_lines: usize, skipped_lines: usize) -> Self {
        Self {
            export_date: Utc::now(),
            platform: EXPORT_PLATFORM.to_string(),
            format_version: EXPORT_FORMAT_VERSION.to_string(),
            total_lines,
            skipped_lines,
        }
    }
}

impl Default for ExportMetadata {
    fn default() -> Self {
        Self::now(0, 0)
    }
}

/// Structured result of parsing one chat export.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatExportData {
    /// Distinct human senders, sorted alphabetically. Never contains [`SYSTEM_SENDER`].
    pub participants: Vec<String>,
    /// Messages in ascending timestamp order; ties keep input order.
    pub messages: Vec<ChatMessage>,
    /// Processing metadata.
    pub metadata: ExportMetadata,
}

impl ChatExportData {
    /// Returns true if no messages were recovered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Returns the timestamps of the first and last message.
    #[must_use]
    pub fn time_span(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let first = self.messages.first()?;
        let last = self.messages.last()?;
        Some((first.timestamp, last.timestamp))
    }

    /// Counts messages that are media placeholders.
    #[must_use]
    pub fn media_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_media).count()
    }
}
