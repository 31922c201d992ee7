//! Data models for chat-ingest.
//!
//! Structured chat data produced by the parser and consumed by the
//! ingestion pipeline.

mod chat;

pub use chat::{
    ChatExportData, ChatMessage, EXPORT_FORMAT_VERSION, EXPORT_PLATFORM, ExportMetadata,
    MEDIA_OMITTED_MARKER, MessageId, SYSTEM_SENDER,
};
