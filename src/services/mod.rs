//! Business logic services.
//!
//! Services compose the parser, breakers, and dedup caches into the upload
//! pipeline. Shared state lives in [`ServiceContainer`].

pub mod chat_parser;
mod container;
pub mod deduplication;
mod ingest;

pub use chat_parser::{ChatParser, is_valid_whatsapp_export, parse_chat_export};
pub use container::ServiceContainer;
pub use deduplication::{
    ContentHasher, DeduplicationConfig, DeduplicationService, DeduplicationStats,
    IdempotencyCheck,
};
pub use ingest::{
    IngestOptions, IngestOutcome, IngestRequest, IngestService, StatsSummarizer, Summarizer,
};
