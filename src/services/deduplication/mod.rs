//! Deduplication and idempotency for the upload pipeline.
//!
//! Two in-memory key spaces decide whether a request has already been handled:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  DeduplicationService                    │
//! │  ┌────────────────────────┐  ┌────────────────────────┐  │
//! │  │ Content hash space     │  │ Idempotency key space  │  │
//! │  │                        │  │                        │  │
//! │  │ SHA256 of the upload   │  │ Client-supplied token  │  │
//! │  │ -> cached result       │  │ -> cached response     │  │
//! │  └────────────────────────┘  └────────────────────────┘  │
//! │          ExpiringKeyStore (TTL, optional LRU cap)        │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! State is per process and lost on restart.

mod config;
mod hasher;
mod service;
mod store;

pub use config::DeduplicationConfig;
pub use hasher::ContentHasher;
pub use service::{DeduplicationService, DeduplicationStats, IdempotencyCheck};
pub use store::{ExpiringEntry, ExpiringKeyStore};
