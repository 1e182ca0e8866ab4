//! vidcore - media delivery engine for the vidrelay Telegram bot
//!
//! This library holds everything that does not need a Telegram client:
//! the large-file delivery resolver, the yt-dlp extraction backend and the
//! PostgreSQL history store.
//!
//! # Module Structure
//!
//! - `core`: configuration, errors, logging, rate limiting, URL helpers
//! - `delivery`: delivery resolver, chunking, per-request state machine
//! - `extraction`: extraction service trait and the yt-dlp backend
//! - `storage`: history store trait and the PostgreSQL implementation

pub mod core;
pub mod delivery;
pub mod extraction;
pub mod storage;

// Re-export commonly used types for convenience
pub use core::{config, AppError, AppResult};
pub use delivery::{
    DeliveryChoice, DeliveryContext, DeliveryError, DeliveryResolver, DeliveryState, DownloadRequest, MediaArtifact,
    MediaKind, PlatformLimits, Requester,
};
pub use extraction::{ExtractionError, ExtractionService};
pub use storage::{HistoryRecord, HistoryStore, StoreError};
