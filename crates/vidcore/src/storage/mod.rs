//! History storage
//!
//! [`HistoryStore`] is the seam used by the delivery resolver and the bot
//! commands; [`pg::PgStore`] is the PostgreSQL implementation.

pub mod pg;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::core::config;
use crate::core::Platform;
use crate::delivery::{MediaKind, Requester};

pub use pg::PgStore;

/// One completed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
    pub requester: Requester,
    pub url: String,
    pub quality: String,
    pub media_kind: MediaKind,
    pub platform: Platform,
    pub created_at: DateTime<Utc>,
}

/// Narrows a history query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryFilter {
    pub platform: Option<Platform>,
    /// `None` returns everything that is retained
    pub limit: Option<i64>,
}

impl Default for HistoryFilter {
    fn default() -> Self {
        Self {
            platform: None,
            limit: Some(config::history::PAGE_SIZE),
        }
    }
}

impl HistoryFilter {
    /// Every retained record, for exports
    pub fn all() -> Self {
        Self {
            platform: None,
            limit: None,
        }
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }
}

/// Downloads per platform, for `/stats`
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PlatformCount {
    pub platform: String,
    pub count: i64,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A row holds a value the application can't interpret
    #[error("Corrupt row in {table}: {reason}")]
    CorruptRow { table: &'static str, reason: String },
}

/// Persistent per-user history
///
/// Records are returned newest first.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, record: &HistoryRecord) -> Result<(), StoreError>;

    async fn query(&self, user_id: i64, filter: HistoryFilter) -> Result<Vec<HistoryRecord>, StoreError>;

    /// Deletes all records of the user, returning how many were removed
    async fn delete_all(&self, user_id: i64) -> Result<u64, StoreError>;
}
