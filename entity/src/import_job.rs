use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Checkpoint row for a mailbox import: one row per job, mutated every batch.
///
/// Imported counts are always re-derived from `staging_message` rather than
/// accumulated in memory, so duplicate pages and partial upserts cannot skew
/// them.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "import_job")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub workspace_id: i32,
    pub status: String,
    pub current_folder: String,
    /// Opaque provider page token. NULL means either "not started" or
    /// "exhausted" -- the `*_done` flag disambiguates.
    pub sent_cursor: Option<String>,
    pub inbox_cursor: Option<String>,
    pub sent_done: bool,
    pub inbox_done: bool,
    pub sent_imported: i32,
    pub inbox_imported: i32,
    pub total_target: i32,
    pub retry_count: i32,
    /// Total imported as of the previous relay hop, for stall detection.
    pub last_progress: i32,
    pub stalled_relays: i32,
    pub last_error: Option<String>,
    pub last_batch_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
