use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Raw ingested message awaiting classification.
///
/// `(workspace_id, external_id)` is unique; re-ingesting the same provider
/// message id is a no-op upsert.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "staging_message")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub workspace_id: i32,
    pub external_id: String,
    pub thread_id: Option<String>,
    pub direction: String,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub subject: Option<String>,
    pub snippet: Option<String>,
    pub body: Option<String>,
    /// NULL until the classifier has seen this row.
    pub category: Option<String>,
    pub requires_reply: Option<bool>,
    pub confidence: Option<f32>,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub entities: Option<Json>,
    pub needs_review: bool,
    /// "rule" | "model" | "fallback" once classified.
    pub classified_by: Option<String>,
    pub processing_status: String,
    pub received_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
