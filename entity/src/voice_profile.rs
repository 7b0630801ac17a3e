use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Learned writing-voice summary for a workspace, one row per workspace.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "voice_profile")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub workspace_id: i32,
    pub tone: Option<String>,
    pub style_notes: Option<String>,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub common_phrases: Option<Json>,
    pub sample_count: i32,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
