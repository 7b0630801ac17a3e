use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Consolidation output: a unique topic rewritten in the owner's voice.
/// Re-runs replace a workspace's rows wholesale (delete-then-insert).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "adapted_faq")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub workspace_id: i32,
    pub topic: String,
    pub question: String,
    pub answer: String,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
