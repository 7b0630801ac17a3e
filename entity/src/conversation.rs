use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Thread-level grouping, keyed by the provider's thread id per workspace.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "conversation")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub workspace_id: i32,
    pub customer_id: i32,
    pub external_thread_id: String,
    pub subject: Option<String>,
    pub last_message_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
