use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Deterministic classification shortcut keyed on the sender address.
/// Pattern is an exact address, a `@domain`, or a `*` wildcard.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sender_rule")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub workspace_id: i32,
    pub pattern: String,
    pub category: String,
    pub requires_reply: bool,
    pub active: bool,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
