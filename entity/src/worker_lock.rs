use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Insert-if-absent mutual exclusion record. Absence of a row = unlocked.
/// There is no TTL; a crashed holder must be cleared manually.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "worker_lock")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub workspace_id: i32,
    pub function_name: String,
    pub locked_at: DateTimeWithTimeZone,
    pub locked_by: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
