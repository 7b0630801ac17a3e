use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A connected mailbox plus the business profile its pipeline runs against.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "workspace")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Owner's own address, used to detect self-sent (outbound) mail.
    pub owner_email: String,
    /// Provider-side account id, the webhook resolution key.
    #[sea_orm(unique)]
    pub provider_account_id: String,
    pub business_name: String,
    pub business_type: Option<String>,
    /// Free-text description of offered services, fed to the FAQ filter pass.
    pub services: Option<String>,
    pub import_total_target: i32,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
