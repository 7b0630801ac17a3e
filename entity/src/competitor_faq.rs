use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Scraped competitor FAQ entry; input to the consolidation pipeline.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "competitor_faq")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub workspace_id: i32,
    pub source: Option<String>,
    pub question: String,
    pub answer: String,
    /// Set by the filter pass; NULL = not yet filtered.
    pub relevant: Option<bool>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
