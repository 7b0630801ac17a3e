//! Shared database imports: entity types plus the SeaORM surface the
//! model layer uses everywhere.

pub use entity::prelude::*;
pub use entity::{
    adapted_faq, competitor_faq, conversation, customer, dead_letter_message, import_job, message,
    owner_faq, queue_message, sender_rule, staging_message, voice_profile, worker_lock, workspace,
};

pub use sea_orm::{
    entity::prelude::*,
    sea_query::{Expr, OnConflict},
    ActiveValue::{self, NotSet, Set},
    Condition, DatabaseConnection, DbErr, FromQueryResult, IntoActiveModel, Order, QueryOrder,
    QuerySelect, TransactionTrait,
};
