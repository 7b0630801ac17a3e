use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Durable FIFO queue entry with at-least-once delivery.
///
/// A read leases the message by pushing `vt` into the future; it reappears
/// to other readers once the lease expires without a delete.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "queue_message")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub msg_id: i64,
    pub queue: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: Json,
    /// Delivery attempt count, incremented on every read.
    pub read_ct: i32,
    /// Visibility timeout: hidden from readers until this instant.
    pub vt: DateTimeWithTimeZone,
    pub enqueued_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
