use crate::{db_core::prelude::*, error::AppResult, util};

use super::staging_message::Direction;

pub struct NewMessage {
    pub workspace_id: i32,
    pub conversation_id: i32,
    pub external_id: String,
    pub direction: Direction,
    pub from_address: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub received_at: Option<DateTimeWithTimeZone>,
}

pub struct MessageCtrl;

impl MessageCtrl {
    pub async fn insert(conn: &DatabaseConnection, new: NewMessage) -> AppResult<message::Model> {
        let row = message::ActiveModel {
            workspace_id: Set(new.workspace_id),
            conversation_id: Set(new.conversation_id),
            external_id: Set(new.external_id),
            direction: Set(new.direction.to_string()),
            from_address: Set(new.from_address),
            subject: Set(new.subject),
            body: Set(new.body),
            received_at: Set(new.received_at),
            created_at: Set(util::now_fixed()),
            ..Default::default()
        };
        let inserted = row.insert(conn).await?;
        Ok(inserted)
    }

    pub async fn by_id(conn: &DatabaseConnection, id: i32) -> AppResult<Option<message::Model>> {
        let found = Message::find_by_id(id).one(conn).await?;
        Ok(found)
    }

    /// Most recent messages of a conversation, oldest first, for the draft
    /// context window.
    pub async fn conversation_tail(
        conn: &DatabaseConnection,
        conversation_id: i32,
        limit: u64,
    ) -> AppResult<Vec<message::Model>> {
        let mut rows = Message::find()
            .filter(message::Column::ConversationId.eq(conversation_id))
            .order_by_desc(message::Column::Id)
            .limit(limit)
            .all(conn)
            .await?;
        rows.reverse();
        Ok(rows)
    }

    pub async fn store_draft(conn: &DatabaseConnection, id: i32, draft: &str) -> AppResult<()> {
        let update = message::ActiveModel {
            id: Set(id),
            draft: Set(Some(draft.to_string())),
            ..Default::default()
        };
        update.update(conn).await?;
        Ok(())
    }
}
