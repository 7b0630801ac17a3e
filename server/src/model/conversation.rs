use crate::{
    db_core::prelude::*,
    error::{is_unique_violation, AppError, AppResult},
    util,
};

pub struct ConversationCtrl;

impl ConversationCtrl {
    /// Race-safe upsert keyed by the provider thread id, same re-fetch
    /// pattern as customers.
    pub async fn find_or_create(
        conn: &DatabaseConnection,
        workspace_id: i32,
        customer_id: i32,
        external_thread_id: &str,
        subject: Option<&str>,
    ) -> AppResult<conversation::Model> {
        if let Some(existing) = Self::find(conn, workspace_id, external_thread_id).await? {
            return Ok(existing);
        }

        let now = util::now_fixed();
        let fresh = conversation::ActiveModel {
            workspace_id: Set(workspace_id),
            customer_id: Set(customer_id),
            external_thread_id: Set(external_thread_id.to_string()),
            subject: Set(subject.map(|s| s.to_string())),
            last_message_at: Set(Some(now)),
            created_at: Set(now),
            ..Default::default()
        };

        match Conversation::insert(fresh).exec_with_returning(conn).await {
            Ok(conversation) => Ok(conversation),
            Err(e) if is_unique_violation(&e) => {
                Self::find(conn, workspace_id, external_thread_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::Internal(anyhow::anyhow!(
                            "conversation vanished after insert race: {}",
                            external_thread_id
                        ))
                    })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn touch(conn: &DatabaseConnection, conversation_id: i32) -> AppResult<()> {
        let update = conversation::ActiveModel {
            id: Set(conversation_id),
            last_message_at: Set(Some(util::now_fixed())),
            ..Default::default()
        };
        update.update(conn).await?;
        Ok(())
    }

    async fn find(
        conn: &DatabaseConnection,
        workspace_id: i32,
        external_thread_id: &str,
    ) -> AppResult<Option<conversation::Model>> {
        let found = Conversation::find()
            .filter(conversation::Column::WorkspaceId.eq(workspace_id))
            .filter(conversation::Column::ExternalThreadId.eq(external_thread_id))
            .one(conn)
            .await?;
        Ok(found)
    }
}
