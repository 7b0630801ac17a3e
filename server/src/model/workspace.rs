use crate::{
    db_core::prelude::*,
    error::{AppError, AppResult},
};

pub struct WorkspaceCtrl;

impl WorkspaceCtrl {
    pub async fn by_id(conn: &DatabaseConnection, id: i32) -> AppResult<workspace::Model> {
        Workspace::find_by_id(id)
            .one(conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("workspace {} not found", id)))
    }

    /// Webhook resolution key. `None` for unknown account ids so the caller
    /// can reply with the uniform accepted response.
    pub async fn by_provider_account_id(
        conn: &DatabaseConnection,
        provider_account_id: &str,
    ) -> AppResult<Option<workspace::Model>> {
        let found = Workspace::find()
            .filter(workspace::Column::ProviderAccountId.eq(provider_account_id))
            .one(conn)
            .await?;
        Ok(found)
    }
}
