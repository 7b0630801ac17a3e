use crate::{
    db_core::prelude::*,
    error::{is_unique_violation, AppError, AppResult},
    util,
};

pub struct CustomerCtrl;

impl CustomerCtrl {
    /// Race-safe upsert by `(workspace_id, email)`: losing an insert race
    /// to a concurrent webhook is expected, so re-fetch instead of failing.
    pub async fn find_or_create(
        conn: &DatabaseConnection,
        workspace_id: i32,
        email: &str,
        name: Option<&str>,
    ) -> AppResult<customer::Model> {
        if let Some(existing) = Self::find(conn, workspace_id, email).await? {
            return Ok(existing);
        }

        let fresh = customer::ActiveModel {
            workspace_id: Set(workspace_id),
            email: Set(email.to_lowercase()),
            name: Set(name.map(|n| n.to_string())),
            created_at: Set(util::now_fixed()),
            ..Default::default()
        };

        match Customer::insert(fresh).exec_with_returning(conn).await {
            Ok(customer) => Ok(customer),
            Err(e) if is_unique_violation(&e) => Self::find(conn, workspace_id, email)
                .await?
                .ok_or_else(|| {
                    AppError::Internal(anyhow::anyhow!(
                        "customer vanished after insert race: {}",
                        email
                    ))
                }),
            Err(e) => Err(e.into()),
        }
    }

    async fn find(
        conn: &DatabaseConnection,
        workspace_id: i32,
        email: &str,
    ) -> AppResult<Option<customer::Model>> {
        let found = Customer::find()
            .filter(customer::Column::WorkspaceId.eq(workspace_id))
            .filter(customer::Column::Email.eq(email.to_lowercase()))
            .one(conn)
            .await?;
        Ok(found)
    }
}
