//! Per-(workspace, function) mutual exclusion.
//!
//! Optimistic first-writer-wins: acquire is a bare insert that loses on a
//! unique violation. No lease and no heartbeat; a crashed holder strands
//! the lock until it is cleared by hand. Callers treat a busy lock as a
//! silent skip, never an error.

use crate::{
    db_core::prelude::*,
    error::{is_unique_violation, AppResult},
    util,
};

pub struct WorkerLockCtrl;

impl WorkerLockCtrl {
    /// Returns false when another worker already holds the lock.
    pub async fn acquire(
        conn: &DatabaseConnection,
        workspace_id: i32,
        function_name: &str,
        locked_by: &str,
    ) -> AppResult<bool> {
        let lock = worker_lock::ActiveModel {
            workspace_id: Set(workspace_id),
            function_name: Set(function_name.to_string()),
            locked_at: Set(util::now_fixed()),
            locked_by: Set(locked_by.to_string()),
            ..Default::default()
        };

        match WorkerLock::insert(lock).exec(conn).await {
            Ok(_) => Ok(true),
            Err(e) if is_unique_violation(&e) => {
                tracing::info!(
                    workspace_id,
                    function_name,
                    "lock busy, skipping invocation"
                );
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn release(
        conn: &DatabaseConnection,
        workspace_id: i32,
        function_name: &str,
    ) -> AppResult<()> {
        WorkerLock::delete_many()
            .filter(worker_lock::Column::WorkspaceId.eq(workspace_id))
            .filter(worker_lock::Column::FunctionName.eq(function_name))
            .exec(conn)
            .await?;
        Ok(())
    }
}
