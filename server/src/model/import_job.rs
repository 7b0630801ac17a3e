//! Import job checkpoint row: load/create, mutate every batch, terminal on
//! completed or error.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{
    db_core::prelude::*,
    error::{is_unique_violation, AppError, AppResult},
    mailbox::Folder,
    util,
};

use super::staging_message::DirectionCounts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    ScanningSent,
    ScanningInbox,
    Importing,
    Classifying,
    Completed,
    Error,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Error | JobStatus::Cancelled
        )
    }
}

/// Parse the stored status string; unknown values read as Error so a bad
/// row can never look runnable.
pub fn job_status(job: &import_job::Model) -> JobStatus {
    job.status.parse().unwrap_or(JobStatus::Error)
}

pub fn current_folder(job: &import_job::Model) -> Folder {
    job.current_folder.parse().unwrap_or(Folder::Sent)
}

/// Checkpoint written after every bounded unit of work.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub status: JobStatus,
    pub current_folder: Folder,
    pub sent_cursor: Option<String>,
    pub inbox_cursor: Option<String>,
    pub sent_done: bool,
    pub inbox_done: bool,
    pub counts: DirectionCounts,
}

pub struct ImportJobCtrl;

impl ImportJobCtrl {
    /// Load the workspace's job or create a fresh one. Creation races with
    /// a concurrent invocation resolve by re-fetching the winner's row.
    pub async fn get_or_create(
        conn: &DatabaseConnection,
        workspace_id: i32,
        total_target: i32,
    ) -> AppResult<import_job::Model> {
        if let Some(job) = Self::for_workspace(conn, workspace_id).await? {
            return Ok(job);
        }

        let now = util::now_fixed();
        let fresh = import_job::ActiveModel {
            workspace_id: Set(workspace_id),
            status: Set(JobStatus::Queued.to_string()),
            current_folder: Set(Folder::Sent.to_string()),
            sent_done: Set(false),
            inbox_done: Set(false),
            sent_imported: Set(0),
            inbox_imported: Set(0),
            total_target: Set(total_target),
            retry_count: Set(0),
            last_progress: Set(0),
            stalled_relays: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        match ImportJob::insert(fresh).exec_with_returning(conn).await {
            Ok(job) => Ok(job),
            Err(e) if is_unique_violation(&e) => Self::for_workspace(conn, workspace_id)
                .await?
                .ok_or_else(|| {
                    AppError::Internal(anyhow::anyhow!(
                        "import job vanished after insert race for workspace {}",
                        workspace_id
                    ))
                }),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn for_workspace(
        conn: &DatabaseConnection,
        workspace_id: i32,
    ) -> AppResult<Option<import_job::Model>> {
        let job = ImportJob::find()
            .filter(import_job::Column::WorkspaceId.eq(workspace_id))
            .one(conn)
            .await?;
        Ok(job)
    }

    pub async fn checkpoint(
        conn: &DatabaseConnection,
        job_id: i32,
        cp: &Checkpoint,
    ) -> AppResult<()> {
        let update = import_job::ActiveModel {
            id: Set(job_id),
            status: Set(cp.status.to_string()),
            current_folder: Set(cp.current_folder.to_string()),
            sent_cursor: Set(cp.sent_cursor.clone()),
            inbox_cursor: Set(cp.inbox_cursor.clone()),
            sent_done: Set(cp.sent_done),
            inbox_done: Set(cp.inbox_done),
            sent_imported: Set(cp.counts.outbound),
            inbox_imported: Set(cp.counts.inbound),
            last_batch_at: Set(Some(util::now_fixed())),
            updated_at: Set(util::now_fixed()),
            ..Default::default()
        };
        update.update(conn).await?;
        Ok(())
    }

    pub async fn set_status(
        conn: &DatabaseConnection,
        job_id: i32,
        status: JobStatus,
    ) -> AppResult<()> {
        let update = import_job::ActiveModel {
            id: Set(job_id),
            status: Set(status.to_string()),
            updated_at: Set(util::now_fixed()),
            ..Default::default()
        };
        update.update(conn).await?;
        Ok(())
    }

    pub async fn set_error(
        conn: &DatabaseConnection,
        job_id: i32,
        message: &str,
    ) -> AppResult<()> {
        let update = import_job::ActiveModel {
            id: Set(job_id),
            status: Set(JobStatus::Error.to_string()),
            last_error: Set(Some(message.to_string())),
            updated_at: Set(util::now_fixed()),
            ..Default::default()
        };
        update.update(conn).await?;
        Ok(())
    }

    /// Record progress made (or not) by this relay hop. Returns the new
    /// consecutive-stall count.
    pub async fn track_progress(
        conn: &DatabaseConnection,
        job: &import_job::Model,
        total_imported: i32,
    ) -> AppResult<i32> {
        let stalled_relays = if total_imported > job.last_progress {
            0
        } else {
            job.stalled_relays + 1
        };

        let update = import_job::ActiveModel {
            id: Set(job.id),
            last_progress: Set(total_imported),
            stalled_relays: Set(stalled_relays),
            updated_at: Set(util::now_fixed()),
            ..Default::default()
        };
        update.update(conn).await?;
        Ok(stalled_relays)
    }

    pub async fn bump_retry_count(conn: &DatabaseConnection, job: &import_job::Model) -> AppResult<()> {
        let update = import_job::ActiveModel {
            id: Set(job.id),
            retry_count: Set(job.retry_count + 1),
            updated_at: Set(util::now_fixed()),
            ..Default::default()
        };
        update.update(conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        assert_eq!(JobStatus::ScanningSent.to_string(), "scanning_sent");
        assert_eq!(
            "scanning_inbox".parse::<JobStatus>().unwrap(),
            JobStatus::ScanningInbox
        );
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Error.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Importing.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
    }
}
