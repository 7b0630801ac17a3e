//! Competitor/owner FAQ access for the consolidation pipeline.

use crate::{db_core::prelude::*, error::AppResult, util};

/// An adapted topic produced by the adapt phase, pending the final write.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct AdaptedRow {
    pub topic: String,
    pub question: String,
    pub answer: String,
}

pub struct FaqCtrl;

impl FaqCtrl {
    /// Competitor FAQs the filter pass has not seen yet, in id order so
    /// chunk indexes stay stable across relays.
    pub async fn unfiltered_chunk(
        conn: &DatabaseConnection,
        workspace_id: i32,
        limit: u64,
    ) -> AppResult<Vec<competitor_faq::Model>> {
        let rows = CompetitorFaq::find()
            .filter(competitor_faq::Column::WorkspaceId.eq(workspace_id))
            .filter(competitor_faq::Column::Relevant.is_null())
            .order_by_asc(competitor_faq::Column::Id)
            .limit(limit)
            .all(conn)
            .await?;
        Ok(rows)
    }

    pub async fn count_unfiltered(
        conn: &DatabaseConnection,
        workspace_id: i32,
    ) -> AppResult<u64> {
        let n = CompetitorFaq::find()
            .filter(competitor_faq::Column::WorkspaceId.eq(workspace_id))
            .filter(competitor_faq::Column::Relevant.is_null())
            .count(conn)
            .await?;
        Ok(n)
    }

    /// Persist the filter verdicts for a chunk.
    pub async fn mark_relevance(
        conn: &DatabaseConnection,
        workspace_id: i32,
        chunk_ids: &[i32],
        kept_ids: &[i32],
    ) -> AppResult<()> {
        if chunk_ids.is_empty() {
            return Ok(());
        }
        CompetitorFaq::update_many()
            .col_expr(competitor_faq::Column::Relevant, Expr::value(true))
            .filter(competitor_faq::Column::WorkspaceId.eq(workspace_id))
            .filter(competitor_faq::Column::Id.is_in(kept_ids.to_vec()))
            .exec(conn)
            .await?;

        let dropped: Vec<i32> = chunk_ids
            .iter()
            .copied()
            .filter(|id| !kept_ids.contains(id))
            .collect();
        CompetitorFaq::update_many()
            .col_expr(competitor_faq::Column::Relevant, Expr::value(false))
            .filter(competitor_faq::Column::WorkspaceId.eq(workspace_id))
            .filter(competitor_faq::Column::Id.is_in(dropped))
            .exec(conn)
            .await?;
        Ok(())
    }

    /// Rows that survived the filter pass, paged for the dedup phase.
    pub async fn relevant_page(
        conn: &DatabaseConnection,
        workspace_id: i32,
        offset: u64,
        limit: u64,
    ) -> AppResult<Vec<competitor_faq::Model>> {
        let rows = CompetitorFaq::find()
            .filter(competitor_faq::Column::WorkspaceId.eq(workspace_id))
            .filter(competitor_faq::Column::Relevant.eq(true))
            .order_by_asc(competitor_faq::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(conn)
            .await?;
        Ok(rows)
    }

    pub async fn owner_questions(
        conn: &DatabaseConnection,
        workspace_id: i32,
    ) -> AppResult<Vec<String>> {
        let rows = OwnerFaq::find()
            .filter(owner_faq::Column::WorkspaceId.eq(workspace_id))
            .all(conn)
            .await?;
        Ok(rows.into_iter().map(|r| r.question).collect())
    }

    /// Idempotent final write: re-running adapt cleanly replaces the prior
    /// rows for the workspace instead of duplicating them.
    pub async fn replace_adapted(
        conn: &DatabaseConnection,
        workspace_id: i32,
        rows: Vec<AdaptedRow>,
    ) -> AppResult<usize> {
        let txn = conn.begin().await?;

        AdaptedFaq::delete_many()
            .filter(adapted_faq::Column::WorkspaceId.eq(workspace_id))
            .exec(&txn)
            .await?;

        let count = rows.len();
        if count > 0 {
            let now = util::now_fixed();
            let active: Vec<adapted_faq::ActiveModel> = rows
                .into_iter()
                .map(|row| adapted_faq::ActiveModel {
                    workspace_id: Set(workspace_id),
                    topic: Set(row.topic),
                    question: Set(row.question),
                    answer: Set(row.answer),
                    created_at: Set(now),
                    ..Default::default()
                })
                .collect();
            AdaptedFaq::insert_many(active).exec(&txn).await?;
        }

        txn.commit().await?;
        Ok(count)
    }

    pub async fn adapted_for_workspace(
        conn: &DatabaseConnection,
        workspace_id: i32,
    ) -> AppResult<Vec<adapted_faq::Model>> {
        let rows = AdaptedFaq::find()
            .filter(adapted_faq::Column::WorkspaceId.eq(workspace_id))
            .all(conn)
            .await?;
        Ok(rows)
    }
}
