use crate::{db_core::prelude::*, error::AppResult, util};

#[derive(Debug, Clone)]
pub struct VoiceSummary {
    pub tone: Option<String>,
    pub style_notes: Option<String>,
    pub common_phrases: Option<serde_json::Value>,
    pub sample_count: i32,
}

pub struct VoiceProfileCtrl;

impl VoiceProfileCtrl {
    pub async fn for_workspace(
        conn: &DatabaseConnection,
        workspace_id: i32,
    ) -> AppResult<Option<voice_profile::Model>> {
        let found = VoiceProfile::find()
            .filter(voice_profile::Column::WorkspaceId.eq(workspace_id))
            .one(conn)
            .await?;
        Ok(found)
    }

    /// One profile per workspace; re-learning overwrites in place.
    pub async fn upsert(
        conn: &DatabaseConnection,
        workspace_id: i32,
        summary: VoiceSummary,
    ) -> AppResult<()> {
        let row = voice_profile::ActiveModel {
            workspace_id: Set(workspace_id),
            tone: Set(summary.tone),
            style_notes: Set(summary.style_notes),
            common_phrases: Set(summary.common_phrases),
            sample_count: Set(summary.sample_count),
            updated_at: Set(util::now_fixed()),
            ..Default::default()
        };

        VoiceProfile::insert(row)
            .on_conflict(
                OnConflict::column(voice_profile::Column::WorkspaceId)
                    .update_columns([
                        voice_profile::Column::Tone,
                        voice_profile::Column::StyleNotes,
                        voice_profile::Column::CommonPhrases,
                        voice_profile::Column::SampleCount,
                        voice_profile::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(conn)
            .await?;
        Ok(())
    }
}
