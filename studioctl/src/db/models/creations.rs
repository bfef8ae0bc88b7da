//! Database models for creation records.

use crate::types::{AccountId, CreationId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// What was created, stored as TEXT in the database
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CreationKind {
    Image,
    Story,
    Music,
}

impl CreationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreationKind::Image => "image",
            CreationKind::Story => "story",
            CreationKind::Music => "music",
        }
    }
}

/// Creation lifecycle status.
///
/// `pending -> processing -> completed | failed`. `completed` and `failed` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CreationStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl CreationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CreationStatus::Completed | CreationStatus::Failed)
    }

    /// Whether a record in `self` may move to `next`. Status only moves forward, and never
    /// leaves a terminal state.
    pub fn can_transition_to(&self, next: CreationStatus) -> bool {
        match (self, next) {
            (CreationStatus::Pending, CreationStatus::Processing | CreationStatus::Completed | CreationStatus::Failed) => true,
            (CreationStatus::Processing, CreationStatus::Completed | CreationStatus::Failed) => true,
            _ => false,
        }
    }

    /// Statuses a record may be in for a transition to `next` to apply
    pub fn predecessors(next: CreationStatus) -> &'static [CreationStatus] {
        match next {
            CreationStatus::Pending => &[],
            CreationStatus::Processing => &[CreationStatus::Pending],
            CreationStatus::Completed | CreationStatus::Failed => &[CreationStatus::Pending, CreationStatus::Processing],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CreationStatus::Pending => "pending",
            CreationStatus::Processing => "processing",
            CreationStatus::Completed => "completed",
            CreationStatus::Failed => "failed",
        }
    }
}

/// Visual style applied to a generated image
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ImageStyle {
    Cartoon,
    Watercolor,
    PixelArt,
    Storybook,
    Crayon,
    Clay,
}

/// Story genre
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StoryGenre {
    Adventure,
    Fantasy,
    Mystery,
    ScienceFiction,
    Animals,
    Funny,
}

/// How long a story continuation should be
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StoryLength {
    Short,
    Medium,
    Long,
}

/// Kind-specific part of a creation record, stored as JSONB
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CreationPayload {
    Image {
        prompt: String,
        style: ImageStyle,
    },
    Story {
        genre: StoryGenre,
        length: StoryLength,
        /// The learner's latest continuation text
        prompt: String,
        /// The generated continuation
        text: String,
    },
    Music {
        prompt: String,
        style: String,
        title: String,
        instrumental: bool,
    },
}

impl CreationPayload {
    pub fn kind(&self) -> CreationKind {
        match self {
            CreationPayload::Image { .. } => CreationKind::Image,
            CreationPayload::Story { .. } => CreationKind::Story,
            CreationPayload::Music { .. } => CreationKind::Music,
        }
    }
}

/// Database request for inserting a creation record
#[derive(Debug, Clone)]
pub struct CreationCreateDBRequest {
    pub account_id: AccountId,
    pub status: CreationStatus,
    pub payload: CreationPayload,
    pub asset_urls: Vec<String>,
    pub task_id: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CreationCreateDBRequest {
    /// A synchronous creation, inserted already complete
    pub fn completed(account_id: AccountId, payload: CreationPayload, asset_urls: Vec<String>) -> Self {
        Self {
            account_id,
            status: CreationStatus::Completed,
            payload,
            asset_urls,
            task_id: None,
            completed_at: Some(Utc::now()),
        }
    }

    /// An asynchronous creation accepted by the provider, awaiting its callback
    pub fn pending(account_id: AccountId, payload: CreationPayload, task_id: String) -> Self {
        Self {
            account_id,
            status: CreationStatus::Pending,
            payload,
            asset_urls: Vec::new(),
            task_id: Some(task_id),
            completed_at: None,
        }
    }
}

/// Database request for a provider-driven status change
#[derive(Debug, Clone)]
pub struct StatusUpdateDBRequest {
    pub status: CreationStatus,
    pub asset_urls: Vec<String>,
    pub error_message: Option<String>,
}

/// Result of applying a status update by task id
#[derive(Debug, Clone)]
pub enum StatusUpdateOutcome {
    /// The record moved to the requested status
    Applied(CreationDBResponse),
    /// The record exists but the transition was not allowed (already terminal, or not forward)
    Unchanged(CreationDBResponse),
    /// No record carries this task id
    UnknownTask,
}

/// Ordering for listing creation records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CreationOrder {
    /// Most recently created first
    #[default]
    Recent,
    /// Completed records first, each group most recent first
    Library,
}

/// Filter for listing creation records
#[derive(Debug, Clone)]
pub struct CreationFilter {
    pub account_id: AccountId,
    pub kind: Option<CreationKind>,
    pub order: CreationOrder,
    pub skip: i64,
    pub limit: i64,
}

impl CreationFilter {
    pub fn new(account_id: AccountId, skip: i64, limit: i64) -> Self {
        Self {
            account_id,
            kind: None,
            order: CreationOrder::Recent,
            skip,
            limit,
        }
    }
}

/// Database response for a creation record
#[derive(Debug, Clone)]
pub struct CreationDBResponse {
    pub id: CreationId,
    pub account_id: AccountId,
    pub kind: CreationKind,
    pub status: CreationStatus,
    pub payload: CreationPayload,
    pub asset_urls: Vec<String>,
    pub task_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_only_moves_forward() {
        use CreationStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Pending.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Completed));
        assert!(!Processing.can_transition_to(Pending));
        assert!(!Processing.can_transition_to(Processing));
        for terminal in [Completed, Failed] {
            for next in [Pending, Processing, Completed, Failed] {
                assert!(!terminal.can_transition_to(next), "{terminal:?} -> {next:?} must be rejected");
            }
        }
    }

    #[test]
    fn test_predecessors_agree_with_transitions() {
        use CreationStatus::*;
        for next in [Pending, Processing, Completed, Failed] {
            for current in [Pending, Processing, Completed, Failed] {
                assert_eq!(
                    CreationStatus::predecessors(next).contains(&current),
                    current.can_transition_to(next),
                    "{current:?} -> {next:?}"
                );
            }
        }
    }

    #[test]
    fn test_payload_serializes_with_kind_tag() {
        let payload = CreationPayload::Music {
            prompt: "a song about otters".to_string(),
            style: "folk".to_string(),
            title: "Otter Song".to_string(),
            instrumental: false,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["kind"], "music");
        assert_eq!(payload.kind(), CreationKind::Music);
    }
}
