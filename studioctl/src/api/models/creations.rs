//! API request/response models for creations.

use super::pagination::Pagination;
use crate::db::models::creations::{
    CreationDBResponse, CreationKind, CreationOrder, CreationPayload, CreationStatus, ImageStyle, StoryGenre, StoryLength,
};
use crate::quota::QuotaDecision;
use crate::types::CreationId;
use crate::workflow::CreationOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Longest prompt or continuation accepted, in characters
pub const MAX_PROMPT_CHARS: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ImageCreate {
    /// What to draw, 1 to 1000 characters
    pub prompt: String,
    pub style: ImageStyle,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StoryCreate {
    /// The story so far; empty when starting a new story
    #[serde(default)]
    pub story_so_far: String,
    pub genre: StoryGenre,
    pub length: StoryLength,
    /// What should happen next, 1 to 1000 characters
    pub continuation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MusicCreate {
    /// What the song is about, 1 to 1000 characters
    pub prompt: String,
    /// Musical style, e.g. "lullaby" or "pop"
    pub style: String,
    pub title: String,
    #[serde(default)]
    pub instrumental: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CreationResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: CreationId,
    pub kind: CreationKind,
    pub status: CreationStatus,
    /// Kind-specific inputs and, for stories, the generated text
    pub details: CreationPayload,
    /// Image or audio URLs; empty until the creation completes
    pub asset_urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<CreationDBResponse> for CreationResponse {
    fn from(db: CreationDBResponse) -> Self {
        Self {
            id: db.id,
            kind: db.kind,
            status: db.status,
            details: db.payload,
            asset_urls: db.asset_urls,
            error_message: db.error_message,
            created_at: db.created_at,
            updated_at: db.updated_at,
            completed_at: db.completed_at,
        }
    }
}

/// Returned by the creation endpoints: the new record and the quota status after this request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreationCreatedResponse {
    pub creation: CreationResponse,
    pub usage: QuotaDecision,
}

impl From<CreationOutcome> for CreationCreatedResponse {
    fn from(outcome: CreationOutcome) -> Self {
        Self {
            creation: outcome.creation.into(),
            usage: outcome.usage,
        }
    }
}

/// Query parameters for listing creations
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct ListCreationsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Only records of this kind
    pub kind: Option<CreationKind>,

    /// `recent` (default) or `library` (completed first)
    pub order: Option<CreationOrder>,
}
