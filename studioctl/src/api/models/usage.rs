//! API request model for check-and-reserve.

use crate::db::models::creations::CreationKind;
use crate::types::AccountId;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Reserve one creation for an account. The response is a
/// [`QuotaDecision`](crate::quota::QuotaDecision).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackUsageRequest {
    #[schema(value_type = String, format = "uuid")]
    pub user_id: AccountId,
    pub action_type: CreationKind,
}
