use axum::{Json, extract::State};
use tracing::instrument;

use crate::{
    AppState,
    api::models::{accounts::CurrentAccount, usage::TrackUsageRequest},
    auth::permissions,
    errors::{Error, Result},
    quota::QuotaDecision,
    types::{Operation, Resource},
};

/// Check and reserve one creation.
///
/// A denial is a normal response here (`canProceed: false`), not an error: the caller is
/// asking for the decision.
#[utoipa::path(
    post,
    path = "/usage/track",
    tag = "usage",
    summary = "Check and reserve",
    description = "Debit one creation from the account's quota if capacity remains. `userId` must be the caller unless the caller is a platform admin.",
    request_body = TrackUsageRequest,
    responses(
        (status = 200, description = "Quota decision; `canProceed` tells whether a creation was reserved", body = QuotaDecision),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Tracking usage for another account"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[instrument(skip_all, fields(action_type = request.action_type.as_str()))]
pub async fn track_usage(
    State(state): State<AppState>,
    current: CurrentAccount,
    Json(request): Json<TrackUsageRequest>,
) -> Result<Json<QuotaDecision>> {
    if !permissions::can_act_for_account(&current, request.user_id) {
        return Err(Error::InsufficientPermissions {
            action: Operation::UpdateAll,
            resource: Resource::Usage,
        });
    }
    Ok(Json(state.ledger.check_and_reserve(request.user_id, request.action_type).await))
}

#[cfg(test)]
mod tests {
    use crate::db::models::accounts::AccountTier;
    use crate::quota::{DenialReason, QuotaDecision};
    use crate::test_utils::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_track_usage_counts_down_to_denial() {
        let state = create_test_state();
        let account = create_test_account(&state, AccountTier::FreeConsumer).await;
        set_lifetime_used(&state, account.id, 8).await;
        let server = create_test_server(state.clone());
        let body = json!({ "userId": account.id, "actionType": "story" });

        let first: QuotaDecision = server
            .post("/api/v1/usage/track")
            .add_header("authorization", bearer_for(&state, &account))
            .json(&body)
            .await
            .json();
        assert!(first.can_proceed);
        assert_eq!(first.remaining_uses, Some(1));

        let second: QuotaDecision = server
            .post("/api/v1/usage/track")
            .add_header("authorization", bearer_for(&state, &account))
            .json(&body)
            .await
            .json();
        assert!(second.can_proceed);
        assert_eq!(second.remaining_uses, Some(0));

        let third = server
            .post("/api/v1/usage/track")
            .add_header("authorization", bearer_for(&state, &account))
            .json(&body)
            .await;
        third.assert_status_ok();
        let third: QuotaDecision = third.json();
        assert!(!third.can_proceed);
        assert_eq!(third.reason, Some(DenialReason::LifetimeExhausted));
    }

    #[tokio::test]
    async fn test_track_usage_for_someone_else() {
        let state = create_test_state();
        let kid = create_test_account(&state, AccountTier::FreeConsumer).await;
        let other = create_test_account(&state, AccountTier::FreeConsumer).await;
        let admin = create_test_account(&state, AccountTier::PlatformAdmin).await;
        let server = create_test_server(state.clone());
        let body = json!({ "userId": other.id, "actionType": "image" });

        server
            .post("/api/v1/usage/track")
            .add_header("authorization", bearer_for(&state, &kid))
            .json(&body)
            .await
            .assert_status(StatusCode::FORBIDDEN);

        let decision: QuotaDecision = server
            .post("/api/v1/usage/track")
            .add_header("authorization", bearer_for(&state, &admin))
            .json(&body)
            .await
            .json();
        assert!(decision.can_proceed);
        assert_eq!(decision.remaining_uses, Some(9));
    }
}
