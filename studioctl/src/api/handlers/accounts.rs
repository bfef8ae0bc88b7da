use axum::{
    Json,
    extract::{Path, State},
};
use tracing::{info, instrument};

use crate::{
    AppState,
    api::models::accounts::{AccountResponse, AccountUpdate, CurrentAccount},
    auth::permissions,
    db::{AccountStore, OrganizationStore, models::accounts::AccountUpdateDBRequest},
    errors::{Error, Result},
    quota::QuotaDecision,
    types::{AccountId, Operation, Resource, abbrev_uuid},
};

#[utoipa::path(
    get,
    path = "/accounts/current",
    tag = "accounts",
    summary = "Get current account",
    responses(
        (status = 200, description = "The signed in account", body = AccountResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[instrument(skip_all)]
pub async fn get_current_account(State(state): State<AppState>, current: CurrentAccount) -> Result<Json<AccountResponse>> {
    let account = state.store.get_account(current.id).await?.ok_or_else(|| Error::NotFound {
        resource: "Account".to_string(),
        id: current.id.to_string(),
    })?;
    Ok(Json(account.into()))
}

/// Read-only quota status; nothing is debited
#[utoipa::path(
    get,
    path = "/accounts/current/usage",
    tag = "accounts",
    summary = "Get quota status",
    description = "How many creations the signed in account has left. Does not use a creation.",
    responses(
        (status = 200, description = "Quota status", body = QuotaDecision),
        (status = 401, description = "Unauthorized"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[instrument(skip_all, fields(account_id = %abbrev_uuid(&current.id)))]
pub async fn get_current_usage(State(state): State<AppState>, current: CurrentAccount) -> Json<QuotaDecision> {
    Json(state.ledger.status(current.id).await)
}

#[utoipa::path(
    patch,
    path = "/accounts/{id}",
    tag = "accounts",
    summary = "Update account",
    description = "Change an account's tier, organization, subscription or active flag. Platform admins only.",
    params(("id" = uuid::Uuid, Path, description = "Account ID")),
    request_body = AccountUpdate,
    responses(
        (status = 200, description = "Updated account", body = AccountResponse),
        (status = 400, description = "Unknown organization"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Account not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[instrument(skip_all, fields(account_id = %abbrev_uuid(&id)))]
pub async fn update_account(
    State(state): State<AppState>,
    Path(id): Path<AccountId>,
    current: CurrentAccount,
    Json(update): Json<AccountUpdate>,
) -> Result<Json<AccountResponse>> {
    permissions::require_platform_admin(&current, Operation::UpdateAll, Resource::Accounts)?;

    if let Some(Some(organization_id)) = update.organization_id
        && state.store.get_organization(organization_id).await?.is_none()
    {
        return Err(Error::BadRequest {
            message: format!("Organization {organization_id} does not exist"),
        });
    }

    let request = AccountUpdateDBRequest {
        display_name: update.display_name,
        tier: update.tier,
        organization_id: update.organization_id,
        subscription_status: update.subscription_status,
        is_active: update.is_active,
    };
    let account = state.store.update_account(id, &request).await.map_err(|e| match e {
        crate::db::errors::DbError::NotFound => Error::NotFound {
            resource: "Account".to_string(),
            id: id.to_string(),
        },
        other => Error::Database(other),
    })?;
    info!(tier = ?account.tier, is_active = account.is_active, "Account updated by {}", abbrev_uuid(&current.id));
    Ok(Json(account.into()))
}
