use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use tracing::{info, instrument};

use crate::{
    AppState,
    api::models::{
        accounts::CurrentAccount,
        organizations::{OrganizationCreate, OrganizationResponse, OrganizationUpdate, OrganizationUsageResponse},
    },
    auth::permissions,
    db::{
        OrganizationStore, UsageStore,
        errors::DbError,
        models::organizations::{OrganizationCreateDBRequest, OrganizationDBResponse, OrganizationUpdateDBRequest},
    },
    errors::{Error, Result},
    types::{Operation, OrganizationId, Resource, abbrev_uuid},
};

fn not_found(id: OrganizationId) -> Error {
    Error::NotFound {
        resource: "Organization".to_string(),
        id: id.to_string(),
    }
}

fn validate_subdomain(subdomain: &str) -> Result<()> {
    let valid_chars = subdomain.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !(3..=63).contains(&subdomain.len()) || !valid_chars || subdomain.starts_with('-') || subdomain.ends_with('-') {
        return Err(Error::BadRequest {
            message: "Subdomain must be 3 to 63 lowercase letters, digits or hyphens, and cannot start or end with a hyphen".to_string(),
        });
    }
    Ok(())
}

fn validate_limits(daily_limit: Option<i64>, monthly_limit: Option<i64>) -> Result<()> {
    if daily_limit.is_some_and(|l| l < 1) || monthly_limit.is_some_and(|l| l < 1) {
        return Err(Error::BadRequest {
            message: "Limits must be at least 1".to_string(),
        });
    }
    Ok(())
}

/// Load an organization the caller may see
async fn visible_organization(state: &AppState, current: &CurrentAccount, id: OrganizationId) -> Result<OrganizationDBResponse> {
    if !permissions::can_read_organization(current, id) {
        return Err(Error::InsufficientPermissions {
            action: Operation::ReadAll,
            resource: Resource::Organizations,
        });
    }
    state.store.get_organization(id).await?.ok_or_else(|| not_found(id))
}

#[utoipa::path(
    post,
    path = "/organizations",
    tag = "organizations",
    summary = "Register an organization",
    description = "Register a school or district. It starts `pending`; learners can create once a platform admin approves it.",
    request_body = OrganizationCreate,
    responses(
        (status = 201, description = "Registered", body = OrganizationResponse),
        (status = 400, description = "Invalid name, subdomain or limits"),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Subdomain taken"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[instrument(skip_all, fields(subdomain = %request.subdomain))]
pub async fn create_organization(
    State(state): State<AppState>,
    current: CurrentAccount,
    Json(request): Json<OrganizationCreate>,
) -> Result<(StatusCode, Json<OrganizationResponse>)> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(Error::BadRequest {
            message: "Organization name cannot be empty".to_string(),
        });
    }
    validate_subdomain(&request.subdomain)?;
    validate_limits(request.daily_limit, request.monthly_limit)?;

    let (default_daily, default_monthly) = request.package_tier.default_limits();
    let organization = state
        .store
        .create_organization(&OrganizationCreateDBRequest {
            name: name.to_string(),
            subdomain: request.subdomain,
            package_tier: request.package_tier,
            daily_limit: request.daily_limit.unwrap_or(default_daily),
            monthly_limit: request.monthly_limit.unwrap_or(default_monthly),
        })
        .await?;
    info!(organization_id = %abbrev_uuid(&organization.id), "Organization registered by {}", abbrev_uuid(&current.id));
    Ok((StatusCode::CREATED, Json(organization.into())))
}

#[utoipa::path(
    get,
    path = "/organizations/{id}",
    tag = "organizations",
    summary = "Get an organization",
    params(("id" = uuid::Uuid, Path, description = "Organization ID")),
    responses(
        (status = 200, description = "The organization", body = OrganizationResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not a member"),
        (status = 404, description = "Not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[instrument(skip_all, fields(organization_id = %abbrev_uuid(&id)))]
pub async fn get_organization(
    State(state): State<AppState>,
    Path(id): Path<OrganizationId>,
    current: CurrentAccount,
) -> Result<Json<OrganizationResponse>> {
    Ok(Json(visible_organization(&state, &current, id).await?.into()))
}

#[utoipa::path(
    patch,
    path = "/organizations/{id}",
    tag = "organizations",
    summary = "Update an organization",
    description = "Platform admins may change the name, status, package and limits. Organization admins may change their own organization's limits.",
    params(("id" = uuid::Uuid, Path, description = "Organization ID")),
    request_body = OrganizationUpdate,
    responses(
        (status = 200, description = "Updated", body = OrganizationResponse),
        (status = 400, description = "Invalid limits"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[instrument(skip_all, fields(organization_id = %abbrev_uuid(&id)))]
pub async fn update_organization(
    State(state): State<AppState>,
    Path(id): Path<OrganizationId>,
    current: CurrentAccount,
    Json(update): Json<OrganizationUpdate>,
) -> Result<Json<OrganizationResponse>> {
    if update.touches_administrative_fields() {
        permissions::require_platform_admin(&current, Operation::UpdateAll, Resource::Organizations)?;
    } else if !permissions::can_update_organization_limits(&current, id) {
        return Err(Error::InsufficientPermissions {
            action: Operation::UpdateOwn,
            resource: Resource::Organizations,
        });
    }
    validate_limits(update.daily_limit, update.monthly_limit)?;

    let request = OrganizationUpdateDBRequest {
        name: update.name,
        status: update.status,
        package_tier: update.package_tier,
        daily_limit: update.daily_limit,
        monthly_limit: update.monthly_limit,
    };
    let organization = state.store.update_organization(id, &request).await.map_err(|e| match e {
        DbError::NotFound => not_found(id),
        other => Error::Database(other),
    })?;
    info!(
        status = ?organization.status,
        daily_limit = organization.daily_limit,
        monthly_limit = organization.monthly_limit,
        "Organization updated by {}",
        abbrev_uuid(&current.id)
    );
    Ok(Json(organization.into()))
}

#[utoipa::path(
    get,
    path = "/organizations/{id}/usage",
    tag = "organizations",
    summary = "Organization usage",
    description = "Creations made by the organization's accounts today and this month, in the configured local time zone.",
    params(("id" = uuid::Uuid, Path, description = "Organization ID")),
    responses(
        (status = 200, description = "Usage counts", body = OrganizationUsageResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not a member"),
        (status = 404, description = "Not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []), ("ProxyHeader" = []))
)]
#[instrument(skip_all, fields(organization_id = %abbrev_uuid(&id)))]
pub async fn get_organization_usage(
    State(state): State<AppState>,
    Path(id): Path<OrganizationId>,
    current: CurrentAccount,
) -> Result<Json<OrganizationUsageResponse>> {
    visible_organization(&state, &current, id).await?;
    let period = state.ledger.period_at(Utc::now());
    let usage = state.store.organization_usage(id, period.day, period.month).await?;
    Ok(Json(usage.into()))
}
