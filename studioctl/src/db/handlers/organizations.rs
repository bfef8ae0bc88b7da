//! Database repository for organizations.

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::organizations::{OrganizationCreateDBRequest, OrganizationDBResponse, OrganizationStatus, OrganizationUpdateDBRequest},
};
use crate::types::{OrganizationId, abbrev_uuid};
use sqlx::PgConnection;
use tracing::instrument;

/// Filter for listing organizations
#[derive(Debug, Clone)]
pub struct OrganizationFilter {
    pub status: Option<OrganizationStatus>,
    pub skip: i64,
    pub limit: i64,
}

impl OrganizationFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self { status: None, skip, limit }
    }
}

pub struct Organizations<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Organizations<'c> {
    type CreateRequest = OrganizationCreateDBRequest;
    type UpdateRequest = OrganizationUpdateDBRequest;
    type Response = OrganizationDBResponse;
    type Id = OrganizationId;
    type Filter = OrganizationFilter;

    #[instrument(skip(self, request), fields(subdomain = %request.subdomain), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let organization = sqlx::query_as::<_, OrganizationDBResponse>(
            r#"
            INSERT INTO organizations (name, subdomain, status, package_tier, daily_limit, monthly_limit)
            VALUES ($1, $2, 'pending', $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&request.name)
        .bind(&request.subdomain)
        .bind(request.package_tier)
        .bind(request.daily_limit)
        .bind(request.monthly_limit)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(organization)
    }

    #[instrument(skip(self), fields(organization_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let organization = sqlx::query_as::<_, OrganizationDBResponse>("SELECT * FROM organizations WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(organization)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let organizations = sqlx::query_as::<_, OrganizationDBResponse>(
            r#"
            SELECT * FROM organizations
            WHERE ($1::TEXT IS NULL OR status = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(filter.status)
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(organizations)
    }

    #[instrument(skip(self, request), fields(organization_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let organization = sqlx::query_as::<_, OrganizationDBResponse>(
            r#"
            UPDATE organizations SET
                name = COALESCE($2, name),
                status = COALESCE($3, status),
                package_tier = COALESCE($4, package_tier),
                daily_limit = COALESCE($5, daily_limit),
                monthly_limit = COALESCE($6, monthly_limit),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.name)
        .bind(request.status)
        .bind(request.package_tier)
        .bind(request.daily_limit)
        .bind(request.monthly_limit)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(organization)
    }
}

impl<'c> Organizations<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }
}
