//! Postgres-backed [`Store`](crate::db::Store), delegating to the repositories in
//! [`crate::db::handlers`].

use crate::db::{
    errors::Result,
    handlers::{Accounts, Creations, Organizations, Repository, Usage},
    models::{
        accounts::{AccountCreateDBRequest, AccountDBResponse, AccountUpdateDBRequest},
        creations::{CreationCreateDBRequest, CreationDBResponse, CreationFilter, StatusUpdateDBRequest, StatusUpdateOutcome},
        organizations::{OrganizationCreateDBRequest, OrganizationDBResponse, OrganizationUpdateDBRequest},
        usage::{OrganizationUsageDBResponse, Reservation, ReservationDBRequest, UsageSnapshot},
    },
    store::{AccountStore, CreationStore, OrganizationStore, UsageStore},
};
use crate::types::{AccountId, CreationId, OrganizationId};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl AccountStore for PostgresStore {
    async fn create_account(&self, request: &AccountCreateDBRequest) -> Result<AccountDBResponse> {
        let mut conn = self.pool.acquire().await?;
        Accounts::new(&mut conn).create(request).await
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<AccountDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Accounts::new(&mut conn).get_by_id(id).await
    }

    async fn get_account_by_email(&self, email: &str) -> Result<Option<AccountDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Accounts::new(&mut conn).get_by_email(email).await
    }

    async fn update_account(&self, id: AccountId, request: &AccountUpdateDBRequest) -> Result<AccountDBResponse> {
        let mut conn = self.pool.acquire().await?;
        Accounts::new(&mut conn).update(id, request).await
    }
}

#[async_trait]
impl OrganizationStore for PostgresStore {
    async fn create_organization(&self, request: &OrganizationCreateDBRequest) -> Result<OrganizationDBResponse> {
        let mut conn = self.pool.acquire().await?;
        Organizations::new(&mut conn).create(request).await
    }

    async fn get_organization(&self, id: OrganizationId) -> Result<Option<OrganizationDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Organizations::new(&mut conn).get_by_id(id).await
    }

    async fn update_organization(&self, id: OrganizationId, request: &OrganizationUpdateDBRequest) -> Result<OrganizationDBResponse> {
        let mut conn = self.pool.acquire().await?;
        Organizations::new(&mut conn).update(id, request).await
    }
}

#[async_trait]
impl UsageStore for PostgresStore {
    async fn reserve(&self, request: &ReservationDBRequest) -> Result<Reservation> {
        let mut conn = self.pool.acquire().await?;
        Usage::new(&mut conn).reserve(request).await
    }

    async fn usage(&self, account_id: AccountId, local_day: NaiveDate, local_month: NaiveDate) -> Result<UsageSnapshot> {
        let mut conn = self.pool.acquire().await?;
        Usage::new(&mut conn).usage(account_id, local_day, local_month).await
    }

    async fn organization_usage(
        &self,
        organization_id: OrganizationId,
        local_day: NaiveDate,
        local_month: NaiveDate,
    ) -> Result<OrganizationUsageDBResponse> {
        let mut conn = self.pool.acquire().await?;
        Usage::new(&mut conn).organization_usage(organization_id, local_day, local_month).await
    }
}

#[async_trait]
impl CreationStore for PostgresStore {
    async fn create_creation(&self, request: &CreationCreateDBRequest) -> Result<CreationDBResponse> {
        let mut conn = self.pool.acquire().await?;
        Creations::new(&mut conn).create(request).await
    }

    async fn update_creation_status(&self, task_id: &str, request: &StatusUpdateDBRequest) -> Result<StatusUpdateOutcome> {
        let mut conn = self.pool.acquire().await?;
        Creations::new(&mut conn).update_status(task_id, request).await
    }

    async fn get_creation(&self, id: CreationId) -> Result<Option<CreationDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Creations::new(&mut conn).get_by_id(id).await
    }

    async fn list_creations(&self, filter: &CreationFilter) -> Result<Vec<CreationDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Creations::new(&mut conn).list(filter).await
    }
}
