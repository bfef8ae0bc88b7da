//! Storage seams used by the quota ledger, the orchestrator and the API.
//!
//! Each trait is object safe so the application can hold an `Arc<dyn Store>` and pick the
//! backend from configuration: [`crate::db::postgres::PostgresStore`] in production and
//! [`crate::db::memory::MemoryStore`] for development and tests.

use crate::db::errors::Result;
use crate::db::models::{
    accounts::{AccountCreateDBRequest, AccountDBResponse, AccountUpdateDBRequest},
    creations::{CreationCreateDBRequest, CreationDBResponse, CreationFilter, StatusUpdateDBRequest, StatusUpdateOutcome},
    organizations::{OrganizationCreateDBRequest, OrganizationDBResponse, OrganizationUpdateDBRequest},
    usage::{OrganizationUsageDBResponse, Reservation, ReservationDBRequest, UsageSnapshot},
};
use crate::types::{AccountId, CreationId, OrganizationId};
use async_trait::async_trait;
use chrono::NaiveDate;

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn create_account(&self, request: &AccountCreateDBRequest) -> Result<AccountDBResponse>;

    async fn get_account(&self, id: AccountId) -> Result<Option<AccountDBResponse>>;

    async fn get_account_by_email(&self, email: &str) -> Result<Option<AccountDBResponse>>;

    /// Fails with [`crate::db::errors::DbError::NotFound`] if the account does not exist
    async fn update_account(&self, id: AccountId, request: &AccountUpdateDBRequest) -> Result<AccountDBResponse>;
}

#[async_trait]
pub trait OrganizationStore: Send + Sync {
    async fn create_organization(&self, request: &OrganizationCreateDBRequest) -> Result<OrganizationDBResponse>;

    async fn get_organization(&self, id: OrganizationId) -> Result<Option<OrganizationDBResponse>>;

    /// Fails with [`crate::db::errors::DbError::NotFound`] if the organization does not exist
    async fn update_organization(&self, id: OrganizationId, request: &OrganizationUpdateDBRequest) -> Result<OrganizationDBResponse>;
}

#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Check capacity and debit one unit in a single atomic step.
    ///
    /// Two concurrent reservations against the last unit of capacity must not both be granted.
    /// Fails with [`crate::db::errors::DbError::NotFound`] if the account does not exist.
    async fn reserve(&self, request: &ReservationDBRequest) -> Result<Reservation>;

    /// Current counters for an account, without debiting
    async fn usage(&self, account_id: AccountId, local_day: NaiveDate, local_month: NaiveDate) -> Result<UsageSnapshot>;

    /// Granted reservations across an organization for a local day and month
    async fn organization_usage(
        &self,
        organization_id: OrganizationId,
        local_day: NaiveDate,
        local_month: NaiveDate,
    ) -> Result<OrganizationUsageDBResponse>;
}

#[async_trait]
pub trait CreationStore: Send + Sync {
    async fn create_creation(&self, request: &CreationCreateDBRequest) -> Result<CreationDBResponse>;

    /// Apply a provider-driven status change to the record carrying `task_id`.
    ///
    /// The transition is applied only if it moves the record forward (see
    /// [`crate::db::models::creations::CreationStatus::can_transition_to`]); the check and the
    /// write happen atomically.
    async fn update_creation_status(&self, task_id: &str, request: &StatusUpdateDBRequest) -> Result<StatusUpdateOutcome>;

    async fn get_creation(&self, id: CreationId) -> Result<Option<CreationDBResponse>>;

    async fn list_creations(&self, filter: &CreationFilter) -> Result<Vec<CreationDBResponse>>;
}

/// Everything the application needs from persistence
pub trait Store: AccountStore + OrganizationStore + UsageStore + CreationStore {}

impl<T> Store for T where T: AccountStore + OrganizationStore + UsageStore + CreationStore {}
