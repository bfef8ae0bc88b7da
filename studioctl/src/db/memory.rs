//! In-memory [`Store`](crate::db::Store) for development and tests.
//!
//! All state sits behind one mutex, so every operation (including a reservation's
//! check-then-debit) is a single critical section.

use crate::db::{
    errors::{DbError, Result},
    models::{
        accounts::{AccountCreateDBRequest, AccountDBResponse, AccountUpdateDBRequest},
        creations::{
            CreationCreateDBRequest, CreationDBResponse, CreationFilter, CreationOrder, CreationStatus, StatusUpdateDBRequest,
            StatusUpdateOutcome,
        },
        organizations::{OrganizationCreateDBRequest, OrganizationDBResponse, OrganizationStatus, OrganizationUpdateDBRequest},
        usage::{OrganizationUsageDBResponse, Reservation, ReservationDBRequest, ReservationRule, UsageSnapshot, WindowKind},
    },
    store::{AccountStore, CreationStore, OrganizationStore, UsageStore},
};
use crate::types::{AccountId, CreationId, OrganizationId};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug)]
struct UsageEvent {
    organization_id: Option<OrganizationId>,
    local_day: NaiveDate,
    local_month: NaiveDate,
}

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<AccountId, AccountDBResponse>,
    organizations: HashMap<OrganizationId, OrganizationDBResponse>,
    windows: HashMap<(AccountId, WindowKind, NaiveDate), i64>,
    events: Vec<UsageEvent>,
    creations: HashMap<CreationId, CreationDBResponse>,
    task_ids: HashMap<String, CreationId>,
}

impl State {
    fn window(&self, account_id: AccountId, kind: WindowKind, start: NaiveDate) -> i64 {
        self.windows.get(&(account_id, kind, start)).copied().unwrap_or(0)
    }

    fn bump_window(&mut self, account_id: AccountId, kind: WindowKind, start: NaiveDate) -> i64 {
        let used = self.windows.entry((account_id, kind, start)).or_insert(0);
        *used += 1;
        *used
    }

    fn check_organization(&self, organization_id: Option<OrganizationId>) -> Result<()> {
        match organization_id {
            Some(id) if !self.organizations.contains_key(&id) => Err(DbError::foreign_key("accounts_organization_id_fkey", "accounts")),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn create_account(&self, request: &AccountCreateDBRequest) -> Result<AccountDBResponse> {
        let mut state = self.state.lock().await;
        if state.accounts.values().any(|a| a.email == request.email) {
            return Err(DbError::unique("accounts_email_unique", "accounts", &request.email));
        }
        state.check_organization(request.organization_id)?;

        let now = Utc::now();
        let account = AccountDBResponse {
            id: Uuid::new_v4(),
            email: request.email.clone(),
            display_name: request.display_name.clone(),
            tier: request.tier,
            lifetime_used: 0,
            organization_id: request.organization_id,
            subscription_status: request.subscription_status,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        state.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<AccountDBResponse>> {
        Ok(self.state.lock().await.accounts.get(&id).cloned())
    }

    async fn get_account_by_email(&self, email: &str) -> Result<Option<AccountDBResponse>> {
        Ok(self.state.lock().await.accounts.values().find(|a| a.email == email).cloned())
    }

    async fn update_account(&self, id: AccountId, request: &AccountUpdateDBRequest) -> Result<AccountDBResponse> {
        let mut state = self.state.lock().await;
        if let Some(organization_id) = request.organization_id {
            state.check_organization(organization_id)?;
        }
        let account = state.accounts.get_mut(&id).ok_or(DbError::NotFound)?;

        if let Some(display_name) = &request.display_name {
            account.display_name = Some(display_name.clone());
        }
        if let Some(tier) = request.tier {
            account.tier = tier;
        }
        if let Some(organization_id) = request.organization_id {
            account.organization_id = organization_id;
        }
        if let Some(subscription_status) = request.subscription_status {
            account.subscription_status = subscription_status;
        }
        if let Some(is_active) = request.is_active {
            account.is_active = is_active;
        }
        account.updated_at = Utc::now();
        Ok(account.clone())
    }
}

#[async_trait]
impl OrganizationStore for MemoryStore {
    async fn create_organization(&self, request: &OrganizationCreateDBRequest) -> Result<OrganizationDBResponse> {
        let mut state = self.state.lock().await;
        if state.organizations.values().any(|o| o.subdomain == request.subdomain) {
            return Err(DbError::unique("organizations_subdomain_unique", "organizations", &request.subdomain));
        }

        let now = Utc::now();
        let organization = OrganizationDBResponse {
            id: Uuid::new_v4(),
            name: request.name.clone(),
            subdomain: request.subdomain.clone(),
            status: OrganizationStatus::Pending,
            package_tier: request.package_tier,
            daily_limit: request.daily_limit,
            monthly_limit: request.monthly_limit,
            created_at: now,
            updated_at: now,
        };
        state.organizations.insert(organization.id, organization.clone());
        Ok(organization)
    }

    async fn get_organization(&self, id: OrganizationId) -> Result<Option<OrganizationDBResponse>> {
        Ok(self.state.lock().await.organizations.get(&id).cloned())
    }

    async fn update_organization(&self, id: OrganizationId, request: &OrganizationUpdateDBRequest) -> Result<OrganizationDBResponse> {
        let mut state = self.state.lock().await;
        let organization = state.organizations.get_mut(&id).ok_or(DbError::NotFound)?;

        if let Some(name) = &request.name {
            organization.name = name.clone();
        }
        if let Some(status) = request.status {
            organization.status = status;
        }
        if let Some(package_tier) = request.package_tier {
            organization.package_tier = package_tier;
        }
        if let Some(daily_limit) = request.daily_limit {
            organization.daily_limit = daily_limit;
        }
        if let Some(monthly_limit) = request.monthly_limit {
            organization.monthly_limit = monthly_limit;
        }
        organization.updated_at = Utc::now();
        Ok(organization.clone())
    }
}

#[async_trait]
impl UsageStore for MemoryStore {
    async fn reserve(&self, request: &ReservationDBRequest) -> Result<Reservation> {
        let mut state = self.state.lock().await;
        let lifetime_used = state.accounts.get(&request.account_id).ok_or(DbError::NotFound)?.lifetime_used;
        let day_used = state.window(request.account_id, WindowKind::Day, request.local_day);
        let month_used = state.window(request.account_id, WindowKind::Month, request.local_month);

        let (granted, organization_id) = match request.rule {
            ReservationRule::Lifetime { limit } => (limit.is_none_or(|limit| lifetime_used < limit), None),
            ReservationRule::Windows {
                organization_id,
                daily_limit,
                monthly_limit,
            } => (day_used < daily_limit && month_used < monthly_limit, Some(organization_id)),
        };

        if !granted {
            return Ok(Reservation {
                granted,
                usage: UsageSnapshot {
                    lifetime_used,
                    day_used,
                    month_used,
                },
            });
        }

        let (day_used, month_used) = if organization_id.is_some() {
            (
                state.bump_window(request.account_id, WindowKind::Day, request.local_day),
                state.bump_window(request.account_id, WindowKind::Month, request.local_month),
            )
        } else {
            (day_used, month_used)
        };
        let account = state.accounts.get_mut(&request.account_id).ok_or(DbError::NotFound)?;
        account.lifetime_used += 1;
        account.updated_at = Utc::now();
        let lifetime_used = account.lifetime_used;
        state.events.push(UsageEvent {
            organization_id,
            local_day: request.local_day,
            local_month: request.local_month,
        });

        Ok(Reservation {
            granted,
            usage: UsageSnapshot {
                lifetime_used,
                day_used,
                month_used,
            },
        })
    }

    async fn usage(&self, account_id: AccountId, local_day: NaiveDate, local_month: NaiveDate) -> Result<UsageSnapshot> {
        let state = self.state.lock().await;
        let lifetime_used = state.accounts.get(&account_id).ok_or(DbError::NotFound)?.lifetime_used;
        Ok(UsageSnapshot {
            lifetime_used,
            day_used: state.window(account_id, WindowKind::Day, local_day),
            month_used: state.window(account_id, WindowKind::Month, local_month),
        })
    }

    async fn organization_usage(
        &self,
        organization_id: OrganizationId,
        local_day: NaiveDate,
        local_month: NaiveDate,
    ) -> Result<OrganizationUsageDBResponse> {
        let state = self.state.lock().await;
        let events = state.events.iter().filter(|e| e.organization_id == Some(organization_id));
        let (today, this_month) = events.fold((0, 0), |(today, month), e| {
            (today + i64::from(e.local_day == local_day), month + i64::from(e.local_month == local_month))
        });
        Ok(OrganizationUsageDBResponse {
            organization_id,
            day: local_day,
            month: local_month,
            today,
            this_month,
        })
    }
}

#[async_trait]
impl CreationStore for MemoryStore {
    async fn create_creation(&self, request: &CreationCreateDBRequest) -> Result<CreationDBResponse> {
        let mut state = self.state.lock().await;
        if !state.accounts.contains_key(&request.account_id) {
            return Err(DbError::foreign_key("creations_account_id_fkey", "creations"));
        }
        if let Some(task_id) = &request.task_id
            && state.task_ids.contains_key(task_id)
        {
            return Err(DbError::unique("creations_task_id_unique", "creations", task_id));
        }

        let now = Utc::now();
        let creation = CreationDBResponse {
            id: Uuid::new_v4(),
            account_id: request.account_id,
            kind: request.payload.kind(),
            status: request.status,
            payload: request.payload.clone(),
            asset_urls: request.asset_urls.clone(),
            task_id: request.task_id.clone(),
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: request.completed_at,
        };
        if let Some(task_id) = &creation.task_id {
            state.task_ids.insert(task_id.clone(), creation.id);
        }
        state.creations.insert(creation.id, creation.clone());
        Ok(creation)
    }

    async fn update_creation_status(&self, task_id: &str, request: &StatusUpdateDBRequest) -> Result<StatusUpdateOutcome> {
        let mut state = self.state.lock().await;
        let Some(id) = state.task_ids.get(task_id).copied() else {
            return Ok(StatusUpdateOutcome::UnknownTask);
        };
        let creation = state.creations.get_mut(&id).ok_or(DbError::NotFound)?;

        if !creation.status.can_transition_to(request.status) {
            return Ok(StatusUpdateOutcome::Unchanged(creation.clone()));
        }

        let now = Utc::now();
        creation.status = request.status;
        if !request.asset_urls.is_empty() {
            creation.asset_urls = request.asset_urls.clone();
        }
        if request.error_message.is_some() {
            creation.error_message = request.error_message.clone();
        }
        if request.status.is_terminal() {
            creation.completed_at = Some(now);
        }
        creation.updated_at = now;
        Ok(StatusUpdateOutcome::Applied(creation.clone()))
    }

    async fn get_creation(&self, id: CreationId) -> Result<Option<CreationDBResponse>> {
        Ok(self.state.lock().await.creations.get(&id).cloned())
    }

    async fn list_creations(&self, filter: &CreationFilter) -> Result<Vec<CreationDBResponse>> {
        let state = self.state.lock().await;
        let mut creations: Vec<CreationDBResponse> = state
            .creations
            .values()
            .filter(|c| c.account_id == filter.account_id)
            .filter(|c| filter.kind.is_none_or(|kind| c.kind == kind))
            .cloned()
            .collect();

        match filter.order {
            CreationOrder::Recent => creations.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            CreationOrder::Library => creations.sort_by(|a, b| {
                let a_done = a.status == CreationStatus::Completed;
                let b_done = b.status == CreationStatus::Completed;
                b_done.cmp(&a_done).then_with(|| b.created_at.cmp(&a.created_at))
            }),
        }

        Ok(creations
            .into_iter()
            .skip(filter.skip.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect())
    }
}
