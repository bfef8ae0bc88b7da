//! Test fixtures: config, app state, accounts and a store with injectable failures.

use crate::config::{
    AuthConfig, DatabaseConfig, ImageProviderConfig, MusicProviderConfig, ProvidersConfig, ProxyHeaderAuthConfig, SessionConfig,
    StoryProviderConfig,
};
use crate::db::errors::{DbError, Result};
use crate::db::memory::MemoryStore;
use crate::db::models::{
    accounts::{AccountCreateDBRequest, AccountDBResponse, AccountTier, AccountUpdateDBRequest, SubscriptionStatus},
    creations::{CreationCreateDBRequest, CreationDBResponse, CreationFilter, CreationKind, StatusUpdateDBRequest, StatusUpdateOutcome},
    organizations::{
        OrganizationCreateDBRequest, OrganizationDBResponse, OrganizationStatus, OrganizationUpdateDBRequest, PackageTier,
    },
    usage::{OrganizationUsageDBResponse, Reservation, ReservationDBRequest, ReservationRule, UsageSnapshot},
};
use crate::db::{AccountStore, CreationStore, OrganizationStore, Store, UsageStore};
use crate::types::{AccountId, CreationId, OrganizationId};
use crate::{AppState, config::Config};
use async_trait::async_trait;
use axum_test::TestServer;
use chrono::NaiveDate;
use std::sync::{
    Arc, Once,
    atomic::{AtomicBool, Ordering},
};
use uuid::Uuid;

static CRYPTO_PROVIDER: Once = Once::new();

/// reqwest is built without a default crypto provider; main installs one, tests call this
pub fn install_crypto_provider() {
    CRYPTO_PROVIDER.call_once(|| {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    });
}

pub fn create_test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        public_url: "http://localhost:3001".parse().unwrap(),
        database_url: None,
        database: DatabaseConfig::Memory,
        secret_key: Some("test-secret-key-for-testing-only".to_string()),
        auth: AuthConfig {
            session: SessionConfig {
                enabled: true,
                ..Default::default()
            },
            proxy_header: ProxyHeaderAuthConfig {
                enabled: true,
                ..Default::default()
            },
            ..Default::default()
        },
        providers: ProvidersConfig {
            image: ImageProviderConfig::Dummy,
            story: StoryProviderConfig::Dummy,
            music: MusicProviderConfig::Dummy(Default::default()),
            callback_secret: None,
        },
        enable_metrics: false,
        enable_otel_export: false,
        ..Default::default()
    }
}

/// App state over a fresh [`MemoryStore`] with dummy providers
pub fn create_test_state() -> AppState {
    create_test_state_with(create_test_config(), Arc::new(MemoryStore::new()))
}

pub fn create_test_state_with(config: Config, store: Arc<dyn Store>) -> AppState {
    install_crypto_provider();
    let providers = crate::providers::create_providers(&config.providers).expect("Failed to create test providers");
    AppState::builder().config(config).store(store).providers(providers).build()
}

/// A test server over the full router
pub fn create_test_server(state: AppState) -> TestServer {
    let router = crate::build_router(&state).expect("Failed to build router");
    TestServer::new(router).expect("Failed to create test server")
}

pub async fn create_test_account(state: &AppState, tier: AccountTier) -> AccountDBResponse {
    let organization_id = if tier.is_organization_affiliated() {
        Some(create_test_organization(state, 50, 1000).await.id)
    } else {
        None
    };
    create_test_account_in(state, tier, organization_id).await
}

pub async fn create_test_account_in(state: &AppState, tier: AccountTier, organization_id: Option<OrganizationId>) -> AccountDBResponse {
    let subscription_status = match tier {
        AccountTier::PremiumConsumer => SubscriptionStatus::Active,
        _ => SubscriptionStatus::NoSubscription,
    };
    state
        .store
        .create_account(&AccountCreateDBRequest {
            email: format!("test-{}@example.com", Uuid::new_v4()),
            display_name: Some("Test Account".to_string()),
            tier,
            organization_id,
            subscription_status,
        })
        .await
        .expect("Failed to create test account")
}

/// An approved organization with the given limits
pub async fn create_test_organization(state: &AppState, daily_limit: i64, monthly_limit: i64) -> OrganizationDBResponse {
    let suffix = Uuid::new_v4().simple().to_string();
    let organization = state
        .store
        .create_organization(&OrganizationCreateDBRequest {
            name: format!("Test School {suffix}"),
            subdomain: format!("school-{suffix}"),
            package_tier: PackageTier::Classroom,
            daily_limit,
            monthly_limit,
        })
        .await
        .expect("Failed to create test organization");
    state
        .store
        .update_organization(
            organization.id,
            &OrganizationUpdateDBRequest {
                status: Some(OrganizationStatus::Approved),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to approve test organization")
}

/// Grant `times` reservations under `rule`, as if the account had made that many creations
pub async fn consume_quota(state: &AppState, account_id: AccountId, rule: ReservationRule, times: i64) {
    let period = state.ledger.period_at(chrono::Utc::now());
    for _ in 0..times {
        let reservation = state
            .store
            .reserve(&ReservationDBRequest {
                account_id,
                kind: CreationKind::Image,
                local_day: period.day,
                local_month: period.month,
                rule,
            })
            .await
            .expect("Failed to reserve");
        assert!(reservation.granted, "test reservation was refused");
    }
}

/// Bring an account's lifetime counter up to `used`
pub async fn set_lifetime_used(state: &AppState, account_id: AccountId, used: i64) {
    let period = state.ledger.period_at(chrono::Utc::now());
    let current = state
        .store
        .usage(account_id, period.day, period.month)
        .await
        .expect("Failed to read usage")
        .lifetime_used;
    consume_quota(state, account_id, ReservationRule::Lifetime { limit: None }, used - current).await;
}

/// `Authorization` header value for an account's session
pub fn bearer_for(state: &AppState, account: &AccountDBResponse) -> String {
    let token =
        crate::auth::session::create_session_token(account.id, &account.email, &state.config).expect("Failed to create session token");
    format!("Bearer {token}")
}

/// A [`MemoryStore`] that can be told to fail specific operations
#[derive(Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    fail_reservations: AtomicBool,
    fail_reads: AtomicBool,
    fail_creations: AtomicBool,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail `reserve` and `usage`
    pub fn fail_reservations(&self, fail: bool) {
        self.fail_reservations.store(fail, Ordering::SeqCst);
    }

    /// Fail account and organization lookups
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Fail `create_creation`
    pub fn fail_creations(&self, fail: bool) {
        self.fail_creations.store(fail, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool, operation: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            Err(DbError::Other(anyhow::anyhow!("injected failure: {operation}")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl AccountStore for FaultyStore {
    async fn create_account(&self, request: &AccountCreateDBRequest) -> Result<AccountDBResponse> {
        self.inner.create_account(request).await
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<AccountDBResponse>> {
        Self::check(&self.fail_reads, "get_account")?;
        self.inner.get_account(id).await
    }

    async fn get_account_by_email(&self, email: &str) -> Result<Option<AccountDBResponse>> {
        Self::check(&self.fail_reads, "get_account_by_email")?;
        self.inner.get_account_by_email(email).await
    }

    async fn update_account(&self, id: AccountId, request: &AccountUpdateDBRequest) -> Result<AccountDBResponse> {
        self.inner.update_account(id, request).await
    }
}

#[async_trait]
impl OrganizationStore for FaultyStore {
    async fn create_organization(&self, request: &OrganizationCreateDBRequest) -> Result<OrganizationDBResponse> {
        self.inner.create_organization(request).await
    }

    async fn get_organization(&self, id: OrganizationId) -> Result<Option<OrganizationDBResponse>> {
        Self::check(&self.fail_reads, "get_organization")?;
        self.inner.get_organization(id).await
    }

    async fn update_organization(&self, id: OrganizationId, request: &OrganizationUpdateDBRequest) -> Result<OrganizationDBResponse> {
        self.inner.update_organization(id, request).await
    }
}

#[async_trait]
impl UsageStore for FaultyStore {
    async fn reserve(&self, request: &ReservationDBRequest) -> Result<Reservation> {
        Self::check(&self.fail_reservations, "reserve")?;
        self.inner.reserve(request).await
    }

    async fn usage(&self, account_id: AccountId, local_day: NaiveDate, local_month: NaiveDate) -> Result<UsageSnapshot> {
        Self::check(&self.fail_reservations, "usage")?;
        self.inner.usage(account_id, local_day, local_month).await
    }

    async fn organization_usage(
        &self,
        organization_id: OrganizationId,
        local_day: NaiveDate,
        local_month: NaiveDate,
    ) -> Result<OrganizationUsageDBResponse> {
        self.inner.organization_usage(organization_id, local_day, local_month).await
    }
}

#[async_trait]
impl CreationStore for FaultyStore {
    async fn create_creation(&self, request: &CreationCreateDBRequest) -> Result<CreationDBResponse> {
        Self::check(&self.fail_creations, "create_creation")?;
        self.inner.create_creation(request).await
    }

    async fn update_creation_status(&self, task_id: &str, request: &StatusUpdateDBRequest) -> Result<StatusUpdateOutcome> {
        self.inner.update_creation_status(task_id, request).await
    }

    async fn get_creation(&self, id: CreationId) -> Result<Option<CreationDBResponse>> {
        self.inner.get_creation(id).await
    }

    async fn list_creations(&self, filter: &CreationFilter) -> Result<Vec<CreationDBResponse>> {
        self.inner.list_creations(filter).await
    }
}
