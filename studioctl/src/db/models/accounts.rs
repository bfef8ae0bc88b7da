//! Database models for accounts.

use crate::types::{AccountId, OrganizationId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Account tier, stored as TEXT in the database.
///
/// Quota policy is selected by exhaustively matching on this enum (see [`crate::quota`]).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AccountTier {
    FreeConsumer,
    PremiumConsumer,
    OrgLearner,
    Educator,
    OrgAdmin,
    PlatformAdmin,
}

impl AccountTier {
    /// Tiers whose usage is governed by an organization's daily and monthly limits
    pub fn is_organization_affiliated(&self) -> bool {
        matches!(self, AccountTier::OrgLearner | AccountTier::Educator | AccountTier::OrgAdmin)
    }
}

/// Consumer subscription status, stored as TEXT in the database
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema, Default)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    #[default]
    #[sqlx(rename = "none")]
    #[serde(rename = "none")]
    NoSubscription,
    Active,
    PastDue,
    Canceled,
}

/// Database request for creating a new account
#[derive(Debug, Clone)]
pub struct AccountCreateDBRequest {
    pub email: String,
    pub display_name: Option<String>,
    pub tier: AccountTier,
    pub organization_id: Option<OrganizationId>,
    pub subscription_status: SubscriptionStatus,
}

impl AccountCreateDBRequest {
    /// A self-signed-up consumer on the free plan
    pub fn free_consumer(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            display_name: None,
            tier: AccountTier::FreeConsumer,
            organization_id: None,
            subscription_status: SubscriptionStatus::NoSubscription,
        }
    }
}

/// Database request for updating an account.
///
/// `organization_id` is doubly optional: `None` leaves it untouched, `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct AccountUpdateDBRequest {
    pub display_name: Option<String>,
    pub tier: Option<AccountTier>,
    pub organization_id: Option<Option<OrganizationId>>,
    pub subscription_status: Option<SubscriptionStatus>,
    pub is_active: Option<bool>,
}

/// Database response for an account
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AccountDBResponse {
    pub id: AccountId,
    pub email: String,
    pub display_name: Option<String>,
    pub tier: AccountTier,
    pub lifetime_used: i64,
    pub organization_id: Option<OrganizationId>,
    pub subscription_status: SubscriptionStatus,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
