//! API request/response models for accounts.

use crate::db::models::accounts::{AccountDBResponse, AccountTier, SubscriptionStatus};
use crate::types::{AccountId, OrganizationId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::rust::double_option;
use utoipa::ToSchema;

/// The authenticated account behind a request.
///
/// Always loaded from the store, so tier and organization reflect the latest admin changes
/// rather than whatever a session token carried when it was issued.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CurrentAccount {
    #[schema(value_type = String, format = "uuid")]
    pub id: AccountId,
    pub email: String,
    pub display_name: Option<String>,
    pub tier: AccountTier,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub organization_id: Option<OrganizationId>,
    pub subscription_status: SubscriptionStatus,
}

impl CurrentAccount {
    pub fn is_platform_admin(&self) -> bool {
        self.tier == AccountTier::PlatformAdmin
    }
}

impl From<AccountDBResponse> for CurrentAccount {
    fn from(db: AccountDBResponse) -> Self {
        Self {
            id: db.id,
            email: db.email,
            display_name: db.display_name,
            tier: db.tier,
            organization_id: db.organization_id,
            subscription_status: db.subscription_status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccountResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: AccountId,
    pub email: String,
    pub display_name: Option<String>,
    pub tier: AccountTier,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub organization_id: Option<OrganizationId>,
    pub subscription_status: SubscriptionStatus,
    /// Creations made over the account's lifetime
    pub lifetime_used: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AccountDBResponse> for AccountResponse {
    fn from(db: AccountDBResponse) -> Self {
        Self {
            id: db.id,
            email: db.email,
            display_name: db.display_name,
            tier: db.tier,
            organization_id: db.organization_id,
            subscription_status: db.subscription_status,
            lifetime_used: db.lifetime_used,
            is_active: db.is_active,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

/// Platform admin update of an account
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct AccountUpdate {
    pub display_name: Option<String>,
    pub tier: Option<AccountTier>,
    /// Organization (None = no change, Some(None) = detach, Some(id) = attach)
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub organization_id: Option<Option<OrganizationId>>,
    pub subscription_status: Option<SubscriptionStatus>,
    pub is_active: Option<bool>,
}
