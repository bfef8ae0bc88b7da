//! Quota ledger: the gate every creation request passes before a provider is called.
//!
//! # Policies
//!
//! The policy is picked by matching on [`AccountTier`]:
//!
//! | Tier | Policy |
//! |---|---|
//! | `free_consumer` | lifetime limit (`quota.free_lifetime_limit`) |
//! | `premium_consumer` | unlimited while the subscription is `active`, otherwise free |
//! | `platform_admin` | unlimited |
//! | `org_learner`, `educator`, `org_admin` | organization daily + monthly windows |
//!
//! Unlimited reservations are still counted, so usage reports stay accurate.
//!
//! # Failure
//!
//! [`QuotaLedger::check_and_reserve`] never returns an error. Any storage failure becomes a
//! denial with [`DenialReason::Unavailable`]: the ledger never fails open.
//!
//! Debits are not refunded when a later step fails.

pub mod windows;

use crate::config::QuotaConfig;
use crate::db::{
    AccountStore, OrganizationStore, Store, UsageStore,
    errors::DbError,
    models::{
        accounts::{AccountDBResponse, AccountTier, SubscriptionStatus},
        creations::CreationKind,
        organizations::OrganizationStatus,
        usage::{ReservationDBRequest, ReservationRule, UsageSnapshot},
    },
};
use crate::types::{AccountId, abbrev_uuid};
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};
use utoipa::ToSchema;
use windows::{LocalPeriod, offset_from_minutes};

/// Why a request was not allowed to proceed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    LifetimeExhausted,
    DailyExhausted,
    MonthlyExhausted,
    /// The account does not exist or has been deactivated
    AccountUnavailable,
    /// The account's organization is missing or not approved
    OrganizationUnavailable,
    /// The ledger could not read or write its counters
    Unavailable,
}

/// Outcome of a quota check, in the shape clients render
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuotaDecision {
    pub can_proceed: bool,
    /// No limit applies to this account
    pub unlimited: bool,
    /// Lifetime creations left (lifetime policy only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_uses: Option<i64>,
    /// Creations left today (organization policy only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_remaining: Option<i64>,
    /// Creations left this month (organization policy only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_remaining: Option<i64>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenialReason>,
    /// When the exhausted window starts over; absent for lifetime limits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resets_at: Option<DateTime<Utc>>,
}

impl QuotaDecision {
    fn denied(reason: DenialReason, message: impl Into<String>) -> Self {
        Self {
            can_proceed: false,
            unlimited: false,
            remaining_uses: None,
            daily_remaining: None,
            monthly_remaining: None,
            message: message.into(),
            reason: Some(reason),
            resets_at: None,
        }
    }

    fn unavailable() -> Self {
        Self::denied(
            DenialReason::Unavailable,
            "We couldn't check your creations right now. Please try again in a moment!",
        )
    }

    fn account_unavailable() -> Self {
        Self::denied(DenialReason::AccountUnavailable, "Please sign in to start creating")
    }

    fn organization_unavailable() -> Self {
        Self::denied(
            DenialReason::OrganizationUnavailable,
            "Your school's account isn't ready yet. Ask your teacher for help!",
        )
    }

    /// Build a decision from the policy, the counters, and whether the request may proceed
    fn from_usage(rule: ReservationRule, usage: UsageSnapshot, granted: bool, period: &LocalPeriod) -> Self {
        match rule {
            ReservationRule::Lifetime { limit: None } => Self {
                can_proceed: true,
                unlimited: true,
                remaining_uses: None,
                daily_remaining: None,
                monthly_remaining: None,
                message: "You have unlimited creations!".to_string(),
                reason: None,
                resets_at: None,
            },
            ReservationRule::Lifetime { limit: Some(limit) } => {
                let remaining = (limit - usage.lifetime_used).max(0);
                let (message, reason) = if granted {
                    (format!("You have {remaining} free {} left.", plural(remaining)), None)
                } else {
                    (
                        format!("You've used all {limit} of your free creations. Ask a grown-up about upgrading to keep creating!"),
                        Some(DenialReason::LifetimeExhausted),
                    )
                };
                Self {
                    can_proceed: granted,
                    unlimited: false,
                    remaining_uses: Some(remaining),
                    daily_remaining: None,
                    monthly_remaining: None,
                    message,
                    reason,
                    resets_at: None,
                }
            }
            ReservationRule::Windows {
                daily_limit, monthly_limit, ..
            } => {
                let daily_remaining = (daily_limit - usage.day_used).max(0);
                let monthly_remaining = (monthly_limit - usage.month_used).max(0);
                // When both are exhausted the monthly window is the one that matters
                let (message, reason, resets_at) = if granted {
                    (
                        format!("You have {daily_remaining} {} left today.", plural(daily_remaining)),
                        None,
                        None,
                    )
                } else if usage.month_used >= monthly_limit {
                    (
                        "You've reached this month's creation limit. Come back next month!".to_string(),
                        Some(DenialReason::MonthlyExhausted),
                        Some(period.month_resets_at),
                    )
                } else {
                    (
                        "You've reached today's creation limit. Come back tomorrow!".to_string(),
                        Some(DenialReason::DailyExhausted),
                        Some(period.day_resets_at),
                    )
                };
                Self {
                    can_proceed: granted,
                    unlimited: false,
                    remaining_uses: None,
                    daily_remaining: Some(daily_remaining),
                    monthly_remaining: Some(monthly_remaining),
                    message,
                    reason,
                    resets_at,
                }
            }
        }
    }
}

fn plural(n: i64) -> &'static str {
    if n == 1 { "creation" } else { "creations" }
}

/// Whether the rule has capacity for one more creation at these counters
fn has_capacity(rule: ReservationRule, usage: UsageSnapshot) -> bool {
    match rule {
        ReservationRule::Lifetime { limit } => limit.is_none_or(|limit| usage.lifetime_used < limit),
        ReservationRule::Windows {
            daily_limit, monthly_limit, ..
        } => usage.day_used < daily_limit && usage.month_used < monthly_limit,
    }
}

#[derive(Clone)]
pub struct QuotaLedger {
    store: Arc<dyn Store>,
    free_lifetime_limit: i64,
    offset: FixedOffset,
}

impl QuotaLedger {
    pub fn new(store: Arc<dyn Store>, config: &QuotaConfig) -> Self {
        Self {
            store,
            free_lifetime_limit: config.free_lifetime_limit,
            offset: offset_from_minutes(config.utc_offset_minutes),
        }
    }

    /// The local day and month windows in effect at `now`
    pub fn period_at(&self, now: DateTime<Utc>) -> LocalPeriod {
        LocalPeriod::at(now, self.offset)
    }

    /// Check the account's policy and, if capacity remains, debit one creation atomically
    #[instrument(skip(self), fields(account_id = %abbrev_uuid(&account_id), kind = kind.as_str()))]
    pub async fn check_and_reserve(&self, account_id: AccountId, kind: CreationKind) -> QuotaDecision {
        let period = self.period_at(Utc::now());
        let rule = match self.resolve(account_id).await {
            Ok(rule) => rule,
            Err(decision) => return decision,
        };

        let request = ReservationDBRequest {
            account_id,
            kind,
            local_day: period.day,
            local_month: period.month,
            rule,
        };
        match self.store.reserve(&request).await {
            Ok(reservation) => {
                let decision = QuotaDecision::from_usage(rule, reservation.usage, reservation.granted, &period);
                if !decision.can_proceed {
                    debug!(reason = ?decision.reason, "Quota denied");
                    metrics::counter!("studio_quota_denials_total", "reason" => reason_label(decision.reason)).increment(1);
                }
                decision
            }
            Err(DbError::NotFound) => QuotaDecision::account_unavailable(),
            Err(e) => {
                error!(error = %e, "Quota reservation failed; denying request");
                metrics::counter!("studio_quota_denials_total", "reason" => "unavailable").increment(1);
                QuotaDecision::unavailable()
            }
        }
    }

    /// Report remaining capacity without debiting
    #[instrument(skip(self), fields(account_id = %abbrev_uuid(&account_id)))]
    pub async fn status(&self, account_id: AccountId) -> QuotaDecision {
        let period = self.period_at(Utc::now());
        let rule = match self.resolve(account_id).await {
            Ok(rule) => rule,
            Err(decision) => return decision,
        };

        match self.store.usage(account_id, period.day, period.month).await {
            Ok(usage) => QuotaDecision::from_usage(rule, usage, has_capacity(rule, usage), &period),
            Err(DbError::NotFound) => QuotaDecision::account_unavailable(),
            Err(e) => {
                error!(error = %e, "Quota status lookup failed");
                QuotaDecision::unavailable()
            }
        }
    }

    /// Load the account and pick its rule, or the denial that applies before any counter is read
    async fn resolve(&self, account_id: AccountId) -> Result<ReservationRule, QuotaDecision> {
        let account = match self.store.get_account(account_id).await {
            Ok(Some(account)) if account.is_active => account,
            Ok(_) => return Err(QuotaDecision::account_unavailable()),
            Err(e) => {
                error!(error = %e, "Account lookup failed during quota check");
                return Err(QuotaDecision::unavailable());
            }
        };
        self.rule_for(&account).await
    }

    async fn rule_for(&self, account: &AccountDBResponse) -> Result<ReservationRule, QuotaDecision> {
        let free = ReservationRule::Lifetime {
            limit: Some(self.free_lifetime_limit),
        };
        match account.tier {
            AccountTier::FreeConsumer => Ok(free),
            AccountTier::PremiumConsumer => match account.subscription_status {
                SubscriptionStatus::Active => Ok(ReservationRule::Lifetime { limit: None }),
                SubscriptionStatus::NoSubscription | SubscriptionStatus::PastDue | SubscriptionStatus::Canceled => Ok(free),
            },
            AccountTier::PlatformAdmin => Ok(ReservationRule::Lifetime { limit: None }),
            AccountTier::OrgLearner | AccountTier::Educator | AccountTier::OrgAdmin => {
                let Some(organization_id) = account.organization_id else {
                    warn!("Organization-tier account has no organization");
                    return Err(QuotaDecision::organization_unavailable());
                };
                match self.store.get_organization(organization_id).await {
                    Ok(Some(org)) if org.status == OrganizationStatus::Approved => Ok(ReservationRule::Windows {
                        organization_id,
                        daily_limit: org.daily_limit,
                        monthly_limit: org.monthly_limit,
                    }),
                    Ok(_) => Err(QuotaDecision::organization_unavailable()),
                    Err(e) => {
                        error!(error = %e, "Organization lookup failed during quota check");
                        Err(QuotaDecision::unavailable())
                    }
                }
            }
        }
    }
}

fn reason_label(reason: Option<DenialReason>) -> &'static str {
    match reason {
        Some(DenialReason::LifetimeExhausted) => "lifetime_exhausted",
        Some(DenialReason::DailyExhausted) => "daily_exhausted",
        Some(DenialReason::MonthlyExhausted) => "monthly_exhausted",
        Some(DenialReason::AccountUnavailable) => "account_unavailable",
        Some(DenialReason::OrganizationUnavailable) => "organization_unavailable",
        Some(DenialReason::Unavailable) => "unavailable",
        None => "none",
    }
}
