//! Plan limits and feature gating.
//!
//! Limits are static per plan. A quota of [`Quota::Unlimited`] is written as
//! `-1` on the wire.

use fieldcheck_platform_access::{Plan, Role};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::permission::{Permission, has_permission};

/// A numeric cap, or no cap at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum Quota {
    Limited(u64),
    Unlimited,
}

impl Quota {
    #[must_use]
    pub fn is_unlimited(self) -> bool {
        matches!(self, Self::Unlimited)
    }
}

impl From<Quota> for i64 {
    fn from(quota: Quota) -> Self {
        match quota {
            Quota::Limited(n) => i64::try_from(n).unwrap_or(i64::MAX),
            Quota::Unlimited => -1,
        }
    }
}

/// Error for negative quota values other than the unlimited sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidQuota(pub i64);

impl fmt::Display for InvalidQuota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid quota {}: only -1 may be negative", self.0)
    }
}

impl std::error::Error for InvalidQuota {}

impl TryFrom<i64> for Quota {
    type Error = InvalidQuota;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::Unlimited),
            n if n >= 0 => Ok(Self::Limited(n.unsigned_abs())),
            n => Err(InvalidQuota(n)),
        }
    }
}

impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Limited(n) => write!(f, "{n}"),
            Self::Unlimited => f.write_str("unlimited"),
        }
    }
}

/// Countable resources a plan caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    StorageGb,
    TeamMembers,
    InspectionsPerMonth,
    Templates,
    Clients,
}

impl LimitKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StorageGb => "storage_gb",
            Self::TeamMembers => "team_members",
            Self::InspectionsPerMonth => "inspections_per_month",
            Self::Templates => "templates",
            Self::Clients => "clients",
        }
    }
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plan-gated product features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    VoiceAssistant,
    AdvancedAnalytics,
    CustomBranding,
    ApiAccess,
    PrioritySupport,
}

impl Feature {
    pub const ALL: [Feature; 5] = [
        Feature::VoiceAssistant,
        Feature::AdvancedAnalytics,
        Feature::CustomBranding,
        Feature::ApiAccess,
        Feature::PrioritySupport,
    ];

    /// Permission the user must also hold to use the feature, if any.
    #[must_use]
    pub const fn required_permission(self) -> Option<Permission> {
        match self {
            Self::VoiceAssistant => Some(Permission::UseVoiceAssistant),
            Self::AdvancedAnalytics => Some(Permission::ViewAnalytics),
            Self::CustomBranding | Self::ApiAccess | Self::PrioritySupport => None,
        }
    }
}

/// Capability table for one plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLimits {
    pub storage_gb: Quota,
    pub team_members: Quota,
    pub inspections_per_month: Quota,
    pub templates: Quota,
    pub clients: Quota,
    pub voice_assistant: bool,
    pub advanced_analytics: bool,
    pub custom_branding: bool,
    pub api_access: bool,
    pub priority_support: bool,
}

const STARTER: PlanLimits = PlanLimits {
    storage_gb: Quota::Limited(5),
    team_members: Quota::Limited(3),
    inspections_per_month: Quota::Limited(50),
    templates: Quota::Limited(10),
    clients: Quota::Limited(25),
    voice_assistant: false,
    advanced_analytics: false,
    custom_branding: false,
    api_access: false,
    priority_support: false,
};

const PROFESSIONAL: PlanLimits = PlanLimits {
    storage_gb: Quota::Limited(50),
    team_members: Quota::Limited(15),
    inspections_per_month: Quota::Limited(500),
    templates: Quota::Limited(100),
    clients: Quota::Limited(250),
    voice_assistant: true,
    advanced_analytics: true,
    custom_branding: true,
    api_access: false,
    priority_support: false,
};

const ENTERPRISE: PlanLimits = PlanLimits {
    storage_gb: Quota::Unlimited,
    team_members: Quota::Unlimited,
    inspections_per_month: Quota::Unlimited,
    templates: Quota::Unlimited,
    clients: Quota::Unlimited,
    voice_assistant: true,
    advanced_analytics: true,
    custom_branding: true,
    api_access: true,
    priority_support: true,
};

impl PlanLimits {
    #[must_use]
    pub const fn for_plan(plan: Plan) -> Self {
        match plan {
            Plan::Starter => STARTER,
            Plan::Professional => PROFESSIONAL,
            Plan::Enterprise => ENTERPRISE,
        }
    }

    #[must_use]
    pub const fn quota(&self, kind: LimitKind) -> Quota {
        match kind {
            LimitKind::StorageGb => self.storage_gb,
            LimitKind::TeamMembers => self.team_members,
            LimitKind::InspectionsPerMonth => self.inspections_per_month,
            LimitKind::Templates => self.templates,
            LimitKind::Clients => self.clients,
        }
    }

    #[must_use]
    pub const fn allows(&self, feature: Feature) -> bool {
        match feature {
            Feature::VoiceAssistant => self.voice_assistant,
            Feature::AdvancedAnalytics => self.advanced_analytics,
            Feature::CustomBranding => self.custom_branding,
            Feature::ApiAccess => self.api_access,
            Feature::PrioritySupport => self.priority_support,
        }
    }
}

/// True if the plan offers `feature` and `role` holds any permission it needs.
#[must_use]
pub fn can_use_feature(plan: Plan, role: Role, feature: Feature) -> bool {
    PlanLimits::for_plan(plan).allows(feature)
        && feature
            .required_permission()
            .is_none_or(|p| has_permission(role, p))
}

/// The cheapest plan offering `feature`.
#[must_use]
pub fn minimum_plan_for(feature: Feature) -> Option<Plan> {
    Plan::ALL
        .into_iter()
        .find(|plan| PlanLimits::for_plan(*plan).allows(feature))
}

/// True if one more unit fits: `current < limit`, or the quota is unlimited.
#[must_use]
pub fn is_within_limit(plan: Plan, kind: LimitKind, current: i64) -> bool {
    match PlanLimits::for_plan(plan).quota(kind) {
        Quota::Unlimited => true,
        Quota::Limited(limit) => i128::from(current) < i128::from(limit),
    }
}

/// Units left before the cap; zero once reached or exceeded.
#[must_use]
pub fn remaining_quota(plan: Plan, kind: LimitKind, current: i64) -> Quota {
    match PlanLimits::for_plan(plan).quota(kind) {
        Quota::Unlimited => Quota::Unlimited,
        Quota::Limited(limit) => {
            let left = (i128::from(limit) - i128::from(current)).max(0);
            Quota::Limited(u64::try_from(left).unwrap_or(u64::MAX))
        }
    }
}

/// Share of the cap in use, clamped to `0.0..=100.0`. Always zero when unlimited.
#[must_use]
pub fn usage_percentage(plan: Plan, kind: LimitKind, current: i64) -> f64 {
    match PlanLimits::for_plan(plan).quota(kind) {
        Quota::Unlimited => 0.0,
        Quota::Limited(0) => 100.0,
        #[allow(clippy::cast_precision_loss)]
        Quota::Limited(limit) => (current as f64 / limit as f64 * 100.0).clamp(0.0, 100.0),
    }
}
