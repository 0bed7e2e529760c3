//! Authorization for fieldcheck.
//!
//! This crate provides:
//! - The `Permission` set and the static role table
//! - Plan limits, quotas and feature gating
//! - Resource-contextual checks (`Authorizer`) backed by an `OwnershipLookup`
//! - The permission gate every data operation goes through

mod context;
mod engine;
mod error;
mod gate;
mod ownership;
mod permission;
mod plan;

pub use context::{AuthorizationContext, ResourceType};
pub use engine::{Authorizer, Decision};
pub use error::AuthzError;
pub use gate::{Guarded, authorized, with_permission};
pub use ownership::{
    InspectionFacts, InspectionStatus, LookupError, OwnershipLookup, TemplateFacts,
    inspection_editable, inspection_visible, template_editable, template_visible,
};
pub use permission::{
    Permission, UnknownPermission, has_all_permissions, has_any_permission, has_permission,
    permissions_for,
};
pub use plan::{
    Feature, InvalidQuota, LimitKind, PlanLimits, Quota, can_use_feature, is_within_limit,
    minimum_plan_for, remaining_quota, usage_percentage,
};
