//! Ownership facts and the lookup that provides them.
//!
//! Facts are fetched from the persistence service on every check and never
//! cached: the world may change between two awaits.

use async_trait::async_trait;
use fieldcheck_core::{ClientId, InspectionId, TeamId, TemplateId, UserId};
use fieldcheck_platform_access::Role;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::context::AuthorizationContext;

/// Lifecycle state of an inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InspectionStatus {
    Draft,
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl InspectionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Scheduled => "scheduled",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Completed inspections are frozen.
    #[must_use]
    pub const fn is_editable(self) -> bool {
        !matches!(self, Self::Completed)
    }
}

impl fmt::Display for InspectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InspectionStatus {
    type Err = LookupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "scheduled" => Ok(Self::Scheduled),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(LookupError::Corrupt {
                reason: format!("unknown inspection status '{other}'"),
            }),
        }
    }
}

/// What authorization needs to know about an inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectionFacts {
    pub owner_id: UserId,
    pub team_id: Option<TeamId>,
    pub client_id: Option<ClientId>,
    pub status: InspectionStatus,
}

/// What authorization needs to know about a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateFacts {
    pub created_by: Option<UserId>,
    pub team_id: Option<TeamId>,
    pub is_public: bool,
}

/// Errors from ownership lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// The persistence service could not answer.
    Unavailable { reason: String },
    /// The stored record cannot be interpreted.
    Corrupt { reason: String },
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "ownership lookup unavailable: {reason}"),
            Self::Corrupt { reason } => write!(f, "ownership record unreadable: {reason}"),
        }
    }
}

impl std::error::Error for LookupError {}

/// Read-only ownership queries against the persistence service.
///
/// `Ok(None)` means the record does not exist.
#[async_trait]
pub trait OwnershipLookup: Send + Sync {
    async fn inspection(&self, id: &InspectionId) -> Result<Option<InspectionFacts>, LookupError>;

    async fn template(&self, id: &TemplateId) -> Result<Option<TemplateFacts>, LookupError>;
}

/// Manager: same team or same client. Inspector: owner only.
#[must_use]
pub fn inspection_visible(ctx: &AuthorizationContext, facts: &InspectionFacts) -> bool {
    match ctx.role {
        Role::Admin => true,
        Role::Manager => {
            ctx.in_team(facts.team_id.as_ref()) || ctx.in_client(facts.client_id.as_ref())
        }
        Role::Inspector => facts.owner_id == ctx.user_id,
    }
}

/// Visible and not completed.
#[must_use]
pub fn inspection_editable(ctx: &AuthorizationContext, facts: &InspectionFacts) -> bool {
    inspection_visible(ctx, facts) && facts.status.is_editable()
}

/// Public, owned by the principal, or scoped to the principal's team.
#[must_use]
pub fn template_visible(ctx: &AuthorizationContext, facts: &TemplateFacts) -> bool {
    facts.is_public
        || facts.created_by.as_ref() == Some(&ctx.user_id)
        || ctx.in_team(facts.team_id.as_ref())
}

/// Owner, a manager of the template's team, or an admin.
#[must_use]
pub fn template_editable(ctx: &AuthorizationContext, facts: &TemplateFacts) -> bool {
    match ctx.role {
        Role::Admin => true,
        Role::Manager if ctx.in_team(facts.team_id.as_ref()) => true,
        _ => facts.created_by.as_ref() == Some(&ctx.user_id),
    }
}
