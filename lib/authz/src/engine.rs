//! Resource-contextual permission checks.

use std::fmt;
use std::sync::Arc;

use fieldcheck_core::{InspectionId, TeamId, TemplateId};
use fieldcheck_platform_access::Role;
use rootcause::prelude::Report;
use tracing::{debug, instrument, warn};

use crate::context::{AuthorizationContext, ResourceType, Scope};
use crate::error::AuthzError;
use crate::ownership::{
    LookupError, OwnershipLookup, inspection_editable, inspection_visible, template_editable,
    template_visible,
};
use crate::permission::{Permission, has_permission};

/// Outcome of one permission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied,
    /// Ownership facts could not be fetched; treated as a denial.
    Unresolved { reason: String },
}

impl Decision {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    fn from_bool(allowed: bool) -> Self {
        if allowed { Self::Allowed } else { Self::Denied }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allowed => f.write_str("allowed"),
            Self::Denied => f.write_str("denied"),
            Self::Unresolved { reason } => write!(f, "unresolved ({reason})"),
        }
    }
}

/// Evaluates permission checks, resolving ownership through an [`OwnershipLookup`].
#[derive(Clone)]
pub struct Authorizer {
    lookup: Arc<dyn OwnershipLookup>,
}

impl fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authorizer").finish_non_exhaustive()
    }
}

impl Authorizer {
    #[must_use]
    pub fn new(lookup: Arc<dyn OwnershipLookup>) -> Self {
        Self { lookup }
    }

    /// Decides whether `context` grants `permission`.
    ///
    /// Admins are always allowed. Inspection, template and team permissions
    /// scoped to a resource consult ownership; everything else, including
    /// unscoped checks, uses the static role table.
    #[instrument(
        skip(self, context),
        fields(user_id = %context.user_id, role = %context.role, permission = %permission)
    )]
    pub async fn evaluate(&self, context: &AuthorizationContext, permission: Permission) -> Decision {
        let decision = if context.role.is_admin() {
            Decision::Allowed
        } else {
            match permission {
                Permission::ViewInspection | Permission::EditInspection => {
                    self.inspection_rule(context, permission).await
                }
                Permission::ViewTemplate | Permission::EditTemplate => {
                    self.template_rule(context, permission).await
                }
                Permission::ManageTeam => team_rule(context),
                _ => Decision::from_bool(has_permission(context.role, permission)),
            }
        };

        match &decision {
            Decision::Unresolved { reason } => {
                warn!(reason = %reason, "ownership lookup failed; denying");
            }
            other => debug!(decision = %other, "permission check"),
        }
        decision
    }

    /// Fail-closed boolean form of [`evaluate`](Self::evaluate).
    pub async fn check_permission(&self, context: &AuthorizationContext, permission: Permission) -> bool {
        self.evaluate(context, permission).await.is_allowed()
    }

    /// Checks permission and returns an error if denied.
    pub async fn require_permission(
        &self,
        context: &AuthorizationContext,
        permission: Permission,
    ) -> Result<(), Report<AuthzError>> {
        if !self.check_permission(context, permission).await {
            return Err(AuthzError::denied(permission, context).into());
        }
        Ok(())
    }

    async fn inspection_rule(&self, context: &AuthorizationContext, permission: Permission) -> Decision {
        let id = match context.scope(ResourceType::Inspection) {
            Scope::Unscoped => return Decision::from_bool(has_permission(context.role, permission)),
            Scope::Mismatch => return Decision::Denied,
            Scope::Resource(id) => InspectionId::from(id),
        };

        match self.lookup.inspection(&id).await {
            Ok(Some(facts)) if permission == Permission::EditInspection => {
                Decision::from_bool(inspection_editable(context, &facts))
            }
            Ok(Some(facts)) => Decision::from_bool(inspection_visible(context, &facts)),
            Ok(None) => Decision::Denied,
            Err(e) => unresolved(&e),
        }
    }

    async fn template_rule(&self, context: &AuthorizationContext, permission: Permission) -> Decision {
        let id = match context.scope(ResourceType::Template) {
            Scope::Unscoped => return Decision::from_bool(has_permission(context.role, permission)),
            Scope::Mismatch => return Decision::Denied,
            Scope::Resource(id) => TemplateId::from(id),
        };

        match self.lookup.template(&id).await {
            Ok(Some(facts)) if permission == Permission::EditTemplate => {
                Decision::from_bool(template_editable(context, &facts))
            }
            Ok(Some(facts)) => Decision::from_bool(template_visible(context, &facts)),
            Ok(None) => Decision::Denied,
            Err(e) => unresolved(&e),
        }
    }
}

fn team_rule(context: &AuthorizationContext) -> Decision {
    match (context.role, context.scope(ResourceType::Team)) {
        (Role::Inspector, _) | (_, Scope::Mismatch) => Decision::Denied,
        (role, Scope::Unscoped) => Decision::from_bool(has_permission(role, Permission::ManageTeam)),
        (_, Scope::Resource(id)) => Decision::from_bool(context.in_team(Some(&TeamId::from(id)))),
    }
}

fn unresolved(error: &LookupError) -> Decision {
    Decision::Unresolved {
        reason: error.to_string(),
    }
}
