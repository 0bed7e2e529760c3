//! Authorization error types.

use std::fmt;

use crate::context::{AuthorizationContext, ResourceType};
use crate::permission::Permission;

/// Authorization errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthzError {
    /// No signed-in principal to check.
    NotAuthenticated,
    /// Permission denied.
    PermissionDenied {
        /// The permission that was requested.
        permission: Permission,
        /// The resource type, when the check was scoped to one.
        resource_type: Option<ResourceType>,
        /// The resource id, when the check was scoped to one.
        resource_id: Option<String>,
    },
}

impl AuthzError {
    /// Denial of `permission` for the resource in `context`.
    #[must_use]
    pub fn denied(permission: Permission, context: &AuthorizationContext) -> Self {
        Self::PermissionDenied {
            permission,
            resource_type: context.resource_type,
            resource_id: context.resource_id.clone(),
        }
    }

    /// The missing permission, for denials.
    #[must_use]
    pub fn permission(&self) -> Option<Permission> {
        match self {
            Self::PermissionDenied { permission, .. } => Some(*permission),
            Self::NotAuthenticated => None,
        }
    }

    /// Message safe to show to the user. Never mentions the resource.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NotAuthenticated => "Please sign in to continue.",
            Self::PermissionDenied { .. } => "You do not have permission to perform this action.",
        }
    }
}

impl fmt::Display for AuthzError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAuthenticated => write!(f, "not authenticated"),
            Self::PermissionDenied {
                permission,
                resource_type: Some(resource_type),
                resource_id: Some(resource_id),
            } => write!(
                f,
                "permission '{permission}' denied on resource '{resource_type}:{resource_id}'"
            ),
            Self::PermissionDenied { permission, .. } => {
                write!(f, "permission '{permission}' denied")
            }
        }
    }
}

impl std::error::Error for AuthzError {}
