//! Errors returned by the data services.

use std::fmt;

use fieldcheck_authz::{AuthzError, LimitKind, Permission, ResourceType};

use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Nobody is signed in.
    NotAuthenticated,
    /// The principal lacks `permission`, on the named resource when the
    /// check was scoped to one.
    Unauthorized {
        permission: Permission,
        resource_type: Option<ResourceType>,
        resource_id: Option<String>,
    },
    /// The resource does not exist within the principal's scope.
    NotFound { resource: &'static str, id: String },
    /// The principal's plan does not allow another item of this kind.
    QuotaExceeded { kind: LimitKind, limit: u64 },
    /// The request itself is malformed.
    Invalid { reason: String },
    /// The persistence service failed.
    Store(StoreError),
}

impl ServiceError {
    pub(crate) fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource,
            id: id.into(),
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }

    /// Message safe to show to the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NotAuthenticated => "Please sign in to continue.".to_string(),
            Self::Unauthorized { .. } => {
                "You do not have permission to perform this action.".to_string()
            }
            Self::NotFound { resource, .. } => format!("That {resource} could not be found."),
            Self::QuotaExceeded { kind, limit } => format!(
                "Your plan allows {limit} {}. Upgrade to add more.",
                kind.as_str().replace('_', " ")
            ),
            Self::Invalid { reason } => reason.clone(),
            Self::Store(_) => "Something went wrong. Please try again.".to_string(),
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAuthenticated => write!(f, "not authenticated"),
            Self::Unauthorized {
                permission,
                resource_type: Some(resource_type),
                resource_id: Some(resource_id),
            } => write!(
                f,
                "missing permission '{permission}' on {resource_type} '{resource_id}'"
            ),
            Self::Unauthorized { permission, .. } => write!(f, "missing permission '{permission}'"),
            Self::NotFound { resource, id } => write!(f, "{resource} '{id}' not found"),
            Self::QuotaExceeded { kind, limit } => {
                write!(f, "plan limit reached for {kind} ({limit})")
            }
            Self::Invalid { reason } => write!(f, "invalid request: {reason}"),
            Self::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<AuthzError> for ServiceError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::NotAuthenticated => Self::NotAuthenticated,
            AuthzError::PermissionDenied {
                permission,
                resource_type,
                resource_id,
            } => Self::Unauthorized {
                permission,
                resource_type,
                resource_id,
            },
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denial_keeps_the_resource_out_of_the_user_message() {
        let err = ServiceError::from(AuthzError::PermissionDenied {
            permission: Permission::EditInspection,
            resource_type: Some(ResourceType::Inspection),
            resource_id: Some("i1".to_string()),
        });
        assert_eq!(
            err,
            ServiceError::Unauthorized {
                permission: Permission::EditInspection,
                resource_type: Some(ResourceType::Inspection),
                resource_id: Some("i1".to_string()),
            }
        );
        assert_eq!(
            err.to_string(),
            "missing permission 'edit_inspection' on inspection 'i1'"
        );
        assert!(!err.user_message().contains("i1"));
    }

    #[test]
    fn quota_message_names_the_limit() {
        let err = ServiceError::QuotaExceeded {
            kind: LimitKind::Templates,
            limit: 5,
        };
        assert_eq!(err.user_message(), "Your plan allows 5 templates. Upgrade to add more.");
    }
}
