//! Authorization context: who is asking, about what.

use fieldcheck_core::{ClientId, TeamId, UserId};
use fieldcheck_platform_access::{Role, User};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kinds of resource a permission check can be scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Inspection,
    InspectionTest,
    Template,
    Team,
    Client,
}

impl ResourceType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inspection => "inspection",
            Self::InspectionTest => "inspection_test",
            Self::Template => "template",
            Self::Team => "team",
            Self::Client => "client",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The principal and optional resource for one permission check.
///
/// Built fresh for every check and never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationContext {
    pub user_id: UserId,
    pub role: Role,
    pub team_id: Option<TeamId>,
    pub client_id: Option<ClientId>,
    pub resource_id: Option<String>,
    pub resource_type: Option<ResourceType>,
}

impl AuthorizationContext {
    /// Context for `user` with no resource attached.
    #[must_use]
    pub fn for_user(user: &User) -> Self {
        Self {
            user_id: user.id().clone(),
            role: user.role(),
            team_id: user.team_id().cloned(),
            client_id: user.client_id().cloned(),
            resource_id: None,
            resource_type: None,
        }
    }

    /// Scopes the check to one resource.
    #[must_use]
    pub fn with_resource(mut self, resource_type: ResourceType, id: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type);
        self.resource_id = Some(id.into());
        self
    }

    /// Resource scope as seen by a rule expecting `expected`.
    pub(crate) fn scope(&self, expected: ResourceType) -> Scope<'_> {
        match (self.resource_type, self.resource_id.as_deref()) {
            (Some(actual), Some(id)) if actual == expected => Scope::Resource(id),
            (_, Some(_)) => Scope::Mismatch,
            (_, None) => Scope::Unscoped,
        }
    }

    /// True if the principal belongs to `team_id`.
    #[must_use]
    pub fn in_team(&self, team_id: Option<&TeamId>) -> bool {
        matches!((self.team_id.as_ref(), team_id), (Some(mine), Some(theirs)) if mine == theirs)
    }

    /// True if the principal belongs to `client_id`.
    #[must_use]
    pub fn in_client(&self, client_id: Option<&ClientId>) -> bool {
        matches!((self.client_id.as_ref(), client_id), (Some(mine), Some(theirs)) if mine == theirs)
    }
}

/// How a context relates to the resource type a rule is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope<'a> {
    /// No resource attached; the static table decides.
    Unscoped,
    /// A resource of the expected type.
    Resource(&'a str),
    /// A resource of some other type.
    Mismatch,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> AuthorizationContext {
        let user = User::new(UserId::from("m1"), "m@x.io".to_string(), "M".to_string())
            .with_role(Role::Manager)
            .with_team(Some(TeamId::from("t1")));
        AuthorizationContext::for_user(&user)
    }

    #[test]
    fn built_from_user() {
        let ctx = manager();
        assert_eq!(ctx.user_id.as_str(), "m1");
        assert_eq!(ctx.role, Role::Manager);
        assert!(ctx.resource_id.is_none());
        assert_eq!(ctx.scope(ResourceType::Inspection), Scope::Unscoped);
    }

    #[test]
    fn scope_checks_type() {
        let ctx = manager().with_resource(ResourceType::Template, "tpl-1");
        assert_eq!(ctx.scope(ResourceType::Template), Scope::Resource("tpl-1"));
        assert_eq!(ctx.scope(ResourceType::Inspection), Scope::Mismatch);
    }

    #[test]
    fn untyped_resource_id_is_a_mismatch() {
        let mut ctx = manager();
        ctx.resource_id = Some("insp-1".to_string());
        assert_eq!(ctx.scope(ResourceType::Inspection), Scope::Mismatch);
        assert_eq!(ctx.scope(ResourceType::Template), Scope::Mismatch);
    }

    #[test]
    fn missing_ids_never_match() {
        let ctx = manager();
        assert!(ctx.in_team(Some(&TeamId::from("t1"))));
        assert!(!ctx.in_team(None));
        assert!(!ctx.in_client(Some(&ClientId::from("c1"))));
    }
}
