//! Teams and their members.
//!
//! Everything here needs `manage_team` on the team in question: managers
//! act on their own team only, admins on any.

use std::sync::Arc;

use fieldcheck_authz::{AuthorizationContext, Authorizer, LimitKind, Permission, ResourceType};
use fieldcheck_core::TeamId;
use fieldcheck_platform_access::{Role, User};
use serde_json::json;
use tracing::{info, instrument};

use crate::error::ServiceError;
use crate::guard::gated;
use crate::quota::ensure_capacity;
use crate::records::{NewTeamMember, Team, TeamMember};
use crate::store::{Filter, Row, Store, Table, decode, encode};

#[derive(Clone)]
pub struct TeamService {
    store: Arc<dyn Store>,
    authorizer: Authorizer,
}

impl std::fmt::Debug for TeamService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeamService").finish_non_exhaustive()
    }
}

fn scoped(user: &User, team_id: &TeamId) -> AuthorizationContext {
    AuthorizationContext::for_user(user).with_resource(ResourceType::Team, team_id.as_str())
}

/// Nobody hands out a role above their own.
fn check_role_ceiling(user: &User, role: Role) -> Result<(), ServiceError> {
    if user.role().has_role_or_higher(role) {
        Ok(())
    } else {
        Err(ServiceError::invalid(format!(
            "You cannot grant the {} role.",
            role.label()
        )))
    }
}

/// Nobody changes or removes a member who outranks them.
fn check_outranks(user: &User, member: &TeamMember) -> Result<(), ServiceError> {
    if user.role().has_role_or_higher(member.role) {
        Ok(())
    } else {
        Err(ServiceError::invalid(format!(
            "You cannot change a member with the {} role.",
            member.role.label()
        )))
    }
}

fn in_team(row: &Row, team_id: &TeamId) -> bool {
    row.get("team_id").and_then(|v| v.as_str()) == Some(team_id.as_str())
}

async fn fetch_member(
    store: &dyn Store,
    team_id: &TeamId,
    member_id: &str,
) -> Result<TeamMember, ServiceError> {
    let row = store
        .get(Table::TeamMembers, member_id)
        .await?
        .filter(|row| in_team(row, team_id))
        .ok_or_else(|| ServiceError::not_found("team member", member_id))?;
    Ok(decode(Table::TeamMembers, row)?)
}

impl TeamService {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, authorizer: Authorizer) -> Self {
        Self { store, authorizer }
    }

    /// # Errors
    ///
    /// `Unauthorized` without `manage_team`, `Invalid` for a blank name.
    #[instrument(skip(self, user), fields(user_id = %user.id()))]
    pub async fn create(&self, user: &User, name: &str) -> Result<Team, ServiceError> {
        let ctx = AuthorizationContext::for_user(user);
        let store = &*self.store;
        gated(&self.authorizer, &ctx, Permission::ManageTeam, move || async move {
            let name = name.trim();
            if name.is_empty() {
                return Err(ServiceError::invalid("A team needs a name."));
            }
            let row = encode(Table::Teams, &json!({"name": name, "owner_id": user.id()}))?;
            let team: Team = decode(Table::Teams, store.insert(Table::Teams, row).await?)?;
            info!(team_id = %team.id, "team created");
            Ok(team)
        })
        .await
    }

    /// # Errors
    ///
    /// `Unauthorized` unless the user manages `team_id`.
    #[instrument(skip(self, user), fields(user_id = %user.id()))]
    pub async fn get(&self, user: &User, team_id: &TeamId) -> Result<Team, ServiceError> {
        let ctx = scoped(user, team_id);
        let store = &*self.store;
        gated(&self.authorizer, &ctx, Permission::ManageTeam, move || async move {
            let row = store
                .get(Table::Teams, team_id.as_str())
                .await?
                .ok_or_else(|| ServiceError::not_found("team", team_id.as_str()))?;
            Ok(decode(Table::Teams, row)?)
        })
        .await
    }

    /// Members and pending invitations, oldest first.
    ///
    /// # Errors
    ///
    /// `Unauthorized` unless the user manages `team_id`.
    #[instrument(skip(self, user), fields(user_id = %user.id()))]
    pub async fn members(&self, user: &User, team_id: &TeamId) -> Result<Vec<TeamMember>, ServiceError> {
        let ctx = scoped(user, team_id);
        let store = &*self.store;
        gated(&self.authorizer, &ctx, Permission::ManageTeam, move || async move {
            let mut members = store
                .list(Table::TeamMembers, &Filter::new().eq("team_id", team_id.as_str()))
                .await?
                .into_iter()
                .map(|row| decode::<TeamMember>(Table::TeamMembers, row))
                .collect::<Result<Vec<_>, _>>()?;
            members.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            Ok(members)
        })
        .await
    }

    /// Invites someone to the team.
    ///
    /// # Errors
    ///
    /// `Unauthorized` unless the user manages `team_id`; `Invalid` for a bad
    /// email, an existing member, or a role above the inviter's;
    /// `QuotaExceeded` when the team is full for the plan.
    #[instrument(skip(self, user, invite), fields(user_id = %user.id(), role = %invite.role))]
    pub async fn invite(
        &self,
        user: &User,
        team_id: &TeamId,
        invite: NewTeamMember,
    ) -> Result<TeamMember, ServiceError> {
        let ctx = scoped(user, team_id);
        let store = &*self.store;
        gated(&self.authorizer, &ctx, Permission::ManageTeam, move || async move {
            check_role_ceiling(user, invite.role)?;
            let email = invite.email.trim().to_lowercase();
            if !email.contains('@') {
                return Err(ServiceError::invalid("Enter a valid email address."));
            }

            let members = store
                .list(Table::TeamMembers, &Filter::new().eq("team_id", team_id.as_str()))
                .await?;
            if members
                .iter()
                .any(|m| m.get("email").and_then(|v| v.as_str()) == Some(email.as_str()))
            {
                return Err(ServiceError::invalid("That person is already on the team."));
            }
            ensure_capacity(user.plan(), LimitKind::TeamMembers, members.len())?;

            let row = encode(
                Table::TeamMembers,
                &json!({
                    "team_id": team_id,
                    "email": email,
                    "full_name": invite.full_name,
                    "role": invite.role,
                    "invited_by": user.id(),
                }),
            )?;
            let member: TeamMember = decode(Table::TeamMembers, store.insert(Table::TeamMembers, row).await?)?;
            info!(member_id = %member.id, "team member invited");
            Ok(member)
        })
        .await
    }

    /// # Errors
    ///
    /// `Unauthorized` unless the user manages `team_id`; `Invalid` for a role
    /// above the user's own or a member who outranks the user; `NotFound` if
    /// the member is not on the team.
    #[instrument(skip(self, user), fields(user_id = %user.id()))]
    pub async fn change_role(
        &self,
        user: &User,
        team_id: &TeamId,
        member_id: &str,
        role: Role,
    ) -> Result<TeamMember, ServiceError> {
        let ctx = scoped(user, team_id);
        let store = &*self.store;
        gated(&self.authorizer, &ctx, Permission::ManageTeam, move || async move {
            check_role_ceiling(user, role)?;
            let member = fetch_member(store, team_id, member_id).await?;
            check_outranks(user, &member)?;
            let patch = encode(Table::TeamMembers, &json!({"role": role}))?;
            let row = store
                .update(Table::TeamMembers, member_id, patch)
                .await?
                .ok_or_else(|| ServiceError::not_found("team member", member_id))?;
            Ok(decode(Table::TeamMembers, row)?)
        })
        .await
    }

    /// # Errors
    ///
    /// `Unauthorized` unless the user manages `team_id`; `Invalid` for a
    /// member who outranks the user; `NotFound` if the member is not on the
    /// team.
    #[instrument(skip(self, user), fields(user_id = %user.id()))]
    pub async fn remove_member(
        &self,
        user: &User,
        team_id: &TeamId,
        member_id: &str,
    ) -> Result<(), ServiceError> {
        let ctx = scoped(user, team_id);
        let store = &*self.store;
        gated(&self.authorizer, &ctx, Permission::ManageTeam, move || async move {
            let member = fetch_member(store, team_id, member_id).await?;
            check_outranks(user, &member)?;
            if !store.delete(Table::TeamMembers, member_id).await? {
                return Err(ServiceError::not_found("team member", member_id));
            }
            info!(member_id, "team member removed");
            Ok(())
        })
        .await
    }
}
