//! Inspection templates.
//!
//! A template is visible if it is public, the user created it, or it belongs
//! to the user's team. Public visibility never grants edit.

use std::sync::Arc;

use fieldcheck_authz::{AuthorizationContext, Authorizer, AuthzError, LimitKind, Permission, ResourceType};
use fieldcheck_core::TemplateId;
use fieldcheck_platform_access::User;
use serde_json::json;
use tracing::{info, instrument};

use crate::error::ServiceError;
use crate::guard::gated;
use crate::quota::ensure_capacity;
use crate::records::{NewTemplate, Template, TemplateUpdate};
use crate::store::{Filter, Store, Table, decode, encode};

#[derive(Clone)]
pub struct TemplateService {
    store: Arc<dyn Store>,
    authorizer: Authorizer,
}

impl std::fmt::Debug for TemplateService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateService").finish_non_exhaustive()
    }
}

fn scoped(user: &User, id: &TemplateId) -> AuthorizationContext {
    AuthorizationContext::for_user(user).with_resource(ResourceType::Template, id.as_str())
}

fn visible_to(user: &User) -> Filter {
    if user.role().is_admin() {
        return Filter::new();
    }
    let mut options = vec![
        ("is_public", json!(true)),
        ("created_by", json!(user.id())),
    ];
    if let Some(team_id) = user.team_id() {
        options.push(("team_id", json!(team_id)));
    }
    Filter::new().any_of(options)
}

impl TemplateService {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, authorizer: Authorizer) -> Self {
        Self { store, authorizer }
    }

    /// Templates the user can see, by name.
    ///
    /// # Errors
    ///
    /// `Unauthorized` without `view_template`.
    #[instrument(skip(self, user), fields(user_id = %user.id()))]
    pub async fn list(&self, user: &User) -> Result<Vec<Template>, ServiceError> {
        let ctx = AuthorizationContext::for_user(user);
        let store = &*self.store;
        gated(&self.authorizer, &ctx, Permission::ViewTemplate, move || async move {
            let mut templates = store
                .list(Table::Templates, &visible_to(user))
                .await?
                .into_iter()
                .map(|row| decode::<Template>(Table::Templates, row))
                .collect::<Result<Vec<_>, _>>()?;
            templates.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
            Ok(templates)
        })
        .await
    }

    /// # Errors
    ///
    /// `Unauthorized` if the template is hidden from the user or missing.
    #[instrument(skip(self, user), fields(user_id = %user.id()))]
    pub async fn get(&self, user: &User, id: &TemplateId) -> Result<Template, ServiceError> {
        let ctx = scoped(user, id);
        let store = &*self.store;
        gated(&self.authorizer, &ctx, Permission::ViewTemplate, move || async move {
            let row = store
                .get(Table::Templates, id.as_str())
                .await?
                .ok_or_else(|| ServiceError::not_found("template", id.as_str()))?;
            Ok(decode(Table::Templates, row)?)
        })
        .await
    }

    /// Creates a template owned by the user and shared with their team.
    ///
    /// # Errors
    ///
    /// `Unauthorized` without `manage_templates`, `Invalid` for a blank name,
    /// `QuotaExceeded` once the plan's template allowance is used.
    #[instrument(skip(self, user, new), fields(user_id = %user.id()))]
    pub async fn create(&self, user: &User, new: NewTemplate) -> Result<Template, ServiceError> {
        let ctx = AuthorizationContext::for_user(user);
        let store = &*self.store;
        gated(&self.authorizer, &ctx, Permission::ManageTemplates, move || async move {
            let name = new.name.trim();
            if name.is_empty() {
                return Err(ServiceError::invalid("A template needs a name."));
            }

            let owned = Filter::new().eq("created_by", user.id().as_str());
            let used = store.list(Table::Templates, &owned).await?.len();
            ensure_capacity(user.plan(), LimitKind::Templates, used)?;

            let row = encode(
                Table::Templates,
                &json!({
                    "name": name,
                    "description": new.description,
                    "trade": new.trade,
                    "items": new.items,
                    "is_public": new.is_public,
                    "created_by": user.id(),
                    "team_id": user.team_id(),
                }),
            )?;
            let stored = store.insert(Table::Templates, row).await?;
            let template: Template = decode(Table::Templates, stored)?;
            info!(template_id = %template.id, "template created");
            Ok(template)
        })
        .await
    }

    /// # Errors
    ///
    /// `Unauthorized` unless the user owns the template, manages its team, or
    /// is an admin. Publishing a template (`is_public`) also needs
    /// `manage_templates`.
    #[instrument(skip(self, user, update), fields(user_id = %user.id()))]
    pub async fn update(
        &self,
        user: &User,
        id: &TemplateId,
        update: TemplateUpdate,
    ) -> Result<Template, ServiceError> {
        if update == TemplateUpdate::default() {
            return Err(ServiceError::invalid("Nothing to update."));
        }
        let ctx = scoped(user, id);
        if update.is_public == Some(true)
            && !self
                .authorizer
                .check_permission(&ctx, Permission::ManageTemplates)
                .await
        {
            return Err(AuthzError::denied(Permission::ManageTemplates, &ctx).into());
        }

        let store = &*self.store;
        gated(&self.authorizer, &ctx, Permission::EditTemplate, move || async move {
            let patch = encode(Table::Templates, &update)?;
            let row = store
                .update(Table::Templates, id.as_str(), patch)
                .await?
                .ok_or_else(|| ServiceError::not_found("template", id.as_str()))?;
            Ok(decode(Table::Templates, row)?)
        })
        .await
    }

    /// # Errors
    ///
    /// `Unauthorized` under the same rule as [`TemplateService::update`].
    #[instrument(skip(self, user), fields(user_id = %user.id()))]
    pub async fn delete(&self, user: &User, id: &TemplateId) -> Result<(), ServiceError> {
        let ctx = scoped(user, id);
        let store = &*self.store;
        gated(&self.authorizer, &ctx, Permission::EditTemplate, move || async move {
            if !store.delete(Table::Templates, id.as_str()).await? {
                return Err(ServiceError::not_found("template", id.as_str()));
            }
            info!(template_id = %id, "template deleted");
            Ok(())
        })
        .await
    }
}
