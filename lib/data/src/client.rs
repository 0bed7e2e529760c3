//! Client organisations.
//!
//! Managers see the clients of their own team (or the ones they created when
//! they have no team). A client outside that scope reads as missing.

use std::sync::Arc;

use fieldcheck_authz::{AuthorizationContext, Authorizer, LimitKind, Permission, ResourceType};
use fieldcheck_core::ClientId;
use fieldcheck_platform_access::User;
use serde_json::json;
use tracing::{info, instrument};

use crate::error::ServiceError;
use crate::guard::gated;
use crate::quota::ensure_capacity;
use crate::records::{Client, ClientUpdate, NewClient};
use crate::store::{Filter, Row, Store, Table, decode, encode};

#[derive(Clone)]
pub struct ClientService {
    store: Arc<dyn Store>,
    authorizer: Authorizer,
}

impl std::fmt::Debug for ClientService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientService").finish_non_exhaustive()
    }
}

fn in_scope(user: &User) -> Filter {
    if user.role().is_admin() {
        return Filter::new();
    }
    match user.team_id() {
        Some(team_id) => Filter::new().eq("team_id", team_id.as_str()),
        None => Filter::new().eq("created_by", user.id().as_str()),
    }
}

async fn fetch_scoped(store: &dyn Store, user: &User, id: &ClientId) -> Result<Row, ServiceError> {
    store
        .list(Table::Clients, &in_scope(user).eq("id", id.as_str()))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ServiceError::not_found("client", id.as_str()))
}

impl ClientService {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, authorizer: Authorizer) -> Self {
        Self { store, authorizer }
    }

    /// # Errors
    ///
    /// `Unauthorized` without `manage_clients`.
    #[instrument(skip(self, user), fields(user_id = %user.id()))]
    pub async fn list(&self, user: &User) -> Result<Vec<Client>, ServiceError> {
        let ctx = AuthorizationContext::for_user(user);
        let store = &*self.store;
        gated(&self.authorizer, &ctx, Permission::ManageClients, move || async move {
            let mut clients = store
                .list(Table::Clients, &in_scope(user))
                .await?
                .into_iter()
                .map(|row| decode::<Client>(Table::Clients, row))
                .collect::<Result<Vec<_>, _>>()?;
            clients.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
            Ok(clients)
        })
        .await
    }

    /// # Errors
    ///
    /// `Unauthorized` without `manage_clients`; `NotFound` outside scope.
    #[instrument(skip(self, user), fields(user_id = %user.id()))]
    pub async fn get(&self, user: &User, id: &ClientId) -> Result<Client, ServiceError> {
        let ctx = AuthorizationContext::for_user(user).with_resource(ResourceType::Client, id.as_str());
        let store = &*self.store;
        gated(&self.authorizer, &ctx, Permission::ManageClients, move || async move {
            Ok(decode(Table::Clients, fetch_scoped(store, user, id).await?)?)
        })
        .await
    }

    /// # Errors
    ///
    /// `Unauthorized` without `manage_clients`, `Invalid` for a blank name,
    /// `QuotaExceeded` once the plan's client allowance is used.
    #[instrument(skip(self, user, new), fields(user_id = %user.id()))]
    pub async fn create(&self, user: &User, new: NewClient) -> Result<Client, ServiceError> {
        let ctx = AuthorizationContext::for_user(user);
        let store = &*self.store;
        gated(&self.authorizer, &ctx, Permission::ManageClients, move || async move {
            let name = new.name.trim();
            if name.is_empty() {
                return Err(ServiceError::invalid("A client needs a name."));
            }
            let used = store.list(Table::Clients, &in_scope(user)).await?.len();
            ensure_capacity(user.plan(), LimitKind::Clients, used)?;

            let row = encode(
                Table::Clients,
                &json!({
                    "name": name,
                    "contact_email": new.contact_email,
                    "phone": new.phone,
                    "address": new.address,
                    "team_id": user.team_id(),
                    "created_by": user.id(),
                }),
            )?;
            let client: Client = decode(Table::Clients, store.insert(Table::Clients, row).await?)?;
            info!(client_id = %client.id, "client created");
            Ok(client)
        })
        .await
    }

    /// # Errors
    ///
    /// `Unauthorized` without `manage_clients`; `Invalid` for an empty update;
    /// `NotFound` outside scope.
    #[instrument(skip(self, user, update), fields(user_id = %user.id()))]
    pub async fn update(
        &self,
        user: &User,
        id: &ClientId,
        update: ClientUpdate,
    ) -> Result<Client, ServiceError> {
        if update == ClientUpdate::default() {
            return Err(ServiceError::invalid("Nothing to update."));
        }
        let ctx = AuthorizationContext::for_user(user).with_resource(ResourceType::Client, id.as_str());
        let store = &*self.store;
        gated(&self.authorizer, &ctx, Permission::ManageClients, move || async move {
            fetch_scoped(store, user, id).await?;
            let patch = encode(Table::Clients, &update)?;
            let row = store
                .update(Table::Clients, id.as_str(), patch)
                .await?
                .ok_or_else(|| ServiceError::not_found("client", id.as_str()))?;
            Ok(decode(Table::Clients, row)?)
        })
        .await
    }

    /// # Errors
    ///
    /// `Unauthorized` without `manage_clients`; `NotFound` outside scope.
    #[instrument(skip(self, user), fields(user_id = %user.id()))]
    pub async fn delete(&self, user: &User, id: &ClientId) -> Result<(), ServiceError> {
        let ctx = AuthorizationContext::for_user(user).with_resource(ResourceType::Client, id.as_str());
        let store = &*self.store;
        gated(&self.authorizer, &ctx, Permission::ManageClients, move || async move {
            fetch_scoped(store, user, id).await?;
            if !store.delete(Table::Clients, id.as_str()).await? {
                return Err(ServiceError::not_found("client", id.as_str()));
            }
            info!(client_id = %id, "client deleted");
            Ok(())
        })
        .await
    }
}
