//! Data services for fieldcheck.
//!
//! This crate provides:
//! - The [`Store`] contract the persistence backend implements, with an
//!   in-memory [`MemoryStore`]
//! - Typed records for inspections, tests, templates, teams and clients
//! - Services whose every operation passes the permission gate before the
//!   store is touched
//! - [`StoreOwnership`], the ownership lookup the authorizer consults
//!
//! Build the services through [`Services`] so they share one authorizer:
//!
//! ```
//! use std::sync::Arc;
//! use fieldcheck_data::{MemoryStore, Services};
//!
//! let services = Services::new(Arc::new(MemoryStore::new()));
//! let _ = services.inspections();
//! ```

mod client;
mod error;
mod guard;
mod inspection;
mod lookup;
mod memory;
mod quota;
mod records;
mod store;
mod team;
mod template;

#[cfg(test)]
mod fixtures;

use std::sync::Arc;

use fieldcheck_authz::Authorizer;

pub use client::ClientService;
pub use error::ServiceError;
pub use inspection::InspectionService;
pub use lookup::StoreOwnership;
pub use memory::MemoryStore;
pub use records::{
    Client, ClientUpdate, Inspection, InspectionTest, InspectionUpdate, NewClient, NewInspection,
    NewInspectionTest, NewTeamMember, NewTemplate, Team, TeamMember, Template, TemplateUpdate,
    TestOutcome,
};
pub use store::{Clause, Filter, Row, Store, StoreError, Table, decode, encode};
pub use team::TeamService;
pub use template::TemplateService;

/// The data services over one store, sharing one authorizer.
#[derive(Debug, Clone)]
pub struct Services {
    authorizer: Authorizer,
    inspections: InspectionService,
    templates: TemplateService,
    teams: TeamService,
    clients: ClientService,
}

impl Services {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        let authorizer = Authorizer::new(Arc::new(StoreOwnership::new(store.clone())));
        Self {
            inspections: InspectionService::new(store.clone(), authorizer.clone()),
            templates: TemplateService::new(store.clone(), authorizer.clone()),
            teams: TeamService::new(store.clone(), authorizer.clone()),
            clients: ClientService::new(store, authorizer.clone()),
            authorizer,
        }
    }

    #[must_use]
    pub fn authorizer(&self) -> &Authorizer {
        &self.authorizer
    }

    #[must_use]
    pub fn inspections(&self) -> &InspectionService {
        &self.inspections
    }

    #[must_use]
    pub fn templates(&self) -> &TemplateService {
        &self.templates
    }

    #[must_use]
    pub fn teams(&self) -> &TeamService {
        &self.teams
    }

    #[must_use]
    pub fn clients(&self) -> &ClientService {
        &self.clients
    }
}
