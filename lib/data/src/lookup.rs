//! Ownership lookups served from the store.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use fieldcheck_authz::{InspectionFacts, InspectionStatus, LookupError, OwnershipLookup, TemplateFacts};
use fieldcheck_core::{ClientId, InspectionId, TeamId, TemplateId, UserId};
use serde_json::Value;

use crate::store::{Row, Store, StoreError, Table};

/// Reads ownership facts straight from the store on every call.
#[derive(Clone)]
pub struct StoreOwnership {
    store: Arc<dyn Store>,
}

impl StoreOwnership {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

impl std::fmt::Debug for StoreOwnership {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreOwnership").finish_non_exhaustive()
    }
}

#[async_trait]
impl OwnershipLookup for StoreOwnership {
    async fn inspection(&self, id: &InspectionId) -> Result<Option<InspectionFacts>, LookupError> {
        let Some(row) = self
            .store
            .get(Table::Inspections, id.as_str())
            .await
            .map_err(lookup_error)?
        else {
            return Ok(None);
        };

        let owner = text(&row, "inspector_id").ok_or_else(|| LookupError::Corrupt {
            reason: format!("inspection {id} has no inspector"),
        })?;
        let status = text(&row, "status").ok_or_else(|| LookupError::Corrupt {
            reason: format!("inspection {id} has no status"),
        })?;

        Ok(Some(InspectionFacts {
            owner_id: UserId::from(owner),
            team_id: text(&row, "team_id").map(TeamId::from),
            client_id: text(&row, "client_id").map(ClientId::from),
            status: InspectionStatus::from_str(status)?,
        }))
    }

    async fn template(&self, id: &TemplateId) -> Result<Option<TemplateFacts>, LookupError> {
        let Some(row) = self
            .store
            .get(Table::Templates, id.as_str())
            .await
            .map_err(lookup_error)?
        else {
            return Ok(None);
        };

        let is_public = match row.get("is_public") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(other) => {
                return Err(LookupError::Corrupt {
                    reason: format!("template {id} has is_public = {other}"),
                });
            }
        };

        Ok(Some(TemplateFacts {
            created_by: text(&row, "created_by").map(UserId::from),
            team_id: text(&row, "team_id").map(TeamId::from),
            is_public,
        }))
    }
}

/// A non-empty string column.
fn text<'a>(row: &'a Row, column: &str) -> Option<&'a str> {
    row.get(column)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn lookup_error(error: StoreError) -> LookupError {
    match error {
        StoreError::Corrupt { reason, .. } => LookupError::Corrupt { reason },
        StoreError::Unavailable { reason } | StoreError::Rejected { reason } => {
            LookupError::Unavailable { reason }
        }
    }
}
