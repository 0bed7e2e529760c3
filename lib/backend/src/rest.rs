//! Persistence store over the hosted table API.
//!
//! Every table is a `/rest/v1/{table}` resource. Filters become query
//! parameters in the `column=op.value` dialect and writes ask for the stored
//! representation back. Requests are authorised with the signed-in user's
//! access token, read from the published session state, so the backend's
//! row-level policies see the same principal the permission gate did.

use async_trait::async_trait;
use fieldcheck_data::{Clause, Filter, Row, Store, StoreError, Table};
use fieldcheck_platform_access::SessionState;
use reqwest::{Method, RequestBuilder};
use serde_json::Value;
use tokio::sync::watch;
use tracing::instrument;

use crate::config::BackendConfig;
use crate::error::BackendError;
use crate::http::HttpClient;

pub struct RestStore {
    client: HttpClient,
    session: watch::Receiver<SessionState>,
}

impl std::fmt::Debug for RestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestStore")
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

/// Renders a filter value in the query dialect.
fn literal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Values inside `or=(...)` must be quoted when they contain reserved characters.
fn quoted(value: &Value) -> String {
    let raw = literal(value);
    if raw.contains([',', '.', ':', '(', ')', '"']) {
        format!("\"{}\"", raw.replace('"', "\\\""))
    } else {
        raw
    }
}

fn equality(value: &Value) -> String {
    match value {
        Value::Null => "is.null".to_string(),
        other => format!("eq.{}", literal(other)),
    }
}

/// Query parameters for `filter`. An empty `AnyOf` can match nothing, so it
/// returns `None` and the caller skips the request.
pub(crate) fn query_params(filter: &Filter) -> Option<Vec<(String, String)>> {
    let mut params = Vec::with_capacity(filter.clauses().len());
    for clause in filter.clauses() {
        match clause {
            Clause::Eq { column, value } => params.push((column.clone(), equality(value))),
            Clause::Gte { column, value } => {
                params.push((column.clone(), format!("gte.{}", literal(value))));
            }
            Clause::AnyOf(options) if options.is_empty() => return None,
            Clause::AnyOf(options) => {
                let alternatives = options
                    .iter()
                    .map(|(column, value)| match value {
                        Value::Null => format!("{column}.is.null"),
                        other => format!("{column}.eq.{}", quoted(other)),
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                params.push(("or".to_string(), format!("({alternatives})")));
            }
        }
    }
    Some(params)
}

fn id_param(id: &str) -> [(&'static str, String); 1] {
    [("id", format!("eq.{id}"))]
}

impl RestStore {
    /// # Errors
    ///
    /// `BackendError::InvalidConfig` if the settings cannot be used.
    pub fn new(
        config: &BackendConfig,
        session: watch::Receiver<SessionState>,
    ) -> fieldcheck_core::Result<Self, BackendError> {
        Ok(Self {
            client: HttpClient::new(config)?,
            session,
        })
    }

    fn path(table: Table) -> String {
        format!("/rest/v1/{table}")
    }

    fn request(&self, method: Method, table: Table) -> RequestBuilder {
        let token = self.session.borrow().access_token().map(str::to_string);
        self.client.request(method, &Self::path(table), token.as_deref())
    }

    async fn rows(&self, table: Table, request: RequestBuilder) -> Result<Vec<Row>, StoreError> {
        let endpoint = Self::path(table);
        let body: Vec<Value> = self.client.json(&endpoint, request).await.map_err(|e| match e {
            BackendError::Decode { reason, .. } => StoreError::Corrupt { table, reason },
            other => StoreError::from(other),
        })?;
        body.into_iter()
            .map(|value| match value {
                Value::Object(row) => Ok(row),
                other => Err(StoreError::Corrupt {
                    table,
                    reason: format!("expected an object, got {other}"),
                }),
            })
            .collect()
    }
}

#[async_trait]
impl Store for RestStore {
    #[instrument(skip(self))]
    async fn get(&self, table: Table, id: &str) -> Result<Option<Row>, StoreError> {
        let request = self.request(Method::GET, table).query(&id_param(id));
        Ok(self.rows(table, request).await?.into_iter().next())
    }

    #[instrument(skip(self, filter))]
    async fn list(&self, table: Table, filter: &Filter) -> Result<Vec<Row>, StoreError> {
        let Some(params) = query_params(filter) else {
            return Ok(Vec::new());
        };
        let request = self
            .request(Method::GET, table)
            .query(&[("select", "*")])
            .query(&params);
        self.rows(table, request).await
    }

    #[instrument(skip(self, row))]
    async fn insert(&self, table: Table, row: Row) -> Result<Row, StoreError> {
        let request = self
            .request(Method::POST, table)
            .header("Prefer", "return=representation")
            .json(&row);
        self.rows(table, request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Corrupt {
                table,
                reason: "insert returned no row".to_string(),
            })
    }

    #[instrument(skip(self, patch))]
    async fn update(&self, table: Table, id: &str, mut patch: Row) -> Result<Option<Row>, StoreError> {
        patch.remove("id");
        let request = self
            .request(Method::PATCH, table)
            .query(&id_param(id))
            .header("Prefer", "return=representation")
            .json(&patch);
        Ok(self.rows(table, request).await?.into_iter().next())
    }

    #[instrument(skip(self))]
    async fn delete(&self, table: Table, id: &str) -> Result<bool, StoreError> {
        let request = self
            .request(Method::DELETE, table)
            .query(&id_param(id))
            .header("Prefer", "return=representation");
        Ok(!self.rows(table, request).await?.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(filter: &Filter) -> Vec<(String, String)> {
        query_params(filter).expect("matchable filter")
    }

    #[test]
    fn equality_and_range_clauses() {
        let filter = Filter::new()
            .eq("created_by", "M1")
            .eq("is_public", true)
            .eq("team_id", Value::Null)
            .gte("created_at", "2026-10-01T00:00:00.000000Z");
        assert_eq!(
            params(&filter),
            [
                ("created_by".to_string(), "eq.M1".to_string()),
                ("is_public".to_string(), "eq.true".to_string()),
                ("team_id".to_string(), "is.null".to_string()),
                (
                    "created_at".to_string(),
                    "gte.2026-10-01T00:00:00.000000Z".to_string()
                ),
            ]
        );
    }

    #[test]
    fn any_of_becomes_a_quoted_or_group() {
        let filter = Filter::new().any_of([
            ("team_id", json!("team-a")),
            ("client_id", json!("acme.co")),
            ("is_public", json!(true)),
        ]);
        assert_eq!(
            params(&filter),
            [(
                "or".to_string(),
                "(team_id.eq.team-a,client_id.eq.\"acme.co\",is_public.eq.true)".to_string()
            )]
        );
    }

    #[test]
    fn empty_any_of_matches_nothing() {
        let filter = Filter::new().eq("status", "draft").any_of(Vec::<(String, Value)>::new());
        assert_eq!(query_params(&filter), None);
    }

    #[test]
    fn empty_filter_has_no_params() {
        assert_eq!(params(&Filter::new()), Vec::<(String, String)>::new());
    }

    #[tokio::test]
    async fn listing_an_unmatchable_filter_skips_the_request() {
        let (_tx, rx) = watch::channel(SessionState::anonymous(None));
        // Port 9 is discard; reaching the network would fail the call.
        let store = RestStore::new(&BackendConfig::new("http://127.0.0.1:9", "anon"), rx)
            .expect("store");
        let rows = store
            .list(Table::Clients, &Filter::new().any_of(Vec::<(String, Value)>::new()))
            .await
            .expect("no request made");
        assert!(rows.is_empty());
    }
}
