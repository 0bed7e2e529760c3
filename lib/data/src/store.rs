//! The persistence-service contract.
//!
//! The hosted backend exposes tables of JSON rows. Rows stay untyped at this
//! seam; the services decode them into records.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;

/// One stored row.
pub type Row = Map<String, Value>;

/// Tables the application reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Inspections,
    InspectionTests,
    Templates,
    Teams,
    TeamMembers,
    Clients,
}

impl Table {
    pub const ALL: [Table; 6] = [
        Table::Inspections,
        Table::InspectionTests,
        Table::Templates,
        Table::Teams,
        Table::TeamMembers,
        Table::Clients,
    ];

    /// Table name on the backend.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inspections => "inspections",
            Self::InspectionTests => "inspection_tests",
            Self::Templates => "templates",
            Self::Teams => "teams",
            Self::TeamMembers => "team_members",
            Self::Clients => "clients",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single row condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// `column = value`. A missing column compares as null.
    Eq { column: String, value: Value },
    /// `column >= value`, for numbers and for strings compared lexically
    /// (RFC 3339 timestamps order correctly).
    Gte { column: String, value: Value },
    /// At least one `column = value` pair holds. Empty matches nothing.
    AnyOf(Vec<(String, Value)>),
}

impl Clause {
    fn matches(&self, row: &Row) -> bool {
        match self {
            Self::Eq { column, value } => field(row, column) == value,
            Self::Gte { column, value } => {
                matches!(compare(field(row, column), value), Some(Ordering::Greater | Ordering::Equal))
            }
            Self::AnyOf(options) => options.iter().any(|(column, value)| field(row, column) == value),
        }
    }
}

/// A conjunction of clauses. The empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<Clause>,
}

impl Filter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push(Clause::Eq {
            column: column.into(),
            value: value.into(),
        });
        self
    }

    #[must_use]
    pub fn gte(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push(Clause::Gte {
            column: column.into(),
            value: value.into(),
        });
        self
    }

    #[must_use]
    pub fn any_of<I, C, V>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = (C, V)>,
        C: Into<String>,
        V: Into<Value>,
    {
        self.clauses.push(Clause::AnyOf(
            options
                .into_iter()
                .map(|(c, v)| (c.into(), v.into()))
                .collect(),
        ));
        self
    }

    #[must_use]
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// True if `row` satisfies every clause.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        self.clauses.iter().all(|c| c.matches(row))
    }
}

fn field<'a>(row: &'a Row, column: &str) -> &'a Value {
    row.get(column).unwrap_or(&Value::Null)
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Errors from the persistence service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The service could not be reached or failed internally.
    Unavailable { reason: String },
    /// The service refused the write (constraint, policy).
    Rejected { reason: String },
    /// A stored row does not decode into the expected record.
    Corrupt { table: Table, reason: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "store unavailable: {reason}"),
            Self::Rejected { reason } => write!(f, "store rejected the write: {reason}"),
            Self::Corrupt { table, reason } => write!(f, "unreadable row in '{table}': {reason}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Table-scoped CRUD over the hosted backend.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetches one row by id.
    async fn get(&self, table: Table, id: &str) -> Result<Option<Row>, StoreError>;

    /// Lists rows matching `filter`.
    async fn list(&self, table: Table, filter: &Filter) -> Result<Vec<Row>, StoreError>;

    /// Inserts `row` and returns it as stored, with server-assigned fields
    /// (`id`, `created_at`) filled in.
    async fn insert(&self, table: Table, row: Row) -> Result<Row, StoreError>;

    /// Merges `patch` into row `id`. `Ok(None)` if there is no such row.
    async fn update(&self, table: Table, id: &str, patch: Row) -> Result<Option<Row>, StoreError>;

    /// Deletes row `id`. Returns false if there was no such row.
    async fn delete(&self, table: Table, id: &str) -> Result<bool, StoreError>;
}

/// Decodes a row into a record.
///
/// # Errors
///
/// `StoreError::Corrupt` if the row does not have the record's shape.
pub fn decode<T: DeserializeOwned>(table: Table, row: Row) -> Result<T, StoreError> {
    serde_json::from_value(Value::Object(row)).map_err(|e| StoreError::Corrupt {
        table,
        reason: e.to_string(),
    })
}

/// Encodes a value that serializes to a JSON object as a row.
///
/// # Errors
///
/// `StoreError::Rejected` if the value is not an object.
pub fn encode<T: serde::Serialize>(table: Table, value: &T) -> Result<Row, StoreError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(row)) => Ok(row),
        Ok(other) => Err(StoreError::Rejected {
            reason: format!("'{table}' rows must be objects, got {other}"),
        }),
        Err(e) => Err(StoreError::Rejected {
            reason: e.to_string(),
        }),
    }
}
