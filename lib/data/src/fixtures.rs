//! Shared test users and a seeded store.
//!
//! Team A: manager M1, inspectors U1 and U2. Team B: manager M2, inspector U3.

use std::sync::Arc;

use fieldcheck_core::{TeamId, UserId};
use fieldcheck_platform_access::{Role, User};
use serde_json::json;

use crate::Services;
use crate::memory::MemoryStore;
use crate::store::Table;

fn user(id: &str, role: Role, team: Option<&str>) -> User {
    User::new(UserId::from(id), format!("{id}@example.com"), id.to_string())
        .with_role(role)
        .with_team(team.map(TeamId::from))
}

pub(crate) fn inspector(id: &str) -> User {
    user(id, Role::Inspector, Some("team-a"))
}

pub(crate) fn manager(id: &str) -> User {
    user(id, Role::Manager, Some("team-a"))
}

pub(crate) fn admin() -> User {
    user("A1", Role::Admin, None)
}

pub(crate) fn services(store: &Arc<MemoryStore>) -> Services {
    Services::new(store.clone())
}

pub(crate) fn seeded_store() -> Arc<MemoryStore> {
    let store = MemoryStore::new()
        .with_row(Table::Teams, json!({"id": "team-a", "name": "Team A", "owner_id": "M1", "created_at": "2020-01-01T00:00:00Z"}))
        .with_row(Table::Teams, json!({"id": "team-b", "name": "Team B", "owner_id": "M2", "created_at": "2020-01-01T00:00:00Z"}))
        .with_row(
            Table::TeamMembers,
            json!({
                "id": "mem-u1",
                "team_id": "team-a",
                "email": "u1@example.com",
                "role": "inspector",
                "invited_by": "M1",
                "created_at": "2020-01-02T00:00:00Z",
            }),
        )
        .with_row(
            Table::TeamMembers,
            json!({
                "id": "mem-u2",
                "team_id": "team-a",
                "email": "u2@example.com",
                "full_name": "Uma Two",
                "role": "inspector",
                "invited_by": "M1",
                "created_at": "2020-01-03T00:00:00Z",
            }),
        )
        .with_row(Table::Inspections, inspection("i1", "U2", "team-a", "in_progress", "Switchboard upgrade"))
        .with_row(Table::Inspections, inspection("i2", "U1", "team-a", "in_progress", "Rooftop array"))
        .with_row(Table::Inspections, inspection("i3", "U1", "team-a", "completed", "Kitchen rewire"))
        .with_row(Table::Inspections, inspection("i4", "U3", "team-b", "scheduled", "Warehouse lighting"))
        .with_row(
            Table::InspectionTests,
            json!({
                "id": "t-i2",
                "inspection_id": "i2",
                "name": "Earth continuity",
                "outcome": "pass",
                "recorded_by": "U1",
                "created_at": "2020-01-05T00:00:00Z",
            }),
        )
        .with_row(
            Table::Templates,
            json!({
                "id": "tpl-public",
                "name": "Residential electrical",
                "items": ["RCD trip time", "Earth continuity"],
                "is_public": true,
                "created_by": "A1",
                "created_at": "2020-01-01T00:00:00Z",
            }),
        )
        .with_row(
            Table::Templates,
            json!({
                "id": "tpl-a",
                "name": "Team HVAC",
                "items": ["Filter"],
                "team_id": "team-a",
                "created_by": "M1",
                "created_at": "2020-01-01T00:00:00Z",
            }),
        )
        .with_row(
            Table::Templates,
            json!({
                "id": "tpl-b",
                "name": "Commercial solar",
                "team_id": "team-b",
                "created_by": "M2",
                "created_at": "2020-01-01T00:00:00Z",
            }),
        )
        .with_row(Table::Clients, client("c-a1", "Acme Property", "team-a", "M1"))
        .with_row(Table::Clients, client("c-a2", "Harbour Council", "team-a", "M1"))
        .with_row(Table::Clients, client("c-b1", "Bayside Retail", "team-b", "M2"));
    Arc::new(store)
}

fn inspection(id: &str, inspector: &str, team: &str, status: &str, title: &str) -> serde_json::Value {
    json!({
        "id": id,
        "title": title,
        "status": status,
        "inspector_id": inspector,
        "created_by": "M1",
        "team_id": team,
        "created_at": "2020-01-01T00:00:00Z",
    })
}

fn client(id: &str, name: &str, team: &str, created_by: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": name,
        "team_id": team,
        "created_by": created_by,
        "created_at": "2020-01-01T00:00:00Z",
    })
}
