//! Inspections and the tests recorded on them.
//!
//! Every operation goes through the permission gate. Tests inherit the parent
//! inspection's rules: reading them needs `view_inspection` on the parent,
//! changing them needs `edit_inspection`, so a completed inspection's tests
//! are frozen with it.

use std::sync::Arc;

use chrono::Utc;
use fieldcheck_authz::{
    AuthorizationContext, Authorizer, AuthzError, InspectionStatus, LimitKind, Permission,
    ResourceType,
};
use fieldcheck_core::{InspectionId, TestId};
use fieldcheck_platform_access::{Role, User};
use serde_json::json;
use tracing::{info, instrument};

use crate::error::ServiceError;
use crate::guard::gated;
use crate::quota::{ensure_capacity, month_start};
use crate::records::{Inspection, InspectionTest, InspectionUpdate, NewInspection, NewInspectionTest};
use crate::store::{Filter, Store, Table, decode, encode};

#[derive(Clone)]
pub struct InspectionService {
    store: Arc<dyn Store>,
    authorizer: Authorizer,
}

impl std::fmt::Debug for InspectionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InspectionService").finish_non_exhaustive()
    }
}

fn scoped(user: &User, id: &InspectionId) -> AuthorizationContext {
    AuthorizationContext::for_user(user).with_resource(ResourceType::Inspection, id.as_str())
}

/// Rows visible to `user`, or `None` if they can see nothing.
fn visible_to(user: &User) -> Option<Filter> {
    match user.role() {
        Role::Admin => Some(Filter::new()),
        Role::Manager => {
            let mut options = Vec::new();
            if let Some(team_id) = user.team_id() {
                options.push(("team_id", json!(team_id)));
            }
            if let Some(client_id) = user.client_id() {
                options.push(("client_id", json!(client_id)));
            }
            (!options.is_empty()).then(|| Filter::new().any_of(options))
        }
        Role::Inspector => Some(Filter::new().eq("inspector_id", user.id().as_str())),
    }
}

impl InspectionService {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, authorizer: Authorizer) -> Self {
        Self { store, authorizer }
    }

    /// Inspections in the user's scope, newest first, optionally by status.
    ///
    /// # Errors
    ///
    /// `Unauthorized` without `view_inspection`; `Store` on backend failure.
    #[instrument(skip(self, user), fields(user_id = %user.id()))]
    pub async fn list(
        &self,
        user: &User,
        status: Option<InspectionStatus>,
    ) -> Result<Vec<Inspection>, ServiceError> {
        let ctx = AuthorizationContext::for_user(user);
        let store = &*self.store;
        gated(&self.authorizer, &ctx, Permission::ViewInspection, move || async move {
            let Some(mut filter) = visible_to(user) else {
                return Ok(Vec::new());
            };
            if let Some(status) = status {
                filter = filter.eq("status", status.as_str());
            }
            let mut inspections = store
                .list(Table::Inspections, &filter)
                .await?
                .into_iter()
                .map(|row| decode::<Inspection>(Table::Inspections, row))
                .collect::<Result<Vec<_>, _>>()?;
            inspections.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(inspections)
        })
        .await
    }

    /// # Errors
    ///
    /// `Unauthorized` if the inspection is outside the user's scope or does
    /// not exist.
    #[instrument(skip(self, user), fields(user_id = %user.id()))]
    pub async fn get(&self, user: &User, id: &InspectionId) -> Result<Inspection, ServiceError> {
        let ctx = scoped(user, id);
        let store = &*self.store;
        gated(&self.authorizer, &ctx, Permission::ViewInspection, move || async move {
            let row = store
                .get(Table::Inspections, id.as_str())
                .await?
                .ok_or_else(|| ServiceError::not_found("inspection", id.as_str()))?;
            Ok(decode(Table::Inspections, row)?)
        })
        .await
    }

    /// Creates an inspection in the user's team.
    ///
    /// Assigning it to someone else needs `assign_inspections`.
    ///
    /// # Errors
    ///
    /// `Invalid` for a blank title, `QuotaExceeded` once the plan's monthly
    /// allowance is used up.
    #[instrument(skip(self, user, new), fields(user_id = %user.id()))]
    pub async fn create(&self, user: &User, new: NewInspection) -> Result<Inspection, ServiceError> {
        let ctx = AuthorizationContext::for_user(user);
        let inspector_id = new.inspector_id.clone().unwrap_or_else(|| user.id().clone());
        if &inspector_id != user.id() {
            self.require(&ctx, Permission::AssignInspections).await?;
        }

        let store = &*self.store;
        gated(&self.authorizer, &ctx, Permission::CreateInspections, move || async move {
            let title = new.title.trim();
            if title.is_empty() {
                return Err(ServiceError::invalid("An inspection needs a title."));
            }

            let this_month = Filter::new()
                .eq("created_by", user.id().as_str())
                .gte("created_at", month_start(Utc::now()));
            let used = store.list(Table::Inspections, &this_month).await?.len();
            ensure_capacity(user.plan(), LimitKind::InspectionsPerMonth, used)?;

            let status = if new.scheduled_for.is_some() {
                InspectionStatus::Scheduled
            } else {
                InspectionStatus::Draft
            };
            let row = encode(
                Table::Inspections,
                &json!({
                    "title": title,
                    "status": status,
                    "inspector_id": inspector_id,
                    "created_by": user.id(),
                    "team_id": user.team_id(),
                    "client_id": new.client_id.as_ref().or(user.client_id()),
                    "template_id": new.template_id,
                    "site_address": new.site_address,
                    "scheduled_for": new.scheduled_for,
                }),
            )?;
            let stored = store.insert(Table::Inspections, row).await?;
            let inspection: Inspection = decode(Table::Inspections, stored)?;
            info!(inspection_id = %inspection.id, "inspection created");
            Ok(inspection)
        })
        .await
    }

    /// # Errors
    ///
    /// `Unauthorized` if the inspection is not editable by the user (outside
    /// scope, or completed), `Invalid` for an empty update.
    #[instrument(skip(self, user, update), fields(user_id = %user.id()))]
    pub async fn update(
        &self,
        user: &User,
        id: &InspectionId,
        update: InspectionUpdate,
    ) -> Result<Inspection, ServiceError> {
        if update.is_empty() {
            return Err(ServiceError::invalid("Nothing to update."));
        }
        let ctx = scoped(user, id);
        if update.inspector_id.is_some() {
            self.require(&ctx, Permission::AssignInspections).await?;
        }

        let store = &*self.store;
        gated(&self.authorizer, &ctx, Permission::EditInspection, move || async move {
            let patch = encode(Table::Inspections, &update)?;
            let row = store
                .update(Table::Inspections, id.as_str(), patch)
                .await?
                .ok_or_else(|| ServiceError::not_found("inspection", id.as_str()))?;
            Ok(decode(Table::Inspections, row)?)
        })
        .await
    }

    /// Deletes an inspection and its tests.
    ///
    /// # Errors
    ///
    /// `Unauthorized` without `delete_inspection`.
    #[instrument(skip(self, user), fields(user_id = %user.id()))]
    pub async fn delete(&self, user: &User, id: &InspectionId) -> Result<(), ServiceError> {
        let ctx = scoped(user, id);
        let store = &*self.store;
        gated(&self.authorizer, &ctx, Permission::DeleteInspection, move || async move {
            let tests = store
                .list(Table::InspectionTests, &Filter::new().eq("inspection_id", id.as_str()))
                .await?;
            for test in &tests {
                if let Some(test_id) = test.get("id").and_then(|v| v.as_str()) {
                    store.delete(Table::InspectionTests, test_id).await?;
                }
            }
            if !store.delete(Table::Inspections, id.as_str()).await? {
                return Err(ServiceError::not_found("inspection", id.as_str()));
            }
            info!(inspection_id = %id, tests = tests.len(), "inspection deleted");
            Ok(())
        })
        .await
    }

    /// Tests recorded on an inspection, oldest first.
    ///
    /// # Errors
    ///
    /// `Unauthorized` unless the user may view the inspection.
    #[instrument(skip(self, user), fields(user_id = %user.id()))]
    pub async fn list_tests(
        &self,
        user: &User,
        inspection_id: &InspectionId,
    ) -> Result<Vec<InspectionTest>, ServiceError> {
        let ctx = scoped(user, inspection_id);
        let store = &*self.store;
        gated(&self.authorizer, &ctx, Permission::ViewInspection, move || async move {
            let filter = Filter::new().eq("inspection_id", inspection_id.as_str());
            let mut tests = store
                .list(Table::InspectionTests, &filter)
                .await?
                .into_iter()
                .map(|row| decode::<InspectionTest>(Table::InspectionTests, row))
                .collect::<Result<Vec<_>, _>>()?;
            tests.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            Ok(tests)
        })
        .await
    }

    /// # Errors
    ///
    /// `Unauthorized` unless the user may edit the inspection; `Invalid` for
    /// a blank test name.
    #[instrument(skip(self, user, test), fields(user_id = %user.id()))]
    pub async fn record_test(
        &self,
        user: &User,
        inspection_id: &InspectionId,
        test: NewInspectionTest,
    ) -> Result<InspectionTest, ServiceError> {
        let ctx = scoped(user, inspection_id);
        let store = &*self.store;
        gated(&self.authorizer, &ctx, Permission::EditInspection, move || async move {
            let name = test.name.trim();
            if name.is_empty() {
                return Err(ServiceError::invalid("A test needs a name."));
            }
            let row = encode(
                Table::InspectionTests,
                &json!({
                    "inspection_id": inspection_id,
                    "name": name,
                    "outcome": test.outcome,
                    "reading": test.reading,
                    "notes": test.notes,
                    "recorded_by": user.id(),
                }),
            )?;
            let stored = store.insert(Table::InspectionTests, row).await?;
            Ok(decode(Table::InspectionTests, stored)?)
        })
        .await
    }

    /// # Errors
    ///
    /// `Unauthorized` unless the user may edit the inspection; `NotFound` if
    /// the test does not belong to it.
    #[instrument(skip(self, user), fields(user_id = %user.id()))]
    pub async fn delete_test(
        &self,
        user: &User,
        inspection_id: &InspectionId,
        test_id: &TestId,
    ) -> Result<(), ServiceError> {
        let ctx = scoped(user, inspection_id);
        let store = &*self.store;
        gated(&self.authorizer, &ctx, Permission::EditInspection, move || async move {
            let belongs = store
                .get(Table::InspectionTests, test_id.as_str())
                .await?
                .is_some_and(|row| {
                    row.get("inspection_id").and_then(|v| v.as_str()) == Some(inspection_id.as_str())
                });
            if !belongs || !store.delete(Table::InspectionTests, test_id.as_str()).await? {
                return Err(ServiceError::not_found("test", test_id.as_str()));
            }
            Ok(())
        })
        .await
    }

    async fn require(&self, ctx: &AuthorizationContext, permission: Permission) -> Result<(), ServiceError> {
        if self.authorizer.check_permission(ctx, permission).await {
            Ok(())
        } else {
            Err(AuthzError::denied(permission, ctx).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{admin, inspector, manager, seeded_store, services};
    use crate::memory::MemoryStore;
    use crate::records::TestOutcome;
    use fieldcheck_core::UserId;
    use fieldcheck_platform_access::Plan;

    fn ids(inspections: &[Inspection]) -> Vec<&str> {
        let mut ids: Vec<&str> = inspections.iter().map(|i| i.id.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    #[tokio::test]
    async fn listing_is_scoped_by_role() {
        let store = seeded_store();
        let inspections = services(&store).inspections().clone();

        let own = inspections.list(&inspector("U1"), None).await.expect("list");
        assert_eq!(ids(&own), ["i2", "i3"]);

        let team = inspections.list(&manager("M1"), None).await.expect("list");
        assert_eq!(ids(&team), ["i1", "i2", "i3"]);

        let all = inspections.list(&admin(), None).await.expect("list");
        assert_eq!(all.len(), 4);

        let completed = inspections
            .list(&manager("M1"), Some(InspectionStatus::Completed))
            .await
            .expect("list");
        assert_eq!(ids(&completed), ["i3"]);
    }

    #[tokio::test]
    async fn manager_without_team_or_client_sees_nothing() {
        let store = seeded_store();
        let loner = manager("M9").with_team(None);
        let listed = services(&store)
            .inspections()
            .list(&loner, None)
            .await
            .expect("list");
        assert!(listed.is_empty());
        assert_eq!(store.reads(), 0);
    }

    #[tokio::test]
    async fn inspector_cannot_read_someone_elses_inspection() {
        let store = seeded_store();
        let inspections = services(&store).inspections().clone();

        let err = inspections
            .get(&inspector("U1"), &InspectionId::from("i1"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ServiceError::Unauthorized {
                permission: Permission::ViewInspection,
                resource_type: Some(ResourceType::Inspection),
                resource_id: Some("i1".to_string()),
            }
        );

        let own = inspections
            .get(&inspector("U1"), &InspectionId::from("i2"))
            .await
            .expect("own inspection");
        assert_eq!(own.title, "Rooftop array");
    }

    #[tokio::test]
    async fn missing_and_forbidden_look_the_same() {
        let store = seeded_store();
        let inspections = services(&store).inspections().clone();

        let missing = inspections
            .get(&inspector("U1"), &InspectionId::from("nope"))
            .await
            .unwrap_err();
        let forbidden = inspections
            .get(&inspector("U1"), &InspectionId::from("i1"))
            .await
            .unwrap_err();
        assert_eq!(missing.user_message(), forbidden.user_message());
    }

    #[tokio::test]
    async fn completed_inspection_is_frozen() {
        let store = seeded_store();
        let inspections = services(&store).inspections().clone();
        let id = InspectionId::from("i3");
        let update = InspectionUpdate {
            notes: Some("late change".to_string()),
            ..InspectionUpdate::default()
        };

        for user in [manager("M1"), inspector("U1")] {
            let err = inspections.update(&user, &id, update.clone()).await.unwrap_err();
            assert_eq!(
                err,
                ServiceError::Unauthorized {
                    permission: Permission::EditInspection,
                    resource_type: Some(ResourceType::Inspection),
                    resource_id: Some("i3".to_string()),
                }
            );
            assert!(inspections.get(&user, &id).await.is_ok());
        }
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn owner_can_complete_their_inspection() {
        let store = seeded_store();
        let inspections = services(&store).inspections().clone();
        let id = InspectionId::from("i2");

        let done = inspections
            .update(
                &inspector("U1"),
                &id,
                InspectionUpdate {
                    status: Some(InspectionStatus::Completed),
                    ..InspectionUpdate::default()
                },
            )
            .await
            .expect("complete");
        assert_eq!(done.status, InspectionStatus::Completed);

        let again = inspections
            .update(
                &inspector("U1"),
                &id,
                InspectionUpdate {
                    title: Some("renamed".to_string()),
                    ..InspectionUpdate::default()
                },
            )
            .await;
        assert!(matches!(again, Err(ServiceError::Unauthorized { .. })));
    }

    #[tokio::test]
    async fn inspector_cannot_reassign() {
        let store = seeded_store();
        let err = services(&store)
            .inspections()
            .update(
                &inspector("U1"),
                &InspectionId::from("i2"),
                InspectionUpdate {
                    inspector_id: Some(UserId::from("U2")),
                    ..InspectionUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ServiceError::Unauthorized {
                permission: Permission::AssignInspections,
                resource_type: Some(ResourceType::Inspection),
                resource_id: Some("i2".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn inspector_cannot_create_and_store_is_untouched() {
        let store = seeded_store();
        let err = services(&store)
            .inspections()
            .create(
                &inspector("U1"),
                NewInspection {
                    title: "Sneaky".to_string(),
                    ..NewInspection::default()
                },
            )
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ServiceError::Unauthorized {
                permission: Permission::CreateInspections,
                resource_type: None,
                resource_id: None,
            }
        );
        assert_eq!(store.reads(), 0);
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn manager_creates_in_their_team() {
        let store = seeded_store();
        let created = services(&store)
            .inspections()
            .create(
                &manager("M1"),
                NewInspection {
                    title: "  Heat pump commissioning ".to_string(),
                    inspector_id: Some(UserId::from("U1")),
                    ..NewInspection::default()
                },
            )
            .await
            .expect("create");

        assert_eq!(created.title, "Heat pump commissioning");
        assert_eq!(created.status, InspectionStatus::Draft);
        assert_eq!(created.inspector_id, UserId::from("U1"));
        assert_eq!(created.created_by, UserId::from("M1"));
        assert_eq!(created.team_id.as_ref().map(|t| t.as_str()), Some("team-a"));
    }

    #[tokio::test]
    async fn blank_title_is_invalid() {
        let store = seeded_store();
        let err = services(&store)
            .inspections()
            .create(&manager("M1"), NewInspection::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Invalid { .. }));
    }

    #[tokio::test]
    async fn monthly_allowance_is_enforced() {
        let mut store = MemoryStore::new();
        let now = Utc::now().to_rfc3339();
        for n in 0..50 {
            store = store.with_row(
                Table::Inspections,
                json!({
                    "id": format!("old-{n}"),
                    "title": "x",
                    "status": "completed",
                    "inspector_id": "M1",
                    "created_by": "M1",
                    "team_id": "team-a",
                    "created_at": now,
                }),
            );
        }
        let store = Arc::new(store);
        let starter = manager("M1").with_plan(Plan::Starter);

        let err = services(&store)
            .inspections()
            .create(
                &starter,
                NewInspection {
                    title: "One too many".to_string(),
                    ..NewInspection::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ServiceError::QuotaExceeded {
                kind: LimitKind::InspectionsPerMonth,
                limit: 50
            }
        );
        assert_eq!(store.writes(), 0);

        let professional = manager("M1").with_plan(Plan::Professional);
        assert!(
            services(&store)
                .inspections()
                .create(
                    &professional,
                    NewInspection {
                        title: "Fits".to_string(),
                        ..NewInspection::default()
                    },
                )
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn only_admin_deletes_and_tests_go_with_it() {
        let store = seeded_store();
        let inspections = services(&store).inspections().clone();
        let id = InspectionId::from("i2");

        let err = inspections.delete(&manager("M1"), &id).await.unwrap_err();
        assert_eq!(
            err,
            ServiceError::Unauthorized {
                permission: Permission::DeleteInspection,
                resource_type: Some(ResourceType::Inspection),
                resource_id: Some("i2".to_string()),
            }
        );

        inspections.delete(&admin(), &id).await.expect("delete");
        assert!(store.rows(Table::Inspections).iter().all(|r| r["id"] != "i2"));
        assert!(store.rows(Table::InspectionTests).iter().all(|r| r["inspection_id"] != "i2"));
    }

    #[tokio::test]
    async fn tests_follow_the_parent_inspection() {
        let store = seeded_store();
        let inspections = services(&store).inspections().clone();
        let owner = inspector("U1");
        let open = InspectionId::from("i2");

        let recorded = inspections
            .record_test(
                &owner,
                &open,
                NewInspectionTest {
                    name: "Insulation resistance".to_string(),
                    outcome: TestOutcome::Pass,
                    reading: Some("550 MΩ".to_string()),
                    notes: None,
                },
            )
            .await
            .expect("record");
        assert_eq!(recorded.recorded_by, UserId::from("U1"));

        let tests = inspections.list_tests(&owner, &open).await.expect("list");
        assert_eq!(tests.len(), 2);

        let frozen = inspections
            .record_test(
                &owner,
                &InspectionId::from("i3"),
                NewInspectionTest {
                    name: "Late".to_string(),
                    outcome: TestOutcome::Fail,
                    reading: None,
                    notes: None,
                },
            )
            .await;
        assert!(matches!(frozen, Err(ServiceError::Unauthorized { .. })));

        let elsewhere = inspections
            .list_tests(&inspector("U2"), &open)
            .await
            .unwrap_err();
        assert!(matches!(elsewhere, ServiceError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn deleting_a_test_checks_its_parent() {
        let store = seeded_store();
        let inspections = services(&store).inspections().clone();
        let owner = inspector("U1");

        let wrong_parent = inspections
            .delete_test(&owner, &InspectionId::from("i3"), &TestId::from("t-i2"))
            .await;
        assert!(matches!(wrong_parent, Err(ServiceError::Unauthorized { .. })));

        let mismatch = inspections
            .delete_test(&manager("M1"), &InspectionId::from("i1"), &TestId::from("t-i2"))
            .await;
        assert!(matches!(mismatch, Err(ServiceError::NotFound { .. })));

        inspections
            .delete_test(&owner, &InspectionId::from("i2"), &TestId::from("t-i2"))
            .await
            .expect("delete");
        assert!(store.rows(Table::InspectionTests).is_empty());
    }

    #[tokio::test]
    async fn store_outage_denies_scoped_reads() {
        let store = seeded_store();
        store.set_unavailable(true);
        let err = services(&store)
            .inspections()
            .get(&manager("M1"), &InspectionId::from("i1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized { .. }));
    }
}
