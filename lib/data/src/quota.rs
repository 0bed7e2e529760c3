//! Plan-limit checks on create.

use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use fieldcheck_authz::{LimitKind, PlanLimits, Quota, is_within_limit};
use fieldcheck_platform_access::Plan;
use tracing::info;

use crate::error::ServiceError;

/// Fails with `QuotaExceeded` unless one more item of `kind` fits `plan`.
pub(crate) fn ensure_capacity(plan: Plan, kind: LimitKind, current: usize) -> Result<(), ServiceError> {
    let current = i64::try_from(current).unwrap_or(i64::MAX);
    if is_within_limit(plan, kind, current) {
        return Ok(());
    }
    let limit = match PlanLimits::for_plan(plan).quota(kind) {
        Quota::Limited(limit) => limit,
        Quota::Unlimited => u64::MAX,
    };
    info!(plan = %plan, kind = %kind, current, limit, "plan limit reached");
    Err(ServiceError::QuotaExceeded { kind, limit })
}

/// Midnight UTC on the first day of `now`'s month, in the store's timestamp format.
pub(crate) fn month_start(now: DateTime<Utc>) -> String {
    now.date_naive()
        .with_day(1)
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map_or(now, |start| start.and_utc())
        .to_rfc3339_opts(SecondsFormat::Micros, true)
}
