//! Proactive token refresh.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::handle::TimerHandle;

/// How long before expiry the refresh fires.
pub const REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);

/// Floor on the delay between consecutive refreshes, so a provider issuing
/// tokens shorter than the margin cannot drive a refresh loop.
pub const MIN_REARM_DELAY: Duration = Duration::from_secs(30);

/// Time to wait before refreshing a token that expires at `expires_at`.
///
/// Zero when the token is already inside the refresh margin or expired.
#[must_use]
pub fn refresh_delay(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (expires_at - now)
        .to_std()
        .ok()
        .and_then(|left| left.checked_sub(REFRESH_MARGIN))
        .unwrap_or(Duration::ZERO)
}

/// Arms a refresh timer for a token expiring at `expires_at`.
///
/// When the timer fires, `on_refresh` runs. If it yields a new expiry the
/// timer re-arms for that expiry; if it yields `None` the timer stops.
pub fn schedule_refresh<F, Fut>(expires_at: DateTime<Utc>, mut on_refresh: F) -> TimerHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Option<DateTime<Utc>>> + Send + 'static,
{
    let handle = TimerHandle::new();
    let timer = handle.clone();

    let task = tokio::spawn(async move {
        let mut expires_at = expires_at;
        let mut delay = refresh_delay(expires_at, Utc::now());

        loop {
            debug!(delay_secs = delay.as_secs(), %expires_at, "refresh timer armed");
            tokio::time::sleep(delay).await;
            if timer.is_cancelled() {
                return;
            }

            match on_refresh().await {
                Some(next) if !timer.is_cancelled() => {
                    expires_at = next;
                    delay = refresh_delay(expires_at, Utc::now()).max(MIN_REARM_DELAY);
                }
                _ => {
                    debug!("refresh timer stopped");
                    return;
                }
            }
        }
    });

    handle.attach(task.abort_handle());
    handle
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    fn minutes(n: u64) -> Duration {
        Duration::from_secs(n * 60)
    }

    #[test]
    fn delay_is_zero_inside_the_margin() {
        let now = Utc::now();
        assert_eq!(
            refresh_delay(now + chrono::Duration::minutes(3), now),
            Duration::ZERO
        );
        assert_eq!(
            refresh_delay(now - chrono::Duration::minutes(3), now),
            Duration::ZERO
        );
    }

    #[test]
    fn delay_is_expiry_minus_margin() {
        let now = Utc::now();
        assert_eq!(
            refresh_delay(now + chrono::Duration::hours(2), now),
            minutes(115)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn near_expiry_refreshes_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let _handle = schedule_refresh(Utc::now() + chrono::Duration::minutes(3), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                None
            }
        });

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fires_margin_before_expiry() {
        let fired_at = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&fired_at);
        let start = Instant::now();

        let _handle = schedule_refresh(Utc::now() + chrono::Duration::hours(2), move || {
            let slot = Arc::clone(&slot);
            async move {
                *slot.lock().unwrap() = Some(Instant::now());
                None
            }
        });

        tokio::time::sleep(minutes(120)).await;
        let elapsed = fired_at.lock().unwrap().expect("refresh fired") - start;
        assert!(elapsed >= minutes(114) && elapsed <= minutes(116), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_fire_prevents_refresh() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let handle = schedule_refresh(Utc::now() + chrono::Duration::hours(2), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                None
            }
        });

        tokio::time::sleep(minutes(60)).await;
        handle.cancel();
        tokio::time::sleep(minutes(240)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(handle.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn successful_refresh_rearms_with_new_expiry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let handle = schedule_refresh(Utc::now() + chrono::Duration::minutes(1), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Some(Utc::now() + chrono::Duration::hours(1))
            }
        });

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(minutes(30)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(minutes(30)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn short_lived_tokens_do_not_spin() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let handle = schedule_refresh(Utc::now(), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Some(Utc::now() + chrono::Duration::minutes(1))
            }
        });

        tokio::time::sleep(Duration::from_secs(45)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        handle.cancel();
    }
}
