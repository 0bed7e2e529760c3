//! Session timers.
//!
//! This crate provides the two timers every signed-in session carries:
//!
//! - **Refresh timer**: refreshes the access token shortly before it expires
//!   and re-arms itself with the new expiry
//! - **Inactivity timer**: signs the user out after a quiet period, reset by
//!   user-interaction events published on an [`ActivityFeed`]
//!
//! Both return a [`TimerHandle`]. Cancelling it is idempotent and guarantees
//! the timer's callback will not run afterwards.

pub mod activity;
pub mod handle;
pub mod refresh;

pub use activity::{
    ActivityEvent, ActivityFeed, ActivityListener, DEFAULT_INACTIVITY_TIMEOUT,
    schedule_inactivity_timeout,
};
pub use handle::TimerHandle;
pub use refresh::{MIN_REARM_DELAY, REFRESH_MARGIN, refresh_delay, schedule_refresh};
