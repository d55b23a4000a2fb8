//! Background token refresh for the Civica client
//!
//! Keeps the stored access token fresh without user interaction. The refresh
//! job reads the refresh token, calls the refresh endpoint, and retries
//! transient failures with exponential backoff up to a fixed ceiling. The
//! scheduler wraps the job in a periodic tokio task with a flex window and
//! host-condition checks, and enqueues idempotently.
//!
//! Job failures never reach the user: they are logged, counted, and left for
//! the next scheduled period (or a manual `refresh_now`).

pub mod refresh;
pub mod scheduler;

pub use refresh::{BackoffPolicy, RefreshOutcome, refresh_now, run_refresh};
pub use scheduler::{
    AlwaysReady, Constraints, HostProbe, PeriodicRefresh, RecurringTask, DEFAULT_FLEX,
    DEFAULT_INTERVAL,
};
