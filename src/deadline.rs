//! Wall-clock deadlines and cooperative cancellation.
//!
//! A [`Deadline`] is fixed when a call starts and handed to every component
//! that can block: the source reader, the container scan, and the decode
//! loop. Each of them calls [`Deadline::check`] at its suspension points and
//! unwinds with [`GopseekError::Timeout`] once the budget is spent. FFmpeg
//! I/O is bounded the same way through an interrupt callback that reads the
//! deadline armed on the owning context.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use gopseek::{Deadline, GopseekError, Stage};
//!
//! let result = gopseek::with_deadline(Duration::from_secs(5), |deadline| {
//!     deadline.check(Stage::Decode)?;
//!     Ok::<_, GopseekError>(42)
//! });
//! assert_eq!(result.unwrap(), 42);
//! ```

use std::ffi::{c_int, c_void};
use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

use ffmpeg_sys_next::AVIOInterruptCB;

use crate::error::{GopseekError, Stage};

/// Cooperative cancellation token backed by an [`AtomicBool`].
///
/// Clone the token, attach it to a call through
/// [`ExtractOptions::with_cancellation`](crate::ExtractOptions::with_cancellation),
/// and call [`cancel`](CancellationToken::cancel) from any thread. The call
/// stops at its next suspension point with [`GopseekError::Cancelled`].
///
/// ```
/// use gopseek::CancellationToken;
///
/// let token = CancellationToken::new();
/// assert!(!token.is_cancelled());
/// token.clone().cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. All clones observe it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// A wall-clock deadline for one call.
///
/// The budget counts from construction, not per step. A deadline is
/// read-only once created; clones share the same start instant.
#[derive(Debug, Clone)]
pub struct Deadline {
    started: Instant,
    budget: Option<Duration>,
    cancellation: Option<CancellationToken>,
}

impl Deadline {
    /// A deadline that expires `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget: Some(budget),
            cancellation: None,
        }
    }

    /// A deadline that never expires on its own.
    pub fn unbounded() -> Self {
        Self {
            started: Instant::now(),
            budget: None,
            cancellation: None,
        }
    }

    /// Build from an optional budget (`None` is unbounded).
    pub fn from_timeout(budget: Option<Duration>) -> Self {
        match budget {
            Some(budget) => Self::after(budget),
            None => Self::unbounded(),
        }
    }

    /// Also expire when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Time spent since the deadline was created.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left before expiry, or `None` for an unbounded deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.budget
            .map(|budget| budget.saturating_sub(self.started.elapsed()))
    }

    /// The configured budget, if any.
    pub fn budget(&self) -> Option<Duration> {
        self.budget
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }

    fn is_timed_out(&self) -> bool {
        self.budget
            .is_some_and(|budget| self.started.elapsed() >= budget)
    }

    /// Returns `true` once the budget is spent or the linked token is
    /// cancelled.
    pub fn is_expired(&self) -> bool {
        self.is_cancelled() || self.is_timed_out()
    }

    /// Fail with [`GopseekError::Cancelled`] or [`GopseekError::Timeout`]
    /// if the deadline has expired.
    pub fn check(&self, stage: Stage) -> Result<(), GopseekError> {
        if self.is_cancelled() {
            return Err(GopseekError::Cancelled);
        }
        if self.is_timed_out() {
            return Err(self.timeout_error(stage));
        }
        Ok(())
    }

    /// The error to report when an operation at `stage` was interrupted by
    /// this deadline.
    pub(crate) fn timeout_error(&self, stage: Stage) -> GopseekError {
        if self.is_cancelled() {
            return GopseekError::Cancelled;
        }
        GopseekError::Timeout {
            stage,
            budget: self.budget.unwrap_or(Duration::MAX),
            elapsed: self.started.elapsed(),
        }
    }
}

/// Run `operation` under a fresh deadline of `timeout`.
///
/// The operation receives the deadline and is expected to thread it through
/// every blocking step. Errors are returned unchanged; the deadline only
/// decides when those steps give up.
pub fn with_deadline<T, F>(timeout: Duration, operation: F) -> Result<T, GopseekError>
where
    F: FnOnce(&Deadline) -> Result<T, GopseekError>,
{
    supervise(Deadline::after(timeout), operation)
}

/// Run `operation` under an already-built deadline, logging how it ended.
pub(crate) fn supervise<T, F>(deadline: Deadline, operation: F) -> Result<T, GopseekError>
where
    F: FnOnce(&Deadline) -> Result<T, GopseekError>,
{
    let result = operation(&deadline);
    match &result {
        Ok(_) => log::debug!("Call finished in {:?}", deadline.elapsed()),
        Err(error) if error.is_timeout() => {
            log::warn!("Call exceeded its budget of {:?}: {error}", deadline.budget())
        }
        Err(error) => log::debug!("Call failed after {:?}: {error}", deadline.elapsed()),
    }
    result
}

/// Interrupt state shared with FFmpeg through an `AVIOInterruptCB`.
///
/// FFmpeg stores a raw pointer to this value, so it is always boxed and
/// must outlive the context it was installed on.
pub(crate) struct InterruptFlag {
    deadline: Mutex<Deadline>,
}

impl InterruptFlag {
    pub(crate) fn new(deadline: &Deadline) -> Box<Self> {
        Box::new(Self {
            deadline: Mutex::new(deadline.clone()),
        })
    }

    /// Replace the deadline consulted by FFmpeg for subsequent I/O.
    pub(crate) fn arm(&self, deadline: &Deadline) {
        if let Ok(mut current) = self.deadline.lock() {
            *current = deadline.clone();
        }
    }

    /// The deadline currently armed.
    pub(crate) fn deadline(&self) -> Deadline {
        self.deadline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn is_expired(&self) -> bool {
        self.deadline
            .lock()
            .map(|deadline| deadline.is_expired())
            .unwrap_or(true)
    }

    /// Build the callback struct to install on an FFmpeg context.
    pub(crate) fn as_callback(&self) -> AVIOInterruptCB {
        AVIOInterruptCB {
            callback: Some(interrupt_callback),
            opaque: self as *const Self as *mut c_void,
        }
    }
}

unsafe extern "C" fn interrupt_callback(opaque: *mut c_void) -> c_int {
    if opaque.is_null() {
        return 0;
    }
    // SAFETY: `opaque` was produced by `InterruptFlag::as_callback` on a boxed
    // flag that outlives the FFmpeg context calling us.
    let flag = unsafe { &*(opaque as *const InterruptFlag) };
    c_int::from(flag.is_expired())
}
