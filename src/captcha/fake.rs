//! Scripted solver for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{CaptchaError, CaptchaOutcome, CaptchaSolver, SolveContext};

/// [`CaptchaSolver`] returning a fixed outcome and counting calls.
pub struct FakeSolver {
    outcome: Mutex<Result<CaptchaOutcome, String>>,
    calls: AtomicUsize,
}

impl FakeSolver {
    /// A solver that always succeeds with `cookie`.
    #[must_use]
    pub fn solving_with_cookie(cookie: impl Into<String>) -> Self {
        Self {
            outcome: Mutex::new(Ok(CaptchaOutcome::solved_with_cookie(cookie))),
            calls: AtomicUsize::new(0),
        }
    }

    /// A solver that always fails with `reason`.
    #[must_use]
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            outcome: Mutex::new(Ok(CaptchaOutcome::failed(reason))),
            calls: AtomicUsize::new(0),
        }
    }

    /// A solver whose calls error at the transport level.
    #[must_use]
    pub fn erroring(message: impl Into<String>) -> Self {
        Self {
            outcome: Mutex::new(Err(message.into())),
            calls: AtomicUsize::new(0),
        }
    }

    /// How many solve attempts the engine made.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptchaSolver for FakeSolver {
    async fn solve_if_present(
        &self,
        _ctx: SolveContext<'_>,
    ) -> Result<CaptchaOutcome, CaptchaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &*self.outcome.lock() {
            Ok(outcome) => Ok(outcome.clone()),
            Err(message) => Err(CaptchaError::Transport(message.clone())),
        }
    }
}
