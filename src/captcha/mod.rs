//! Captcha capability: resolving anti-bot interstitials.
//!
//! Providers share one contract: given the page URL and the browser's
//! [`CaptchaObservation`], attempt a solve and report back an optional
//! cookie to install before reloading. The engine attempts at most one
//! solve per scrape.

pub mod datadome;
pub mod fake;
pub mod generic;

pub use datadome::DataDomeSolver;
pub use fake::FakeSolver;
pub use generic::GenericTokenSolver;

use async_trait::async_trait;
use std::time::Duration;

use crate::browser::CaptchaObservation;

/// Errors from captcha providers.
#[derive(Debug, thiserror::Error)]
pub enum CaptchaError {
    /// No provider is configured for the observed challenge kind.
    #[error("No captcha solver configured for this challenge")]
    NotConfigured,

    /// The external service rejected the task or reported a fatal error.
    #[error("Captcha provider error: {0}")]
    Provider(String),

    /// Polling exceeded the configured timeout.
    #[error("Captcha solve timed out after {0:?}")]
    Timeout(Duration),

    /// Transport-level failure talking to the provider.
    #[error("Captcha transport error: {0}")]
    Transport(String),
}

/// Polling behavior shared by the HTTP-backed solvers.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Overall budget for submit + poll.
    pub timeout: Duration,
    /// Delay between poll attempts.
    pub poll_interval: Duration,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// Inputs for one solve attempt.
#[derive(Debug, Clone)]
pub struct SolveContext<'a> {
    pub page_url: &'a str,
    pub observation: &'a CaptchaObservation,
    pub user_agent: Option<&'a str>,
    pub proxy: Option<&'a str>,
}

/// Result of a solve attempt that terminated without transport failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptchaOutcome {
    pub solved: bool,
    /// `name=value` cookie to install on the page before reloading.
    pub updated_cookie: Option<String>,
    /// Why the solve failed, when it did.
    pub reason: Option<String>,
}

impl CaptchaOutcome {
    #[must_use]
    pub fn solved_with_cookie(cookie: impl Into<String>) -> Self {
        Self {
            solved: true,
            updated_cookie: Some(cookie.into()),
            reason: None,
        }
    }

    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            solved: false,
            updated_cookie: None,
            reason: Some(reason.into()),
        }
    }
}

/// The solver contract consumed by the scrape state machine.
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    /// Attempt to solve the observed challenge. Implementations must
    /// terminate polling on any fatal error indicator from the service,
    /// not only on an explicit terminal status.
    async fn solve_if_present(
        &self,
        ctx: SolveContext<'_>,
    ) -> Result<CaptchaOutcome, CaptchaError>;
}

/// Dispatches to the solver matching the observed challenge kind.
#[derive(Default)]
pub struct SolverRouter {
    generic: Option<GenericTokenSolver>,
    datadome: Option<DataDomeSolver>,
}

impl SolverRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_generic(mut self, solver: GenericTokenSolver) -> Self {
        self.generic = Some(solver);
        self
    }

    #[must_use]
    pub fn with_datadome(mut self, solver: DataDomeSolver) -> Self {
        self.datadome = Some(solver);
        self
    }

    /// Whether any backend is configured at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.generic.is_none() && self.datadome.is_none()
    }
}

#[async_trait]
impl CaptchaSolver for SolverRouter {
    async fn solve_if_present(
        &self,
        ctx: SolveContext<'_>,
    ) -> Result<CaptchaOutcome, CaptchaError> {
        use crate::browser::CaptchaKind;
        match ctx.observation.kind {
            CaptchaKind::Generic => match &self.generic {
                Some(solver) => solver.solve_if_present(ctx).await,
                None => Err(CaptchaError::NotConfigured),
            },
            CaptchaKind::DataDome => match &self.datadome {
                Some(solver) => solver.solve_if_present(ctx).await,
                None => Err(CaptchaError::NotConfigured),
            },
            CaptchaKind::None => Ok(CaptchaOutcome {
                solved: true,
                updated_cookie: None,
                reason: None,
            }),
        }
    }
}
