//! Ownership of the OS-visible foreground indicator.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::VerifyError;

/// Host control over the foreground indicator some platforms require
/// while background location monitoring is active.
#[uniffi::export(with_foreign)]
pub trait ForegroundIndicatorHost: Send + Sync {
    /// Shows the indicator. Not called again until after `stop`.
    ///
    /// # Errors
    /// Returns an error if the OS refuses to start the indicator.
    fn start(&self) -> Result<(), VerifyError>;

    /// Hides the indicator.
    ///
    /// # Errors
    /// Returns an error if the indicator cannot be stopped.
    fn stop(&self) -> Result<(), VerifyError>;

    /// Whether the indicator is currently visible.
    fn is_running(&self) -> bool;
}

/// Reference-counted owner of the single process-wide foreground
/// indicator.
///
/// Sessions started with `with_foreground` take a reference before they
/// enter monitoring and release it when they stop; the indicator only
/// stops once the last holder lets go. A manual hold taken through the
/// boundary `start_foreground_service` call is tracked separately so a
/// manual stop cannot pull the indicator out from under active sessions.
pub struct ForegroundSupervisor {
    host: Arc<dyn ForegroundIndicatorHost>,
    holds: Mutex<Holds>,
}

#[derive(Default)]
struct Holds {
    sessions: u32,
    manual: bool,
}

impl ForegroundSupervisor {
    /// Wraps a host indicator.
    #[must_use]
    pub fn new(host: Arc<dyn ForegroundIndicatorHost>) -> Self {
        Self {
            host,
            holds: Mutex::new(Holds::default()),
        }
    }

    /// Takes a session reference, starting the indicator with the first
    /// one.
    ///
    /// # Errors
    /// Returns [`VerifyError::EngineUnavailable`] if the indicator cannot
    /// be started.
    pub fn acquire(&self) -> Result<(), VerifyError> {
        let mut holds = self.holds();
        if holds.sessions == 0 && !holds.manual {
            self.start_host()?;
        }
        holds.sessions += 1;
        Ok(())
    }

    /// Releases one session reference, stopping the indicator with the
    /// last one.
    ///
    /// # Errors
    /// Returns an error if the host fails to stop the indicator.
    pub fn release(&self) -> Result<(), VerifyError> {
        let mut holds = self.holds();
        if holds.sessions > 0 {
            holds.sessions -= 1;
            if holds.sessions == 0 && !holds.manual {
                self.host.stop()?;
            }
        }
        Ok(())
    }

    /// Takes the manual hold; a no-op success while already running.
    ///
    /// # Errors
    /// Returns [`VerifyError::EngineUnavailable`] if the indicator cannot
    /// be started.
    pub fn start_manual(&self) -> Result<(), VerifyError> {
        let mut holds = self.holds();
        if holds.sessions == 0 && !holds.manual {
            self.start_host()?;
        }
        holds.manual = true;
        Ok(())
    }

    /// Clears the manual hold; only actually stops the indicator once no
    /// session still requires it. A no-op success while not running.
    ///
    /// # Errors
    /// Returns an error if the host fails to stop the indicator.
    pub fn stop_manual(&self) -> Result<(), VerifyError> {
        let mut holds = self.holds();
        if holds.manual {
            holds.manual = false;
            if holds.sessions == 0 {
                self.host.stop()?;
            }
        }
        Ok(())
    }

    /// Whether the indicator is currently visible.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.host.is_running()
    }

    fn start_host(&self) -> Result<(), VerifyError> {
        self.host
            .start()
            .map_err(|e| VerifyError::EngineUnavailable {
                reason: e.to_string(),
            })
    }

    fn holds(&self) -> MutexGuard<'_, Holds> {
        self.holds.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
