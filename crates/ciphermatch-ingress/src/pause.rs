//! Risk-control pause switch.
//!
//! While paused, new submissions and settlements are refused. Cancellation
//! and reads stay available so traders can always exit. Only the
//! configured risk controller may flip the switch.

use chrono::{DateTime, Utc};
use ciphermatch_types::{CiphermatchError, Result, TraderId};

#[derive(Debug, Clone)]
pub struct PauseSwitch {
    controller: TraderId,
    paused: bool,
    changed_at: Option<DateTime<Utc>>,
}

impl PauseSwitch {
    #[must_use]
    pub fn new(controller: TraderId) -> Self {
        Self {
            controller,
            paused: false,
            changed_at: None,
        }
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    #[must_use]
    pub fn changed_at(&self) -> Option<DateTime<Utc>> {
        self.changed_at
    }

    /// # Errors
    /// Returns `NotRiskController` if `caller` is not the controller.
    pub fn pause(&mut self, caller: TraderId, now: DateTime<Utc>) -> Result<()> {
        self.set(caller, true, now)
    }

    /// # Errors
    /// Returns `NotRiskController` if `caller` is not the controller.
    pub fn unpause(&mut self, caller: TraderId, now: DateTime<Utc>) -> Result<()> {
        self.set(caller, false, now)
    }

    /// Guard an operation that is refused while paused.
    ///
    /// # Errors
    /// Returns `EnginePaused` while paused.
    pub fn ensure_running(&self) -> Result<()> {
        if self.paused {
            Err(CiphermatchError::EnginePaused)
        } else {
            Ok(())
        }
    }

    fn set(&mut self, caller: TraderId, paused: bool, now: DateTime<Utc>) -> Result<()> {
        if caller != self.controller {
            return Err(CiphermatchError::NotRiskController(caller));
        }
        // Repeating the current state is accepted and leaves the timestamp alone.
        if self.paused != paused {
            self.paused = paused;
            self.changed_at = Some(now);
        }
        Ok(())
    }
}
