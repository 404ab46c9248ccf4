//! Store configuration types

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for a [`Store`](crate::Store)
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct StoreConfig {
    /// Capacity of the event broadcast channel
    pub event_buffer: usize,
    /// How long a blocking acquire may wait before a warning is logged
    pub slow_wait_threshold: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            event_buffer: 1024,
            slow_wait_threshold: Duration::from_secs(5),
        }
    }
}

impl StoreConfig {
    /// Validate the configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.event_buffer == 0 {
            return Err(Error::configuration("event_buffer must be greater than 0"));
        }
        if self.slow_wait_threshold.is_zero() {
            return Err(Error::configuration(
                "slow_wait_threshold must be greater than 0",
            ));
        }
        Ok(())
    }
}
