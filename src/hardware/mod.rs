//! Diverter hardware command abstraction.
//!
//! The orchestration core never touches device registers. All physical
//! actuation goes through [`DiverterDriver`], implemented by the
//! vendor-specific driver layer (PLC or motion card). The driver methods
//! return boxed futures so implementations can be used as trait objects.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future type for dyn-safe driver methods.
pub type DriverFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Directional command a diverter can execute.
///
/// `Straight` passes the parcel through without deflection and is the
/// default fallback action: it never blocks downstream flow.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum DiverterDirection {
    /// Deflect the parcel to the left.
    Left,
    /// Deflect the parcel to the right.
    Right,
    /// Pass the parcel straight through.
    Straight,
    /// Stop the diverter motor.
    Stop,
}

impl fmt::Display for DiverterDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => write!(f, "Left"),
            Self::Right => write!(f, "Right"),
            Self::Straight => write!(f, "Straight"),
            Self::Stop => write!(f, "Stop"),
        }
    }
}

/// Errors surfaced by the hardware driver layer.
///
/// These never escape the path executor as raw errors; they are converted
/// into a `PathFailureReason` at that boundary.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The diverter did not acknowledge a command in time.
    #[error("timed out communicating with diverter {diverter_id} after {timeout_ms}ms")]
    CommunicationTimeout { diverter_id: String, timeout_ms: u64 },

    /// The diverter reported a mechanical or electrical fault.
    #[error("diverter {diverter_id} reported a device fault: {detail}")]
    DeviceFault { diverter_id: String, detail: String },

    /// The driver has no device registered under this ID.
    #[error("unknown diverter id {0}")]
    UnknownDiverter(String),
}

/// Dyn-safe async interface to the diverter driver layer.
///
/// Callers must hold the diverter's write lock while issuing a [`command`]
/// (see the lock module): a physical diverter cannot honor two simultaneous
/// directional commands.
///
/// [`command`]: DiverterDriver::command
pub trait DiverterDriver: Send + Sync {
    /// Issues a directional command to a diverter.
    ///
    /// Resolves to `Ok(true)` once the diverter acknowledges the move,
    /// `Ok(false)` if the diverter refused the command (mechanical
    /// interlock), or `Err` on a driver-level failure.
    fn command<'a>(
        &'a self,
        diverter_id: &'a str,
        direction: DiverterDirection,
    ) -> DriverFuture<'a, Result<bool, DriverError>>;

    /// Polls the diverter's current status string.
    ///
    /// Callers should hold the diverter's read lock; status polls may run
    /// concurrently with each other but never with an actuation command.
    fn status<'a>(&'a self, diverter_id: &'a str) -> DriverFuture<'a, Result<String, DriverError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_display() {
        assert_eq!(format!("{}", DiverterDirection::Left), "Left");
        assert_eq!(format!("{}", DiverterDirection::Straight), "Straight");
    }

    #[test]
    fn driver_error_messages_name_the_diverter() {
        let err = DriverError::CommunicationTimeout {
            diverter_id: "D3".to_string(),
            timeout_ms: 1500,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("D3"));
        assert!(msg.contains("1500"));

        let err = DriverError::UnknownDiverter("D9".to_string());
        assert!(format!("{}", err).contains("D9"));
    }
}
