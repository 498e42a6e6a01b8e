//! Transport-agnostic upstream messaging.
//!
//! The rule engine that decides chute assignments lives outside this core.
//! Inbound assignments arrive on an explicit channel between the
//! transport listener task and the sorting service; outbound completion
//! notifications leave through a [`CompletionSink`] trait object
//! registered once at startup. Both payload types carry serde derives so
//! any transport adapter can encode them.

use crate::parcel::ParcelId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use tracing::warn;

/// Inbound: the upstream rule engine assigned a chute to a parcel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChuteAssignment {
    /// Parcel the assignment is for.
    pub parcel_id: ParcelId,
    /// Destination chute decided upstream.
    pub chute_id: u32,
    /// When the upstream decision was made.
    pub assigned_at: DateTime<Utc>,
}

/// Final disposition of a parcel, reported upstream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortingOutcome {
    /// Sorted to the target chute.
    Success,
    /// A wait budget was exceeded; parcel went to the exception chute.
    Timeout,
    /// The parcel disappeared from the belt.
    Lost,
    /// The parcel could not be routed or executed (no route, unhealthy
    /// path, overload, or an unrecoverable segment failure); it went to
    /// the exception chute.
    Failed,
}

impl fmt::Display for SortingOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "Success"),
            Self::Timeout => write!(f, "Timeout"),
            Self::Lost => write!(f, "Lost"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Outbound: a parcel reached a terminal state.
///
/// Every failure is reported through the `outcome` field so external
/// systems can reconcile physical losses; the system never leaves a
/// parcel with an undefined destination.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SortingCompletedNotification {
    /// Parcel the notification is for.
    pub parcel_id: ParcelId,
    /// Chute the parcel actually reached (exception chute on failure).
    pub actual_chute_id: u32,
    /// When the terminal state was reached.
    pub completed_at: DateTime<Utc>,
    /// Final disposition.
    pub outcome: SortingOutcome,
}

/// Sink for completion notifications.
pub trait CompletionSink: Send + Sync {
    /// Delivers a notification upstream. Must not block.
    fn notify(&self, notification: SortingCompletedNotification);
}

/// Sink that discards notifications.
pub struct NullCompletionSink;

impl CompletionSink for NullCompletionSink {
    fn notify(&self, _notification: SortingCompletedNotification) {}
}

/// Sink that forwards notifications onto an unbounded channel.
pub struct ChannelCompletionSink {
    tx: mpsc::UnboundedSender<SortingCompletedNotification>,
}

impl ChannelCompletionSink {
    /// Creates a sink and the receiver the transport adapter drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SortingCompletedNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl CompletionSink for ChannelCompletionSink {
    fn notify(&self, notification: SortingCompletedNotification) {
        if self.tx.send(notification).is_err() {
            warn!("completion receiver dropped, notification discarded");
        }
    }
}

/// Creates the inbound assignment channel between the transport listener
/// and the sorting service.
pub fn assignment_channel() -> (
    mpsc::UnboundedSender<ChuteAssignment>,
    mpsc::UnboundedReceiver<ChuteAssignment>,
) {
    mpsc::unbounded_channel()
}
