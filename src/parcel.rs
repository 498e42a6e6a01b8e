//! Parcel identity.
//!
//! Every parcel entering the sorter is tracked by a [`ParcelId`]. IDs are
//! usually the barcode or induction-scanner value; auto-generated IDs exist
//! for parcels detected without a readable code.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for generating unique parcel IDs.
static PARCEL_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a parcel.
///
/// # Example
///
/// ```
/// use crossbelt::parcel::ParcelId;
///
/// // ID from a scanned barcode
/// let id = ParcelId::new("PKG-20260830-0042");
///
/// // Auto-generated ID for an unreadable label
/// let id = ParcelId::auto();
/// ```
#[derive(Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParcelId(String);

impl ParcelId {
    /// Creates a parcel ID from the given string value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates a unique auto-generated parcel ID.
    ///
    /// The ID format is `parcel-{counter}` where counter is monotonically
    /// increasing. Used when the induction scanner cannot read a label.
    pub fn auto() -> Self {
        let counter = PARCEL_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("parcel-{}", counter))
    }

    /// Returns the string value of this parcel ID.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ParcelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParcelId({})", self.0)
    }
}

impl fmt::Display for ParcelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ParcelId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ParcelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
