//! Crossbelt - Sorting orchestration core for cross-belt conveyor sorters
//!
//! This library turns upstream chute assignments into timed diverter
//! actions, executes them against the hardware under per-segment
//! deadlines, and tracks every parcel from detection to a terminal
//! outcome. Parcels that cannot be sorted in time are diverted to a
//! well-known exception chute; nothing ends without a reported
//! destination.
//!
//! # High-Level API
//!
//! For most use cases, the [`service`] module provides a facade:
//!
//! ```ignore
//! use crossbelt::config::SortingConfig;
//! use crossbelt::service::SortingService;
//!
//! let service = SortingService::new(
//!     SortingConfig::default(),
//!     routes,
//!     topology,
//!     driver,
//!     health,
//!     telemetry,
//!     completions,
//! )?;
//!
//! service.handle_detection(parcel_id);
//! let outcome = service.handle_assignment(assignment).await;
//! ```

pub mod capacity;
pub mod config;
pub mod deadline;
pub mod executor;
pub mod hardware;
pub mod health;
pub mod lock;
pub mod logging;
pub mod messaging;
pub mod parcel;
pub mod path;
pub mod reroute;
pub mod service;
pub mod telemetry;
pub mod timing;
pub mod topology;
pub mod tracker;

/// Version of the crossbelt library.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
