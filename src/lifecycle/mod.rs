//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → logging/metrics → runtime → connect → monitor + admin
//!
//! Shutdown (shutdown.rs):
//!     Signal or explicit call → close connection → race deadline → clear
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then connection, then listeners
//! - Shutdown has a deadline; missing it is logged, never escalated
//! - Every shutdown trigger funnels through the same single-flight coordinator

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownCoordinator, ShutdownOutcome};
