//! Worker connection lifecycle and health diagnostics.
//!
//! Holds a worker's persistent connection to its dispatcher, answers "is this
//! worker actually able to receive work?" from transport-level evidence, and
//! shuts the connection down gracefully within a deadline.

pub mod admin;
pub mod config;
pub mod connection;
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod registry;
pub mod runtime;
pub mod transport;

pub use config::schema::WorkerConfig;
pub use connection::{ConnectionManager, ConnectionState};
pub use health::{ConnectionHealthInfo, HealthCheckResult, HealthStatus, SystemHealth};
pub use lifecycle::{Shutdown, ShutdownOutcome};
pub use runtime::WorkerRuntime;
