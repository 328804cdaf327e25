//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Connection verdict (diagnostics.rs):
//!     ConnectionManager snapshot
//!     → tiered probe inspection
//!     → ConnectionHealthInfo
//!
//! System report (aggregator.rs):
//!     connection / functions / memory checks (checks.rs)
//!     → concurrent fan-out, single-flight
//!     → SystemHealth (worst status wins)
//!
//! Background (monitor.rs):
//!     Periodic timer → aggregator → log transitions
//! ```
//!
//! # Design Decisions
//! - Diagnostics are synchronous and never fail
//! - Aggregation never fails; broken checks report unhealthy
//! - Degraded is reserved for transient states and soft limits

pub mod aggregator;
pub mod checks;
pub mod diagnostics;
pub mod monitor;
pub mod types;

pub use aggregator::{HealthAggregator, ReportInfo};
pub use checks::{
    ConnectionCheck, FunctionRegistrationCheck, HealthCheck, MemoryCheck, MemoryPolicy, MemoryProbe,
    MemoryUsage, SysinfoMemoryProbe,
};
pub use diagnostics::{DiagnosticsPolicy, HealthDiagnostics};
pub use monitor::HealthMonitor;
pub use types::{CheckError, ConnectionHealthInfo, HealthCheckResult, HealthStatus, SystemHealth};
