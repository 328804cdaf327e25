//! Worker connection lifecycle.
//!
//! # Data Flow
//! ```text
//! establish():
//!     ConnectOptions (from config)
//!     → Transport::connect
//!     → ActiveConnection stored (state ACTIVE)
//!
//! state() / is_connected():
//!     connectionless → NOT_APPLICABLE
//!     no connection  → CLOSED
//!     otherwise      → WorkerConnection::state()
//!
//! shutdown (lifecycle::shutdown):
//!     close → race closed() vs timer → clear reference
//! ```
//!
//! # Design Decisions
//! - The manager holds the only reference slot; establish writes, shutdown clears
//! - The coarse state is exposed as-is; health verdicts live in `health::diagnostics`

pub mod manager;
pub mod state;

pub use manager::{ActiveConnection, ConnectionManager};
pub use state::ConnectionState;
