//! API layer
//!
//! HTTP handlers for:
//! - ActivityPub inbox and relay actor
//! - WebFinger and NodeInfo discovery
//! - Metrics (Prometheus)

mod actor;
mod inbox;
pub mod metrics;
mod wellknown;

pub use actor::actor_router;
pub use inbox::inbox_router;
pub use metrics::metrics_router;
pub use wellknown::wellknown_router;
