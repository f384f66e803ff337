//! Internal position tracking.
//!
//! The registry is a cache of open legs owned by the trading core; broker
//! state is authoritative and the registry is rebuilt from (persistence +
//! broker snapshot) on recovery. `TicketWatch` holds the independent ticket
//! sets used by the monitor and the risk supervisor.

pub mod registry;
pub mod tickets;

pub use registry::{PositionRegistry, TrackedLeg};
pub use tickets::TicketWatch;
