//! Hub server components
//!
//! The [`broker::Broker`] owns the endpoint and connection lifecycle and
//! composes the other pieces: the room [`registry`] for fan-out, the
//! [`presence`] store for online/offline transitions, per-connection
//! [`session`] state, and the event [`router`] that maps client events to
//! store mutations and broadcasts.

pub mod broker;
pub mod presence;
pub mod registry;
pub mod router;
pub mod session;

pub use broker::{Broker, BrokerConfig};
pub use presence::{PresenceRecord, PresenceStore};
pub use registry::RoomRegistry;
pub use router::EventRouter;
pub use session::{OutboundSender, Session};
