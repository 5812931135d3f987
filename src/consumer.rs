//! Broker side of the sink: transport seam, lifecycle, channel setup, and delivery.
//!
//! [`ConnectionSupervisor`] owns one logical connection and keeps it alive; [`DeliveryGate`]
//! is the only way consumers see it, and only once every binding is in place.

pub mod amqp;
pub mod backoff;
pub mod channel;
pub mod delivery;
pub mod state;
pub mod supervisor;
pub mod transport;

pub use amqp::*;
pub use backoff::*;
pub use channel::*;
pub use delivery::*;
pub use state::*;
pub use supervisor::*;
pub use transport::*;
