//! # huddle-transport
//!
//! Transport abstraction layer for the huddle session protocol.
//!
//! The session layer treats the publish/subscribe broker as an external
//! collaborator behind the [`Transport`] trait: connect, disconnect,
//! subscribe, publish, and one inbound delivery stream. An MQTT or other
//! broker binding implements the trait on the outside; this crate ships an
//! in-process [`MemoryBroker`] used by tests and single-process embedders.
//!
//! ```rust,no_run
//! use huddle_transport::{MemoryBroker, SubscribeOptions, Transport};
//!
//! # async fn run() -> Result<(), huddle_transport::TransportError> {
//! let broker = MemoryBroker::new();
//! let client = broker.client("peer-1");
//! let mut inbound = client.connect().await?;
//! client.subscribe("some/topic", SubscribeOptions::default()).await?;
//! while let Some(delivery) = inbound.recv().await {
//!     // Process delivery.payload
//! }
//! # Ok(())
//! # }
//! ```

pub mod memory;
pub mod traits;

pub use memory::{MemoryBroker, MemoryTransport};
pub use traits::{Inbound, PublishOptions, QoS, SubscribeOptions, Transport, TransportError};
