//! # huddle-protocol
//!
//! Wire protocol definitions for the huddle session layer.
//!
//! This crate defines the JSON envelopes peers exchange over a pub/sub
//! transport, the topic scheme that routes them, and the identifier
//! generator behind peer and correlation ids.
//!
//! ## Envelope variants
//!
//! - `Ping` - heartbeat plus liveness status
//! - `Request` - addressed to exactly one peer
//! - `BroadcastRequest` - addressed to every known peer
//! - `Response` - acknowledgment of a prior request
//!
//! ## Example
//!
//! ```rust
//! use huddle_protocol::{codec, EnvelopeFactory};
//!
//! let factory = EnvelopeFactory::with_generated_id();
//! let request = factory.new_request(serde_json::json!({"sq": "e4"}), "move", "peer-2");
//!
//! let encoded = codec::encode(&request).unwrap();
//! let decoded = codec::decode(&encoded).unwrap();
//! assert_eq!(request, decoded);
//! ```

pub mod codec;
pub mod envelope;
pub mod topic;

pub use codec::{decode, encode, ProtocolError, MAX_ENVELOPE_SIZE};
pub use envelope::{generate_id, now_millis, CorrelationId, Envelope, EnvelopeFactory, PeerId};
pub use topic::{TopicKind, Topics};
