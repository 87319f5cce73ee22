//! # huddle-core
//!
//! Session coordination for the huddle protocol: presence tracking,
//! request/broadcast correlation, and the connection lifecycle.
//!
//! This crate provides the building blocks:
//!
//! - **Session** - lifecycle, heartbeats, send/broadcast operations
//! - **Presence** - roster of alive peers, refreshed by inbound pings
//! - **CorrelationRegistry** - in-flight requests and completion policies
//! - **SessionConfig** - timers and session identity
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌─────────────────────┐
//! │  Transport  │────▶│   Session    │────▶│ CorrelationRegistry │
//! └─────────────┘     └──────────────┘     └─────────────────────┘
//!                            │
//!                            ▼
//!                     ┌─────────────┐
//!                     │  Presence   │
//!                     └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use huddle_core::{Session, SessionConfig};
//! use huddle_transport::MemoryBroker;
//!
//! # async fn run() -> Result<(), huddle_core::SessionError> {
//! let broker = MemoryBroker::new();
//! let mut session = Session::new(broker.client("client-1"), SessionConfig::new("chess", "game-1"));
//!
//! let _incoming = session.connect().await?;
//! session.set_status("ready");
//!
//! // Broadcast once peers are known; completion resolves when all answer.
//! let completion = session.send_to_all("start", serde_json::json!({"round": 1})).await?;
//! completion.await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod correlation;
pub mod error;
pub mod presence;
pub mod session;

pub use config::SessionConfig;
pub use correlation::{Completion, CompletionPolicy, CorrelationRegistry};
pub use error::SessionError;
pub use presence::{PeerRecord, Presence};
pub use session::{ConnectionState, IncomingMessage, Session};
