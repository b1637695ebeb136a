//! RabbitMQ messaging module
//!
//! The bridge owns the broker connection for the whole process: RPC
//! commands with correlated replies, fire-and-forget events and jobs,
//! topology declaration on every (re)connect and bounded reconnection.

pub mod bridge;
pub mod patterns;
pub mod topology;

pub use bridge::{BridgeStatus, MessagingBridge, MessagingConfig};
pub use patterns::{MessageEnvelope, MessageMetadata};
