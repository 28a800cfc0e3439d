//! Channel Bridge - blocking access to an event-driven channel socket.
//!
//! This crate lets synchronous code (a test routine, a script, a worker
//! thread) drive an asynchronous, callback-driven publish/subscribe socket
//! client with ordinary blocking calls and timeouts.
//!
//! # Architecture
//!
//! - **Bridge** - handle with blocking operations (join, leave, push, ...)
//! - **Socket task** - actor owning the protocol client and the callback handler
//! - **Mailbox** - owner inbox the handler forwards tagged notifications to
//! - **Serializer** - pluggable wire codec handed to the protocol client
//!
//! # Modules
//!
//! - [`bridge`] - the blocking handle and its socket handler
//! - [`socket`] - protocol client and callback contracts, driver loop
//! - [`mailbox`] - notifications and selective receive
//! - [`serializer`] - plain and compressed codecs
//! - [`config`] - bridge configuration
//! - [`testing`] - scripted protocol client for tests

pub mod bridge;
pub mod config;
pub mod error;
pub mod mailbox;
pub mod message;
pub mod serializer;
pub mod socket;
pub mod testing;

// Re-export commonly used types
pub use bridge::{Bridge, BridgeStatus, ConnectStatus, ConnectionState, IncomingMessage, TopicState};
pub use config::BridgeConfig;
pub use error::{BridgeError, BridgeResult};
pub use mailbox::{BridgeId, Notification, NotificationKind};
pub use message::{Message, Payload, Ref, Topic};
pub use serializer::{Frame, Serializer, SerializerKind};
pub use socket::{ProtocolClient, SocketEvent, SocketHandler};
