//! Incident event bus
//!
//! Per-session publish/subscribe with history replay:
//!
//! - [`Event`] / [`EventType`]: immutable progress records; three types are terminal
//! - [`EventBus`]: non-blocking `emit`, atomic replay-then-live `subscribe`, `close`
//! - [`Subscription`]: `Stream` of events that ends at a terminal event or on close
//!
//! # Example
//!
//! ```rust,ignore
//! use incident_events::{EventBus, EventType};
//!
//! let bus = EventBus::new();
//! bus.emit("S-1", EventType::Received, json!({"service": "payment-service"}), "Alert received");
//! let mut sub = bus.subscribe("S-1");
//! while let Some(event) = sub.recv().await {
//!     println!("{} {}", event.event_type, event.message);
//! }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod bus;
mod event;
mod subscription;

pub use bus::{EventBus, EventBusStats, DEFAULT_QUEUE_CAPACITY};
pub use event::{Event, EventType, ParseEventTypeError};
pub use subscription::Subscription;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
