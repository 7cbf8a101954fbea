//! Typed event bus for progress fan-out.
//!
//! Sync runs, indexing workers and the filesystem observer publish here;
//! WebSocket and MCP subscribers pull at their own pace from bounded
//! per-subscriber buffers. See [`bus::EventBus`] and [`wire::Event`].

pub mod bus;
pub mod wire;

pub use bus::{AllTopics, BusMessage, EventBus, Subscriber, BUFFER_CAPACITY};
pub use wire::{Event, Topic};
