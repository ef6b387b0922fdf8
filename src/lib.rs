//! # Amberlink - BLE device registry and UART light link
//!
//! Amberlink tracks advertising BLE peripherals, keeps a bounded set of them
//! connected, and drives Amber multi-channel lights over a Nordic-UART style
//! write/notify pipe.
//!
//! ## Features
//!
//! - **Device Registry**: Discovery with per-family RSSI admission, eviction of weak or silent devices, and a FIFO-bounded auto-reconnect selection.
//! - **UART Framing**: One header byte per write/notify, fixed 5-byte application frames, malformed input dropped without tearing down the link.
//! - **Coalesced Writes**: Channel changes are debounced into one batch; locally pending values always win over echoed device state.
//! - **Demo Devices**: Synthetic devices that run through the same state machine with no radio attached.
//! - **Async Design**: A single Tokio event loop owns all state; other tasks talk to it through a cloneable handle.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use amberlink::config::Config;
//! use amberlink::names::MemoryNameStore;
//! use amberlink::registry::DeviceRegistry;
//! use amberlink::runtime::LinkRuntime;
//! use amberlink::transport::{NullTransport, TransportHandle};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("amberlink.toml").await?;
//!     let registry = DeviceRegistry::new(
//!         config.registry_settings(),
//!         NullTransport::new(TransportHandle(1)),
//!         Box::new(MemoryNameStore::new()),
//!     );
//!     let (_transport_tx, transport_rx) = tokio::sync::mpsc::unbounded_channel();
//!     let (runtime, handle) = LinkRuntime::new(registry, transport_rx);
//!     let task = runtime.spawn();
//!
//!     let snapshot = handle.snapshot().await?;
//!     println!("{} devices", snapshot.devices.len());
//!
//!     handle.shutdown().await;
//!     task.await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`registry`] - Device records, admission/eviction policy, selection, connection state machine
//! - [`uart`] - Header framing, frame codec and the channel coalescer
//! - [`runtime`] - The event loop and its handle
//! - [`transport`] - Interface to the host BLE stack
//! - [`events`] - Lifecycle events published to subscribers
//! - [`message_log`] - Traffic and informational log for display
//! - [`names`] - Custom device names
//! - [`scheduler`] - Keyed single-shot deadlines
//! - [`config`] - TOML configuration
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   LinkRuntime   │ ← event loop, commands, timers
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │ DeviceRegistry  │ ← state machine, policies, selection
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │  UART protocol  │ ← coalescer → frames → header
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │    Transport    │ ← host BLE stack
//! └─────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod logutil;
pub mod message_log;
pub mod metrics;
pub mod names;
pub mod registry;
pub mod runtime;
pub mod scheduler;
pub mod transport;
pub mod uart;
