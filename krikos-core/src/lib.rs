//! Board-agnostic core logic for the ring network engine
//!
//! This crate contains all protocol state that does not depend on specific
//! hardware implementations:
//!
//! - Silence-detection watcher gating when a join attempt is safe
//! - MAC address-assignment state machine (claim / arbitration)
//! - Forwarding engine deciding the transmit action for every packet
//! - Application callback trait for free and data packets
//! - Engine configuration types
//!
//! The byte-level serial transport and the task scheduling that drive the
//! engine live in the firmware crate; everything here is host-testable.

#![no_std]
#![deny(unsafe_code)]

pub mod config;
pub mod engine;
pub mod mac;
pub mod traits;
pub mod watcher;

pub use config::{RingConfig, TieBreak};
pub use engine::{RingEngine, SendError};
pub use mac::{MacManager, MacState};
pub use traits::{PacketHandler, TxAction};
pub use watcher::{RingWatcher, WatcherState};
