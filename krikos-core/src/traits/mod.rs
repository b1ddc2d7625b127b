//! Application-facing traits
//!
//! These traits define the seam between the protocol engine and the
//! application policy that decides what to do with packets delivered to
//! this node.

pub mod handler;

pub use handler::{PacketHandler, TxAction};
