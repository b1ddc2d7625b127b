//! Ring network wire format
//!
//! This crate defines the serial wire format shared by every node on the
//! ring: the packet model, the reserved protocol messages used for address
//! assignment, and the byte-stuffed framing that turns packets into a
//! delimited byte stream and back.
//!
//! # Frame layout
//!
//! ```text
//! ┌───────┬──────────────────────────────────────────────┬─────┐
//! │ START │ escaped( HEADER ‖ PAYLOAD ‖ CHECKSUM )       │ END │
//! │ 1B    │ 5B        0–256B   4B   (before escaping)    │ 1B  │
//! └───────┴──────────────────────────────────────────────┴─────┘
//! ```
//!
//! Any literal occurrence of the START, END, or ESCAPE marker inside the
//! escaped region is transmitted as ESCAPE followed by the raw byte. The
//! checksum is CRC-32 over header and payload, little-endian on the wire.
//!
//! Both the transmitter and the receiver are single-byte state machines so
//! they can be driven directly from transmit-ready / receive interrupts.

#![no_std]
#![deny(unsafe_code)]

pub mod framer;
pub mod messages;
pub mod packet;

pub use framer::{
    encode_frame, FrameError, FrameReceiver, FrameTransmitter, FRAME_END, FRAME_ESCAPE,
    FRAME_START, MAX_ENCODED_FRAME_SIZE,
};
pub use messages::{
    DeviceName, ProtocolMessage, MSG_ADDRESS_CLAIM, MSG_FREE, MSG_HELLO, MSG_WHO_ARE_YOU,
};
pub use packet::{
    Packet, CHECKSUM_SIZE, DEVICE_NAME_MAXSIZE, HEADER_SIZE, MAX_DATA_SIZE, MAX_FRAME_SIZE,
    MAX_PAYLOAD_SIZE, TTL_MAX, UNASSIGNED_ADDRESS,
};
