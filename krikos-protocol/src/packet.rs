//! Ring packet model
//!
//! A packet is a 5-byte header, up to 256 payload bytes, and a CRC-32
//! footer. The header carries the payload size, a control byte (bit 0
//! distinguishes protocol packets from data packets), source and
//! destination ring addresses, and a hop budget.
//!
//! The distinguished *free packet* (protocol, empty payload) is the idle
//! token: exactly one token-equivalent packet circulates on a healthy ring.

use heapless::Vec;

/// Payload buffer capacity in bytes
pub const MAX_PAYLOAD_SIZE: usize = 256;

/// Largest payload expressible in the one-byte wire `data_size` field
pub const MAX_DATA_SIZE: usize = 255;

/// Wire header size: data_size, control, src, dst, ttl
pub const HEADER_SIZE: usize = 5;

/// Wire footer size: CRC-32, little-endian
pub const CHECKSUM_SIZE: usize = 4;

/// Maximum unescaped frame size (header + payload + checksum)
pub const MAX_FRAME_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD_SIZE + CHECKSUM_SIZE;

/// Hop budget assigned to every locally originated packet
pub const TTL_MAX: u8 = 10;

/// The unassigned / generic destination address
pub const UNASSIGNED_ADDRESS: u8 = 0;

/// Maximum device name length carried in an address claim
pub const DEVICE_NAME_MAXSIZE: usize = 16;

/// Control bit 0: clear for protocol packets, set for data packets
const CONTROL_DATA: u8 = 0x01;

/// A ring packet
///
/// The wire-level `data_size` field is `payload.len()`; the checksum is
/// computed by the framer at transmit time and verified at reception, so
/// neither is stored here.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Packet {
    /// Control byte; bit 0 clear = protocol, set = data, other bits reserved
    pub control: u8,
    /// Source ring address (0 while unassigned)
    pub src_address: u8,
    /// Destination ring address (0 = generic)
    pub dst_address: u8,
    /// Remaining hop budget
    pub ttl: u8,
    /// Payload bytes; first byte of a protocol packet is the message id
    pub payload: Vec<u8, MAX_PAYLOAD_SIZE>,
}

impl Default for Packet {
    fn default() -> Self {
        Self::free()
    }
}

impl Packet {
    /// Create the idle token
    pub fn free() -> Self {
        Self {
            control: 0,
            src_address: UNASSIGNED_ADDRESS,
            dst_address: UNASSIGNED_ADDRESS,
            ttl: TTL_MAX,
            payload: Vec::new(),
        }
    }

    /// Create a data packet with a full hop budget
    ///
    /// Payloads longer than [`MAX_DATA_SIZE`] are truncated.
    pub fn data(src_address: u8, dst_address: u8, payload: &[u8]) -> Self {
        let mut p = Vec::new();
        let len = payload.len().min(MAX_DATA_SIZE);
        let _ = p.extend_from_slice(&payload[..len]);
        Self {
            control: CONTROL_DATA,
            src_address,
            dst_address,
            ttl: TTL_MAX,
            payload: p,
        }
    }

    /// Number of valid payload bytes (the wire `data_size` field)
    pub fn data_size(&self) -> usize {
        self.payload.len()
    }

    /// True iff control bit 0 is clear
    pub fn is_protocol_packet(&self) -> bool {
        self.control & CONTROL_DATA == 0
    }

    /// True iff this is the idle token (protocol packet, empty payload)
    pub fn is_free_packet(&self) -> bool {
        self.is_protocol_packet() && self.payload.is_empty()
    }

    /// True iff the packet is addressed to `address`
    pub fn is_for(&self, address: u8) -> bool {
        self.dst_address == address
    }

    /// Rewrite this packet in place as the idle token
    pub fn make_free(&mut self) {
        self.control = 0;
        self.src_address = UNASSIGNED_ADDRESS;
        self.dst_address = UNASSIGNED_ADDRESS;
        self.ttl = TTL_MAX;
        self.payload.clear();
    }

    /// Rewrite this packet as a `hello` reply to its own sender
    ///
    /// The old source becomes the destination, `new_src` becomes the
    /// source. Used by a freshly joined node to announce itself to the
    /// neighbor whose traffic it last observed.
    pub fn make_hello_from(&mut self, new_src: u8) {
        self.control = 0;
        self.dst_address = self.src_address;
        self.src_address = new_src;
        self.ttl = TTL_MAX;
        self.payload.clear();
        let _ = self.payload.push(crate::messages::MSG_HELLO);
    }

    /// Serialize the wire header into a 5-byte array
    pub fn header_bytes(&self) -> [u8; HEADER_SIZE] {
        [
            self.payload.len() as u8,
            self.control,
            self.src_address,
            self.dst_address,
            self.ttl,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::MSG_HELLO;

    #[test]
    fn test_free_packet_shape() {
        let p = Packet::free();
        assert!(p.is_protocol_packet());
        assert!(p.is_free_packet());
        assert_eq!(p.src_address, UNASSIGNED_ADDRESS);
        assert_eq!(p.dst_address, UNASSIGNED_ADDRESS);
        assert_eq!(p.ttl, TTL_MAX);
        assert_eq!(p.data_size(), 0);
    }

    #[test]
    fn test_data_packet_is_not_protocol() {
        let p = Packet::data(3, 7, &[1, 2, 3]);
        assert!(!p.is_protocol_packet());
        assert!(!p.is_free_packet());
        assert!(p.is_for(7));
        assert!(!p.is_for(3));
        assert_eq!(p.data_size(), 3);
        assert_eq!(p.ttl, TTL_MAX);
    }

    #[test]
    fn test_make_free_resets_header() {
        let mut p = Packet::data(3, 7, &[9; 16]);
        p.ttl = 1;
        p.make_free();
        assert!(p.is_free_packet());
        assert_eq!(p.src_address, 0);
        assert_eq!(p.dst_address, 0);
        assert_eq!(p.ttl, TTL_MAX);
        assert_eq!(p.data_size(), 0);
    }

    #[test]
    fn test_make_hello_swaps_addresses() {
        let mut p = Packet::data(5, 9, &[1, 2, 3, 4]);
        p.make_hello_from(42);
        assert!(p.is_protocol_packet());
        assert_eq!(p.dst_address, 5); // old source
        assert_eq!(p.src_address, 42);
        assert_eq!(p.ttl, TTL_MAX);
        assert_eq!(p.payload.as_slice(), &[MSG_HELLO]);
    }

    #[test]
    fn test_data_payload_truncated_at_wire_limit() {
        let big = [0xABu8; MAX_PAYLOAD_SIZE + 10];
        let p = Packet::data(1, 2, &big);
        assert_eq!(p.data_size(), MAX_DATA_SIZE);
    }

    #[test]
    fn test_header_bytes_layout() {
        let p = Packet::data(3, 7, &[1, 2]);
        assert_eq!(p.header_bytes(), [2, 0x01, 3, 7, TTL_MAX]);
    }
}
