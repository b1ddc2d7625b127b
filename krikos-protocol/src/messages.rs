//! Reserved protocol messages
//!
//! The first payload byte of a protocol packet is the message id. These
//! messages drive address assignment and are consumed by the MAC layer;
//! they are never surfaced to the application.

use crate::packet::{Packet, DEVICE_NAME_MAXSIZE, TTL_MAX, UNASSIGNED_ADDRESS};
use heapless::String;

// Message ids
pub const MSG_FREE: u8 = 0;
pub const MSG_ADDRESS_CLAIM: u8 = 1;
pub const MSG_WHO_ARE_YOU: u8 = 2;
pub const MSG_HELLO: u8 = 3;

/// Human-readable node identity carried in an address claim
pub type DeviceName = String<DEVICE_NAME_MAXSIZE>;

/// A parsed protocol-packet payload
///
/// An address claim announces the candidate address (in the packet's
/// source field) together with the claimant's hardware id and device name:
/// `[id, hwid as LE u32, name_len, name bytes]`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolMessage {
    /// The idle token
    Free,
    /// Arbitration claim for the address in `src_address`
    AddressClaim {
        hardware_id: u32,
        device_name: DeviceName,
    },
    /// Request for address holders to re-announce themselves
    WhoAreYou,
    /// Announcement from a freshly joined node
    Hello,
}

impl ProtocolMessage {
    /// Parse the payload of a protocol packet
    ///
    /// Returns `None` for data packets and for malformed or unknown
    /// protocol payloads; callers treat those as unknown messages.
    pub fn parse(packet: &Packet) -> Option<Self> {
        if !packet.is_protocol_packet() {
            return None;
        }
        if packet.payload.is_empty() {
            return Some(ProtocolMessage::Free);
        }
        let payload = &packet.payload;
        match payload[0] {
            MSG_FREE => Some(ProtocolMessage::Free),
            MSG_ADDRESS_CLAIM => {
                if payload.len() < 6 {
                    return None;
                }
                let hardware_id =
                    u32::from_le_bytes([payload[1], payload[2], payload[3], payload[4]]);
                let name_len = payload[5] as usize;
                if name_len > DEVICE_NAME_MAXSIZE || payload.len() < 6 + name_len {
                    return None;
                }
                // a name that is not valid UTF-8 is dropped; the claim
                // itself stays valid since arbitration runs on the hwid
                let mut device_name = DeviceName::new();
                if let Ok(name) = core::str::from_utf8(&payload[6..6 + name_len]) {
                    let _ = device_name.push_str(name);
                }
                Some(ProtocolMessage::AddressClaim {
                    hardware_id,
                    device_name,
                })
            }
            MSG_WHO_ARE_YOU => Some(ProtocolMessage::WhoAreYou),
            MSG_HELLO => Some(ProtocolMessage::Hello),
            _ => None,
        }
    }

    /// Rewrite `packet` in place as this message
    ///
    /// Sets the protocol control byte, the given addresses, a full hop
    /// budget, and the message payload.
    pub fn apply(&self, packet: &mut Packet, src_address: u8, dst_address: u8) {
        packet.control = 0;
        packet.src_address = src_address;
        packet.dst_address = dst_address;
        packet.ttl = TTL_MAX;
        packet.payload.clear();
        match self {
            ProtocolMessage::Free => {
                packet.src_address = UNASSIGNED_ADDRESS;
                packet.dst_address = UNASSIGNED_ADDRESS;
            }
            ProtocolMessage::AddressClaim {
                hardware_id,
                device_name,
            } => {
                let _ = packet.payload.push(MSG_ADDRESS_CLAIM);
                let _ = packet.payload.extend_from_slice(&hardware_id.to_le_bytes());
                let name = device_name.as_bytes();
                let _ = packet.payload.push(name.len() as u8);
                let _ = packet.payload.extend_from_slice(name);
            }
            ProtocolMessage::WhoAreYou => {
                let _ = packet.payload.push(MSG_WHO_ARE_YOU);
            }
            ProtocolMessage::Hello => {
                let _ = packet.payload.push(MSG_HELLO);
            }
        }
    }
}
