//! Byte-stuffed framing over a continuous duplex byte channel
//!
//! The serial wire has no inherent message boundaries, so frames are
//! delimited by reserved START and END markers and any literal occurrence
//! of a marker inside the frame body is prefixed with the ESCAPE marker.
//! The receiver accepts the byte following an ESCAPE literally and resumes
//! the state that was active before the escape.
//!
//! Both directions are single-byte state machines: [`FrameTransmitter`] is
//! pumped one byte per transmit-ready event, [`FrameReceiver`] is fed one
//! byte per receive event. There is no retransmission at this layer; every
//! anomaly drops the in-progress frame and resynchronizes on the next
//! START marker.

use crate::packet::{
    Packet, CHECKSUM_SIZE, HEADER_SIZE, MAX_DATA_SIZE, MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE,
};
use heapless::Vec;

/// Frame start marker
pub const FRAME_START: u8 = 0xAA;

/// Frame end marker
pub const FRAME_END: u8 = 0x55;

/// Escape marker; the following byte is taken literally
pub const FRAME_ESCAPE: u8 = 0xCC;

/// Worst-case encoded frame size: every body byte escaped, plus delimiters
pub const MAX_ENCODED_FRAME_SIZE: usize = 2 * MAX_FRAME_SIZE + 2;

/// Errors that can occur during framing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Payload exceeds the wire size field
    PayloadTooLarge,
    /// Checksum mismatch; frame dropped
    InvalidChecksum,
    /// Byte outside the expected alphabet; frame dropped
    UnexpectedByte,
    /// Transmitter still streaming a previous frame
    Busy,
    /// Output buffer too small for the encoded frame
    BufferTooSmall,
}

fn needs_escape(byte: u8) -> bool {
    matches!(byte, FRAME_START | FRAME_END | FRAME_ESCAPE)
}

/// CRC-32 over header and payload, as carried in the frame footer
fn frame_checksum(header: &[u8; HEADER_SIZE], payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(header);
    hasher.update(payload);
    hasher.finalize()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Idle,
    SendStart,
    SendStream,
    SendEscape,
    SendEnd,
}

/// Transmit-side framing state machine
///
/// `load` serializes a packet (header, exactly `data_size` payload bytes,
/// CRC-32 footer) into the internal buffer; `next_byte` then yields the
/// escaped stream one byte per call, suitable for a transmit-ready
/// interrupt. The buffer is owned here, so the caller's packet is free as
/// soon as `load` returns.
#[derive(Debug)]
pub struct FrameTransmitter {
    state: TxState,
    buf: [u8; MAX_FRAME_SIZE],
    len: usize,
    idx: usize,
}

impl Default for FrameTransmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameTransmitter {
    pub fn new() -> Self {
        Self {
            state: TxState::Idle,
            buf: [0; MAX_FRAME_SIZE],
            len: 0,
            idx: 0,
        }
    }

    /// True when no frame is being streamed
    pub fn is_idle(&self) -> bool {
        self.state == TxState::Idle
    }

    /// Serialize `packet` and arm the pump
    ///
    /// Fails with [`FrameError::Busy`] while a previous frame is still
    /// streaming, so an armed transmission is never torn mid-frame.
    pub fn load(&mut self, packet: &Packet) -> Result<(), FrameError> {
        if !self.is_idle() {
            return Err(FrameError::Busy);
        }
        if packet.payload.len() > MAX_DATA_SIZE {
            return Err(FrameError::PayloadTooLarge);
        }

        let header = packet.header_bytes();
        let n = packet.payload.len();
        self.buf[..HEADER_SIZE].copy_from_slice(&header);
        self.buf[HEADER_SIZE..HEADER_SIZE + n].copy_from_slice(&packet.payload);

        let checksum = frame_checksum(&header, &packet.payload);
        self.buf[HEADER_SIZE + n..HEADER_SIZE + n + CHECKSUM_SIZE]
            .copy_from_slice(&checksum.to_le_bytes());

        self.len = HEADER_SIZE + n + CHECKSUM_SIZE;
        self.idx = 0;
        self.state = TxState::SendStart;
        Ok(())
    }

    /// Produce the next wire byte, or `None` while idle
    pub fn next_byte(&mut self) -> Option<u8> {
        match self.state {
            TxState::Idle => None,
            TxState::SendStart => {
                self.state = TxState::SendStream;
                Some(FRAME_START)
            }
            TxState::SendStream => {
                let byte = self.buf[self.idx];
                if needs_escape(byte) {
                    // keep idx; the literal byte goes out on the next pump
                    self.state = TxState::SendEscape;
                    return Some(FRAME_ESCAPE);
                }
                self.advance();
                Some(byte)
            }
            TxState::SendEscape => {
                let byte = self.buf[self.idx];
                self.advance();
                Some(byte)
            }
            TxState::SendEnd => {
                self.state = TxState::Idle;
                Some(FRAME_END)
            }
        }
    }

    fn advance(&mut self) {
        self.idx += 1;
        self.state = if self.idx == self.len {
            TxState::SendEnd
        } else {
            TxState::SendStream
        };
    }
}

/// Encode a whole frame into `out`, returning the encoded length
///
/// Produces exactly the byte sequence the pump would, in one call; used by
/// buffered or DMA transmit paths and by tests.
pub fn encode_frame(packet: &Packet, out: &mut [u8]) -> Result<usize, FrameError> {
    let mut tx = FrameTransmitter::new();
    tx.load(packet)?;
    let mut n = 0;
    while let Some(byte) = tx.next_byte() {
        if n == out.len() {
            return Err(FrameError::BufferTooSmall);
        }
        out[n] = byte;
        n += 1;
    }
    Ok(n)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxState {
    Idle,
    Header,
    Payload,
    Footer,
    End,
    Escape,
}

/// Receive-side framing state machine
///
/// Fed one byte per receive event. A completed, checksum-verified frame is
/// returned as a packet; every anomaly (marker out of sequence, checksum
/// mismatch) drops the in-progress frame and returns the machine to the
/// resync scan. Escapes are recorded with an explicit return state since
/// they can occur inside the header, payload, or footer.
#[derive(Debug)]
pub struct FrameReceiver {
    state: RxState,
    return_state: RxState,
    header: [u8; HEADER_SIZE],
    header_idx: usize,
    data_size: usize,
    payload: Vec<u8, MAX_PAYLOAD_SIZE>,
    footer: [u8; CHECKSUM_SIZE],
    footer_idx: usize,
}

impl Default for FrameReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReceiver {
    pub fn new() -> Self {
        Self {
            state: RxState::Idle,
            return_state: RxState::Idle,
            header: [0; HEADER_SIZE],
            header_idx: 0,
            data_size: 0,
            payload: Vec::new(),
            footer: [0; CHECKSUM_SIZE],
            footer_idx: 0,
        }
    }

    /// Drop any in-progress frame and return to the resync scan
    pub fn reset(&mut self) {
        self.state = RxState::Idle;
        self.return_state = RxState::Idle;
        self.header_idx = 0;
        self.data_size = 0;
        self.payload.clear();
        self.footer_idx = 0;
    }

    /// Feed a single wire byte
    ///
    /// Returns `Ok(Some(packet))` when a verified frame completes,
    /// `Ok(None)` when more bytes are needed, `Err` when the in-progress
    /// frame was dropped. After an error the receiver is re-armed; no
    /// recovery action is required of the caller.
    pub fn feed(&mut self, byte: u8) -> Result<Option<Packet>, FrameError> {
        match self.state {
            RxState::Idle => {
                if byte == FRAME_START {
                    self.begin_frame();
                }
                // anything else is inter-frame noise
                Ok(None)
            }
            RxState::Escape => {
                self.state = self.return_state;
                self.accept(byte)
            }
            RxState::Header | RxState::Payload | RxState::Footer => {
                if byte == FRAME_ESCAPE {
                    self.return_state = self.state;
                    self.state = RxState::Escape;
                    Ok(None)
                } else if byte == FRAME_START || byte == FRAME_END {
                    // marker before the frame is complete
                    self.reset();
                    Err(FrameError::UnexpectedByte)
                } else {
                    self.accept(byte)
                }
            }
            RxState::End => {
                if byte == FRAME_END {
                    let packet = self.take_packet();
                    self.reset();
                    Ok(Some(packet))
                } else {
                    self.reset();
                    Err(FrameError::UnexpectedByte)
                }
            }
        }
    }

    fn begin_frame(&mut self) {
        self.reset();
        self.state = RxState::Header;
    }

    /// Accept a body byte (literal or unescaped) in the current state
    fn accept(&mut self, byte: u8) -> Result<Option<Packet>, FrameError> {
        match self.state {
            RxState::Header => {
                self.header[self.header_idx] = byte;
                self.header_idx += 1;
                if self.header_idx == HEADER_SIZE {
                    self.data_size = self.header[0] as usize;
                    self.state = if self.data_size == 0 {
                        RxState::Footer
                    } else {
                        RxState::Payload
                    };
                }
                Ok(None)
            }
            RxState::Payload => {
                // cannot overflow: data_size <= 255 < capacity
                let _ = self.payload.push(byte);
                if self.payload.len() == self.data_size {
                    self.state = RxState::Footer;
                }
                Ok(None)
            }
            RxState::Footer => {
                self.footer[self.footer_idx] = byte;
                self.footer_idx += 1;
                if self.footer_idx == CHECKSUM_SIZE {
                    let received = u32::from_le_bytes(self.footer);
                    let computed = frame_checksum(&self.header, &self.payload);
                    if received != computed {
                        self.reset();
                        return Err(FrameError::InvalidChecksum);
                    }
                    self.state = RxState::End;
                }
                Ok(None)
            }
            // Escape never re-enters here; Idle/End bytes are handled in feed
            _ => {
                self.reset();
                Err(FrameError::UnexpectedByte)
            }
        }
    }

    fn take_packet(&mut self) -> Packet {
        Packet {
            control: self.header[1],
            src_address: self.header[2],
            dst_address: self.header[3],
            ttl: self.header[4],
            payload: core::mem::take(&mut self.payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::TTL_MAX;
    use proptest::prelude::*;

    fn feed_all(rx: &mut FrameReceiver, bytes: &[u8]) -> Option<Packet> {
        for &b in bytes {
            if let Ok(Some(p)) = rx.feed(b) {
                return Some(p);
            }
        }
        None
    }

    fn encode_to_vec(packet: &Packet) -> Vec<u8, MAX_ENCODED_FRAME_SIZE> {
        let mut buf = [0u8; MAX_ENCODED_FRAME_SIZE];
        let n = encode_frame(packet, &mut buf).unwrap();
        let mut v = Vec::new();
        v.extend_from_slice(&buf[..n]).unwrap();
        v
    }

    #[test]
    fn test_roundtrip_data_packet() {
        let original = Packet::data(3, 7, &[1, 2, 3, 4, 5]);
        let encoded = encode_to_vec(&original);

        let mut rx = FrameReceiver::new();
        let decoded = feed_all(&mut rx, &encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_roundtrip_free_packet() {
        let original = Packet::free();
        let encoded = encode_to_vec(&original);
        assert_eq!(encoded[0], FRAME_START);
        assert_eq!(*encoded.last().unwrap(), FRAME_END);

        let mut rx = FrameReceiver::new();
        let decoded = feed_all(&mut rx, &encoded).unwrap();
        assert!(decoded.is_free_packet());
    }

    #[test]
    fn test_markers_in_payload_are_escaped() {
        let payload = [FRAME_START, FRAME_END, FRAME_ESCAPE, 0x00, FRAME_START];
        let original = Packet::data(1, 2, &payload);
        let encoded = encode_to_vec(&original);

        // the body must not contain an unescaped START or END
        for window in encoded[1..encoded.len() - 1].windows(2) {
            if window[0] != FRAME_ESCAPE {
                assert_ne!(window[1], FRAME_START);
            }
        }

        let mut rx = FrameReceiver::new();
        let decoded = feed_all(&mut rx, &encoded).unwrap();
        assert_eq!(decoded.payload.as_slice(), &payload);
    }

    #[test]
    fn test_markers_in_header_are_escaped() {
        // src address equal to the start marker must round-trip
        let mut original = Packet::data(FRAME_START, FRAME_END, &[9]);
        original.ttl = 4;
        let encoded = encode_to_vec(&original);

        let mut rx = FrameReceiver::new();
        let decoded = feed_all(&mut rx, &encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_checksum_mismatch_drops_frame() {
        let original = Packet::data(3, 7, &[1, 2, 3]);
        let mut encoded = encode_to_vec(&original);
        // corrupt a payload byte (index 1 = start, 5 header bytes, then payload)
        let idx = 1 + HEADER_SIZE + 1;
        encoded[idx] ^= 0x01;

        let mut rx = FrameReceiver::new();
        let mut delivered = false;
        let mut saw_error = false;
        for &b in &encoded {
            match rx.feed(b) {
                Ok(Some(_)) => delivered = true,
                Ok(None) => {}
                Err(FrameError::InvalidChecksum) => saw_error = true,
                Err(_) => {}
            }
        }
        assert!(!delivered);
        assert!(saw_error);

        // receiver must be ready for the next frame
        let encoded = encode_to_vec(&original);
        let decoded = feed_all(&mut rx, &encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_resync_after_garbage() {
        let original = Packet::data(1, 2, &[0xDE, 0xAD]);
        let encoded = encode_to_vec(&original);

        let mut rx = FrameReceiver::new();
        assert!(feed_all(&mut rx, &[0x00, 0x13, 0x37, 0xFF]).is_none());
        let decoded = feed_all(&mut rx, &encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_start_marker_mid_frame_drops_frame() {
        let mut rx = FrameReceiver::new();
        // begin a frame, then an unescaped START inside the header
        assert_eq!(rx.feed(FRAME_START), Ok(None));
        assert_eq!(rx.feed(2), Ok(None));
        assert_eq!(rx.feed(FRAME_START), Err(FrameError::UnexpectedByte));

        // a later complete frame still parses
        let original = Packet::data(9, 1, &[7]);
        let encoded = encode_to_vec(&original);
        let decoded = feed_all(&mut rx, &encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_pump_matches_encode() {
        let packet = Packet::data(FRAME_ESCAPE, 7, &[FRAME_START, 1, FRAME_END]);
        let encoded = encode_to_vec(&packet);

        let mut tx = FrameTransmitter::new();
        tx.load(&packet).unwrap();
        let mut pumped = Vec::<u8, MAX_ENCODED_FRAME_SIZE>::new();
        while let Some(b) = tx.next_byte() {
            pumped.push(b).unwrap();
        }
        assert_eq!(pumped, encoded);
        assert!(tx.is_idle());
    }

    #[test]
    fn test_load_while_busy_rejected() {
        let packet = Packet::free();
        let mut tx = FrameTransmitter::new();
        tx.load(&packet).unwrap();
        assert_eq!(tx.load(&packet), Err(FrameError::Busy));

        // drain, then loading works again
        while tx.next_byte().is_some() {}
        assert!(tx.load(&packet).is_ok());
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let mut packet = Packet::free();
        for _ in 0..MAX_DATA_SIZE + 1 {
            packet.payload.push(0).unwrap();
        }
        let mut tx = FrameTransmitter::new();
        assert_eq!(tx.load(&packet), Err(FrameError::PayloadTooLarge));
        assert!(tx.is_idle());
    }

    #[test]
    fn test_only_data_size_bytes_are_streamed() {
        let packet = Packet::data(1, 2, &[0x11, 0x22]);
        let encoded = encode_to_vec(&packet);
        // start + header + 2 payload bytes + checksum + end, no marker
        // collisions in this frame body except possibly the checksum
        assert!(encoded.len() <= 1 + HEADER_SIZE + 2 + 2 * CHECKSUM_SIZE + 1);
    }

    proptest! {
        #[test]
        fn prop_roundtrip(
            src in any::<u8>(),
            dst in any::<u8>(),
            ttl in 1u8..=TTL_MAX,
            payload in proptest::collection::vec(any::<u8>(), 0..MAX_DATA_SIZE),
        ) {
            let mut original = Packet::data(src, dst, &payload);
            original.ttl = ttl;
            let encoded = encode_to_vec(&original);

            let mut rx = FrameReceiver::new();
            let decoded = feed_all(&mut rx, &encoded).unwrap();
            prop_assert_eq!(decoded, original);
        }

        #[test]
        fn prop_marker_heavy_payloads_roundtrip(
            payload in proptest::collection::vec(
                prop_oneof![Just(FRAME_START), Just(FRAME_END), Just(FRAME_ESCAPE), any::<u8>()],
                0..MAX_DATA_SIZE,
            ),
        ) {
            let original = Packet::data(FRAME_START, FRAME_END, &payload);
            let encoded = encode_to_vec(&original);

            let mut rx = FrameReceiver::new();
            let decoded = feed_all(&mut rx, &encoded).unwrap();
            prop_assert_eq!(decoded.payload.as_slice(), payload.as_slice());
        }
    }
}
