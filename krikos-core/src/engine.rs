//! Ring engine: per-packet forwarding and dispatch
//!
//! `RingEngine` ties the framing state machines, the silence watcher, and
//! the MAC manager together behind the three entry points the host gives
//! us: the receive-byte context, the transmit-ready context, and the
//! periodic scheduling context (`tick` + `poll`).
//!
//! Shared state crossing the interrupt/periodic boundary follows a
//! single-flag handoff: a completed receive is published once into the
//! packet slot, the periodic context reads it after observing the ready
//! flag, and only consuming the packet frees the slot for the next frame.
//! The transmitter is armed only from the periodic context and drained
//! only by the transmit context until it returns to idle.

use krikos_protocol::{FrameError, FrameReceiver, FrameTransmitter, Packet};

use crate::config::RingConfig;
use crate::mac::{MacManager, MacState};
use crate::traits::{PacketHandler, TxAction};
use crate::watcher::RingWatcher;

/// Errors returned by [`RingEngine::send_packet`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SendError {
    /// No ring address assigned yet
    NotReady,
    /// A frame is still streaming out
    Busy,
    /// Payload exceeds the wire size field
    TooLarge,
}

/// The per-node protocol engine
///
/// Construct once at boot, then drive from three contexts:
///
/// - [`on_rx_byte`](Self::on_rx_byte) per received byte,
/// - [`next_tx_byte`](Self::next_tx_byte) per transmit-ready event,
/// - [`tick`](Self::tick) and [`poll`](Self::poll) from the periodic
///   scheduling context.
pub struct RingEngine {
    receiver: FrameReceiver,
    transmitter: FrameTransmitter,
    rx_packet: Packet,
    rx_ready: bool,
    /// Set by the receive context, drained by `tick` into the watcher
    rx_seen: bool,
    watcher: RingWatcher,
    mac: MacManager,
    /// Watcher says claiming is safe; claim not yet transmitted
    claim_pending: bool,
    /// Contention window expired; hello not yet transmitted
    hello_pending: bool,
    frame_errors: u32,
    overruns: u32,
}

impl RingEngine {
    pub fn new(config: RingConfig) -> Self {
        let watcher = RingWatcher::new(
            config.silence_timeout_ms,
            config.debounce_with_jitter_ms(),
        );
        Self {
            receiver: FrameReceiver::new(),
            transmitter: FrameTransmitter::new(),
            rx_packet: Packet::free(),
            rx_ready: false,
            rx_seen: false,
            watcher,
            mac: MacManager::new(config),
            claim_pending: false,
            hello_pending: false,
            frame_errors: 0,
            overruns: 0,
        }
    }

    // --- receive-byte context ---

    /// Feed one received wire byte
    ///
    /// Framing errors are counted and swallowed; the link resynchronizes
    /// on the next start marker. A frame completing while the previous
    /// packet is still unconsumed is dropped (overrun) so the slot is
    /// never overwritten under the reader.
    pub fn on_rx_byte(&mut self, byte: u8) {
        match self.receiver.feed(byte) {
            Ok(Some(packet)) => {
                self.rx_seen = true;
                if self.rx_ready {
                    self.overruns = self.overruns.wrapping_add(1);
                } else {
                    self.rx_packet = packet;
                    self.rx_ready = true;
                }
            }
            Ok(None) => {}
            Err(_) => {
                self.frame_errors = self.frame_errors.wrapping_add(1);
            }
        }
    }

    // --- transmit-ready context ---

    /// Produce the next wire byte to transmit, or `None` when idle
    pub fn next_tx_byte(&mut self) -> Option<u8> {
        self.transmitter.next_byte()
    }

    /// True when no frame is being streamed out
    pub fn tx_idle(&self) -> bool {
        self.transmitter.is_idle()
    }

    // --- periodic scheduling context ---

    /// Advance all countdowns by elapsed milliseconds
    ///
    /// Latches watcher and MAC expiry events; the corresponding
    /// transmissions happen on the next [`poll`](Self::poll).
    pub fn tick(&mut self, delta_ms: u32) {
        if self.rx_seen {
            self.rx_seen = false;
            self.watcher.observe_packet();
        }
        if self.watcher.advance(delta_ms) && self.mac.state() != MacState::Claiming {
            // quiet wire: join if unassigned, or restart a starved ring
            self.claim_pending = true;
        }
        if self.mac.advance(delta_ms) {
            self.hello_pending = true;
        }
    }

    /// Drain a completed receive and emit exactly one transmit action
    ///
    /// Must be called on every scheduling tick. A ready packet is only
    /// consumed while the transmitter is idle; otherwise it stays pending
    /// for the next poll, bounding the token turnaround to one period.
    pub fn poll<H: PacketHandler>(&mut self, handler: &mut H) {
        if self.rx_ready && self.transmitter.is_idle() {
            self.mac.observe_packet(&self.rx_packet);
            let action = self.dispatch(handler);
            self.execute(action);
            self.rx_ready = false;
        }

        if self.hello_pending && self.transmitter.is_idle() {
            let mut hello = Packet::free();
            self.mac.make_hello(&mut hello);
            self.load(&hello);
            self.hello_pending = false;
        }

        if self.claim_pending && self.transmitter.is_idle() {
            let mut claim = Packet::free();
            self.mac.begin_claim(&mut claim);
            self.load(&claim);
            self.claim_pending = false;
        }
    }

    // --- application surface ---

    /// True once the MAC manager holds a ring address
    pub fn is_address_assigned(&self) -> bool {
        self.mac.is_address_assigned()
    }

    /// The node's current ring address (0 while unassigned)
    pub fn address(&self) -> u8 {
        self.mac.address()
    }

    /// Submit an application packet for transmission
    ///
    /// The frame is serialized into the transmitter's own buffer, so the
    /// caller's packet may be reused as soon as this returns. Note that a
    /// packet sent outside the free-packet callback adds a frame to the
    /// ring on top of the circulating token; prefer seizing the token via
    /// [`PacketHandler::on_free_packet`].
    pub fn send_packet(&mut self, packet: &Packet) -> Result<(), SendError> {
        if !self.mac.is_address_assigned() {
            return Err(SendError::NotReady);
        }
        self.transmitter.load(packet).map_err(|e| match e {
            FrameError::PayloadTooLarge => SendError::TooLarge,
            _ => SendError::Busy,
        })
    }

    /// True while a received packet is waiting to be read
    pub fn packet_received(&self) -> bool {
        self.rx_ready
    }

    /// The most recently completed receive; meaningful only while
    /// [`packet_received`](Self::packet_received) is true
    pub fn packet(&self) -> &Packet {
        &self.rx_packet
    }

    /// Release the receive slot for the next frame
    pub fn consume_packet(&mut self) {
        self.rx_ready = false;
    }

    /// Frames dropped for framing or checksum errors
    pub fn frame_errors(&self) -> u32 {
        self.frame_errors
    }

    /// Frames dropped because the receive slot was still occupied
    pub fn overruns(&self) -> u32 {
        self.overruns
    }

    // --- internals ---

    /// The forwarding table: one action per received packet
    fn dispatch<H: PacketHandler>(&mut self, handler: &mut H) -> TxAction {
        let p = &mut self.rx_packet;
        if p.is_free_packet() {
            handler.on_free_packet(p)
        } else if p.is_protocol_packet() {
            self.mac.process_protocol_packet(p)
        } else if self.mac.is_address_assigned() && p.is_for(self.mac.address()) {
            handler.on_data_packet(p)
        } else {
            TxAction::PassAlong
        }
    }

    fn execute(&mut self, action: TxAction) {
        match action {
            TxAction::PassAlong => {
                if self.rx_packet.ttl > 1 {
                    self.rx_packet.ttl -= 1;
                } else {
                    // hop budget exhausted: the packet dies here
                    self.rx_packet.make_free();
                }
            }
            TxAction::SendFree => self.rx_packet.make_free(),
            TxAction::Send => {}
        }
        // cannot fail: the transmitter was idle and received payloads
        // always fit the wire size field
        let _ = self.transmitter.load(&self.rx_packet);
    }

    fn load(&mut self, packet: &Packet) {
        // cannot fail: the transmitter was idle and every packet built
        // here fits the wire size field
        let _ = self.transmitter.load(packet);
    }
}
