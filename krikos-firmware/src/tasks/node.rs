//! Node task: owns the ring engine and the application policy
//!
//! The single owner of all protocol state. Selects over incoming wire
//! bytes and the periodic tick, drives the engine, and hands armed frames
//! to the transmit task.

use defmt::*;
use embassy_futures::select::{select, Either};

use krikos_core::{PacketHandler, RingConfig, RingEngine, TxAction};
use krikos_protocol::Packet;

use crate::channels::{TxFrame, RX_BYTES, TICK_SIGNAL, TX_FRAMES};

/// Free packets to let pass between status reports
const STATUS_INTERVAL_TOKENS: u32 = 128;

/// Demo application policy: log and consume data packets addressed to
/// this node, and periodically seize the token to report uptime.
struct NodeHandler {
    address: u8,
    tokens_seen: u32,
    status_seq: u32,
}

impl NodeHandler {
    fn new() -> Self {
        Self {
            address: 0,
            tokens_seen: 0,
            status_seq: 0,
        }
    }
}

impl PacketHandler for NodeHandler {
    fn on_free_packet(&mut self, packet: &mut Packet) -> TxAction {
        self.tokens_seen += 1;
        if self.address != 0 && self.tokens_seen % STATUS_INTERVAL_TOKENS == 0 {
            self.status_seq += 1;
            *packet = Packet::data(self.address, 0, &self.status_seq.to_le_bytes());
            debug!("Status report {} sent", self.status_seq);
            return TxAction::Send;
        }
        TxAction::PassAlong
    }

    fn on_data_packet(&mut self, packet: &mut Packet) -> TxAction {
        debug!(
            "Data packet from {}: {} bytes",
            packet.src_address,
            packet.data_size()
        );
        TxAction::SendFree
    }
}

/// Node task - drives the ring engine from bytes and ticks
#[embassy_executor::task]
pub async fn node_task(config: RingConfig) {
    info!("Node task started, hardware id {:08x}", config.hardware_id);

    let mut engine = RingEngine::new(config);
    let mut handler = NodeHandler::new();
    let mut last_tick_ms: u32 = 0;
    let mut was_assigned = false;

    loop {
        match select(RX_BYTES.receive(), TICK_SIGNAL.wait()).await {
            Either::First(chunk) => {
                for &byte in chunk.iter() {
                    engine.on_rx_byte(byte);
                }
            }
            Either::Second(now_ms) => {
                let delta_ms = now_ms.wrapping_sub(last_tick_ms);
                last_tick_ms = now_ms;
                engine.tick(delta_ms);
            }
        }

        engine.poll(&mut handler);

        if engine.is_address_assigned() != was_assigned {
            was_assigned = engine.is_address_assigned();
            handler.address = engine.address();
            if was_assigned {
                info!("Ring address assigned: {}", engine.address());
            } else {
                warn!("Ring address lost, re-claiming");
            }
        }

        // hand an armed frame to the transmit task
        if !engine.tx_idle() {
            let mut frame = TxFrame::new();
            while let Some(byte) = engine.next_tx_byte() {
                // cannot fail: TxFrame holds a worst-case encoded frame
                let _ = frame.push(byte);
            }
            if TX_FRAMES.try_send(frame).is_err() {
                // drop rather than stall the engine; the ring self-heals
                warn!("TX channel full, frame dropped");
            }
        }
    }
}
