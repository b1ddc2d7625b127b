//! Ring UART receive task
//!
//! Reads raw bytes from the upstream neighbor and ships them to the node
//! task in chunks. Framing happens inside the engine, so this task never
//! interprets the bytes.

use defmt::*;
use embassy_rp::uart::BufferedUartRx;
use embedded_io_async::Read;

use crate::channels::{RxChunk, RX_BYTES, RX_CHUNK_SIZE};

/// Ring RX task - forwards wire bytes to the node task
#[embassy_executor::task]
pub async fn ring_rx_task(mut rx: BufferedUartRx) {
    info!("Ring RX task started");

    let mut buf = [0u8; RX_CHUNK_SIZE];

    loop {
        match rx.read(&mut buf).await {
            Ok(n) if n > 0 => {
                trace!("RX: {} bytes", n);
                let mut chunk = RxChunk::new();
                // cannot fail: n <= RX_CHUNK_SIZE
                let _ = chunk.extend_from_slice(&buf[..n]);
                if RX_BYTES.try_send(chunk).is_err() {
                    // the framer resynchronizes on the next start marker
                    warn!("RX channel full, dropping {} bytes", n);
                }
            }
            Ok(_) => {
                // No bytes read, continue
            }
            Err(e) => {
                warn!("UART read error: {:?}", e);
            }
        }
    }
}
