//! Ring UART transmit task
//!
//! Writes encoded frames to the downstream neighbor. Frames arrive on the
//! TX channel already escaped and delimited.

use defmt::*;
use embassy_rp::uart::BufferedUartTx;
use embedded_io_async::Write;

use crate::channels::TX_FRAMES;

/// Ring TX task - streams encoded frames onto the wire
#[embassy_executor::task]
pub async fn ring_tx_task(mut tx: BufferedUartTx) {
    info!("Ring TX task started");

    loop {
        let frame = TX_FRAMES.receive().await;
        if let Err(e) = tx.write_all(&frame).await {
            warn!("UART write error: {:?}", e);
        } else {
            trace!("TX: {} bytes", frame.len());
        }
    }
}
