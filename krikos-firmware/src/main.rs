//! Krikos - Serial Ring Network Firmware
//!
//! Main firmware binary for RP2040-based ring nodes. Each node's UART TX
//! pin feeds the next node's RX pin, closing the loop; a single token
//! packet circulates continuously and nodes join by claiming an address
//! once the wire has been quiet long enough.
//!
//! Named after the Greek "krikos" (κρίκος) meaning "ring link".

#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use embassy_rp::bind_interrupts;
use embassy_rp::flash::{Blocking, Flash};
use embassy_rp::peripherals::UART0;
use embassy_rp::uart::{BufferedInterruptHandler, Config as UartConfig, Uart};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use krikos_core::RingConfig;

mod channels;
mod tasks;

bind_interrupts!(struct Irqs {
    UART0_IRQ => BufferedInterruptHandler<UART0>;
});

// Static cells for UART buffers (must live forever)
static TX_BUF: StaticCell<[u8; 256]> = StaticCell::new();
static RX_BUF: StaticCell<[u8; 256]> = StaticCell::new();

/// Flash size on the target board (2MB)
const FLASH_SIZE: usize = 2 * 1024 * 1024;

/// Main entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Krikos firmware starting...");

    let p = embassy_rp::init(Default::default());
    info!("Peripherals initialized");

    // Stable per-device identity from the flash unique id; drives both
    // address arbitration and the claim debounce jitter
    let mut flash = Flash::<_, Blocking, FLASH_SIZE>::new_blocking(p.FLASH);
    let mut uid = [0u8; 8];
    if flash.blocking_unique_id(&mut uid).is_err() {
        warn!("Flash unique id unavailable");
    }
    let hardware_id = fold_unique_id(&uid);
    info!("Hardware id: {:08x}", hardware_id);

    let config = RingConfig::new(hardware_id).with_device_name("krikos-node");

    // UART0 carries the ring: TX feeds the downstream neighbor, RX is fed
    // by the upstream one
    let uart_config = UartConfig::default(); // 115200 baud default

    let tx_buf = TX_BUF.init([0u8; 256]);
    let rx_buf = RX_BUF.init([0u8; 256]);

    let uart = Uart::new_blocking(p.UART0, p.PIN_0, p.PIN_1, uart_config);
    let uart = uart.into_buffered(Irqs, tx_buf, rx_buf);
    let (tx, rx) = uart.split();

    info!("UART initialized for ring communication");

    // Spawn tasks
    spawner.spawn(tasks::tick_task()).unwrap();
    spawner.spawn(tasks::ring_rx_task(rx)).unwrap();
    spawner.spawn(tasks::ring_tx_task(tx)).unwrap();
    spawner.spawn(tasks::node_task(config)).unwrap();

    info!("All tasks spawned, firmware running");

    // Main task has nothing else to do - all work happens in spawned tasks
    loop {
        embassy_time::Timer::after_secs(60).await;
        trace!("Main loop heartbeat");
    }
}

/// Fold the 64-bit flash unique id onto the 32-bit hardware id
///
/// An all-zero id (unique id unreadable) maps to a fixed non-zero value
/// so arbitration still has something to compare.
fn fold_unique_id(uid: &[u8; 8]) -> u32 {
    let lo = u32::from_le_bytes([uid[0], uid[1], uid[2], uid[3]]);
    let hi = u32::from_le_bytes([uid[4], uid[5], uid[6], uid[7]]);
    let id = lo ^ hi;
    if id == 0 {
        0x4B52_4B53 // "KRKS"
    } else {
        id
    }
}
