//! Inter-task communication channels
//!
//! Defines the static channels used for communication between Embassy
//! tasks. Uses embassy-sync primitives for safe async communication.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;

use heapless::Vec;
use krikos_protocol::MAX_ENCODED_FRAME_SIZE;

/// Bytes read from the UART in one pass
pub const RX_CHUNK_SIZE: usize = 64;

/// A chunk of raw wire bytes on their way to the engine
pub type RxChunk = Vec<u8, RX_CHUNK_SIZE>;

/// A fully encoded frame on its way to the wire
pub type TxFrame = Vec<u8, MAX_ENCODED_FRAME_SIZE>;

/// Raw receive bytes from the UART task to the node task
pub static RX_BYTES: Channel<CriticalSectionRawMutex, RxChunk, 4> = Channel::new();

/// Encoded frames from the node task to the UART task
pub static TX_FRAMES: Channel<CriticalSectionRawMutex, TxFrame, 2> = Channel::new();

/// Periodic tick carrying the milliseconds elapsed since boot
pub static TICK_SIGNAL: Signal<CriticalSectionRawMutex, u32> = Signal::new();
