//! Embassy tasks wiring the ring engine to the hardware

pub mod node;
pub mod ring_rx;
pub mod ring_tx;
pub mod tick;

pub use node::node_task;
pub use ring_rx::ring_rx_task;
pub use ring_tx::ring_tx_task;
pub use tick::{tick_task, TICK_INTERVAL_MS};
