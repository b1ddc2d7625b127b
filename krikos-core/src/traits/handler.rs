//! Packet delivery callbacks and transmit actions

use krikos_protocol::Packet;

/// What to transmit after processing a received packet
///
/// Every completed receive maps to exactly one of these; the engine turns
/// the choice into a single outgoing frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxAction {
    /// Forward the packet with its hop budget decremented; an exhausted
    /// budget becomes a free packet instead
    PassAlong,
    /// Replace the packet with the idle token
    SendFree,
    /// Transmit the (possibly rewritten) packet as-is
    Send,
}

/// Application policy for packets delivered to this node
///
/// Both callbacks receive the packet mutably: to seize a free packet the
/// handler rewrites it into its own data packet and returns
/// [`TxAction::Send`]; returning [`TxAction::PassAlong`] lets the token
/// travel on. For a data packet addressed to this node,
/// [`TxAction::SendFree`] consumes it and [`TxAction::PassAlong`] lets it
/// continue broadcast-style.
pub trait PacketHandler {
    /// Called for every free (idle token) packet
    fn on_free_packet(&mut self, packet: &mut Packet) -> TxAction;

    /// Called for every data packet addressed to this node
    fn on_data_packet(&mut self, packet: &mut Packet) -> TxAction;
}
