//! MAC address assignment
//!
//! A node joins the ring without a central coordinator: once the watcher
//! reports that the wire has been quiet long enough, the node claims a
//! candidate address derived from its hardware id and defends it through
//! a contention window. Conflicts are resolved by a deterministic
//! tie-break on the hardware ids carried in the claims, so two nodes
//! claiming the same address always diverge.
//!
//! All protocol-packet interpretation happens in
//! [`MacManager::process_protocol_packet`]; protocol packets never reach
//! the application layer.

use krikos_protocol::{Packet, ProtocolMessage, UNASSIGNED_ADDRESS};

use crate::config::{RingConfig, TieBreak};
use crate::traits::TxAction;

/// Address-assignment states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MacState {
    /// No address; waiting for the watcher's safe-to-claim signal
    Unassigned,
    /// Claim sent; defending the candidate through the contention window
    Claiming,
    /// Address acquired; steady operating state
    Idle,
}

/// Address-assignment state machine
///
/// Owns the node's ring address exclusively. State changes come from two
/// places only: received protocol packets and countdown expiry.
#[derive(Debug)]
pub struct MacManager {
    config: RingConfig,
    state: MacState,
    /// Assigned address in `Idle`, candidate in `Claiming`, 0 otherwise
    address: u8,
    claim_countdown_ms: u32,
    /// Source address of the most recently observed packet; the `hello`
    /// after a successful claim goes to this neighbor
    last_seen_src: u8,
}

impl MacManager {
    pub fn new(config: RingConfig) -> Self {
        Self {
            config,
            state: MacState::Unassigned,
            address: UNASSIGNED_ADDRESS,
            claim_countdown_ms: 0,
            last_seen_src: UNASSIGNED_ADDRESS,
        }
    }

    pub fn state(&self) -> MacState {
        self.state
    }

    /// True once an address has been acquired
    pub fn is_address_assigned(&self) -> bool {
        self.state == MacState::Idle
    }

    /// The node's current ring address (0 while unassigned)
    pub fn address(&self) -> u8 {
        if self.state == MacState::Idle {
            self.address
        } else {
            UNASSIGNED_ADDRESS
        }
    }

    /// Record the source of a received packet
    pub fn observe_packet(&mut self, packet: &Packet) {
        self.last_seen_src = packet.src_address;
    }

    /// Enter `Claiming` and write the claim into `out`
    ///
    /// From `Unassigned` the candidate derives from the hardware id; from
    /// `Idle` (ring starvation) the currently held address is re-claimed
    /// so the claim traffic restarts the ring without renumbering it.
    pub fn begin_claim(&mut self, out: &mut Packet) {
        if self.state != MacState::Idle {
            self.address = self
                .config
                .initial_candidate
                .unwrap_or_else(|| derive_candidate(self.config.hardware_id));
        }
        self.state = MacState::Claiming;
        self.write_claim(out);
    }

    /// Advance the contention countdown
    ///
    /// Returns true exactly when the window expires with the candidate
    /// undisputed: the node is now `Idle` and should announce itself with
    /// a `hello`.
    pub fn advance(&mut self, delta_ms: u32) -> bool {
        if self.state != MacState::Claiming {
            return false;
        }
        self.claim_countdown_ms = self.claim_countdown_ms.saturating_sub(delta_ms);
        if self.claim_countdown_ms > 0 {
            return false;
        }
        self.state = MacState::Idle;
        true
    }

    /// Write the post-claim `hello` toward the last observed neighbor
    pub fn make_hello(&self, out: &mut Packet) {
        ProtocolMessage::Hello.apply(out, self.address, self.last_seen_src);
    }

    /// Interpret a received protocol packet and decide the transmit action
    ///
    /// Called once per fully received protocol packet. The packet may be
    /// rewritten in place when the action is [`TxAction::Send`].
    pub fn process_protocol_packet(&mut self, packet: &mut Packet) -> TxAction {
        match ProtocolMessage::parse(packet) {
            Some(ProtocolMessage::AddressClaim { hardware_id, .. }) => {
                self.on_claim(packet, hardware_id)
            }
            Some(ProtocolMessage::WhoAreYou) => self.on_who_are_you(packet),
            // the free packet is dispatched to the application before the
            // MAC sees it; treat a stray one like any passing traffic
            Some(ProtocolMessage::Free) => TxAction::PassAlong,
            // hello and unknown messages terminate here when addressed to
            // this node, otherwise they continue around the ring
            Some(ProtocolMessage::Hello) | None => {
                if packet.is_for(self.address) {
                    TxAction::SendFree
                } else {
                    TxAction::PassAlong
                }
            }
        }
    }

    fn on_claim(&mut self, packet: &mut Packet, their_hwid: u32) -> TxAction {
        if their_hwid == self.config.hardware_id {
            // our own claim made it around the ring; take it off the wire
            return TxAction::SendFree;
        }
        let claimed = packet.src_address;
        match self.state {
            MacState::Claiming if claimed == self.address => {
                if self.wins_over(their_hwid) {
                    // the rival sees this claim and backs off
                    TxAction::PassAlong
                } else {
                    self.address = next_candidate(self.address);
                    self.write_claim(packet);
                    TxAction::Send
                }
            }
            MacState::Idle if claimed == self.address => {
                // somebody is claiming the address we hold
                self.state = MacState::Claiming;
                self.address = next_candidate(self.address);
                self.write_claim(packet);
                TxAction::Send
            }
            _ => TxAction::PassAlong,
        }
    }

    fn on_who_are_you(&mut self, packet: &mut Packet) -> TxAction {
        let addressed_here =
            packet.is_for(UNASSIGNED_ADDRESS) || packet.is_for(self.address);
        match self.state {
            MacState::Claiming | MacState::Idle if addressed_here => {
                // prove the address is taken (or being taken)
                self.write_claim(packet);
                TxAction::Send
            }
            _ => TxAction::PassAlong,
        }
    }

    fn wins_over(&self, their_hwid: u32) -> bool {
        match self.config.tie_break {
            TieBreak::HigherIdWins => self.config.hardware_id > their_hwid,
            TieBreak::LowerIdWins => self.config.hardware_id < their_hwid,
        }
    }

    fn write_claim(&mut self, out: &mut Packet) {
        ProtocolMessage::AddressClaim {
            hardware_id: self.config.hardware_id,
            device_name: self.config.device_name.clone(),
        }
        .apply(out, self.address, UNASSIGNED_ADDRESS);
        self.claim_countdown_ms = self.config.claim_timeout_ms;
    }
}

/// First candidate address for a hardware id, avoiding the reserved 0
fn derive_candidate(hardware_id: u32) -> u8 {
    (hardware_id % 255) as u8 + 1
}

/// Next candidate after a lost arbitration, wrapping within 1..=255
fn next_candidate(current: u8) -> u8 {
    if current == u8::MAX {
        1
    } else {
        current + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use krikos_protocol::TTL_MAX;

    fn manager(hwid: u32) -> MacManager {
        MacManager::new(RingConfig::new(hwid).with_device_name("node"))
    }

    fn claim_of(mac: &mut MacManager) -> Packet {
        let mut p = Packet::free();
        mac.begin_claim(&mut p);
        p
    }

    #[test]
    fn test_boot_state() {
        let mac = manager(1);
        assert_eq!(mac.state(), MacState::Unassigned);
        assert!(!mac.is_address_assigned());
        assert_eq!(mac.address(), UNASSIGNED_ADDRESS);
    }

    #[test]
    fn test_candidate_derivation_avoids_zero() {
        assert_eq!(derive_candidate(0), 1);
        assert_eq!(derive_candidate(254), 255);
        assert_eq!(derive_candidate(255), 1);
        for hwid in [0u32, 1, 254, 255, 0xFFFF_FFFF] {
            assert_ne!(derive_candidate(hwid), 0);
        }
        assert_ne!(next_candidate(255), 0);
    }

    #[test]
    fn test_claim_packet_contents() {
        let mut mac = manager(0x1234_5678);
        let p = claim_of(&mut mac);
        assert_eq!(mac.state(), MacState::Claiming);
        assert_eq!(p.src_address, derive_candidate(0x1234_5678));
        assert_eq!(p.dst_address, UNASSIGNED_ADDRESS);
        assert_eq!(p.ttl, TTL_MAX);
        match ProtocolMessage::parse(&p) {
            Some(ProtocolMessage::AddressClaim {
                hardware_id,
                device_name,
            }) => {
                assert_eq!(hardware_id, 0x1234_5678);
                assert_eq!(device_name.as_str(), "node");
            }
            other => panic!("expected claim, got {:?}", other),
        }
    }

    #[test]
    fn test_uncontested_claim_reaches_idle() {
        let mut mac = manager(42);
        let _ = claim_of(&mut mac);
        assert!(!mac.advance(100));
        assert!(mac.advance(250));
        assert!(mac.is_address_assigned());
        assert_eq!(mac.address(), derive_candidate(42));
        // the expiry signal fires exactly once
        assert!(!mac.advance(1000));
    }

    #[test]
    fn test_hello_goes_to_last_observed_neighbor() {
        let mut mac = manager(42);
        let _ = claim_of(&mut mac);
        mac.observe_packet(&Packet::data(7, 9, &[1]));
        assert!(mac.advance(1000));

        let mut hello = Packet::free();
        mac.make_hello(&mut hello);
        assert_eq!(hello.src_address, mac.address());
        assert_eq!(hello.dst_address, 7);
        assert_eq!(ProtocolMessage::parse(&hello), Some(ProtocolMessage::Hello));
    }

    #[test]
    fn test_own_claim_returning_is_consumed() {
        let mut mac = manager(42);
        let mut p = claim_of(&mut mac);
        let action = mac.process_protocol_packet(&mut p);
        assert_eq!(action, TxAction::SendFree);
        assert_eq!(mac.state(), MacState::Claiming);
    }

    #[test]
    fn test_arbitration_winner_keeps_candidate() {
        let mut winner = manager(200);
        let mut loser = manager(100);
        let _ = claim_of(&mut winner);
        let mut rival = claim_of(&mut loser);
        // same candidate: force the collision
        rival.src_address = derive_candidate(200);
        loser.address = rival.src_address;

        let action = winner.process_protocol_packet(&mut rival.clone());
        assert_eq!(action, TxAction::PassAlong);
        assert_eq!(winner.address, derive_candidate(200));
    }

    #[test]
    fn test_arbitration_loser_picks_next_candidate() {
        let mut winner = manager(200);
        let mut loser = manager(100);
        let winner_claim = claim_of(&mut winner);
        let _ = claim_of(&mut loser);
        loser.address = winner_claim.src_address; // collision

        let before = loser.address;
        let mut observed = winner_claim.clone();
        let action = loser.process_protocol_packet(&mut observed);
        assert_eq!(action, TxAction::Send);
        assert_eq!(loser.state(), MacState::Claiming);
        assert_eq!(observed.src_address, next_candidate(before));
        match ProtocolMessage::parse(&observed) {
            Some(ProtocolMessage::AddressClaim { hardware_id, .. }) => {
                assert_eq!(hardware_id, 100)
            }
            other => panic!("expected replacement claim, got {:?}", other),
        }
    }

    #[test]
    fn test_concurrent_claims_converge() {
        // two nodes fighting over the same candidate must settle on
        // distinct addresses within a bounded number of exchanges
        let mut a = manager(200);
        let mut b = manager(100);
        let mut claim_a = claim_of(&mut a);
        let mut claim_b = claim_of(&mut b);
        b.address = a.address; // both picked the same candidate
        claim_b.src_address = b.address;

        for _ in 0..8 {
            if a.address != b.address {
                break;
            }
            // each observes the other's claim
            let act_a = a.process_protocol_packet(&mut claim_b);
            let act_b = b.process_protocol_packet(&mut claim_a);
            assert_ne!(
                (act_a, act_b),
                (TxAction::Send, TxAction::Send),
                "both nodes backed off at once"
            );
        }
        assert_ne!(a.address, b.address);

        assert!(a.advance(1000));
        assert!(b.advance(1000));
        assert_ne!(a.address(), b.address());
    }

    #[test]
    fn test_who_are_you_answered_while_idle() {
        let mut mac = manager(42);
        let _ = claim_of(&mut mac);
        assert!(mac.advance(1000));
        let own = mac.address();

        let mut p = Packet::free();
        ProtocolMessage::WhoAreYou.apply(&mut p, 9, UNASSIGNED_ADDRESS);
        let action = mac.process_protocol_packet(&mut p);
        assert_eq!(action, TxAction::Send);
        assert_eq!(p.src_address, own);
        assert!(matches!(
            ProtocolMessage::parse(&p),
            Some(ProtocolMessage::AddressClaim { .. })
        ));
    }

    #[test]
    fn test_who_are_you_passed_while_unassigned() {
        let mut mac = manager(42);
        let mut p = Packet::free();
        ProtocolMessage::WhoAreYou.apply(&mut p, 9, UNASSIGNED_ADDRESS);
        assert_eq!(mac.process_protocol_packet(&mut p), TxAction::PassAlong);
    }

    #[test]
    fn test_conflict_on_held_address_forces_reclaim() {
        let mut mac = manager(42);
        let _ = claim_of(&mut mac);
        assert!(mac.advance(1000));
        let held = mac.address();

        // a different device claims our address
        let mut p = Packet::free();
        ProtocolMessage::AddressClaim {
            hardware_id: 7,
            device_name: Default::default(),
        }
        .apply(&mut p, held, UNASSIGNED_ADDRESS);

        let action = mac.process_protocol_packet(&mut p);
        assert_eq!(action, TxAction::Send);
        assert_eq!(mac.state(), MacState::Claiming);
        assert!(!mac.is_address_assigned());
        assert_ne!(p.src_address, held);
    }

    #[test]
    fn test_starvation_reclaim_keeps_address() {
        let mut mac = manager(42);
        let _ = claim_of(&mut mac);
        assert!(mac.advance(1000));
        let held = mac.address();

        // watcher fired while Idle: re-claim the held address
        let mut p = Packet::free();
        mac.begin_claim(&mut p);
        assert_eq!(mac.state(), MacState::Claiming);
        assert_eq!(p.src_address, held);
        assert!(mac.advance(1000));
        assert_eq!(mac.address(), held);
    }

    #[test]
    fn test_hello_for_us_is_consumed() {
        let mut mac = manager(42);
        let _ = claim_of(&mut mac);
        assert!(mac.advance(1000));

        let mut p = Packet::free();
        ProtocolMessage::Hello.apply(&mut p, 9, mac.address());
        assert_eq!(mac.process_protocol_packet(&mut p), TxAction::SendFree);

        let mut other = Packet::free();
        ProtocolMessage::Hello.apply(&mut other, 9, 77);
        assert_eq!(mac.process_protocol_packet(&mut other), TxAction::PassAlong);
    }

    #[test]
    fn test_unknown_message_elsewhere_passes() {
        let mut mac = manager(42);
        let mut p = Packet::free();
        let _ = p.payload.push(0x66);
        p.dst_address = 31;
        assert_eq!(mac.process_protocol_packet(&mut p), TxAction::PassAlong);
    }
}
