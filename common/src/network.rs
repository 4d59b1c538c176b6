use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{ChannelId, EdgeId, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
pub enum NodeKind {
    EndUser,
    Merchant,
    Intermediary,
    CentralBank,
}

impl NodeKind {
    /// Node kinds are encoded in the topology as label prefixes.
    pub fn from_label(label: &str) -> Option<NodeKind> {
        if label.starts_with("CB") {
            Some(NodeKind::CentralBank)
        } else if label.starts_with("Intermediary") {
            Some(NodeKind::Intermediary)
        } else if label.starts_with("Retail") {
            Some(NodeKind::EndUser)
        } else if label.starts_with("Merchant") {
            Some(NodeKind::Merchant)
        } else {
            None
        }
    }

    pub fn is_intermediary(&self) -> bool {
        matches!(self, NodeKind::Intermediary | NodeKind::CentralBank)
    }
}

/// Euro-area country tags used by the payment scenario sampler.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum Country {
    AT,
    BE,
    CY,
    DE,
    EE,
    ES,
    FI,
    FR,
    GR,
    HR,
    IE,
    IT,
    LT,
    LU,
    LV,
    MT,
    NL,
    PT,
    SI,
    SK,
    EU,
}

pub const NUM_COUNTRIES: usize = 21;

impl Country {
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn from_index(index: usize) -> Country {
        const ALL: [Country; NUM_COUNTRIES] = [
            Country::AT,
            Country::BE,
            Country::CY,
            Country::DE,
            Country::EE,
            Country::ES,
            Country::FI,
            Country::FR,
            Country::GR,
            Country::HR,
            Country::IE,
            Country::IT,
            Country::LT,
            Country::LU,
            Country::LV,
            Country::MT,
            Country::NL,
            Country::PT,
            Country::SI,
            Country::SK,
            Country::EU,
        ];
        ALL[index % NUM_COUNTRIES]
    }
}

/// A node of the payment-channel network.
/// Everything here is immutable after load; the mutable node state
/// (learned results, pending payments, swaps) lives in the node LP.
#[derive(Debug)]
pub struct Node {
    pub id: NodeId,
    pub label: String,
    pub kind: NodeKind,
    pub country: Country,
    pub partition: usize,
    // The custodian (LSP) of this node, when it has one. It doubles as the
    // last-hop hint of payments directed to this node.
    pub custodian: Option<NodeId>,
    pub open_edges: Vec<EdgeId>,
}

/// A bidirectional payment channel open between two nodes.
#[derive(Debug)]
pub struct Channel {
    pub id: ChannelId,
    pub node1: NodeId,
    pub node2: NodeId,
    pub edge1: EdgeId,
    pub edge2: EdgeId,
    pub capacity: u64,
    pub is_private: bool,
}

/// The forwarding policy of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub fee_base: u64,
    // parts per million
    pub fee_proportional: u64,
    pub min_htlc: u64,
    pub timelock: u32,
}

impl Policy {
    pub fn fee(&self, amount_to_forward: u64) -> u64 {
        self.fee_base + (self.fee_proportional * amount_to_forward) / 1_000_000
    }
}

/// One direction of a payment channel.
///
/// The balance and flow counter are the only mutable pieces of the network
/// after load. They are written exclusively by the LP owning `from`, but may
/// be read by any LP (the routing engine reads foreign balances), hence the
/// atomics.
#[derive(Debug)]
pub struct Edge {
    pub id: EdgeId,
    pub channel_id: ChannelId,
    pub counter_edge_id: EdgeId,
    pub from: NodeId,
    pub to: NodeId,
    pub policy: Policy,
    balance: AtomicU64,
    tot_flows: AtomicU64,
}

impl Edge {
    pub fn new(
        id: EdgeId,
        channel_id: ChannelId,
        counter_edge_id: EdgeId,
        from: NodeId,
        to: NodeId,
        balance: u64,
        policy: Policy,
    ) -> Self {
        Edge {
            id,
            channel_id,
            counter_edge_id,
            from,
            to,
            policy,
            balance: AtomicU64::new(balance),
            tot_flows: AtomicU64::new(0),
        }
    }

    pub fn balance(&self) -> u64 {
        self.balance.load(Ordering::Relaxed)
    }

    pub fn add_balance(&self, amount: u64) {
        self.balance.fetch_add(amount, Ordering::Relaxed);
    }

    pub fn sub_balance(&self, amount: u64) {
        let prev = self.balance.fetch_sub(amount, Ordering::Relaxed);
        if prev < amount {
            panic!(
                "edge {} balance underflow: {} - {}",
                self.id, prev, amount
            );
        }
    }

    pub fn tot_flows(&self) -> u64 {
        self.tot_flows.load(Ordering::Relaxed)
    }

    pub fn inc_flows(&self) {
        self.tot_flows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_flows(&self) {
        self.tot_flows.fetch_sub(1, Ordering::Relaxed);
    }
}

/// The network arena: all cross references are ids into these vectors.
#[derive(Debug, Default)]
pub struct Network {
    pub nodes: Vec<Node>,
    pub channels: Vec<Channel>,
    pub edges: Vec<Edge>,
}

impl Network {
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id as usize]
    }

    pub fn channel(&self, id: ChannelId) -> &Channel {
        &self.channels[id as usize]
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id as usize]
    }

    pub fn counter_edge(&self, edge: &Edge) -> &Edge {
        self.edge(edge.counter_edge_id)
    }

    /// Total balance a node can spend across its open edges.
    pub fn available_balance(&self, node: &Node) -> u64 {
        node.open_edges
            .iter()
            .map(|id| self.edge(*id).balance())
            .sum()
    }

    /// Sum of the capacities of the node's channels.
    pub fn wallet_cap(&self, node: &Node) -> u64 {
        node.open_edges
            .iter()
            .map(|id| self.channel(self.edge(*id).channel_id).capacity)
            .sum()
    }

    /// Maximum and total spendable balance over the node's open edges.
    pub fn balance_summary(&self, node: &Node) -> (u64, u64) {
        let mut max_balance = 0;
        let mut total_balance = 0;
        for id in &node.open_edges {
            let balance = self.edge(*id).balance();
            total_balance += balance;
            if balance > max_balance {
                max_balance = balance;
            }
        }
        (max_balance, total_balance)
    }

    /// Invariant check: the two directions of a channel always sum to its
    /// capacity between committed events.
    pub fn channel_is_balanced(&self, channel: &Channel) -> bool {
        self.edge(channel.edge1).balance() + self.edge(channel.edge2).balance()
            == channel.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> Policy {
        Policy {
            fee_base: 1000,
            fee_proportional: 10,
            min_htlc: 1,
            timelock: 10,
        }
    }

    #[test]
    fn test_fee_computation() {
        // fee = base + proportional * amount / 1e6, integer division
        assert_eq!(policy().fee(1000), 1000);
        assert_eq!(policy().fee(100_000), 1001);
        assert_eq!(policy().fee(1_000_000), 1010);
    }

    #[test]
    fn test_node_kind_from_label() {
        assert_eq!(NodeKind::from_label("CB-EU-0"), Some(NodeKind::CentralBank));
        assert_eq!(
            NodeKind::from_label("Intermediary-IT-4"),
            Some(NodeKind::Intermediary)
        );
        assert_eq!(NodeKind::from_label("Retail-IT-99"), Some(NodeKind::EndUser));
        assert_eq!(
            NodeKind::from_label("Merchant-FR-2"),
            Some(NodeKind::Merchant)
        );
        assert_eq!(NodeKind::from_label("Unknown-1"), None);
    }

    #[test]
    fn test_balance_updates() {
        let edge = Edge::new(0, 0, 1, 0, 1, 10_000, policy());
        edge.sub_balance(1000);
        edge.inc_flows();
        assert_eq!(edge.balance(), 9000);
        assert_eq!(edge.tot_flows(), 1);
        edge.add_balance(1000);
        edge.dec_flows();
        assert_eq!(edge.balance(), 10_000);
        assert_eq!(edge.tot_flows(), 0);
    }
}
