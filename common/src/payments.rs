use strum::Display;

use crate::{
    config::{PAYMENT_ID_SENDER_FACTOR, SWAP_EXPIRY_BLOCK_TIMES},
    network::Network,
    serializer::{Reader, ReaderError, Writer},
    EdgeId, NodeId, SimTime,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[repr(u8)]
pub enum PaymentKind {
    Tx = 0,
    Deposit = 1,
    Withdrawal = 2,
    SubmarineSwap = 3,
}

impl PaymentKind {
    fn from_u8(value: u8) -> Result<PaymentKind, ReaderError> {
        match value {
            0 => Ok(PaymentKind::Tx),
            1 => Ok(PaymentKind::Deposit),
            2 => Ok(PaymentKind::Withdrawal),
            3 => Ok(PaymentKind::SubmarineSwap),
            _ => Err(ReaderError::InvalidValue("PaymentKind")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[repr(u8)]
pub enum PaymentErrorKind {
    // runtime liquidity shortage at some hop
    NoBalance = 1,
    // corresponds to `FailUnknownNextPeer` in lnd
    OfflineNode = 2,
    // routing could not find any path
    NoCapacity = 3,
}

impl PaymentErrorKind {
    fn from_u8(value: u8) -> Result<PaymentErrorKind, ReaderError> {
        match value {
            1 => Ok(PaymentErrorKind::NoBalance),
            2 => Ok(PaymentErrorKind::OfflineNode),
            3 => Ok(PaymentErrorKind::NoCapacity),
            _ => Err(ReaderError::InvalidValue("PaymentErrorKind")),
        }
    }
}

/// The most recent failure observed for a payment.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentError {
    pub kind: PaymentErrorKind,
    pub hop: Option<RouteHop>,
    pub time: SimTime,
}

/// One hop of a route: forward `amount_to_forward` over `edge_id`,
/// locked for `timelock` blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteHop {
    pub from: NodeId,
    pub to: NodeId,
    pub edge_id: EdgeId,
    pub amount_to_forward: u64,
    pub timelock: u32,
}

impl RouteHop {
    // `from`/`to` are implied by the edge and restored from the topology,
    // which keeps a full 27-hop route inside the event payload cap
    fn write(&self, writer: &mut Writer) {
        writer.write_u64(self.edge_id);
        writer.write_u64(self.amount_to_forward);
        writer.write_u16(self.timelock as u16);
    }

    fn read(reader: &mut Reader, network: &Network) -> Result<RouteHop, ReaderError> {
        let edge_id = reader.read_u64()?;
        let amount_to_forward = reader.read_u64()?;
        let timelock = reader.read_u16()? as u32;
        if edge_id as usize >= network.edges.len() {
            return Err(ReaderError::InvalidValue("RouteHop.edge_id"));
        }
        let edge = network.edge(edge_id);
        Ok(RouteHop {
            from: edge.from,
            to: edge.to,
            edge_id,
            amount_to_forward,
            timelock,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Route {
    pub hops: Vec<RouteHop>,
    pub total_amount: u64,
    pub total_fee: u64,
    pub total_timelock: u32,
}

impl Route {
    /// The hop leaving `node`, when acting as a forwarder.
    pub fn hop_from(&self, node: NodeId) -> Option<&RouteHop> {
        self.hops.iter().find(|hop| hop.from == node)
    }

    /// The hop entering `node`.
    pub fn hop_to(&self, node: NodeId) -> Option<&RouteHop> {
        self.hops.iter().find(|hop| hop.to == node)
    }

    pub fn first_hop(&self) -> &RouteHop {
        &self.hops[0]
    }

    pub fn last_hop(&self) -> &RouteHop {
        &self.hops[self.hops.len() - 1]
    }
}

/// A payment in flight through the network. Travels serialized in event
/// payloads; each in-flight event owns exactly one logical copy.
#[derive(Debug, Clone, PartialEq)]
pub struct Payment {
    pub id: u64,
    pub sender: NodeId,
    pub receiver: NodeId,
    pub amount: u64,
    // route hint: the hop before the receiver (mimics the r tagged field
    // of a bolt11 invoice)
    pub last_hop: Option<NodeId>,
    pub kind: PaymentKind,
    pub route: Option<Route>,
    pub start_time: SimTime,
    pub end_time: SimTime,
    pub attempts: u32,
    pub is_success: bool,
    pub is_timeout: bool,
    pub offline_node_count: u16,
    pub no_balance_count: u16,
    pub error: Option<PaymentError>,
}

impl Payment {
    pub fn new(
        sender: NodeId,
        receiver: NodeId,
        amount: u64,
        start_time: SimTime,
        kind: PaymentKind,
    ) -> Self {
        let id = PAYMENT_ID_SENDER_FACTOR * sender + start_time as u64;
        Payment {
            id,
            sender,
            receiver,
            amount,
            last_hop: None,
            kind,
            route: None,
            start_time,
            end_time: 0.0,
            attempts: 0,
            is_success: false,
            is_timeout: false,
            offline_node_count: 0,
            no_balance_count: 0,
            error: None,
        }
    }

    pub fn is_expired(&self, now: SimTime, expire_after_ms: SimTime, block_time_ms: SimTime) -> bool {
        if self.kind == PaymentKind::SubmarineSwap {
            now > self.start_time + SWAP_EXPIRY_BLOCK_TIMES * block_time_ms
        } else {
            now > self.start_time + expire_after_ms
        }
    }

    pub fn set_expired(&mut self, now: SimTime) {
        self.end_time = now;
        self.is_timeout = true;
    }

    /// True when no failure has been recorded yet. The waterfall retry loop
    /// uses this to notify the receiver exactly once.
    pub fn has_no_error(&self) -> bool {
        self.error.is_none()
    }

    pub fn write(&self, writer: &mut Writer) {
        writer.write_u64(self.id);
        writer.write_u64(self.sender);
        writer.write_u64(self.receiver);
        writer.write_u64(self.amount);
        match self.last_hop {
            Some(hop) => {
                writer.write_bool(true);
                writer.write_u64(hop);
            }
            None => writer.write_bool(false),
        }
        writer.write_u8(self.kind as u8);
        writer.write_f64(self.start_time);
        writer.write_f64(self.end_time);
        writer.write_u32(self.attempts);
        writer.write_bool(self.is_success);
        writer.write_bool(self.is_timeout);
        writer.write_u16(self.offline_node_count);
        writer.write_u16(self.no_balance_count);
        match &self.error {
            Some(error) => {
                writer.write_u8(error.kind as u8);
                writer.write_f64(error.time);
                match &error.hop {
                    Some(hop) => {
                        writer.write_bool(true);
                        hop.write(writer);
                    }
                    None => writer.write_bool(false),
                }
            }
            None => writer.write_u8(0),
        }
        match &self.route {
            Some(route) => {
                writer.write_bool(true);
                writer.write_u64(route.total_amount);
                writer.write_u64(route.total_fee);
                writer.write_u32(route.total_timelock);
                writer.write_u8(route.hops.len() as u8);
                for hop in &route.hops {
                    hop.write(writer);
                }
            }
            None => writer.write_bool(false),
        }
    }

    pub fn read(reader: &mut Reader, network: &Network) -> Result<Payment, ReaderError> {
        let id = reader.read_u64()?;
        let sender = reader.read_u64()?;
        let receiver = reader.read_u64()?;
        let amount = reader.read_u64()?;
        let last_hop = if reader.read_bool()? {
            Some(reader.read_u64()?)
        } else {
            None
        };
        let kind = PaymentKind::from_u8(reader.read_u8()?)?;
        let start_time = reader.read_f64()?;
        let end_time = reader.read_f64()?;
        let attempts = reader.read_u32()?;
        let is_success = reader.read_bool()?;
        let is_timeout = reader.read_bool()?;
        let offline_node_count = reader.read_u16()?;
        let no_balance_count = reader.read_u16()?;
        let error = match reader.read_u8()? {
            0 => None,
            code => {
                let kind = PaymentErrorKind::from_u8(code)?;
                let time = reader.read_f64()?;
                let hop = if reader.read_bool()? {
                    Some(RouteHop::read(reader, network)?)
                } else {
                    None
                };
                Some(PaymentError { kind, hop, time })
            }
        };
        let route = if reader.read_bool()? {
            let total_amount = reader.read_u64()?;
            let total_fee = reader.read_u64()?;
            let total_timelock = reader.read_u32()?;
            let n_hops = reader.read_u8()? as usize;
            let mut hops = Vec::with_capacity(n_hops);
            for _ in 0..n_hops {
                hops.push(RouteHop::read(reader, network)?);
            }
            Some(Route {
                hops,
                total_amount,
                total_fee,
                total_timelock,
            })
        } else {
            None
        };
        Ok(Payment {
            id,
            sender,
            receiver,
            amount,
            last_hop,
            kind,
            route,
            start_time,
            end_time,
            attempts,
            is_success,
            is_timeout,
            offline_node_count,
            no_balance_count,
            error,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        self.write(&mut writer);
        writer.into_bytes()
    }

    pub fn from_bytes(bytes: &[u8], network: &Network) -> Result<Payment, ReaderError> {
        let mut reader = Reader::new(bytes);
        Payment::read(&mut reader, network)
    }
}
