use plasma_common::{
    blockchain::BcTx,
    network::Network,
    payments::Payment,
    serializer::{Reader, Serializer, Writer},
    swaps::SubmarineSwap,
    NodeId, SimTime,
};
use plasma_kernel::{Event, EventCtx, LpId, Payload};
use strum::Display;

/// Every event type exchanged between LPs. The discriminant is the wire
/// code carried in the kernel event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[repr(u16)]
pub enum EventKind {
    FindPath = 0,
    SendPayment = 1,
    ForwardPayment = 2,
    ReceivePayment = 3,
    ForwardSuccess = 4,
    ForwardFail = 5,
    ReceiveSuccess = 6,
    ReceiveFail = 7,
    // load generation
    GeneratePayment = 8,
    // waterfall functionality
    NotifyPayment = 9,
    // submarine swaps functionality
    SwapRequest = 10,
    // blockchain events
    BcTxBroadcast = 11,
    BcTxConfirmed = 12,
    TickTockNextBlock = 13,
}

impl EventKind {
    pub fn code(&self) -> u16 {
        *self as u16
    }

    pub fn from_code(code: u16) -> Option<EventKind> {
        match code {
            0 => Some(EventKind::FindPath),
            1 => Some(EventKind::SendPayment),
            2 => Some(EventKind::ForwardPayment),
            3 => Some(EventKind::ReceivePayment),
            4 => Some(EventKind::ForwardSuccess),
            5 => Some(EventKind::ForwardFail),
            6 => Some(EventKind::ReceiveSuccess),
            7 => Some(EventKind::ReceiveFail),
            8 => Some(EventKind::GeneratePayment),
            9 => Some(EventKind::NotifyPayment),
            10 => Some(EventKind::SwapRequest),
            11 => Some(EventKind::BcTxBroadcast),
            12 => Some(EventKind::BcTxConfirmed),
            13 => Some(EventKind::TickTockNextBlock),
            _ => None,
        }
    }
}

pub fn payment_payload(payment: &Payment) -> Payload {
    let mut writer = Writer::with_capacity(128);
    payment.write(&mut writer);
    Payload::new(writer.into_bytes())
}

pub fn decode_payment(ev: &Event, network: &Network) -> Payment {
    let mut reader = Reader::new(ev.payload.as_bytes());
    match Payment::read(&mut reader, network) {
        Ok(payment) => payment,
        Err(e) => panic!("undecodable payment in {} event: {}", ev.kind, e),
    }
}

pub fn swap_payload(swap: &SubmarineSwap) -> Payload {
    Payload::new(swap.to_bytes())
}

pub fn decode_swap(ev: &Event) -> SubmarineSwap {
    match SubmarineSwap::from_bytes(ev.payload.as_bytes()) {
        Ok(swap) => swap,
        Err(e) => panic!("undecodable swap in {} event: {}", ev.kind, e),
    }
}

pub fn tx_payload(tx: &BcTx) -> Payload {
    Payload::new(tx.to_bytes())
}

pub fn schedule_payment(
    ctx: &mut EventCtx<'_>,
    dest: NodeId,
    delay: SimTime,
    kind: EventKind,
    payment: &Payment,
) {
    ctx.schedule(dest, delay, kind.code(), payment_payload(payment));
}

pub fn schedule_swap(
    ctx: &mut EventCtx<'_>,
    dest: NodeId,
    delay: SimTime,
    kind: EventKind,
    swap: &SubmarineSwap,
) {
    ctx.schedule(dest, delay, kind.code(), swap_payload(swap));
}

pub fn schedule_tx(ctx: &mut EventCtx<'_>, dest: LpId, delay: SimTime, kind: EventKind, tx: &BcTx) {
    ctx.schedule(dest, delay, kind.code(), tx_payload(tx));
}

pub fn decode_tx(ev: &Event) -> BcTx {
    match BcTx::from_bytes(ev.payload.as_bytes()) {
        Ok(tx) => tx,
        Err(e) => panic!("undecodable blockchain tx in {} event: {}", ev.kind, e),
    }
}
