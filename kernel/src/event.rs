use crate::{LpId, SimTime};

/// Maximum size of an event payload on the wire.
pub const MAX_PAYLOAD: usize = 1024;

/// Opaque event payload, capped at [`MAX_PAYLOAD`] bytes.
#[derive(Debug, Clone, Default)]
pub struct Payload(Box<[u8]>);

impl Payload {
    pub fn new(bytes: Vec<u8>) -> Self {
        if bytes.len() > MAX_PAYLOAD {
            panic!(
                "event payload of {} bytes exceeds the {} byte cap",
                bytes.len(),
                MAX_PAYLOAD
            );
        }
        Payload(bytes.into_boxed_slice())
    }

    pub fn empty() -> Self {
        Payload(Box::new([]))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Per-event bit field. A forward handler records which branch it took so
/// its reverse handler can undo exactly that branch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bitfield(u32);

impl Bitfield {
    pub fn set(&mut self, bit: u8) {
        self.0 |= 1 << bit;
    }

    pub fn get(&self, bit: u8) -> bool {
        self.0 & (1 << bit) != 0
    }
}

/// A timestamped message between LPs. Events are totally ordered by
/// (recv_time, id); the id also serves as the anti-message key.
#[derive(Debug, Clone)]
pub struct Event {
    pub id: u64,
    pub src: LpId,
    pub dest: LpId,
    pub send_time: SimTime,
    pub recv_time: SimTime,
    pub kind: u16,
    pub payload: Payload,
}

impl Event {
    /// Ordering key; f64 times never hold NaN here.
    pub(crate) fn key(&self) -> (SimTime, u64) {
        (self.recv_time, self.id)
    }
}

pub(crate) fn key_cmp(a: (SimTime, u64), b: (SimTime, u64)) -> std::cmp::Ordering {
    a.0.total_cmp(&b.0).then(a.1.cmp(&b.1))
}
