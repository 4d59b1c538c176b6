use crate::{
    event::{Bitfield, Event, Payload},
    rng::ReversibleRng,
    LpId, SimTime,
};

/// An event a handler asked to schedule, before the executor stamps it.
#[derive(Debug)]
pub struct ScheduledEvent {
    pub dest: LpId,
    pub delay: SimTime,
    pub kind: u16,
    pub payload: Payload,
}

/// Handler context: virtual clock, the LP's reversible random stream, the
/// event bit field, and the only legal way to talk to other LPs.
pub struct EventCtx<'a> {
    now: SimTime,
    lp: LpId,
    bf: &'a mut Bitfield,
    rng: &'a mut ReversibleRng,
    out: &'a mut Vec<ScheduledEvent>,
}

impl<'a> EventCtx<'a> {
    /// Handlers normally receive their context from the executor; building
    /// one directly is how tests drive a handler in isolation.
    pub fn new(
        now: SimTime,
        lp: LpId,
        bf: &'a mut Bitfield,
        rng: &'a mut ReversibleRng,
        out: &'a mut Vec<ScheduledEvent>,
    ) -> Self {
        EventCtx {
            now,
            lp,
            bf,
            rng,
            out,
        }
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn lp(&self) -> LpId {
        self.lp
    }

    pub fn rng(&mut self) -> &mut ReversibleRng {
        self.rng
    }

    pub fn set_flag(&mut self, bit: u8) {
        self.bf.set(bit);
    }

    /// Schedule an event `delay` virtual milliseconds in the future.
    /// A strictly positive delay is the executor's lookahead contract.
    pub fn schedule(&mut self, dest: LpId, delay: SimTime, kind: u16, payload: Payload) {
        if !(delay > 0.0) {
            panic!("scheduled event with non-positive delay {}", delay);
        }
        self.out.push(ScheduledEvent {
            dest,
            delay,
            kind,
            payload,
        });
    }
}

/// The three-handler contract every logical process implements.
///
/// `forward` applies the event and may stash a `Note` for its own
/// `reverse`/`commit`; `reverse` restores the pre-event state exactly
/// (the executor itself rewinds the RNG and cancels scheduled events);
/// `commit` runs once the event is irrevocably in the past and is the
/// only place for side effects that cannot be undone.
pub trait LogicalProcess: Send {
    type Note: Send;
    type Journal: Default + Send;

    /// Called once before the simulation starts; an LP may only schedule
    /// events here (typically to itself). Never rolled back.
    fn on_start(&mut self, _ctx: &mut EventCtx<'_>) {}

    fn forward(&mut self, ev: &Event, ctx: &mut EventCtx<'_>) -> Option<Self::Note>;

    fn reverse(&mut self, ev: &Event, bf: Bitfield, note: Option<&mut Self::Note>);

    fn commit(&mut self, _ev: &Event, _note: Option<Self::Note>, _journal: &mut Self::Journal) {}
}
