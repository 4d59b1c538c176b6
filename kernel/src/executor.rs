use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap},
    mem,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering as MemOrdering},
        Barrier, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use log::{debug, info};

use crate::{
    event::{key_cmp, Bitfield, Event, Payload},
    lp::{EventCtx, LogicalProcess, ScheduledEvent},
    rng::ReversibleRng,
    LpId, SimTime,
};

// An idle partition volunteers a GVT round at most this often, so global
// termination is always detected without thrashing busy partitions.
const IDLE_GVT_PERIOD: Duration = Duration::from_millis(10);
const IDLE_BACKOFF: Duration = Duration::from_micros(100);

#[derive(Debug, Clone, Copy)]
pub struct ExecutorConfig {
    /// Virtual end time in ms; events at or beyond it are never processed.
    pub end_time: SimTime,
    /// Master seed; each LP derives its own stream from it.
    pub seed: u64,
    /// Events a partition processes between GVT computations.
    pub gvt_interval: usize,
}

impl ExecutorConfig {
    pub fn new(end_time: SimTime, seed: u64) -> Self {
        ExecutorConfig {
            end_time,
            seed,
            gvt_interval: 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunStats {
    pub processed: u64,
    pub committed: u64,
    pub rollbacks: u64,
    pub annihilated: u64,
}

pub struct RunOutput<L: LogicalProcess> {
    /// All LPs in global-id order, as they were at the end of the run.
    pub lps: Vec<L>,
    /// One journal per partition, filled by commit handlers.
    pub journals: Vec<L::Journal>,
    pub stats: RunStats,
}

// Min-heap ordering over (recv_time, id)
struct PendingEvent(Event);

impl PartialEq for PendingEvent {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for PendingEvent {}

impl PartialOrd for PendingEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed: BinaryHeap is a max-heap
        key_cmp(other.0.key(), self.0.key())
    }
}

struct SentRef {
    dest: LpId,
    id: u64,
    recv_time: SimTime,
}

struct ProcessedEvent<N> {
    ev: Event,
    bf: Bitfield,
    rng_count: u64,
    note: Option<N>,
    sent: Vec<SentRef>,
}

struct LocalLp<L: LogicalProcess> {
    id: LpId,
    lp: L,
    rng: ReversibleRng,
    // executed events, strictly ordered by (recv_time, id); the rollback
    // stack and the commit queue at once
    processed: Vec<ProcessedEvent<L::Note>>,
}

enum Incoming {
    Event(Event),
    Anti {
        dest: LpId,
        id: u64,
        recv_time: SimTime,
    },
}

struct Shared {
    mailboxes: Vec<Mutex<Vec<Incoming>>>,
    barrier: Barrier,
    mins: Mutex<Vec<SimTime>>,
    activity: AtomicBool,
    gvt_request: AtomicBool,
    done: AtomicBool,
    next_event_id: AtomicU64,
    partition_of: Vec<usize>,
}

impl Shared {
    fn new(n_partitions: usize, partition_of: Vec<usize>) -> Self {
        Shared {
            mailboxes: (0..n_partitions).map(|_| Mutex::new(Vec::new())).collect(),
            barrier: Barrier::new(n_partitions),
            mins: Mutex::new(vec![SimTime::INFINITY; n_partitions]),
            activity: AtomicBool::new(false),
            gvt_request: AtomicBool::new(false),
            done: AtomicBool::new(false),
            next_event_id: AtomicU64::new(1),
            partition_of,
        }
    }

    fn fresh_id(&self) -> u64 {
        self.next_event_id.fetch_add(1, MemOrdering::Relaxed)
    }
}

struct PartitionState<L: LogicalProcess> {
    index: usize,
    lps: Vec<LocalLp<L>>,
    local_index: HashMap<LpId, usize>,
    pending: BinaryHeap<PendingEvent>,
    // ids annihilated by anti-messages, dropped when they surface
    cancelled: HashMap<u64, SimTime>,
    journal: L::Journal,
    events_since_gvt: usize,
    last_idle_round: Instant,
    stats: RunStats,
}

impl<L: LogicalProcess> PartitionState<L> {
    fn new(index: usize) -> Self {
        PartitionState {
            index,
            lps: Vec::new(),
            local_index: HashMap::new(),
            pending: BinaryHeap::new(),
            cancelled: HashMap::new(),
            journal: L::Journal::default(),
            events_since_gvt: 0,
            last_idle_round: Instant::now(),
            stats: RunStats::default(),
        }
    }

    fn add_lp(&mut self, id: LpId, lp: L, rng: ReversibleRng) {
        self.local_index.insert(id, self.lps.len());
        self.lps.push(LocalLp {
            id,
            lp,
            rng,
            processed: Vec::new(),
        });
    }

    fn local(&self, lp: LpId) -> usize {
        match self.local_index.get(&lp) {
            Some(index) => *index,
            None => panic!("partition {} received an event for foreign lp {}", self.index, lp),
        }
    }

    fn run(mut self, shared: &Shared, cfg: &ExecutorConfig) -> (Vec<LocalLp<L>>, L::Journal, RunStats) {
        loop {
            self.drain_mailbox(shared);
            if shared.done.load(MemOrdering::Acquire) {
                break;
            }

            let idle = self.next_runnable_time(cfg).is_none();
            let interval_hit = self.events_since_gvt >= cfg.gvt_interval;
            let requested = shared.gvt_request.load(MemOrdering::Relaxed);
            let volunteer = idle && self.last_idle_round.elapsed() >= IDLE_GVT_PERIOD;

            if requested || interval_hit || volunteer {
                shared.gvt_request.store(true, MemOrdering::Relaxed);
                self.gvt_round(shared, cfg);
                if idle {
                    self.last_idle_round = Instant::now();
                }
                continue;
            }

            if idle {
                thread::sleep(IDLE_BACKOFF);
                continue;
            }

            self.process_one(shared, cfg);
        }
        (self.lps, self.journal, self.stats)
    }

    /// Pull everything out of our mailbox: fresh events (possibly
    /// stragglers) and anti-messages.
    fn drain_mailbox(&mut self, shared: &Shared) -> bool {
        let batch = { mem::take(&mut *shared.mailboxes[self.index].lock().unwrap()) };
        let did_work = !batch.is_empty();
        for incoming in batch {
            match incoming {
                Incoming::Event(ev) => self.accept_event(ev, shared),
                Incoming::Anti {
                    dest,
                    id,
                    recv_time,
                } => self.accept_anti(dest, id, recv_time, shared),
            }
        }
        did_work
    }

    fn accept_event(&mut self, ev: Event, shared: &Shared) {
        let li = self.local(ev.dest);
        let straggler_behind = match self.lps[li].processed.last() {
            Some(last) if key_cmp(ev.key(), last.ev.key()) == Ordering::Less => {
                Some(last.ev.recv_time)
            }
            _ => None,
        };
        if let Some(last_time) = straggler_behind {
            // straggler: unwind everything this LP ran too early
            debug!(
                "lp {} straggler at {:.3} (last processed {:.3}), rolling back",
                ev.dest, ev.recv_time, last_time
            );
            self.rollback_lp(li, ev.recv_time, ev.id, false, shared);
        }
        self.pending.push(PendingEvent(ev));
    }

    fn accept_anti(&mut self, dest: LpId, id: u64, recv_time: SimTime, shared: &Shared) {
        let li = self.local(dest);
        let was_processed = self.lps[li].processed.iter().any(|p| p.ev.id == id);
        if was_processed {
            // roll back through the event itself; it lands back in pending
            // where the cancellation below annihilates it
            self.rollback_lp(li, recv_time, id, true, shared);
        }
        self.cancelled.insert(id, recv_time);
        self.stats.annihilated += 1;
    }

    /// Reverse the LP's processed events down to virtual time `t`
    /// (exclusive of (t, id) unless `include_target`), LIFO, cancelling
    /// every event the undone handlers scheduled.
    fn rollback_lp(&mut self, li: usize, t: SimTime, id: u64, include_target: bool, shared: &Shared) {
        loop {
            let unwind = match self.lps[li].processed.last() {
                Some(p) => match key_cmp(p.ev.key(), (t, id)) {
                    Ordering::Greater => true,
                    Ordering::Equal => include_target,
                    Ordering::Less => false,
                },
                None => false,
            };
            if !unwind {
                break;
            }

            let mut p = self.lps[li].processed.pop().unwrap();
            let sent = mem::take(&mut p.sent);
            {
                let slot = &mut self.lps[li];
                slot.lp.reverse(&p.ev, p.bf, p.note.as_mut());
                slot.rng.rewind(p.rng_count);
            }
            self.stats.rollbacks += 1;
            self.pending.push(PendingEvent(p.ev));
            for sent_ref in sent {
                self.send_anti(sent_ref, shared);
            }
        }
    }

    fn send_anti(&mut self, sent: SentRef, shared: &Shared) {
        let partition = shared.partition_of[sent.dest as usize];
        if partition == self.index {
            self.accept_anti(sent.dest, sent.id, sent.recv_time, shared);
        } else {
            shared.mailboxes[partition].lock().unwrap().push(Incoming::Anti {
                dest: sent.dest,
                id: sent.id,
                recv_time: sent.recv_time,
            });
        }
    }

    fn route_event(&mut self, ev: Event, shared: &Shared) {
        let partition = shared.partition_of[ev.dest as usize];
        if partition == self.index {
            self.accept_event(ev, shared);
        } else {
            shared.mailboxes[partition]
                .lock()
                .unwrap()
                .push(Incoming::Event(ev));
        }
    }

    /// Earliest pending event below the end time, with annihilated entries
    /// swept out on the way.
    fn next_runnable_time(&mut self, cfg: &ExecutorConfig) -> Option<SimTime> {
        while let Some(top) = self.pending.peek() {
            if self.cancelled.remove(&top.0.id).is_some() {
                self.pending.pop();
                continue;
            }
            if top.0.recv_time >= cfg.end_time {
                return None;
            }
            return Some(top.0.recv_time);
        }
        None
    }

    fn process_one(&mut self, shared: &Shared, cfg: &ExecutorConfig) {
        if self.next_runnable_time(cfg).is_none() {
            return;
        }
        let PendingEvent(ev) = self.pending.pop().unwrap();
        let li = self.local(ev.dest);

        let mut bf = Bitfield::default();
        let mut out: Vec<ScheduledEvent> = Vec::new();
        let (note, rng_count) = {
            let slot = &mut self.lps[li];
            if let Some(last) = slot.processed.last() {
                debug_assert!(key_cmp(last.ev.key(), ev.key()) == Ordering::Less);
            }
            let rng_start = slot.rng.count();
            let mut ctx = EventCtx::new(ev.recv_time, ev.dest, &mut bf, &mut slot.rng, &mut out);
            let note = slot.lp.forward(&ev, &mut ctx);
            (note, slot.rng.count() - rng_start)
        };

        let mut sent = Vec::with_capacity(out.len());
        for scheduled in out {
            let id = shared.fresh_id();
            let new_ev = Event {
                id,
                src: ev.dest,
                dest: scheduled.dest,
                send_time: ev.recv_time,
                recv_time: ev.recv_time + scheduled.delay,
                kind: scheduled.kind,
                payload: scheduled.payload,
            };
            sent.push(SentRef {
                dest: new_ev.dest,
                id,
                recv_time: new_ev.recv_time,
            });
            self.route_event(new_ev, shared);
        }

        self.lps[li].processed.push(ProcessedEvent {
            ev,
            bf,
            rng_count,
            note,
            sent,
        });
        self.events_since_gvt += 1;
        self.stats.processed += 1;
    }

    /// Synchronized GVT computation: drain mailboxes to quiescence, take
    /// the minimum over all pending queues, then fossil-collect.
    fn gvt_round(&mut self, shared: &Shared, cfg: &ExecutorConfig) {
        shared.barrier.wait();
        loop {
            if self.drain_mailbox(shared) {
                shared.activity.store(true, MemOrdering::Relaxed);
            }
            shared.barrier.wait();
            let any_activity = shared.activity.load(MemOrdering::Relaxed);
            shared.barrier.wait();
            if self.index == 0 {
                shared.activity.store(false, MemOrdering::Relaxed);
            }
            shared.barrier.wait();
            if !any_activity {
                break;
            }
        }

        // with every mailbox quiescent the global minimum is exact
        let local_min = self
            .pending
            .peek()
            .map(|top| top.0.recv_time)
            .unwrap_or(SimTime::INFINITY);
        {
            shared.mins.lock().unwrap()[self.index] = local_min;
        }
        shared.barrier.wait();
        let gvt = {
            let mins = shared.mins.lock().unwrap();
            mins.iter().fold(SimTime::INFINITY, |a, b| a.min(*b))
        };

        if gvt >= cfg.end_time {
            shared.done.store(true, MemOrdering::Release);
            self.fossil_collect(SimTime::INFINITY);
        } else {
            self.fossil_collect(gvt);
        }
        self.events_since_gvt = 0;

        shared.barrier.wait();
        if self.index == 0 {
            shared.gvt_request.store(false, MemOrdering::Relaxed);
        }
        shared.barrier.wait();
    }

    /// Commit and drop every processed event now guaranteed to be in the
    /// past, in per-LP virtual-time order.
    fn fossil_collect(&mut self, gvt: SimTime) {
        let journal = &mut self.journal;
        let stats = &mut self.stats;
        for slot in &mut self.lps {
            let cut = slot
                .processed
                .iter()
                .position(|p| p.ev.recv_time >= gvt)
                .unwrap_or(slot.processed.len());
            for p in slot.processed.drain(..cut) {
                slot.lp.commit(&p.ev, p.note, journal);
                stats.committed += 1;
            }
        }
        self.cancelled.retain(|_, recv_time| *recv_time >= gvt);
    }
}

struct Primed {
    dest: LpId,
    recv_time: SimTime,
    kind: u16,
    payload: Payload,
}

/// The executor owns all LPs, partitioned over worker threads.
pub struct Executor<L: LogicalProcess> {
    cfg: ExecutorConfig,
    partitions: Vec<PartitionState<L>>,
    partition_of: Vec<usize>,
    primed: Vec<Primed>,
}

impl<L: LogicalProcess> Executor<L> {
    /// `lps[i]` is the LP with global id `i` together with its partition.
    pub fn new(cfg: ExecutorConfig, lps: Vec<(L, usize)>) -> Self {
        let n_partitions = lps
            .iter()
            .map(|(_, partition)| *partition + 1)
            .max()
            .unwrap_or(1);
        let mut partitions: Vec<PartitionState<L>> =
            (0..n_partitions).map(PartitionState::new).collect();
        let mut partition_of = Vec::with_capacity(lps.len());
        for (id, (lp, partition)) in lps.into_iter().enumerate() {
            let id = id as LpId;
            partition_of.push(partition);
            partitions[partition].add_lp(id, lp, ReversibleRng::new(cfg.seed, id));
        }
        Executor {
            cfg,
            partitions,
            partition_of,
            primed: Vec::new(),
        }
    }

    /// Inject an event before the run starts. Scenario drivers use this to
    /// feed hand-built payments into an otherwise quiet network.
    pub fn prime(&mut self, dest: LpId, recv_time: SimTime, kind: u16, payload: Payload) {
        if !(recv_time > 0.0) {
            panic!("primed event must have a positive time, got {}", recv_time);
        }
        self.primed.push(Primed {
            dest,
            recv_time,
            kind,
            payload,
        });
    }

    pub fn run(mut self) -> RunOutput<L> {
        let n_partitions = self.partitions.len();
        let shared = Shared::new(n_partitions, self.partition_of.clone());

        // init phase: LPs may schedule their first events; never rolled back
        let mut startup = Vec::new();
        for partition in &mut self.partitions {
            for slot in &mut partition.lps {
                let mut bf = Bitfield::default();
                let mut out = Vec::new();
                {
                    let mut ctx = EventCtx::new(0.0, slot.id, &mut bf, &mut slot.rng, &mut out);
                    slot.lp.on_start(&mut ctx);
                }
                for scheduled in out {
                    if scheduled.dest != slot.id {
                        panic!("lp {} scheduled to {} during init", slot.id, scheduled.dest);
                    }
                    startup.push(Event {
                        id: shared.fresh_id(),
                        src: slot.id,
                        dest: scheduled.dest,
                        send_time: 0.0,
                        recv_time: scheduled.delay,
                        kind: scheduled.kind,
                        payload: scheduled.payload,
                    });
                }
            }
        }
        for primed in mem::take(&mut self.primed) {
            startup.push(Event {
                id: shared.fresh_id(),
                src: primed.dest,
                dest: primed.dest,
                send_time: 0.0,
                recv_time: primed.recv_time,
                kind: primed.kind,
                payload: primed.payload,
            });
        }
        for ev in startup {
            let partition = shared.partition_of[ev.dest as usize];
            self.partitions[partition].pending.push(PendingEvent(ev));
        }

        let cfg = self.cfg;
        let results: Vec<(Vec<LocalLp<L>>, L::Journal, RunStats)> = thread::scope(|scope| {
            let shared_ref = &shared;
            let handles: Vec<_> = self
                .partitions
                .into_iter()
                .map(|partition| scope.spawn(move || partition.run(shared_ref, &cfg)))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("executor worker panicked"))
                .collect()
        });

        let mut lps_with_ids = Vec::new();
        let mut journals = Vec::with_capacity(n_partitions);
        let mut stats = RunStats::default();
        for (lps, journal, partition_stats) in results {
            for slot in lps {
                lps_with_ids.push((slot.id, slot.lp));
            }
            journals.push(journal);
            stats.processed += partition_stats.processed;
            stats.committed += partition_stats.committed;
            stats.rollbacks += partition_stats.rollbacks;
            stats.annihilated += partition_stats.annihilated;
        }
        lps_with_ids.sort_by_key(|(id, _)| *id);

        info!(
            "executor finished: {} events processed, {} committed, {} rolled back, {} annihilated",
            stats.processed, stats.committed, stats.rollbacks, stats.annihilated
        );

        RunOutput {
            lps: lps_with_ids.into_iter().map(|(_, lp)| lp).collect(),
            journals,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADD: u16 = 1;
    const PING: u16 = 2;

    /// Adds the event kind's low byte to a counter; exercises the full
    /// forward/reverse/commit contract.
    #[derive(Default)]
    struct AddLp {
        value: u64,
    }

    impl LogicalProcess for AddLp {
        type Note = u64;
        type Journal = Vec<(u64, SimTime)>;

        fn forward(&mut self, ev: &Event, ctx: &mut EventCtx<'_>) -> Option<u64> {
            use rand::Rng;
            let delta = (ev.kind & 0xff) as u64;
            self.value += delta;
            // consume a draw so rollback has something to rewind
            let _: u64 = ctx.rng().gen();
            Some(delta)
        }

        fn reverse(&mut self, _ev: &Event, _bf: Bitfield, note: Option<&mut u64>) {
            self.value -= *note.unwrap();
        }

        fn commit(&mut self, ev: &Event, _note: Option<u64>, journal: &mut Self::Journal) {
            journal.push((ev.id, ev.recv_time));
        }
    }

    fn event(id: u64, dest: LpId, recv_time: SimTime, kind: u16) -> Event {
        Event {
            id,
            src: dest,
            dest,
            send_time: 0.0,
            recv_time,
            kind,
            payload: Payload::empty(),
        }
    }

    fn single_partition(n_lps: usize) -> (PartitionState<AddLp>, Shared) {
        let mut partition = PartitionState::new(0);
        for id in 0..n_lps as LpId {
            partition.add_lp(id, AddLp::default(), ReversibleRng::new(7, id));
        }
        (partition, Shared::new(1, vec![0; n_lps]))
    }

    #[test]
    fn test_straggler_rolls_back_state_and_rng() {
        let cfg = ExecutorConfig::new(1000.0, 7);
        let (mut partition, shared) = single_partition(1);
        let rng_start = partition.lps[0].rng.count();

        partition.pending.push(PendingEvent(event(10, 0, 50.0, 2)));
        partition.process_one(&shared, &cfg);
        assert_eq!(partition.lps[0].lp.value, 2);

        // a straggler at t=20 undoes the speculative execution at t=50
        partition.accept_event(event(11, 0, 20.0, 3), &shared);
        assert_eq!(partition.lps[0].lp.value, 0);
        assert_eq!(partition.lps[0].rng.count(), rng_start);
        assert_eq!(partition.stats.rollbacks, 1);

        // both events re-execute in the right order
        partition.process_one(&shared, &cfg);
        partition.process_one(&shared, &cfg);
        assert_eq!(partition.lps[0].lp.value, 5);
        let times: Vec<SimTime> = partition.lps[0]
            .processed
            .iter()
            .map(|p| p.ev.recv_time)
            .collect();
        assert_eq!(times, vec![20.0, 50.0]);
    }

    #[test]
    fn test_anti_message_annihilates_scheduled_event() {
        struct SchedulerLp {
            fired: bool,
        }

        impl LogicalProcess for SchedulerLp {
            type Note = ();
            type Journal = ();

            fn forward(&mut self, ev: &Event, ctx: &mut EventCtx<'_>) -> Option<()> {
                if ev.kind == PING {
                    // lp 0 relays every ping to lp 1 after 5 ms
                    self.fired = true;
                    ctx.schedule(1, 5.0, ADD, Payload::empty());
                }
                Some(())
            }

            fn reverse(&mut self, ev: &Event, _bf: Bitfield, _note: Option<&mut ()>) {
                if ev.kind == PING {
                    self.fired = false;
                }
            }
        }

        let cfg = ExecutorConfig::new(1000.0, 7);
        let mut partition: PartitionState<SchedulerLp> = PartitionState::new(0);
        partition.add_lp(0, SchedulerLp { fired: false }, ReversibleRng::new(7, 0));
        partition.add_lp(1, SchedulerLp { fired: false }, ReversibleRng::new(7, 1));
        let shared = Shared::new(1, vec![0, 0]);

        partition
            .pending
            .push(PendingEvent(event(shared.fresh_id(), 0, 50.0, PING)));
        partition.process_one(&shared, &cfg);
        assert!(partition.lps[0].lp.fired);
        // the relayed event for lp 1 sits in pending at t=55
        assert_eq!(partition.pending.len(), 1);

        // straggler for lp 0 rolls it back; the anti-message must chase
        // down the event it scheduled to lp 1
        partition.accept_event(event(shared.fresh_id(), 0, 10.0, PING), &shared);
        assert!(!partition.lps[0].lp.fired);
        assert_eq!(partition.next_runnable_time(&cfg), Some(10.0));

        partition.process_one(&shared, &cfg); // t=10, relays at t=15
        partition.process_one(&shared, &cfg); // t=15 at lp 1
        partition.process_one(&shared, &cfg); // t=50 re-execution, relays at t=55
        partition.process_one(&shared, &cfg); // sweeps the annihilated t=55, runs the new one
        let fired_events: Vec<SimTime> = partition.lps[1]
            .processed
            .iter()
            .map(|p| p.ev.recv_time)
            .collect();
        // only the surviving relays reached lp 1
        assert_eq!(fired_events, vec![15.0, 55.0]);
        assert!(partition.pending.is_empty());
    }

    #[test]
    fn test_sequential_run_commits_in_order() {
        struct ChainLp {
            hops_left: u32,
            value: u64,
        }

        impl LogicalProcess for ChainLp {
            type Note = ();
            type Journal = Vec<SimTime>;

            fn on_start(&mut self, ctx: &mut EventCtx<'_>) {
                ctx.schedule(ctx.lp(), 1.0, PING, Payload::empty());
            }

            fn forward(&mut self, _ev: &Event, ctx: &mut EventCtx<'_>) -> Option<()> {
                self.value += 1;
                if self.hops_left > 0 {
                    self.hops_left -= 1;
                    ctx.schedule(ctx.lp(), 10.0, PING, Payload::empty());
                }
                Some(())
            }

            fn reverse(&mut self, _ev: &Event, _bf: Bitfield, _note: Option<&mut ()>) {
                self.value -= 1;
            }

            fn commit(&mut self, ev: &Event, _note: Option<()>, journal: &mut Self::Journal) {
                journal.push(ev.recv_time);
            }
        }

        let cfg = ExecutorConfig::new(1000.0, 3);
        let executor = Executor::new(
            cfg,
            vec![(
                ChainLp {
                    hops_left: 9,
                    value: 0,
                },
                0,
            )],
        );
        let output = executor.run();
        assert_eq!(output.lps[0].value, 10);
        assert_eq!(output.stats.committed, 10);
        let mut expected = vec![1.0];
        for hop in 0..9 {
            expected.push(1.0 + 10.0 * (hop + 1) as SimTime);
        }
        assert_eq!(output.journals[0], expected);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        struct PingPong {
            peer: LpId,
            count: u64,
        }

        impl LogicalProcess for PingPong {
            type Note = ();
            type Journal = Vec<u64>;

            fn on_start(&mut self, ctx: &mut EventCtx<'_>) {
                if ctx.lp() == 0 {
                    ctx.schedule(ctx.lp(), 1.0, PING, Payload::empty());
                }
            }

            fn forward(&mut self, ev: &Event, ctx: &mut EventCtx<'_>) -> Option<()> {
                self.count += 1;
                if ev.kind == PING && ctx.now() < 500.0 {
                    ctx.schedule(self.peer, 7.0, PING, Payload::empty());
                }
                Some(())
            }

            fn reverse(&mut self, _ev: &Event, _bf: Bitfield, _note: Option<&mut ()>) {
                self.count -= 1;
            }

            fn commit(&mut self, _ev: &Event, _note: Option<()>, journal: &mut Self::Journal) {
                journal.push(1);
            }
        }

        let run = |partitions: [usize; 2]| {
            let cfg = ExecutorConfig {
                end_time: 1000.0,
                seed: 11,
                gvt_interval: 8,
            };
            let executor = Executor::new(
                cfg,
                vec![
                    (PingPong { peer: 1, count: 0 }, partitions[0]),
                    (PingPong { peer: 0, count: 0 }, partitions[1]),
                ],
            );
            let output = executor.run();
            (
                output.lps.iter().map(|lp| lp.count).collect::<Vec<_>>(),
                output.stats.committed,
            )
        };

        let (sequential_counts, sequential_committed) = run([0, 0]);
        let (parallel_counts, parallel_committed) = run([0, 1]);
        assert_eq!(sequential_counts, parallel_counts);
        assert_eq!(sequential_committed, parallel_committed);
    }
}
