use std::sync::Arc;

use plasma_common::{
    blockchain::BcTx,
    network::{Network, NodeKind},
    payments::{Payment, PaymentKind},
    results::ResultStore,
    swaps::SubmarineSwap,
    SimTime,
};
use plasma_kernel::{Bitfield, Event, EventCtx, LogicalProcess, LpId};

use crate::{
    chain::ChainLp,
    config::SimConfig,
    generator::Generator,
    load::{NodeIndex, PathTable},
    node::NodeLp,
};

/// Data a forward handler leaves behind for its reverse and commit
/// handlers: the deserialized (and possibly updated) in-flight object.
pub enum SimNote {
    Payment {
        payment: Payment,
        swap: Option<SubmarineSwap>,
    },
    Swap(SubmarineSwap),
    Tx(BcTx),
    Generated { id: u64, kind: PaymentKind },
}

/// Per-partition commit sink: every payment that reached a terminal state
/// at a sender of this partition.
#[derive(Default)]
pub struct SimJournal {
    pub payments: Vec<Payment>,
}

/// The two LP types of the simulation.
pub enum SimLp {
    Node(Box<NodeLp>),
    Chain(ChainLp),
}

impl LogicalProcess for SimLp {
    type Note = SimNote;
    type Journal = SimJournal;

    fn on_start(&mut self, ctx: &mut EventCtx<'_>) {
        match self {
            SimLp::Node(node) => node.on_start(ctx),
            SimLp::Chain(chain) => chain.on_start(ctx),
        }
    }

    fn forward(&mut self, ev: &Event, ctx: &mut EventCtx<'_>) -> Option<SimNote> {
        match self {
            SimLp::Node(node) => node.forward(ev, ctx),
            SimLp::Chain(chain) => {
                chain.forward(ev, ctx);
                None
            }
        }
    }

    fn reverse(&mut self, ev: &Event, bf: Bitfield, note: Option<&mut SimNote>) {
        match self {
            SimLp::Node(node) => node.reverse(ev, bf, note),
            SimLp::Chain(chain) => chain.reverse(ev),
        }
    }

    fn commit(&mut self, ev: &Event, note: Option<SimNote>, journal: &mut SimJournal) {
        match self {
            SimLp::Node(node) => node.commit(ev, note, journal),
            SimLp::Chain(_) => {}
        }
    }
}

/// Assemble all LPs: one per node, in its topology partition, plus the
/// blockchain LP with global id = node count, always on partition 0.
pub fn build_lps(
    net: &Arc<Network>,
    index: &Arc<NodeIndex>,
    paths: &Arc<PathTable>,
    rates: &Arc<[f64; plasma_common::config::TPS_WINDOWS]>,
    cfg: &Arc<SimConfig>,
) -> Vec<(SimLp, usize)> {
    let chain_lp: LpId = net.nodes.len() as LpId;
    let mut lps = Vec::with_capacity(net.nodes.len() + 1);
    for node in &net.nodes {
        let generator = (node.kind == NodeKind::EndUser).then(|| Generator {
            rates: Arc::clone(rates),
        });
        lps.push((
            SimLp::Node(Box::new(NodeLp {
                net: Arc::clone(net),
                cfg: Arc::clone(cfg),
                paths: Arc::clone(paths),
                index: Arc::clone(index),
                id: node.id,
                chain_lp,
                results: ResultStore::new(),
                awaiting_payment: None,
                withdrawal_id: 0,
                swaps: Vec::new(),
                generator,
                rollback_count: 0,
            })),
            node.partition,
        ));
    }
    lps.push((SimLp::Chain(ChainLp::new(chain_lp, Arc::clone(cfg))), 0));
    lps
}

/// End-of-run sweep: payments still parked behind a withdrawal that never
/// arrived count as timed out and join the output of their partition.
pub fn sweep_pending_payments(
    lps: &mut [SimLp],
    journals: &mut [SimJournal],
    net: &Network,
    cfg: &SimConfig,
    end_time: SimTime,
) {
    for lp in lps {
        let SimLp::Node(node) = lp else {
            continue;
        };
        let expired = node.awaiting_payment.as_ref().is_some_and(|awaiting| {
            awaiting.is_expired(end_time, cfg.payments_expire_after_ms, cfg.block_time_ms)
        });
        if !expired {
            continue;
        }
        let mut awaiting = node.awaiting_payment.take().unwrap();
        node.withdrawal_id = 0;
        awaiting.set_expired(end_time);
        let partition = net.node(node.id).partition;
        journals[partition].payments.push(awaiting);
    }
}
