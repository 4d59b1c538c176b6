use std::sync::Arc;

use plasma_common::{
    config::ROUTING_LATENCY_MS,
    network::{Network, Node},
    payments::Payment,
    results::ResultStore,
    swaps::SubmarineSwap,
    NodeId,
};
use plasma_kernel::{Bitfield, Event, EventCtx, LpId};

use crate::{
    config::SimConfig,
    generator::{self, Generator},
    htlc,
    load::{NodeIndex, PathTable},
    message::{decode_payment, decode_swap, decode_tx, schedule_payment, EventKind},
    routing,
    sim::{SimJournal, SimNote},
    swaps,
};

// bitfield bit recording that the forward handler debited an edge
pub(crate) const FLAG_EDGE_UPDATED: u8 = 0;

/// A node of the payment-channel network as a logical process: the
/// immutable topology is shared, everything mutable in here belongs to
/// this LP alone.
pub struct NodeLp {
    pub net: Arc<Network>,
    pub cfg: Arc<SimConfig>,
    pub paths: Arc<PathTable>,
    pub index: Arc<NodeIndex>,
    pub id: NodeId,
    pub chain_lp: LpId,
    /// Outcomes of past payment attempts, used to bias routing.
    pub results: ResultStore,
    /// Reverse waterfall: the payment parked until its withdrawal lands,
    /// and the id of that withdrawal.
    pub awaiting_payment: Option<Payment>,
    pub withdrawal_id: u64,
    /// Outstanding submarine swaps this node takes part in.
    pub swaps: Vec<SubmarineSwap>,
    /// Present on end users only.
    pub generator: Option<Generator>,
    pub rollback_count: u64,
}

impl NodeLp {
    pub fn node(&self) -> &Node {
        self.net.node(self.id)
    }

    fn kind_of(ev: &Event) -> EventKind {
        match EventKind::from_code(ev.kind) {
            Some(kind) => kind,
            None => panic!("node: unknown event code {}", ev.kind),
        }
    }

    pub fn on_start(&mut self, ctx: &mut EventCtx<'_>) {
        // only end users generate load
        if self.generator.is_some() {
            generator::schedule_next_generate(self, ctx, 0.0, 0.0);
        }
    }

    pub fn forward(&mut self, ev: &Event, ctx: &mut EventCtx<'_>) -> Option<SimNote> {
        match Self::kind_of(ev) {
            EventKind::GeneratePayment => generator::generate_payment(self, ctx),
            EventKind::FindPath => {
                let mut payment = decode_payment(ev, &self.net);
                if let Some(path) = routing::find_path(
                    &mut payment,
                    ctx.now(),
                    &self.net,
                    &self.results,
                    &self.paths,
                    &self.cfg,
                ) {
                    payment.route =
                        Some(routing::transform_path_into_route(&path, payment.amount, &self.net));
                    // the time the sender's device needs to run a findpath
                    schedule_payment(
                        ctx,
                        payment.sender,
                        ROUTING_LATENCY_MS,
                        EventKind::SendPayment,
                        &payment,
                    );
                }
                Some(SimNote::Payment {
                    payment,
                    swap: None,
                })
            }
            EventKind::SendPayment => {
                let mut payment = decode_payment(ev, &self.net);
                if htlc::send_payment(self, &mut payment, ctx) {
                    ctx.set_flag(FLAG_EDGE_UPDATED);
                }
                Some(SimNote::Payment {
                    payment,
                    swap: None,
                })
            }
            EventKind::ForwardPayment => {
                let mut payment = decode_payment(ev, &self.net);
                if htlc::forward_payment(self, &mut payment, ctx) {
                    ctx.set_flag(FLAG_EDGE_UPDATED);
                }
                let swap = swaps::on_forward_payment(self, &payment, ctx);
                Some(SimNote::Payment { payment, swap })
            }
            EventKind::ReceivePayment => {
                let mut payment = decode_payment(ev, &self.net);
                htlc::receive_payment(self, &mut payment, ctx);
                Some(SimNote::Payment {
                    payment,
                    swap: None,
                })
            }
            EventKind::ForwardSuccess => {
                let mut payment = decode_payment(ev, &self.net);
                htlc::forward_success(self, &mut payment, ctx);
                Some(SimNote::Payment {
                    payment,
                    swap: None,
                })
            }
            EventKind::ReceiveSuccess => {
                let mut payment = decode_payment(ev, &self.net);
                htlc::receive_success(self, &mut payment, ctx);
                swaps::on_receive_success(self, &payment, ctx);
                Some(SimNote::Payment {
                    payment,
                    swap: None,
                })
            }
            EventKind::ForwardFail => {
                let mut payment = decode_payment(ev, &self.net);
                htlc::forward_fail(self, &mut payment, ctx);
                Some(SimNote::Payment {
                    payment,
                    swap: None,
                })
            }
            EventKind::ReceiveFail => {
                let mut payment = decode_payment(ev, &self.net);
                htlc::receive_fail(self, &mut payment, ctx);
                Some(SimNote::Payment {
                    payment,
                    swap: None,
                })
            }
            EventKind::NotifyPayment => {
                let mut payment = decode_payment(ev, &self.net);
                htlc::notify_payment(self, &mut payment, ctx);
                Some(SimNote::Payment {
                    payment,
                    swap: None,
                })
            }
            EventKind::SwapRequest => {
                let swap = decode_swap(ev);
                swaps::on_swap_request(self, &swap, ctx);
                Some(SimNote::Swap(swap))
            }
            EventKind::BcTxConfirmed => {
                let tx = decode_tx(ev);
                swaps::on_blockchain_tx(self, &tx, ctx);
                Some(SimNote::Tx(tx))
            }
            other => panic!("node {}: unhandled forward event {}", self.id, other),
        }
    }

    pub fn reverse(&mut self, ev: &Event, bf: Bitfield, note: Option<&mut SimNote>) {
        match Self::kind_of(ev) {
            EventKind::GeneratePayment => generator::reverse_generate(self, note),
            EventKind::FindPath => {}
            EventKind::SendPayment => {
                if bf.get(FLAG_EDGE_UPDATED) {
                    if let Some(SimNote::Payment { payment, .. }) = note {
                        htlc::rev_send_payment(self, payment);
                    }
                }
            }
            EventKind::ForwardPayment => {
                if let Some(SimNote::Payment { payment, swap }) = note {
                    if bf.get(FLAG_EDGE_UPDATED) {
                        htlc::rev_forward_payment(self, payment);
                    }
                    if let Some(swap) = swap {
                        swaps::on_forward_payment_rev(self, swap);
                    }
                }
            }
            EventKind::ReceivePayment => {
                if let Some(SimNote::Payment { payment, .. }) = note {
                    htlc::rev_receive_payment(self, payment);
                }
            }
            EventKind::ForwardSuccess => {
                if let Some(SimNote::Payment { payment, .. }) = note {
                    htlc::rev_forward_success(self, payment);
                }
            }
            EventKind::ReceiveSuccess => {
                // nothing to restore: the end time lived in the in-flight
                // copy and the claim broadcast is annihilated by the
                // executor
            }
            EventKind::ForwardFail => {
                if let Some(SimNote::Payment { payment, .. }) = note {
                    htlc::rev_forward_fail(self, payment);
                }
            }
            EventKind::ReceiveFail => {
                if let Some(SimNote::Payment { payment, .. }) = note {
                    htlc::rev_receive_fail(self, payment);
                }
            }
            EventKind::NotifyPayment => {}
            EventKind::SwapRequest => {
                if let Some(SimNote::Swap(swap)) = note {
                    swaps::on_swap_request_rev(self, swap);
                }
            }
            EventKind::BcTxConfirmed => {
                if let Some(SimNote::Tx(tx)) = note {
                    swaps::on_blockchain_tx_rev(self, tx);
                }
            }
            other => panic!("node {}: unhandled reverse event {}", self.id, other),
        }
    }

    pub fn commit(&mut self, ev: &Event, note: Option<SimNote>, journal: &mut SimJournal) {
        let kind = Self::kind_of(ev);
        match (&kind, &note) {
            (EventKind::SendPayment, Some(SimNote::Payment { payment, .. })) => {
                // the parked payment is on its way, its slot can go
                let matches = self
                    .awaiting_payment
                    .as_ref()
                    .is_some_and(|awaiting| awaiting.id == payment.id);
                if matches {
                    self.awaiting_payment = None;
                    self.withdrawal_id = 0;
                }
            }
            (EventKind::ReceiveSuccess, Some(SimNote::Payment { payment, .. })) => {
                /* learning runs at the event's forward time, not the commit
                time: a later find-path may already have executed and its
                probability queries reject results from their future */
                htlc::process_success_result(&mut self.results, payment, ev.recv_time);
            }
            (EventKind::ReceiveFail, Some(SimNote::Payment { payment, .. })) => {
                htlc::process_fail_result(
                    &mut self.results,
                    payment,
                    ev.recv_time,
                    self.cfg.fail_suppression_window_ms,
                );
            }
            (EventKind::BcTxConfirmed, Some(SimNote::Tx(tx))) => {
                swaps::on_blockchain_tx_commit(self, tx);
            }
            _ => {}
        }

        // a payment that ended at its sender goes to the output record
        if let Some(SimNote::Payment { payment, .. }) = note {
            if payment.end_time > 0.0 && payment.sender == self.id {
                journal.payments.push(payment);
            }
        }
    }
}
