use log::debug;

use plasma_common::{
    config::{LOCAL_EVENT_DELAY_MS, OFFLINE_LATENCY_MS},
    network::Edge,
    payments::{Payment, PaymentError, PaymentErrorKind, PaymentKind, RouteHop},
    results::ResultStore,
    SimTime,
};
use plasma_kernel::EventCtx;

use crate::{
    delays::gamma_delay,
    message::{schedule_payment, EventKind},
    node::NodeLp,
};

/* The HTLC mechanism for exchanging payments, as implemented in the
   Lightning Network: a (high-level) copy of lnd-v0.9.1-beta
   (`routing/missioncontrol.go`, `htlcswitch/switch.go`,
   `htlcswitch/link.go`). */

fn route_of(payment: &Payment) -> &plasma_common::payments::Route {
    match &payment.route {
        Some(route) => route,
        None => panic!("payment {} has no route in an htlc handler", payment.id),
    }
}

fn assert_own_edge(node: &NodeLp, edge: &Edge, handler: &str) {
    if !node.node().open_edges.contains(&edge.id) {
        panic!(
            "{}: edge {} is not an edge of node {}",
            handler, edge.id, node.id
        );
    }
}

/// Balance and policy gate for one hop. An insufficient balance is a
/// runtime condition; a violated policy means the route itself is broken.
fn check_balance_and_policy(
    next_edge: &Edge,
    prev_edge: &Edge,
    prev_hop: &RouteHop,
    next_hop: &RouteHop,
) -> bool {
    if next_hop.amount_to_forward > next_edge.balance() {
        return false;
    }

    if next_hop.amount_to_forward < next_edge.policy.min_htlc {
        panic!(
            "policy.min_htlc not respected on edge {}: {} < {}",
            next_edge.id, next_hop.amount_to_forward, next_edge.policy.min_htlc
        );
    }

    let expected_fee = next_edge.policy.fee(next_hop.amount_to_forward);
    if prev_hop.amount_to_forward != next_hop.amount_to_forward + expected_fee {
        panic!(
            "policy.fee not respected on edge {}: {} != {} + {}",
            next_edge.id, prev_hop.amount_to_forward, next_hop.amount_to_forward, expected_fee
        );
    }

    if prev_hop.timelock != next_hop.timelock + prev_edge.policy.timelock {
        panic!(
            "policy.timelock not respected on edge {}: {} != {} + {}",
            prev_edge.id, prev_hop.timelock, next_hop.timelock, prev_edge.policy.timelock
        );
    }

    true
}

/// Commit the first hop of the route (behavior of the payment sender).
/// Returns whether the outgoing edge was debited.
pub(crate) fn send_payment(node: &NodeLp, payment: &mut Payment, ctx: &mut EventCtx<'_>) -> bool {
    let first_hop = *route_of(payment).first_hop();
    let next_edge = node.net.edge(first_hop.edge_id);
    assert_own_edge(node, next_edge, "send_payment");

    /* simulate the case that the next node in the route is offline */
    let next_node_offline = false;
    if next_node_offline {
        payment.offline_node_count += 1;
        payment.error = Some(PaymentError {
            kind: PaymentErrorKind::OfflineNode,
            hop: Some(first_hop),
            time: ctx.now(),
        });
        schedule_payment(ctx, node.id, OFFLINE_LATENCY_MS, EventKind::ReceiveFail, payment);
        return false;
    }

    if first_hop.amount_to_forward > next_edge.balance() {
        payment.error = Some(PaymentError {
            kind: PaymentErrorKind::NoBalance,
            hop: Some(first_hop),
            time: ctx.now(),
        });
        payment.no_balance_count += 1;
        schedule_payment(ctx, node.id, LOCAL_EVENT_DELAY_MS, EventKind::ReceiveFail, payment);
        return false;
    }

    next_edge.sub_balance(first_hop.amount_to_forward);
    next_edge.inc_flows();

    let kind = if first_hop.to == payment.receiver {
        EventKind::ReceivePayment
    } else {
        EventKind::ForwardPayment
    };
    let delay = gamma_delay(ctx.rng());
    schedule_payment(ctx, first_hop.to, delay, kind, payment);
    true
}

/// Commit the outgoing hop of an intermediate node. Returns whether the
/// outgoing edge was debited.
pub(crate) fn forward_payment(
    node: &NodeLp,
    payment: &mut Payment,
    ctx: &mut EventCtx<'_>,
) -> bool {
    let route = route_of(payment);
    let next_hop = match route.hop_from(node.id) {
        Some(hop) => *hop,
        None => panic!("forward_payment: no hop leaves node {}", node.id),
    };
    let prev_hop = match route.hop_to(node.id) {
        Some(hop) => *hop,
        None => panic!("forward_payment: no hop enters node {}", node.id),
    };
    let next_edge = node.net.edge(next_hop.edge_id);
    let next_node = node.net.node(next_edge.to);
    let prev_edge = node.net.edge(prev_hop.edge_id);
    assert_own_edge(node, next_edge, "forward_payment");

    /* simulate the case that the next node in the route is offline; the
    receiver itself is assumed always online */
    let next_node_offline = false;
    if next_node_offline && next_hop.to != payment.receiver {
        payment.offline_node_count += 1;
        payment.error = Some(PaymentError {
            kind: PaymentErrorKind::OfflineNode,
            hop: Some(next_hop),
            time: ctx.now(),
        });
        let prev_node_id = prev_hop.from;
        let kind = if prev_node_id == payment.sender {
            EventKind::ReceiveFail
        } else {
            EventKind::ForwardFail
        };
        let delay = gamma_delay(ctx.rng()) + OFFLINE_LATENCY_MS;
        schedule_payment(ctx, prev_node_id, delay, kind, payment);
        return false;
    }

    let can_send_htlc = check_balance_and_policy(next_edge, prev_edge, &prev_hop, &next_hop);

    // an intermediary short on liquidity towards the receiving end user
    // asks for a deposit and keeps retrying until it lands (waterfall)
    let await_waterfall = node.cfg.waterfall
        && !can_send_htlc
        && payment.kind == PaymentKind::Tx
        && node.node().kind == plasma_common::network::NodeKind::Intermediary
        && next_node.id == payment.receiver
        && matches!(
            next_node.kind,
            plasma_common::network::NodeKind::EndUser | plasma_common::network::NodeKind::Merchant
        )
        && ctx.now() < payment.start_time + node.cfg.payments_expire_after_ms;

    if await_waterfall {
        // the error field doubles as the notified-already marker
        if payment.has_no_error() {
            payment.error = Some(PaymentError {
                kind: PaymentErrorKind::NoBalance,
                hop: None,
                time: ctx.now(),
            });
            let delay = gamma_delay(ctx.rng());
            schedule_payment(ctx, payment.receiver, delay, EventKind::NotifyPayment, payment);
        }

        debug!(
            "node {} awaiting waterfall deposit for payment {}",
            node.id, payment.id
        );
        let delay = gamma_delay(ctx.rng());
        schedule_payment(ctx, node.id, delay, EventKind::ForwardPayment, payment);
        return false;
    }

    if !can_send_htlc {
        payment.error = Some(PaymentError {
            kind: PaymentErrorKind::NoBalance,
            hop: Some(next_hop),
            time: ctx.now(),
        });
        payment.no_balance_count += 1;
        let prev_node_id = prev_hop.from;
        let kind = if prev_node_id == payment.sender {
            EventKind::ReceiveFail
        } else {
            EventKind::ForwardFail
        };
        let delay = gamma_delay(ctx.rng());
        schedule_payment(ctx, prev_node_id, delay, kind, payment);
        return false;
    }

    next_edge.sub_balance(next_hop.amount_to_forward);
    next_edge.inc_flows();

    let kind = if next_hop.to == payment.receiver {
        EventKind::ReceivePayment
    } else {
        EventKind::ForwardPayment
    };
    let delay = gamma_delay(ctx.rng());
    schedule_payment(ctx, next_hop.to, delay, kind, payment);
    true
}

/// Accept the incoming HTLC (behavior of the payment receiver): the claim
/// credits the backward edge and starts the success cascade.
pub(crate) fn receive_payment(node: &NodeLp, payment: &mut Payment, ctx: &mut EventCtx<'_>) {
    let last_hop = *route_of(payment).last_hop();
    let forward_edge = node.net.edge(last_hop.edge_id);
    let backward_edge = node.net.counter_edge(forward_edge);
    assert_own_edge(node, backward_edge, "receive_payment");

    backward_edge.add_balance(last_hop.amount_to_forward);
    payment.is_success = true;

    let prev_node_id = last_hop.from;
    let kind = if prev_node_id == payment.sender {
        EventKind::ReceiveSuccess
    } else {
        EventKind::ForwardSuccess
    };
    let delay = gamma_delay(ctx.rng());
    schedule_payment(ctx, prev_node_id, delay, kind, payment);

    if payment.kind == PaymentKind::Withdrawal {
        if payment.receiver != node.id {
            panic!(
                "receive_payment: withdrawal {} landed on node {} instead of {}",
                payment.id, node.id, payment.receiver
            );
        }
        // the funds are in, release the payment that waited for them
        if let Some(awaiting) = &node.awaiting_payment {
            if node.withdrawal_id == payment.id {
                schedule_payment(
                    ctx,
                    awaiting.sender,
                    LOCAL_EVENT_DELAY_MS,
                    EventKind::FindPath,
                    awaiting,
                );
            }
        }
    }
}

/// Propagate an HTLC success towards the sender: the preimage reveal
/// re-credits this node's backward edge.
pub(crate) fn forward_success(node: &NodeLp, payment: &mut Payment, ctx: &mut EventCtx<'_>) {
    let prev_hop = match route_of(payment).hop_to(node.id) {
        Some(hop) => *hop,
        None => panic!("forward_success: no hop enters node {}", node.id),
    };
    let forward_edge = node.net.edge(prev_hop.edge_id);
    let backward_edge = node.net.counter_edge(forward_edge);
    assert_own_edge(node, backward_edge, "forward_success");

    backward_edge.add_balance(prev_hop.amount_to_forward);

    let prev_node_id = prev_hop.from;
    let kind = if prev_node_id == payment.sender {
        EventKind::ReceiveSuccess
    } else {
        EventKind::ForwardSuccess
    };
    let delay = gamma_delay(ctx.rng());
    schedule_payment(ctx, prev_node_id, delay, kind, payment);
}

pub(crate) fn receive_success(_node: &NodeLp, payment: &mut Payment, ctx: &mut EventCtx<'_>) {
    payment.end_time = ctx.now();
}

/// Propagate an HTLC fail towards the sender, refunding this node's
/// outgoing edge.
pub(crate) fn forward_fail(node: &NodeLp, payment: &mut Payment, ctx: &mut EventCtx<'_>) {
    let next_hop = match route_of(payment).hop_from(node.id) {
        Some(hop) => *hop,
        None => panic!("forward_fail: no hop leaves node {}", node.id),
    };
    let next_edge = node.net.edge(next_hop.edge_id);
    assert_own_edge(node, next_edge, "forward_fail");

    /* the payment failed downstream, bring the balance back to the state
    before it was locked */
    next_edge.add_balance(next_hop.amount_to_forward);

    let prev_hop = match route_of(payment).hop_to(node.id) {
        Some(hop) => *hop,
        None => panic!("forward_fail: no hop enters node {}", node.id),
    };
    let prev_node_id = prev_hop.from;
    let kind = if prev_node_id == payment.sender {
        EventKind::ReceiveFail
    } else {
        EventKind::ForwardFail
    };
    let delay = gamma_delay(ctx.rng());
    schedule_payment(ctx, prev_node_id, delay, kind, payment);
}

/// The fail cascade reached the sender: refund the first hop (unless the
/// failure happened right there) and retry with a fresh route.
pub(crate) fn receive_fail(node: &NodeLp, payment: &mut Payment, ctx: &mut EventCtx<'_>) {
    let error_hop = match payment.error.as_ref().and_then(|error| error.hop) {
        Some(hop) => hop,
        None => panic!("receive_fail: payment {} carries no error hop", payment.id),
    };

    // if the error occurred at the first hop the balance was never locked
    if error_hop.from != payment.sender {
        let first_hop = *route_of(payment).first_hop();
        let next_edge = node.net.edge(first_hop.edge_id);
        assert_own_edge(node, next_edge, "receive_fail");
        next_edge.add_balance(first_hop.amount_to_forward);
    }

    schedule_payment(
        ctx,
        payment.sender,
        LOCAL_EVENT_DELAY_MS,
        EventKind::FindPath,
        payment,
    );
}

/// The receiver is told an incoming payment needs liquidity: deposit
/// enough with the custodian to make room for it (waterfall).
pub(crate) fn notify_payment(node: &NodeLp, payment: &mut Payment, ctx: &mut EventCtx<'_>) {
    if node.id != payment.receiver {
        panic!(
            "notify_payment: node {} and payment receiver {} are not the same",
            node.id, payment.receiver
        );
    }

    let this_node = node.node();
    let wallet_cap = node.net.wallet_cap(this_node) as i64;
    let balance = node.net.available_balance(this_node) as i64;

    // deposit D = B + P - C, and at least a third of the wallet capacity
    let mut deposit = balance + payment.amount as i64 - wallet_cap;
    if deposit < wallet_cap / 3 {
        deposit = wallet_cap / 3;
    }

    let custodian = match this_node.custodian {
        Some(custodian) => custodian,
        None => panic!("notify_payment: node {} has no custodian to deposit to", node.id),
    };
    let deposit_payment = Payment::new(
        node.id,
        custodian,
        deposit as u64,
        ctx.now(),
        PaymentKind::Deposit,
    );
    // an RTT to ask the custodian for a deposit invoice, then the usual
    // local setup delay
    let delay = LOCAL_EVENT_DELAY_MS + 2.0 * gamma_delay(ctx.rng());
    schedule_payment(
        ctx,
        deposit_payment.sender,
        delay,
        EventKind::FindPath,
        &deposit_payment,
    );
}

/* reverse handlers: exact inverses of the balance and counter updates;
   rescheduling is undone by the executor's anti-messages */

pub(crate) fn rev_send_payment(node: &NodeLp, payment: &Payment) {
    let first_hop = route_of(payment).first_hop();
    let next_edge = node.net.edge(first_hop.edge_id);
    next_edge.add_balance(first_hop.amount_to_forward);
    next_edge.dec_flows();
}

pub(crate) fn rev_forward_payment(node: &NodeLp, payment: &Payment) {
    let next_hop = match route_of(payment).hop_from(node.id) {
        Some(hop) => *hop,
        None => panic!("rev_forward_payment: no hop leaves node {}", node.id),
    };
    let next_edge = node.net.edge(next_hop.edge_id);
    next_edge.add_balance(next_hop.amount_to_forward);
    next_edge.dec_flows();
}

pub(crate) fn rev_receive_payment(node: &NodeLp, payment: &Payment) {
    let last_hop = route_of(payment).last_hop();
    let forward_edge = node.net.edge(last_hop.edge_id);
    let backward_edge = node.net.counter_edge(forward_edge);
    backward_edge.sub_balance(last_hop.amount_to_forward);
}

pub(crate) fn rev_forward_success(node: &NodeLp, payment: &Payment) {
    let prev_hop = match route_of(payment).hop_to(node.id) {
        Some(hop) => *hop,
        None => panic!("rev_forward_success: no hop enters node {}", node.id),
    };
    let forward_edge = node.net.edge(prev_hop.edge_id);
    let backward_edge = node.net.counter_edge(forward_edge);
    backward_edge.sub_balance(prev_hop.amount_to_forward);
}

pub(crate) fn rev_forward_fail(node: &NodeLp, payment: &Payment) {
    let next_hop = match route_of(payment).hop_from(node.id) {
        Some(hop) => *hop,
        None => panic!("rev_forward_fail: no hop leaves node {}", node.id),
    };
    node.net.edge(next_hop.edge_id).sub_balance(next_hop.amount_to_forward);
}

pub(crate) fn rev_receive_fail(node: &NodeLp, payment: &Payment) {
    let error_hop = match payment.error.as_ref().and_then(|error| error.hop) {
        Some(hop) => hop,
        None => panic!("rev_receive_fail: payment {} carries no error hop", payment.id),
    };
    if error_hop.from != payment.sender {
        let first_hop = route_of(payment).first_hop();
        node.net
            .edge(first_hop.edge_id)
            .sub_balance(first_hop.amount_to_forward);
    }
}

/* node pair result learning, commit side */

/// A success teaches the sender that every hop of the route forwarded.
pub(crate) fn process_success_result(results: &mut ResultStore, payment: &Payment, time: SimTime) {
    for hop in &route_of(payment).hops {
        results.set_success(hop.from, hop.to, hop.amount_to_forward, time);
    }
}

/// A failure teaches the sender where the route broke; everything before
/// the failing hop demonstrably forwarded.
pub(crate) fn process_fail_result(
    results: &mut ResultStore,
    payment: &Payment,
    time: SimTime,
    suppression_window_ms: SimTime,
) {
    let Some(error) = &payment.error else {
        return;
    };
    let Some(error_hop) = error.hop else {
        return;
    };

    // the sender already knows its own state, nothing to learn
    // (see `processPaymentOutcomeSelf` in lnd)
    if error_hop.from == payment.sender {
        return;
    }

    match error.kind {
        PaymentErrorKind::OfflineNode => {
            results.set_fail(error_hop.from, error_hop.to, 0, time, suppression_window_ms);
            results.set_fail(error_hop.to, error_hop.from, 0, time, suppression_window_ms);
        }
        PaymentErrorKind::NoBalance => {
            for hop in &route_of(payment).hops {
                if hop.edge_id == error_hop.edge_id {
                    results.set_fail(
                        hop.from,
                        hop.to,
                        hop.amount_to_forward,
                        time,
                        suppression_window_ms,
                    );
                    break;
                }
                results.set_success(hop.from, hop.to, hop.amount_to_forward, time);
            }
        }
        PaymentErrorKind::NoCapacity => {}
    }
}
