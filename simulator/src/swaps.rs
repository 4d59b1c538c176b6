use log::debug;

use plasma_common::{
    blockchain::{BcTx, BcTxKind},
    config::LOCAL_EVENT_DELAY_MS,
    payments::{Payment, PaymentKind},
    swaps::{SubmarineSwap, SwapState},
};
use plasma_kernel::EventCtx;

use crate::{
    delays::gamma_delay,
    message::{schedule_payment, schedule_swap, schedule_tx, EventKind},
    node::NodeLp,
};

/* Submarine swaps: when a channel towards another intermediary fills up
   past the configured threshold, the local node rebalances by paying the
   peer off-chain against an on-chain HTLC commitment. */

pub(crate) fn delete_swap(node: &mut NodeLp, swap: &SubmarineSwap) {
    if let Some(position) = node.swaps.iter().position(|candidate| candidate == swap) {
        debug!("node {} deletes swap towards {}", node.id, swap.submarine_receiver);
        node.swaps.remove(position);
    }
}

fn find_swap_by_tx<'a>(node: &'a mut NodeLp, tx: &BcTx) -> Option<&'a mut SubmarineSwap> {
    node.swaps.iter_mut().find(|swap| {
        swap.submarine_receiver == tx.sender
            && swap.submarine_sender == tx.receiver
            && swap.amount == tx.amount
    })
}

fn find_swap_by_payment<'a>(node: &'a mut NodeLp, payment: &Payment) -> &'a mut SubmarineSwap {
    let node_id = node.id;
    match node.swaps.iter_mut().find(|swap| {
        swap.submarine_receiver == payment.receiver
            && swap.submarine_sender == payment.sender
            && swap.amount == payment.amount
    }) {
        Some(swap) => swap,
        None => panic!(
            "node {} cannot find a swap matching payment {}",
            node_id, payment.id
        ),
    }
}

/// Hook run on every forwarded payment: check whether the channel the
/// payment arrived on has filled up enough to trigger a rebalancing swap.
/// Returns the started swap, which the reverse handler deletes again.
pub(crate) fn on_forward_payment(
    node: &mut NodeLp,
    payment: &Payment,
    ctx: &mut EventCtx<'_>,
) -> Option<SubmarineSwap> {
    /*
     * PrevNode ---- prev edge, LOW balance ----> Node
     * PrevNode <--- backward edge, HIGH balance  --- Node
     * Few payments can still be routed PrevNode -> Node: this node becomes
     * the submarine sender, PrevNode the submarine receiver.
     */
    let route = payment.route.as_ref()?;
    let prev_hop = route.hop_to(node.id)?;
    let prev_edge = node.net.edge(prev_hop.edge_id);
    let prev_backward_edge = node.net.counter_edge(prev_edge);
    let prev_channel = node.net.channel(prev_edge.channel_id);
    let prev_node = node.net.node(prev_edge.from);

    let unbalancedness = prev_backward_edge.balance() as f64 / prev_channel.capacity as f64;

    let submarine_sender = node.id;
    let submarine_receiver = prev_node.id;

    let already_started = node.swaps.iter().any(|swap| {
        swap.submarine_sender == submarine_sender && swap.submarine_receiver == submarine_receiver
    });

    let start_swap = !already_started
        && node.cfg.submarine_swaps
        && node.node().kind.is_intermediary()
        && prev_node.kind.is_intermediary()
        && unbalancedness > node.cfg.submarine_swap_threshold;

    if !start_swap {
        return None;
    }

    // swap amount S = B + P - C/2
    let amount = prev_backward_edge.balance() as i64 + payment.amount as i64
        - prev_channel.capacity as i64 / 2;
    if amount <= 0 {
        panic!(
            "node {} starting swap towards {} with non-positive amount {}",
            node.id, submarine_receiver, amount
        );
    }

    let swap = SubmarineSwap {
        submarine_sender,
        submarine_receiver,
        amount: amount as u64,
        trigger_payment_id: payment.id,
        start_time: ctx.now(),
        state: SwapState::Requested,
    };
    debug!(
        "node {} starting swap of {} towards {} (unbalancedness {:.3})",
        node.id, swap.amount, submarine_receiver, unbalancedness
    );
    node.swaps.push(swap.clone());

    let delay = gamma_delay(ctx.rng());
    schedule_swap(ctx, prev_node.id, delay, EventKind::SwapRequest, &swap);
    Some(swap)
}

pub(crate) fn on_forward_payment_rev(node: &mut NodeLp, swap: &SubmarineSwap) {
    delete_swap(node, swap);
}

/// The counterparty records the swap and commits the on-chain side.
pub(crate) fn on_swap_request(node: &mut NodeLp, swap: &SubmarineSwap, ctx: &mut EventCtx<'_>) {
    if swap.submarine_receiver != node.id {
        panic!(
            "swap request for {} delivered to node {}",
            swap.submarine_receiver, node.id
        );
    }

    node.swaps.push(swap.clone());

    // the prepare sender is the submarine receiver and vice versa
    let prepare_htlc = BcTx {
        kind: BcTxKind::PrepareHtlc,
        sender: swap.submarine_receiver,
        receiver: swap.submarine_sender,
        amount: swap.amount,
        start_time: ctx.now(),
        originator: node.id,
    };
    let delay = gamma_delay(ctx.rng());
    schedule_tx(ctx, node.chain_lp, delay, EventKind::BcTxBroadcast, &prepare_htlc);
}

pub(crate) fn on_swap_request_rev(node: &mut NodeLp, swap: &SubmarineSwap) {
    delete_swap(node, swap);
}

/// A block confirmed an on-chain HTLC this node cares about.
pub(crate) fn on_blockchain_tx(node: &mut NodeLp, tx: &BcTx, ctx: &mut EventCtx<'_>) {
    let node_id = node.id;
    let Some(swap) = find_swap_by_tx(node, tx) else {
        debug!("node {} has no swap for confirmed tx from {}", node_id, tx.sender);
        return;
    };

    match tx.kind {
        BcTxKind::PrepareHtlc if tx.sender == node_id => {
            swap.state = SwapState::L1Prepared;
        }
        BcTxKind::PrepareHtlc if tx.receiver == node_id => {
            swap.state = SwapState::L1Prepared;
            // the on-chain commitment is in: pay the counterparty off-chain
            let swap_payment = Payment::new(
                swap.submarine_sender,
                swap.submarine_receiver,
                swap.amount,
                ctx.now(),
                PaymentKind::SubmarineSwap,
            );
            schedule_payment(
                ctx,
                swap_payment.sender,
                LOCAL_EVENT_DELAY_MS,
                EventKind::FindPath,
                &swap_payment,
            );
        }
        BcTxKind::ClaimHtlc => {
            swap.state = SwapState::L1Claimed;
        }
        _ => {}
    }
}

pub(crate) fn on_blockchain_tx_rev(node: &mut NodeLp, tx: &BcTx) {
    let Some(swap) = find_swap_by_tx(node, tx) else {
        return;
    };
    match tx.kind {
        BcTxKind::PrepareHtlc => swap.state = SwapState::Requested,
        BcTxKind::ClaimHtlc => swap.state = SwapState::L1Prepared,
    }
}

/// Commit side of a confirmation: a claimed swap is settled for good and
/// leaves the book.
pub(crate) fn on_blockchain_tx_commit(node: &mut NodeLp, tx: &BcTx) {
    let node_id = node.id;
    let swap = match find_swap_by_tx(node, tx) {
        Some(swap) => swap.clone(),
        None => panic!(
            "node {} cannot find a swap for committed blockchain tx from {}",
            node_id, tx.sender
        ),
    };
    if swap.state == SwapState::L1Claimed && tx.kind == BcTxKind::ClaimHtlc {
        delete_swap(node, &swap);
    }
}

/// The off-chain leg of a swap succeeded: the counterparty claims the
/// on-chain HTLC.
pub(crate) fn on_receive_success(node: &mut NodeLp, payment: &Payment, ctx: &mut EventCtx<'_>) {
    if payment.kind != PaymentKind::SubmarineSwap {
        return;
    }

    let swap = find_swap_by_payment(node, payment).clone();
    let claim_htlc = BcTx {
        kind: BcTxKind::ClaimHtlc,
        sender: swap.submarine_receiver,
        receiver: swap.submarine_sender,
        amount: swap.amount,
        start_time: ctx.now(),
        originator: node.id,
    };
    let delay = gamma_delay(ctx.rng());
    schedule_tx(ctx, node.chain_lp, delay, EventKind::BcTxBroadcast, &claim_htlc);
}
