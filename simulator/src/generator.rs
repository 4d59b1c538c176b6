use std::sync::Arc;

use log::warn;
use rand::Rng;

use plasma_common::{
    config::{
        BASE_WALLET_AMOUNT, CROSS_BORDER_PROBABILITY, LOCAL_EVENT_DELAY_MS,
        RETRY_GENERATE_MAX_OFFSET_MS, ROUTING_LATENCY_MS, TPS_WINDOWS,
    },
    network::{Country, NUM_COUNTRIES},
    payments::{Payment, PaymentKind},
    NodeId, SimTime,
};
use plasma_kernel::{EventCtx, ReversibleRng};

use crate::{
    delays::{exponential_delay, gamma_delay},
    message::{schedule_payment, EventKind},
    node::NodeLp,
    sim::SimNote,
};

/* The stochastic load generator, one per end-user LP: POS, e-commerce and
   peer-to-peer payment scenarios with empirical amount distributions. */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scenario {
    Pos,
    Ecom,
    P2p,
}

const SCENARIO_VALUES: [Scenario; 3] = [Scenario::Pos, Scenario::Ecom, Scenario::P2p];
const SCENARIO_PDF: [u32; 3] = [800, 170, 3];

const AMOUNT_RANGES: [(u64, u64); 7] = [
    (1, 500),
    (501, 1000),
    (1001, 2000),
    (2001, 3000),
    (3001, 5000),
    (5001, 10_000),
    (10_001, 100_000),
];
const AMOUNT_PDF_POS: [u32; 7] = [210, 170, 210, 130, 130, 100, 50];
const AMOUNT_PDF_P2P: [u32; 7] = [140, 110, 220, 160, 140, 110, 120];
const AMOUNT_PDF_ECOM: [u32; 7] = [100, 110, 200, 150, 170, 160, 110];

/// Per-LP generator state: the tps schedule shared by every end user.
#[derive(Debug, Clone)]
pub struct Generator {
    pub rates: Arc<[f64; TPS_WINDOWS]>,
}

/// Draw from a discrete distribution given as relative weights.
fn discrete(rng: &mut ReversibleRng, pdf: &[u32]) -> usize {
    let total: u32 = pdf.iter().sum();
    let rnd = rng.gen_range(1..=total);
    let mut cumulative = 0;
    for (index, weight) in pdf.iter().enumerate() {
        cumulative += weight;
        if rnd < cumulative {
            return index;
        }
    }
    pdf.len() - 1
}

fn sample_scenario(rng: &mut ReversibleRng) -> Scenario {
    SCENARIO_VALUES[discrete(rng, &SCENARIO_PDF)]
}

fn sample_amount(rng: &mut ReversibleRng, scenario: Scenario) -> u64 {
    let pdf = match scenario {
        Scenario::Pos => &AMOUNT_PDF_POS,
        Scenario::Ecom => &AMOUNT_PDF_ECOM,
        Scenario::P2p => &AMOUNT_PDF_P2P,
    };
    let (low, high) = AMOUNT_RANGES[discrete(rng, pdf)];
    rng.gen_range(low..=high)
}

/// Pick a receiver: a merchant for POS/e-com, another end user for P2P,
/// preferring the sender's country unless the payment is cross-border.
/// Falls through to other countries until a suitable population exists.
fn pick_receiver(node: &NodeLp, rng: &mut ReversibleRng, scenario: Scenario) -> NodeId {
    let sender = node.node();
    let is_cross_border = rng.gen_bool(CROSS_BORDER_PROBABILITY);

    let mut receiver_country = sender.country;
    let start_country_index = rng.gen_range(0..NUM_COUNTRIES);
    for i in 0..NUM_COUNTRIES {
        let persons = &node.index.users[receiver_country.index()];
        let merchants = &node.index.merchants[receiver_country.index()];
        let unsuitable = (is_cross_border && receiver_country == sender.country)
            || (matches!(scenario, Scenario::Pos | Scenario::Ecom) && merchants.is_empty())
            || (scenario == Scenario::P2p && persons.len() < 2);
        if !unsuitable {
            break;
        }
        receiver_country = Country::from_index(start_country_index + i);
    }

    let persons = &node.index.users[receiver_country.index()];
    let merchants = &node.index.merchants[receiver_country.index()];
    loop {
        let receiver = match scenario {
            Scenario::Pos | Scenario::Ecom => merchants[rng.gen_range(0..merchants.len())],
            Scenario::P2p => persons[rng.gen_range(0..persons.len())],
        };
        if receiver != sender.id {
            return receiver;
        }
    }
}

fn current_rate(generator: &Generator, now: SimTime, duration: SimTime) -> f64 {
    let index = (now * TPS_WINDOWS as f64 / duration).floor() as usize;
    if index >= TPS_WINDOWS {
        panic!(
            "payment rate window {} out of range, simulation time {} past the duration",
            index, now
        );
    }
    generator.rates[index]
}

/// The rate of the next window where the tps actually changes, and how far
/// away it is.
fn next_rate_change(generator: &Generator, now: SimTime, duration: SimTime) -> (f64, SimTime) {
    let step = (duration / TPS_WINDOWS as f64).floor();
    let delta_to_next_window = step - (now - (now / step).floor() * step);

    let starting_index = (now * TPS_WINDOWS as f64 / duration).floor() as usize;
    let mut last_rate = generator.rates[starting_index];
    let mut index = starting_index + 1;
    while index < TPS_WINDOWS - 1 && last_rate == generator.rates[index] {
        last_rate = generator.rates[index];
        index += 1;
    }
    let index = index.min(TPS_WINDOWS - 1);
    let windows_away = index as i64 - (starting_index as i64 - 1);
    (
        generator.rates[index],
        delta_to_next_window + windows_away as SimTime * step,
    )
}

/// Schedule the next generation: exponential inter-arrival at the current
/// window's rate, re-drawn across a window boundary when the rate changes
/// there, and never before the previous payment has had time to leave.
pub(crate) fn schedule_next_generate(
    node: &NodeLp,
    ctx: &mut EventCtx<'_>,
    routing_latency: SimTime,
    payment_delay: SimTime,
) {
    let Some(generator) = &node.generator else {
        return;
    };
    let duration = node.cfg.duration_ms;
    let tps_now = current_rate(generator, ctx.now(), duration);
    if tps_now <= 0.0 {
        // a zero rate generates no load at all
        return;
    }

    let mut next_ms = exponential_delay(ctx.rng(), 1000.0 / tps_now).round();
    let (tps_next, delta_ms) = next_rate_change(generator, ctx.now(), duration);
    if delta_ms < next_ms && tps_now != tps_next && tps_next > 0.0 {
        next_ms = delta_ms + exponential_delay(ctx.rng(), 1000.0 / tps_next).round();
    }

    let offset = (routing_latency + payment_delay + 1.0).max(next_ms);
    ctx.schedule(
        node.id,
        offset,
        EventKind::GeneratePayment.code(),
        plasma_kernel::Payload::empty(),
    );
}

/// Generate the next random payment of this user. When the reverse
/// waterfall is on and the balance cannot cover it, a withdrawal from the
/// custodian goes out first and the payment itself is parked until the
/// funds arrive.
pub(crate) fn generate_payment(node: &mut NodeLp, ctx: &mut EventCtx<'_>) -> Option<SimNote> {
    // an earlier withdrawal is still in flight, try again shortly
    if node.cfg.reverse_waterfall && node.awaiting_payment.is_some() {
        let offset = ctx.rng().gen_range(1..=RETRY_GENERATE_MAX_OFFSET_MS as u64) as SimTime;
        ctx.schedule(
            node.id,
            offset,
            EventKind::GeneratePayment.code(),
            plasma_kernel::Payload::empty(),
        );
        return None;
    }

    let sender_id = node.id;
    let wallet_cap = node.net.wallet_cap(node.node()) as i64;
    let available_balance = node.net.available_balance(node.node()) as i64;

    let scenario = sample_scenario(ctx.rng());
    let mut amount = sample_amount(ctx.rng(), scenario) as i64;
    if amount > wallet_cap {
        warn!(
            "generated a payment of {} above the wallet cap {} of sender {}",
            amount, wallet_cap, sender_id
        );
        amount = wallet_cap;
    }

    let receiver_id = pick_receiver(node, ctx.rng(), scenario);
    let receiver_custodian = node.net.node(receiver_id).custodian;

    let payment = if node.cfg.reverse_waterfall && available_balance < amount {
        // W = max(Wbase - B, Pa - B)
        let withdraw_amount =
            (BASE_WALLET_AMOUNT as i64 - available_balance).max(amount - available_balance);
        let custodian = match node.node().custodian {
            Some(custodian) => custodian,
            None => panic!("end user {} has no custodian to withdraw from", sender_id),
        };
        let withdrawal = Payment::new(
            custodian,
            sender_id,
            withdraw_amount as u64,
            ctx.now(),
            PaymentKind::Withdrawal,
        );

        let mut postponed = Payment::new(
            sender_id,
            receiver_id,
            amount as u64,
            ctx.now(),
            PaymentKind::Tx,
        );
        // the last hop of a payment runs from the receiver's custodian
        postponed.last_hop = receiver_custodian;
        node.awaiting_payment = Some(postponed);
        node.withdrawal_id = withdrawal.id;
        withdrawal
    } else {
        let mut payment = Payment::new(
            sender_id,
            receiver_id,
            amount as u64,
            ctx.now(),
            PaymentKind::Tx,
        );
        payment.last_hop = receiver_custodian;
        payment
    };

    let payment_delay = if payment.kind == PaymentKind::Withdrawal {
        gamma_delay(ctx.rng())
    } else {
        LOCAL_EVENT_DELAY_MS
    };
    schedule_payment(ctx, payment.sender, payment_delay, EventKind::FindPath, &payment);

    schedule_next_generate(node, ctx, ROUTING_LATENCY_MS, payment_delay);

    Some(SimNote::Generated {
        id: payment.id,
        kind: payment.kind,
    })
}

/// Rollback of a generation: a parked payment waiting on the rolled-back
/// withdrawal is un-parked.
pub(crate) fn reverse_generate(node: &mut NodeLp, note: Option<&mut SimNote>) {
    node.rollback_count += 1;
    if let Some(SimNote::Generated {
        id,
        kind: PaymentKind::Withdrawal,
    }) = note
    {
        if node.awaiting_payment.is_some() && node.withdrawal_id == *id {
            node.awaiting_payment = None;
            node.withdrawal_id = 0;
        }
    }
}
