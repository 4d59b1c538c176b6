use std::sync::Arc;

use plasma_common::{
    blockchain::BcTxKind,
    network::{Channel, Country, Edge, Network, Node, NodeKind, Policy},
    payments::{Payment, PaymentErrorKind, PaymentKind},
    EdgeId, NodeId,
};
use plasma_kernel::{Bitfield, Event, EventCtx, Executor, ExecutorConfig, ReversibleRng};
use plasma_simulator::{
    config::SimConfig,
    load::{NodeIndex, PathTable},
    message::{payment_payload, EventKind},
    node::NodeLp,
    sim::{build_lps, SimJournal, SimLp},
};

fn base_config() -> SimConfig {
    SimConfig {
        use_known_paths: false,
        tps: 0,
        waterfall: true,
        reverse_waterfall: true,
        submarine_swaps: false,
        submarine_swap_threshold: 0.9,
        block_size: 4,
        block_time_ms: 60_000.0,
        block_congestion_rate: 0.0,
        duration_ms: 60_000.0,
        payments_expire_after_ms: 10_000.0,
        fail_suppression_window_ms: 60_000.0,
    }
}

fn zero_fee_policy() -> Policy {
    Policy {
        fee_base: 0,
        fee_proportional: 0,
        min_htlc: 1,
        timelock: 10,
    }
}

#[derive(Default)]
struct NetBuilder {
    net: Network,
}

impl NetBuilder {
    fn node(&mut self, kind: NodeKind, custodian: Option<NodeId>) -> NodeId {
        let id = self.net.nodes.len() as NodeId;
        let label = match kind {
            NodeKind::EndUser => format!("Retail-IT-{}", id),
            NodeKind::Merchant => format!("Merchant-IT-{}", id),
            NodeKind::Intermediary => format!("Intermediary-IT-{}", id),
            NodeKind::CentralBank => format!("CB-EU-{}", id),
        };
        self.net.nodes.push(Node {
            id,
            label,
            kind,
            country: Country::IT,
            partition: 0,
            custodian,
            open_edges: Vec::new(),
        });
        id
    }

    /// Open a channel between `a` and `b` with `balance_a` spendable on
    /// a's side and the rest on b's. Returns the two directed edge ids.
    fn channel(
        &mut self,
        a: NodeId,
        b: NodeId,
        capacity: u64,
        balance_a: u64,
        policy: Policy,
    ) -> (EdgeId, EdgeId) {
        let channel_id = self.net.channels.len() as u64;
        let forward = self.net.edges.len() as EdgeId;
        let backward = forward + 1;
        self.net.channels.push(Channel {
            id: channel_id,
            node1: a,
            node2: b,
            edge1: forward,
            edge2: backward,
            capacity,
            is_private: false,
        });
        self.net.edges.push(Edge::new(
            forward, channel_id, backward, a, b, balance_a, policy,
        ));
        self.net.edges.push(Edge::new(
            backward,
            channel_id,
            forward,
            b,
            a,
            capacity - balance_a,
            policy,
        ));
        self.net.nodes[a as usize].open_edges.push(forward);
        self.net.nodes[b as usize].open_edges.push(backward);
        (forward, backward)
    }
}

struct SimResult {
    net: Arc<Network>,
    lps: Vec<SimLp>,
    journals: Vec<SimJournal>,
}

impl SimResult {
    fn payments(&self) -> Vec<&Payment> {
        self.journals
            .iter()
            .flat_map(|journal| journal.payments.iter())
            .collect()
    }

    fn node_lp(&self, id: NodeId) -> &NodeLp {
        match &self.lps[id as usize] {
            SimLp::Node(node) => node,
            SimLp::Chain(_) => panic!("lp {} is the blockchain", id),
        }
    }

    fn chain(&self) -> &plasma_simulator::chain::ChainLp {
        match self.lps.last().unwrap() {
            SimLp::Chain(chain) => chain,
            SimLp::Node(_) => panic!("last lp is not the blockchain"),
        }
    }

    fn assert_balance_conservation(&self) {
        for channel in &self.net.channels {
            assert!(
                self.net.channel_is_balanced(channel),
                "channel {} out of balance: {} + {} != {}",
                channel.id,
                self.net.edge(channel.edge1).balance(),
                self.net.edge(channel.edge2).balance(),
                channel.capacity
            );
        }
    }
}

/// Run the simulation with the given hand-built payments injected as
/// find-path events at their start times.
fn run_sim(net: Network, cfg: SimConfig, payments: Vec<Payment>) -> SimResult {
    let net = Arc::new(net);
    let cfg = Arc::new(cfg);
    let index = Arc::new(NodeIndex::build(&net));
    let paths = Arc::new(PathTable::new());
    let rates = Arc::new([0.0; plasma_common::config::TPS_WINDOWS]);

    let lps = build_lps(&net, &index, &paths, &rates, &cfg);
    let mut executor = Executor::new(
        ExecutorConfig {
            end_time: cfg.duration_ms,
            seed: 42,
            gvt_interval: 64,
        },
        lps,
    );
    for payment in &payments {
        executor.prime(
            payment.sender,
            payment.start_time,
            EventKind::FindPath.code(),
            payment_payload(payment),
        );
    }
    let run = executor.run();
    SimResult {
        net,
        lps: run.lps,
        journals: run.journals,
    }
}

#[test]
fn test_s1_direct_payment_succeeds() {
    let mut builder = NetBuilder::default();
    let a = builder.node(NodeKind::Intermediary, None);
    let b = builder.node(NodeKind::Intermediary, None);
    let (ab, ba) = builder.channel(a, b, 10_000, 10_000, zero_fee_policy());

    let payment = Payment::new(a, b, 1_000, 1.0, PaymentKind::Tx);
    let result = run_sim(builder.net, base_config(), vec![payment]);

    let payments = result.payments();
    assert_eq!(payments.len(), 1);
    let done = payments[0];
    assert!(done.is_success);
    assert!(!done.is_timeout);
    assert_eq!(done.attempts, 1);
    assert_eq!(done.route.as_ref().unwrap().hops.len(), 1);

    assert_eq!(result.net.edge(ab).balance(), 9_000);
    assert_eq!(result.net.edge(ba).balance(), 1_000);
    assert_eq!(result.net.edge(ab).tot_flows(), 1);
    result.assert_balance_conservation();
}

#[test]
fn test_s2_two_hop_payment_pays_the_fee() {
    let fee_policy = Policy {
        fee_base: 1000,
        fee_proportional: 10,
        min_htlc: 1,
        timelock: 10,
    };
    let mut builder = NetBuilder::default();
    let a = builder.node(NodeKind::Intermediary, None);
    let i = builder.node(NodeKind::Intermediary, None);
    let b = builder.node(NodeKind::Intermediary, None);
    let (ai, ia) = builder.channel(a, i, 1_000_000, 1_000_000, fee_policy);
    let (ib, bi) = builder.channel(i, b, 1_000_000, 1_000_000, fee_policy);

    let payment = Payment::new(a, b, 1_000, 1.0, PaymentKind::Tx);
    let result = run_sim(builder.net, base_config(), vec![payment]);

    let payments = result.payments();
    assert_eq!(payments.len(), 1);
    let done = payments[0];
    assert!(done.is_success);
    let route = done.route.as_ref().unwrap();
    assert_eq!(route.hops.len(), 2);
    // fee at the intermediary: base 1000 + floor(10 * 1000 / 1e6) = 1000
    assert_eq!(route.total_fee, 1_000);
    assert_eq!(route.hops[0].amount_to_forward, 2_000);
    assert_eq!(route.hops[1].amount_to_forward, 1_000);

    // the sender paid amount + fee, the intermediary earned the fee
    assert_eq!(result.net.edge(ai).balance(), 1_000_000 - 2_000);
    assert_eq!(result.net.edge(ia).balance(), 2_000);
    assert_eq!(result.net.edge(ib).balance(), 1_000_000 - 1_000);
    assert_eq!(result.net.edge(bi).balance(), 1_000);
    result.assert_balance_conservation();
}

#[test]
fn test_s3_waterfall_deposit_unblocks_the_payment() {
    let mut builder = NetBuilder::default();
    let x = builder.node(NodeKind::Intermediary, None);
    let i = builder.node(NodeKind::Intermediary, None);
    // the user's wallet is full: all of the channel sits on its side
    let u = builder.node(NodeKind::EndUser, Some(i));
    builder.channel(x, i, 1_000_000, 1_000_000, zero_fee_policy());
    let (iu, ui) = builder.channel(i, u, 100_000, 0, zero_fee_policy());

    let payment = Payment::new(x, u, 500, 1.0, PaymentKind::Tx);
    let result = run_sim(builder.net, base_config(), vec![payment]);

    let payments = result.payments();
    // the incoming tx and exactly one waterfall deposit (notify fired once)
    assert_eq!(payments.len(), 2);
    let tx = payments
        .iter()
        .find(|payment| payment.kind == PaymentKind::Tx)
        .unwrap();
    let deposit = payments
        .iter()
        .find(|payment| payment.kind == PaymentKind::Deposit)
        .unwrap();

    assert!(tx.is_success);
    assert_eq!(tx.attempts, 1);

    // deposit = max(balance + amount - wallet_cap, wallet_cap / 3)
    assert!(deposit.is_success);
    assert_eq!(deposit.sender, u);
    assert_eq!(deposit.receiver, i);
    assert_eq!(deposit.amount, 100_000 / 3);

    // the deposit freed exactly enough inbound capacity
    assert_eq!(result.net.edge(ui).balance(), 100_000 - 100_000 / 3 + 500);
    assert_eq!(result.net.edge(iu).balance(), 100_000 / 3 - 500);
    result.assert_balance_conservation();
}

#[test]
fn test_s4_no_balance_failure_teaches_the_sender() {
    let mut cfg = base_config();
    cfg.waterfall = false;

    let mut builder = NetBuilder::default();
    let s = builder.node(NodeKind::Intermediary, None);
    let i1 = builder.node(NodeKind::Intermediary, None);
    let i2 = builder.node(NodeKind::Intermediary, None);
    let r = builder.node(NodeKind::Merchant, None);
    builder.channel(s, i1, 1_000_000, 1_000_000, zero_fee_policy());
    builder.channel(i1, i2, 1_000_000, 1_000_000, zero_fee_policy());
    // the last hop has no liquidity, but routing only sees the capacity
    let (i2r, _) = builder.channel(i2, r, 1_000_000, 0, zero_fee_policy());

    let payment = Payment::new(s, r, 1_000, 1.0, PaymentKind::Tx);
    let result = run_sim(builder.net, cfg, vec![payment]);

    let payments = result.payments();
    assert_eq!(payments.len(), 1);
    let done = payments[0];
    assert!(!done.is_success);
    let error = done.error.as_ref().unwrap();
    assert_eq!(error.kind, PaymentErrorKind::NoBalance);
    assert!(done.no_balance_count >= 1);

    // the sender learned from the fail cascade: the hops before the
    // failure forwarded, the failing hop is recorded at its amount
    let store = &result.node_lp(s).results;
    assert_eq!(store.get(s, i1).unwrap().success_amount, 1_000);
    assert_eq!(store.get(i1, i2).unwrap().success_amount, 1_000);
    let failed = store.get(i2, r).unwrap();
    assert_eq!(failed.fail_amount, 1_000);
    assert_eq!(failed.success_amount, 0);

    // every hold was refunded on the way back
    assert_eq!(result.net.edge(i2r).balance(), 0);
    result.assert_balance_conservation();
}

#[test]
fn test_s5_submarine_swap_lifecycle() {
    let mut cfg = base_config();
    cfg.waterfall = false;
    cfg.submarine_swaps = true;
    cfg.block_time_ms = 1_000.0;

    let mut builder = NetBuilder::default();
    let x = builder.node(NodeKind::Intermediary, None);
    let i1 = builder.node(NodeKind::Intermediary, None);
    let i2 = builder.node(NodeKind::Intermediary, None);
    let y = builder.node(NodeKind::Intermediary, None);
    builder.channel(x, i1, 10_000, 10_000, zero_fee_policy());
    // the i1 -> i2 direction is nearly drained: i2 holds 46 of 50
    let (_, i2i1) = builder.channel(i1, i2, 50, 4, zero_fee_policy());
    builder.channel(i2, y, 10_000, 10_000, zero_fee_policy());

    let payment = Payment::new(x, y, 2, 1.0, PaymentKind::Tx);
    let result = run_sim(builder.net, cfg, vec![payment]);

    // unbalancedness 46/50 > 0.9 triggered a swap of 46 + 2 - 25 = 23
    let payments = result.payments();
    let swap_payment = payments
        .iter()
        .find(|payment| payment.kind == PaymentKind::SubmarineSwap)
        .expect("no submarine swap payment was sent");
    assert_eq!(swap_payment.sender, i2);
    assert_eq!(swap_payment.receiver, i1);
    assert_eq!(swap_payment.amount, 23);
    assert!(swap_payment.is_success);

    // prepare and claim both confirmed on chain
    let chain = result.chain();
    let confirmed: Vec<BcTxKind> = chain
        .blocks
        .iter()
        .flat_map(|block| block.txs.iter().map(|entry| entry.tx.kind))
        .collect();
    assert!(confirmed.contains(&BcTxKind::PrepareHtlc));
    assert!(confirmed.contains(&BcTxKind::ClaimHtlc));
    assert!(chain.mempool.is_empty());

    // the settled swap left both books
    assert!(result.node_lp(i1).swaps.is_empty());
    assert!(result.node_lp(i2).swaps.is_empty());

    // 46 to start, +2 credited by the success cascade, -23 for the swap
    assert_eq!(result.net.edge(i2i1).balance(), 25);
    result.assert_balance_conservation();
}

#[test]
fn test_s6_send_payment_rollback_restores_state() {
    let mut builder = NetBuilder::default();
    let a = builder.node(NodeKind::Intermediary, None);
    let b = builder.node(NodeKind::Intermediary, None);
    let (ab, _) = builder.channel(a, b, 10_000, 10_000, zero_fee_policy());
    let net = Arc::new(builder.net);
    let cfg = Arc::new(base_config());

    let mut payment = Payment::new(a, b, 1_000, 1.0, PaymentKind::Tx);
    payment.route = Some(plasma_simulator::routing::transform_path_into_route(
        &[plasma_simulator::routing::PathHop {
            sender: a,
            receiver: b,
            edge: ab,
        }],
        1_000,
        &net,
    ));

    let mut node = NodeLp {
        net: Arc::clone(&net),
        cfg: Arc::clone(&cfg),
        paths: Arc::new(PathTable::new()),
        index: Arc::new(NodeIndex::build(&net)),
        id: a,
        chain_lp: 2,
        results: plasma_common::results::ResultStore::new(),
        awaiting_payment: None,
        withdrawal_id: 0,
        swaps: Vec::new(),
        generator: None,
        rollback_count: 0,
    };

    let ev = Event {
        id: 1,
        src: a,
        dest: a,
        send_time: 0.0,
        recv_time: 5.0,
        kind: EventKind::SendPayment.code(),
        payload: payment_payload(&payment),
    };

    let mut rng = ReversibleRng::new(42, a);
    let rng_position = rng.count();
    let balance_before = net.edge(ab).balance();
    let flows_before = net.edge(ab).tot_flows();

    let mut bf = Bitfield::default();
    let mut out = Vec::new();
    let mut note = {
        let mut ctx = EventCtx::new(ev.recv_time, a, &mut bf, &mut rng, &mut out);
        node.forward(&ev, &mut ctx)
    };
    let consumed = rng.count() - rng_position;

    // the forward took effect and scheduled the next hop
    assert_eq!(net.edge(ab).balance(), balance_before - 1_000);
    assert_eq!(net.edge(ab).tot_flows(), flows_before + 1);
    assert_eq!(out.len(), 1);

    // reverse restores balances, counters and the rng position exactly
    node.reverse(&ev, bf, note.as_mut());
    rng.rewind(consumed);
    assert_eq!(net.edge(ab).balance(), balance_before);
    assert_eq!(net.edge(ab).tot_flows(), flows_before);
    assert_eq!(rng.count(), rng_position);
}

#[test]
fn test_generator_produces_load() {
    let mut cfg = base_config();
    cfg.tps = 10;
    cfg.duration_ms = 30_000.0;
    cfg.reverse_waterfall = false;
    cfg.waterfall = false;

    let mut builder = NetBuilder::default();
    let i = builder.node(NodeKind::Intermediary, None);
    let user1 = builder.node(NodeKind::EndUser, Some(i));
    let user2 = builder.node(NodeKind::EndUser, Some(i));
    let merchant = builder.node(NodeKind::Merchant, Some(i));
    builder.channel(user1, i, 10_000_000, 10_000_000, zero_fee_policy());
    builder.channel(user2, i, 10_000_000, 10_000_000, zero_fee_policy());
    builder.channel(i, merchant, 10_000_000, 10_000_000, zero_fee_policy());

    let net = Arc::new(builder.net);
    let cfg = Arc::new(cfg);
    let index = Arc::new(NodeIndex::build(&net));
    let paths = Arc::new(PathTable::new());
    let rates = Arc::new([10.0; plasma_common::config::TPS_WINDOWS]);

    let lps = build_lps(&net, &index, &paths, &rates, &cfg);
    let run = Executor::new(
        ExecutorConfig {
            end_time: cfg.duration_ms,
            seed: 7,
            gvt_interval: 64,
        },
        lps,
    )
    .run();

    let generated: Vec<&Payment> = run
        .journals
        .iter()
        .flat_map(|journal| journal.payments.iter())
        .collect();
    // two users at ~10 tx/s each over 30 s, minus scheduling floors:
    // expect a steady stream
    assert!(
        generated.len() > 80,
        "expected a steady payment stream, got {}",
        generated.len()
    );
    assert!(generated
        .iter()
        .all(|payment| payment.sender == user1 || payment.sender == user2));
    assert!(generated
        .iter()
        .all(|payment| payment.receiver != payment.sender));
    let successes = generated.iter().filter(|payment| payment.is_success).count();
    assert!(
        successes * 2 > generated.len(),
        "most payments should succeed, {} of {}",
        successes,
        generated.len()
    );
}

#[test]
fn test_reverse_waterfall_withdrawal_releases_the_payment() {
    let mut cfg = base_config();
    cfg.tps = 1;
    cfg.duration_ms = 20_000.0;

    let mut builder = NetBuilder::default();
    let i = builder.node(NodeKind::Intermediary, None);
    let user = builder.node(NodeKind::EndUser, Some(i));
    let peer = builder.node(NodeKind::EndUser, Some(i));
    let merchant = builder.node(NodeKind::Merchant, Some(i));
    // the user starts broke: everything sits with the custodian
    builder.channel(user, i, 10_000_000, 0, zero_fee_policy());
    builder.channel(peer, i, 10_000_000, 10_000_000, zero_fee_policy());
    builder.channel(i, merchant, 10_000_000, 10_000_000, zero_fee_policy());

    let net = Arc::new(builder.net);
    let cfg = Arc::new(cfg);
    let index = Arc::new(NodeIndex::build(&net));
    let paths = Arc::new(PathTable::new());
    let rates = Arc::new([1.0; plasma_common::config::TPS_WINDOWS]);

    let lps = build_lps(&net, &index, &paths, &rates, &cfg);
    let run = Executor::new(
        ExecutorConfig {
            end_time: cfg.duration_ms,
            seed: 21,
            gvt_interval: 64,
        },
        lps,
    )
    .run();

    let payments: Vec<&Payment> = run
        .journals
        .iter()
        .flat_map(|journal| journal.payments.iter())
        .collect();
    let withdrawal = payments
        .iter()
        .find(|payment| payment.kind == PaymentKind::Withdrawal && payment.receiver == user)
        .expect("no withdrawal was generated for the broke user");
    assert_eq!(withdrawal.sender, i);
    // W = max(25_000 - 0, amount - 0): at least the base wallet amount
    assert!(withdrawal.amount >= 25_000);

    // the parked payment went out after the withdrawal landed
    payments
        .iter()
        .find(|payment| {
            payment.kind == PaymentKind::Tx && payment.is_success && payment.sender == user
        })
        .expect("the parked payment never completed");
}
