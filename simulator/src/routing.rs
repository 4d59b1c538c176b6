use std::{cell::RefCell, cmp::Ordering, collections::BinaryHeap};

use log::debug;

use plasma_common::{
    config::{
        APRIORI_HOP_PROBABILITY, APRIORI_WEIGHT, FINAL_TIMELOCK, HOPS_LIMIT, MIN_PROBABILITY,
        PAYMENT_ATTEMPT_PENALTY, PENALTY_HALF_LIFE_HOURS, PREV_SUCCESS_PROBABILITY,
        PROBABILITY_LIMIT, RISK_FACTOR, TIMELOCK_LIMIT,
    },
    network::{Network, Policy},
    payments::{Payment, PaymentError, PaymentErrorKind, Route, RouteHop},
    results::{PairResult, ResultStore},
    EdgeId, NodeId, SimTime,
};

use crate::{config::SimConfig, load::PathTable};

/* A modified version of the path finding implemented in the Lightning
   Network (lnd-v0.10.0-beta, `routing/pathfind.go` and
   `routing/payment_session.go`): a reverse Dijkstra whose edge cost blends
   fee, timelock and an empirical success probability learned from the
   sender's previous attempts. */

const INF: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathfindError {
    /// The sender cannot possibly cover the amount across its channels.
    NoLocalBalance,
    /// No eligible path exists at this time.
    NoPath,
}

/// One hop of a raw path, before fees and timelocks are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathHop {
    pub sender: NodeId,
    pub receiver: NodeId,
    pub edge: EdgeId,
}

/* probability model */

fn ms_to_hours(ms: f64) -> f64 {
    ms / 3_600_000.0
}

/// Time decay of a recorded failure: 2^(-age / half-life).
fn decay_weight(age_ms: f64) -> f64 {
    2f64.powf(-ms_to_hours(age_ms) / PENALTY_HALF_LIFE_HOURS)
}

/// Average success probability over everything the sender knows about a
/// node, blended with an a-priori mass.
fn node_probability(
    results: &indexmap::IndexMap<NodeId, PairResult>,
    amount: u64,
    now: SimTime,
) -> f64 {
    if results.is_empty() {
        return APRIORI_HOP_PROBABILITY;
    }
    let apriori_factor = 1.0 / (1.0 - APRIORI_WEIGHT) - 1.0;
    let mut total_probabilities = APRIORI_HOP_PROBABILITY * apriori_factor;
    let mut total_weight = apriori_factor;
    for result in results.values() {
        if amount <= result.success_amount {
            total_weight += 1.0;
            total_probabilities += PREV_SUCCESS_PROBABILITY;
            continue;
        }
        if result.fail_time != 0.0 && amount >= result.fail_amount {
            total_weight += decay_weight(now - result.fail_time);
        }
    }
    total_probabilities / total_weight
}

fn pair_probability(
    results: &indexmap::IndexMap<NodeId, PairResult>,
    to: NodeId,
    amount: u64,
    node_probability: f64,
    now: SimTime,
) -> f64 {
    let Some(result) = results.get(&to) else {
        return node_probability;
    };
    if amount <= result.success_amount {
        return PREV_SUCCESS_PROBABILITY;
    }
    if result.fail_time == 0.0 || amount < result.fail_amount {
        return node_probability;
    }
    if result.fail_time > now {
        panic!(
            "pair result in the future: fail_time {} > now {}",
            result.fail_time, now
        );
    }
    node_probability * (1.0 - decay_weight(now - result.fail_time))
}

/// Probability that `amount` can be forwarded over the edge from `from` to
/// `to`, as estimated by `sender`'s learned results.
pub fn edge_probability(
    store: &ResultStore,
    sender: NodeId,
    from: NodeId,
    to: NodeId,
    amount: u64,
    now: SimTime,
) -> f64 {
    let Some(results) = store.node_results(from) else {
        return APRIORI_HOP_PROBABILITY;
    };
    let node_probability = if from == sender {
        PREV_SUCCESS_PROBABILITY
    } else {
        node_probability(results, amount, now)
    };
    // the specific pair is consulted for the maximum amount: only recorded
    // failures bias it, never the success fast path
    pair_probability(results, to, u64::MAX, node_probability, now)
}

fn probability_based_distance(weight: f64, probability: f64) -> u64 {
    if probability < MIN_PROBABILITY {
        return INF;
    }
    (weight + PAYMENT_ATTEMPT_PENALTY / probability) as u64
}

/// Fee plus the capital lock-up cost of the timelock.
fn edge_weight(amount: u64, fee: u64, timelock: u32) -> f64 {
    let timelock_penalty = amount as f64 * timelock as f64 * RISK_FACTOR as f64 / 1e9;
    timelock_penalty + fee as f64
}

/* dijkstra */

#[derive(Debug, Clone, Copy)]
struct Distance {
    distance: u64,
    amt_to_receive: u64,
    fee: u64,
    probability: f64,
    timelock: u32,
    weight: f64,
    next_edge: Option<EdgeId>,
}

impl Distance {
    fn reset() -> Self {
        Distance {
            distance: INF,
            amt_to_receive: 0,
            fee: 0,
            probability: 0.0,
            timelock: 0,
            weight: 0.0,
            next_edge: None,
        }
    }
}

struct Frontier {
    distance: u64,
    probability: f64,
    node: NodeId,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        // max-heap: best entry = lowest distance, then highest probability
        other
            .distance
            .cmp(&self.distance)
            .then(self.probability.total_cmp(&other.probability))
            .then(other.node.cmp(&self.node))
    }
}

// distance table + heap, reused across find_path calls on this thread
struct Scratch {
    distance: Vec<Distance>,
    heap: BinaryHeap<Frontier>,
}

thread_local! {
    static SCRATCH: RefCell<Scratch> = RefCell::new(Scratch {
        distance: Vec::new(),
        heap: BinaryHeap::new(),
    });
}

/// Reverse Dijkstra from `target` back to `source`.
pub fn dijkstra(
    network: &Network,
    source: NodeId,
    target: NodeId,
    last_hop: Option<NodeId>,
    amount: u64,
    results: &ResultStore,
    now: SimTime,
) -> Result<Vec<PathHop>, PathfindError> {
    let source_node = network.node(source);
    let (max_balance, total_balance) = network.balance_summary(source_node);
    if amount > total_balance {
        return Err(PathfindError::NoLocalBalance);
    }
    if amount > max_balance {
        return Err(PathfindError::NoPath);
    }

    SCRATCH.with(|scratch| {
        let mut scratch = scratch.borrow_mut();
        scratch.heap.clear();
        scratch.distance.clear();
        scratch
            .distance
            .resize(network.nodes.len(), Distance::reset());

        /* the search starts from the target, or from the last-hop hint when
        the payment carries one and a funded direct edge to the target
        exists */
        let mut search_target = target;
        let mut amt_to_receive = amount;
        let mut seed_timelock = FINAL_TIMELOCK;
        let mut seed_fee = 0;

        if let Some(hint) = last_hop {
            if hint as usize >= network.nodes.len() {
                return Err(PathfindError::NoPath);
            }
            let target_node = network.node(target);
            let mut seeded = false;
            for open_edge in &target_node.open_edges {
                let edge = network.counter_edge(network.edge(*open_edge));
                if edge.from != hint {
                    continue;
                }
                if edge.balance() < amount || amount < edge.policy.min_htlc {
                    return Err(PathfindError::NoLocalBalance);
                }
                seed_fee = edge.policy.fee(amount);
                seed_timelock = FINAL_TIMELOCK + edge.policy.timelock;
                amt_to_receive = amount + seed_fee;
                search_target = hint;
                scratch.distance[hint as usize].next_edge = Some(edge.id);
                seeded = true;
                // only the first channel to the hint is considered
                break;
            }
            if !seeded {
                return Err(PathfindError::NoPath);
            }
        }

        {
            let seed = &mut scratch.distance[search_target as usize];
            seed.distance = 0;
            seed.amt_to_receive = amt_to_receive;
            seed.fee = seed_fee;
            seed.timelock = seed_timelock;
            seed.weight = 0.0;
            seed.probability = 1.0;
        }
        scratch.heap.push(Frontier {
            distance: 0,
            probability: 1.0,
            node: search_target,
        });

        while let Some(best) = scratch.heap.pop() {
            let to_node_dist = scratch.distance[best.node as usize];
            // stale heap entry, a better relaxation has landed since
            if best.distance != to_node_dist.distance
                || best.probability != to_node_dist.probability
            {
                continue;
            }
            if best.node == source {
                break;
            }

            let amt_to_send = to_node_dist.amt_to_receive;
            let best_node = network.node(best.node);

            for open_edge in &best_node.open_edges {
                // the search walks edges in reverse
                let edge = network.counter_edge(network.edge(*open_edge));
                let from = edge.from;
                let channel = network.channel(edge.channel_id);

                if from != source && channel.is_private {
                    continue;
                }
                // the sender knows its own liquidity, elsewhere only the
                // channel capacity is public
                if from == source {
                    if edge.balance() < amt_to_send {
                        continue;
                    }
                } else if channel.capacity < amt_to_send {
                    continue;
                }
                if amt_to_send < edge.policy.min_htlc {
                    continue;
                }

                let probability =
                    edge_probability(results, source, from, best.node, amt_to_send, now);
                if probability == 0.0 {
                    continue;
                }

                let (fee, timelock) = if from == source {
                    (0, 0)
                } else {
                    (edge.policy.fee(amt_to_send), edge.policy.timelock)
                };
                let amt_to_receive = amt_to_send + fee;

                let tmp_timelock = to_node_dist.timelock + timelock;
                if tmp_timelock > TIMELOCK_LIMIT {
                    continue;
                }
                let tmp_probability = to_node_dist.probability * probability;
                if tmp_probability < PROBABILITY_LIMIT {
                    continue;
                }

                let tmp_weight = to_node_dist.weight + edge_weight(amt_to_receive, fee, timelock);
                let tmp_distance = probability_based_distance(tmp_weight, tmp_probability);

                let current = &scratch.distance[from as usize];
                if tmp_distance > current.distance {
                    continue;
                }
                if tmp_distance == current.distance && tmp_probability <= current.probability {
                    continue;
                }

                scratch.distance[from as usize] = Distance {
                    distance: tmp_distance,
                    amt_to_receive,
                    fee,
                    probability: tmp_probability,
                    timelock: tmp_timelock,
                    weight: tmp_weight,
                    next_edge: Some(edge.id),
                };
                scratch.heap.push(Frontier {
                    distance: tmp_distance,
                    probability: tmp_probability,
                    node: from,
                });
            }
        }

        let mut hops = Vec::new();
        let mut current = source;
        while current != target {
            let Some(next_edge) = scratch.distance[current as usize].next_edge else {
                return Err(PathfindError::NoPath);
            };
            let edge = network.edge(next_edge);
            hops.push(PathHop {
                sender: current,
                receiver: edge.to,
                edge: next_edge,
            });
            current = edge.to;
        }
        if hops.len() > HOPS_LIMIT {
            return Err(PathfindError::NoPath);
        }
        Ok(hops)
    })
}

/// Turn a path into a route by accumulating fees and timelocks right to
/// left: every hop must receive what the next hop forwards plus the fee of
/// the next edge, and locks for its own edge's timelock on top.
pub fn transform_path_into_route(
    path: &[PathHop],
    destination_amount: u64,
    network: &Network,
) -> Route {
    let mut route = Route {
        hops: vec![
            RouteHop {
                from: 0,
                to: 0,
                edge_id: 0,
                amount_to_forward: 0,
                timelock: 0,
            };
            path.len()
        ],
        total_amount: 0,
        total_fee: 0,
        total_timelock: 0,
    };

    let mut next_hop: Option<RouteHop> = None;
    let mut next_policy: Option<Policy> = None;
    for (i, path_hop) in path.iter().enumerate().rev() {
        let edge = network.edge(path_hop.edge);
        let hop = if let (Some(next), Some(next_policy)) = (next_hop, next_policy) {
            let fee = next_policy.fee(next.amount_to_forward);
            route.total_amount += fee;
            route.total_fee += fee;
            route.total_timelock += edge.policy.timelock;
            RouteHop {
                from: path_hop.sender,
                to: path_hop.receiver,
                edge_id: path_hop.edge,
                amount_to_forward: next.amount_to_forward + fee,
                timelock: next.timelock + edge.policy.timelock,
            }
        } else {
            route.total_amount += destination_amount;
            route.total_timelock += FINAL_TIMELOCK;
            RouteHop {
                from: path_hop.sender,
                to: path_hop.receiver,
                edge_id: path_hop.edge,
                amount_to_forward: destination_amount,
                timelock: FINAL_TIMELOCK,
            }
        };
        route.hops[i] = hop;
        next_hop = Some(hop);
        next_policy = Some(edge.policy);
    }
    route
}

/// Choose (or re-choose) a route for the payment. On the first attempt the
/// precomputed custodian paths are used when available; otherwise the
/// search runs in full. Routing failures mark the payment and end the
/// attempt; expiry ends the payment.
pub fn find_path(
    payment: &mut Payment,
    now: SimTime,
    network: &Network,
    results: &ResultStore,
    path_table: &PathTable,
    cfg: &SimConfig,
) -> Option<Vec<PathHop>> {
    payment.attempts += 1;

    if payment.is_expired(now, cfg.payments_expire_after_ms, cfg.block_time_ms) {
        payment.set_expired(now);
        return None;
    }

    let source = network.node(payment.sender);
    let destination = network.node(payment.receiver);

    let path = match (source.custodian, destination.custodian) {
        (Some(sender_custodian), Some(receiver_custodian))
            if cfg.use_known_paths && payment.attempts == 1 =>
        {
            let stored = path_table.get(&(sender_custodian, receiver_custodian));
            let mut path = Vec::with_capacity(stored.map_or(0, |hops| hops.len()) + 2);
            let first_edge = network.edge(source.open_edges[0]);
            path.push(PathHop {
                sender: payment.sender,
                receiver: sender_custodian,
                edge: first_edge.id,
            });
            if let Some(hops) = stored {
                path.extend(hops.iter().copied());
            }
            let last_edge = network.edge(destination.open_edges[0]);
            path.push(PathHop {
                sender: receiver_custodian,
                receiver: payment.receiver,
                edge: last_edge.counter_edge_id,
            });
            Some(path)
        }
        _ => match dijkstra(
            network,
            payment.sender,
            payment.receiver,
            payment.last_hop,
            payment.amount,
            results,
            now,
        ) {
            Ok(path) => Some(path),
            Err(error) => {
                debug!(
                    "payment {}: no route from {} to {} ({:?})",
                    payment.id, payment.sender, payment.receiver, error
                );
                None
            }
        },
    };

    if path.is_some() {
        return path;
    }

    if payment.has_no_error() {
        payment.error = Some(PaymentError {
            kind: PaymentErrorKind::NoCapacity,
            hop: None,
            time: now,
        });
    }
    payment.end_time = now;
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use plasma_common::network::{Channel, Edge, Node, NodeKind, Policy};

    fn policy(fee_base: u64, fee_proportional: u64, timelock: u32) -> Policy {
        Policy {
            fee_base,
            fee_proportional,
            min_htlc: 1,
            timelock,
        }
    }

    /// A line topology 0 - 1 - 2 - ... with the given balances on the
    /// forward side and symmetric policies.
    fn line_network(balances: &[u64], policies: &[Policy]) -> Network {
        let mut network = Network::default();
        let n = balances.len() + 1;
        for id in 0..n as NodeId {
            network.nodes.push(Node {
                id,
                label: format!("Intermediary-IT-{}", id),
                kind: NodeKind::Intermediary,
                country: plasma_common::network::Country::IT,
                partition: 0,
                custodian: None,
                open_edges: Vec::new(),
            });
        }
        for (i, (&balance, policy)) in balances.iter().zip(policies).enumerate() {
            let channel_id = i as u64;
            let forward = (2 * i) as u64;
            let backward = forward + 1;
            let from = i as NodeId;
            let to = (i + 1) as NodeId;
            network.channels.push(Channel {
                id: channel_id,
                node1: from,
                node2: to,
                edge1: forward,
                edge2: backward,
                capacity: balance,
                is_private: false,
            });
            network
                .edges
                .push(Edge::new(forward, channel_id, backward, from, to, balance, *policy));
            network
                .edges
                .push(Edge::new(backward, channel_id, forward, to, from, 0, *policy));
            network.nodes[i].open_edges.push(forward);
            network.nodes[i + 1].open_edges.push(backward);
        }
        network
    }

    #[test]
    fn test_direct_route() {
        let network = line_network(&[10_000], &[policy(1000, 10, 10)]);
        let store = ResultStore::new();
        let path = dijkstra(&network, 0, 1, None, 1000, &store, 1000.0).unwrap();
        assert_eq!(path.len(), 1);
        assert_eq!(path[0].edge, 0);

        let route = transform_path_into_route(&path, 1000, &network);
        assert_eq!(route.hops[0].amount_to_forward, 1000);
        assert_eq!(route.hops[0].timelock, FINAL_TIMELOCK);
        assert_eq!(route.total_fee, 0);
    }

    #[test]
    fn test_two_hop_route_fees_and_timelocks() {
        let network = line_network(
            &[100_000, 100_000],
            &[policy(1000, 10, 10), policy(500, 20, 20)],
        );
        let store = ResultStore::new();
        let path = dijkstra(&network, 0, 2, None, 1000, &store, 1000.0).unwrap();
        assert_eq!(path.len(), 2);

        let route = transform_path_into_route(&path, 1000, &network);
        // the fee of the second edge is paid by the first hop
        let expected_fee = 500 + (20 * 1000) / 1_000_000;
        assert_eq!(route.hops[1].amount_to_forward, 1000);
        assert_eq!(route.hops[0].amount_to_forward, 1000 + expected_fee);
        assert_eq!(route.total_fee, expected_fee);
        // each hop adds its own edge's timelock on top of the next hop
        assert_eq!(route.hops[1].timelock, FINAL_TIMELOCK);
        assert_eq!(route.hops[0].timelock, FINAL_TIMELOCK + 10);
        assert_eq!(route.total_timelock, FINAL_TIMELOCK + 10);
    }

    #[test]
    fn test_route_well_formedness() {
        let policies = [
            policy(1000, 10, 10),
            policy(200, 5, 15),
            policy(700, 50, 30),
            policy(90, 3, 25),
        ];
        let network = line_network(&[1_000_000; 4], &policies);
        let store = ResultStore::new();
        let path = dijkstra(&network, 0, 4, None, 5000, &store, 1000.0).unwrap();
        let route = transform_path_into_route(&path, 5000, &network);

        assert!(route.hops.len() <= HOPS_LIMIT);
        assert!(route.total_timelock <= TIMELOCK_LIMIT);
        for window in route.hops.windows(2) {
            let (hop, next) = (&window[0], &window[1]);
            let next_edge = network.edge(next.edge_id);
            assert_eq!(
                hop.amount_to_forward,
                next.amount_to_forward + next_edge.policy.fee(next.amount_to_forward)
            );
            let own_edge = network.edge(hop.edge_id);
            assert_eq!(hop.timelock, next.timelock + own_edge.policy.timelock);
            assert!(hop.amount_to_forward >= own_edge.policy.min_htlc);
        }
    }

    #[test]
    fn test_no_local_balance_and_no_path() {
        let network = line_network(&[500], &[policy(0, 0, 10)]);
        let store = ResultStore::new();
        assert_eq!(
            dijkstra(&network, 0, 1, None, 501, &store, 0.0).unwrap_err(),
            PathfindError::NoLocalBalance
        );

        // receiver side has zero balance, no path back
        assert_eq!(
            dijkstra(&network, 1, 0, None, 100, &store, 0.0).unwrap_err(),
            PathfindError::NoLocalBalance
        );
    }

    #[test]
    fn test_private_channel_excluded_unless_sender_owns_it() {
        let mut network = line_network(
            &[100_000, 100_000],
            &[policy(0, 0, 10), policy(0, 0, 10)],
        );
        let store = ResultStore::new();
        network.channels[1].is_private = true;
        // node 1 owns the private edge and may use it
        assert!(dijkstra(&network, 1, 2, None, 100, &store, 0.0).is_ok());
        // node 0 must route through it as a foreign hop: excluded
        assert_eq!(
            dijkstra(&network, 0, 2, None, 100, &store, 0.0).unwrap_err(),
            PathfindError::NoPath
        );
    }

    #[test]
    fn test_last_hop_hint() {
        let network = line_network(
            &[100_000, 100_000, 100_000],
            &[policy(0, 0, 10), policy(100, 0, 20), policy(300, 0, 30)],
        );
        let store = ResultStore::new();
        // hint = node 2, which has a direct funded edge to the target 3...
        let path = dijkstra(&network, 0, 3, Some(2), 1000, &store, 0.0).unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(path[2].edge, 4);

        // ...but node 0 has no direct channel to 3
        assert_eq!(
            dijkstra(&network, 0, 3, Some(0), 1000, &store, 0.0).unwrap_err(),
            PathfindError::NoPath
        );
    }

    #[test]
    fn test_hops_limit() {
        let balances = vec![1_000_000u64; HOPS_LIMIT + 1];
        let policies = vec![policy(0, 0, 1); HOPS_LIMIT + 1];
        let network = line_network(&balances, &policies);

        // enough learned successes that long paths survive the cumulative
        // probability pruning and actually hit the hop limit
        let mut store = ResultStore::new();
        for from in 0..(HOPS_LIMIT + 2) as NodeId {
            for peer in 0..10 {
                store.set_success(from, 10_000 + peer, 1_000_000, 1.0);
            }
        }

        assert_eq!(
            dijkstra(
                &network,
                0,
                (HOPS_LIMIT + 1) as NodeId,
                None,
                100,
                &store,
                10.0
            )
            .unwrap_err(),
            PathfindError::NoPath
        );
        assert!(dijkstra(&network, 0, HOPS_LIMIT as NodeId, None, 100, &store, 10.0).is_ok());
    }

    #[test]
    fn test_probability_learning_bias() {
        let now = 3_600_000.0;
        let mut store = ResultStore::new();
        // an untouched node pair starts at the a-priori value
        assert_eq!(edge_probability(&store, 9, 1, 2, 500, now), APRIORI_HOP_PROBABILITY);

        // a fresh failure on (1, 2) drives the pair's probability down
        store.set_fail(1, 2, 400, now - 1000.0, 60_000.0);
        let failed = edge_probability(&store, 9, 1, 2, 500, now);
        assert!(failed < 0.1, "fresh failure should crush the probability, got {}", failed);

        // the penalty decays over time
        let mut decayed_store = ResultStore::new();
        decayed_store.set_fail(1, 2, 400, 1000.0, 60_000.0);
        let decayed = edge_probability(&decayed_store, 9, 1, 2, 500, 1000.0 + 43_200_000.0);
        assert!(decayed > failed);

        // sender's own edges are trusted
        assert_eq!(edge_probability(&store, 1, 1, 3, 500, now), PREV_SUCCESS_PROBABILITY);
    }

    #[test]
    fn test_probability_monotonicity() {
        let now = 7_200_000.0;
        let amount = 500;

        let mut store = ResultStore::new();
        store.set_success(1, 2, 400, now - 1000.0);
        let base = edge_probability(&store, 9, 1, 2, amount, now);

        // a later success for a larger amount cannot lower the estimate
        store.set_success(1, 3, 600, now - 500.0);
        let with_more_success = edge_probability(&store, 9, 1, 2, amount, now);
        assert!(with_more_success >= base);

        // a failure at or below the successful amount lowers it
        store.set_fail(1, 2, 300, now - 100.0, 60_000.0);
        let with_fail = edge_probability(&store, 9, 1, 2, amount, now);
        assert!(with_fail < with_more_success);
    }

    #[test]
    fn test_find_path_expiry_and_no_capacity() {
        let network = line_network(&[10_000], &[policy(0, 0, 10)]);
        let store = ResultStore::new();
        let table = PathTable::new();
        let cfg = crate::config::test_config();

        let mut payment = Payment::new(0, 1, 100, 0.0, plasma_common::payments::PaymentKind::Tx);
        payment.start_time = 0.0;
        assert!(find_path(&mut payment, 20_000.0, &network, &store, &table, &cfg).is_none());
        assert!(payment.is_timeout);
        assert_eq!(payment.end_time, 20_000.0);

        // an unroutable amount is terminal for the attempt with no-capacity
        let mut payment = Payment::new(0, 1, 50_000, 1.0, plasma_common::payments::PaymentKind::Tx);
        assert!(find_path(&mut payment, 10.0, &network, &store, &table, &cfg).is_none());
        assert_eq!(
            payment.error.as_ref().unwrap().kind,
            PaymentErrorKind::NoCapacity
        );
        assert_eq!(payment.end_time, 10.0);
        assert_eq!(payment.attempts, 1);
    }

    #[test]
    fn test_known_paths_used_on_first_attempt() {
        // 0 (user) - 1 (custodian) - 2 (custodian) - 3 (user)
        let mut network = line_network(
            &[100_000, 100_000, 100_000],
            &[policy(0, 0, 10), policy(0, 0, 10), policy(0, 0, 10)],
        );
        network.nodes[0].kind = NodeKind::EndUser;
        network.nodes[0].custodian = Some(1);
        network.nodes[3].kind = NodeKind::EndUser;
        network.nodes[3].custodian = Some(2);

        let mut table = PathTable::new();
        table.insert(
            (1, 2),
            vec![PathHop {
                sender: 1,
                receiver: 2,
                edge: 2,
            }],
        );
        let store = ResultStore::new();
        let mut cfg = crate::config::test_config();
        cfg.use_known_paths = true;

        let mut payment = Payment::new(0, 3, 100, 1.0, plasma_common::payments::PaymentKind::Tx);
        let path = find_path(&mut payment, 10.0, &network, &store, &table, &cfg).unwrap();
        let edges: Vec<EdgeId> = path.iter().map(|hop| hop.edge).collect();
        // the stored edge sequence wrapped by the two custodian hops
        assert_eq!(edges, vec![0, 2, 4]);

        // second attempt falls back to the full search
        let path = find_path(&mut payment, 20.0, &network, &store, &table, &cfg).unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(payment.attempts, 2);
    }
}
