use indexmap::IndexMap;

use crate::{NodeId, SimTime};

/// The most recent payment outcome observed over the edge connecting a node
/// pair. A sender keeps one per (from, to) pair it has learned about and
/// biases its future routing with them.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PairResult {
    pub success_time: SimTime,
    pub success_amount: u64,
    pub fail_time: SimTime,
    pub fail_amount: u64,
}

/// Learned node-pair results, owned exclusively by one sender LP.
/// Updates happen only in commit handlers, so the store never has to be
/// rolled back.
#[derive(Debug, Default)]
pub struct ResultStore {
    by_node: IndexMap<NodeId, IndexMap<NodeId, PairResult>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Results keyed by destination for everything learned about `from`.
    pub fn node_results(&self, from: NodeId) -> Option<&IndexMap<NodeId, PairResult>> {
        self.by_node.get(&from)
    }

    pub fn get(&self, from: NodeId, to: NodeId) -> Option<&PairResult> {
        self.by_node.get(&from)?.get(&to)
    }

    /// Record that `amount` was successfully forwarded from `from` to `to`.
    pub fn set_success(&mut self, from: NodeId, to: NodeId, amount: u64, time: SimTime) {
        let result = self
            .by_node
            .entry(from)
            .or_default()
            .entry(to)
            .or_default();

        result.success_time = time;
        if amount > result.success_amount {
            result.success_amount = amount;
        }
        if result.fail_time != 0.0 && result.success_amount > result.fail_amount {
            result.fail_amount = amount + 1;
        }
    }

    /// Record a failure of `amount` from `from` to `to`. A failure for a
    /// larger amount arriving within `suppression_window_ms` of the previous
    /// one is dropped (correlated failure storms carry no new information).
    /// A zero amount means the node is unreachable at any amount.
    pub fn set_fail(
        &mut self,
        from: NodeId,
        to: NodeId,
        amount: u64,
        time: SimTime,
        suppression_window_ms: SimTime,
    ) {
        let results = self.by_node.entry(from).or_default();
        if let Some(result) = results.get(&to) {
            if amount > result.fail_amount && time - result.fail_time < suppression_window_ms {
                return;
            }
        }
        let result = results.entry(to).or_default();

        result.fail_amount = amount;
        result.fail_time = time;
        if amount == 0 {
            result.success_amount = 0;
        } else if amount <= result.success_amount {
            result.success_amount = amount - 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: SimTime = 60_000.0;

    #[test]
    fn test_success_raises_amount_monotonically() {
        let mut store = ResultStore::new();
        store.set_success(1, 2, 500, 10.0);
        store.set_success(1, 2, 300, 20.0);
        let result = store.get(1, 2).unwrap();
        // a smaller later success does not lower the known good amount
        assert_eq!(result.success_amount, 500);
        assert_eq!(result.success_time, 20.0);
    }

    #[test]
    fn test_success_never_exceeds_fail_minus_one() {
        let mut store = ResultStore::new();
        store.set_fail(1, 2, 400, 10.0, WINDOW);
        store.set_success(1, 2, 600, 70_000.0);
        let result = store.get(1, 2).unwrap();
        assert_eq!(result.success_amount, 600);
        assert_eq!(result.fail_amount, 601);
    }

    #[test]
    fn test_fail_clamps_success_amount() {
        let mut store = ResultStore::new();
        store.set_success(1, 2, 500, 10.0);
        store.set_fail(1, 2, 300, 20.0, WINDOW);
        let result = store.get(1, 2).unwrap();
        assert_eq!(result.fail_amount, 300);
        assert_eq!(result.success_amount, 299);
    }

    #[test]
    fn test_fail_zero_clears_success() {
        let mut store = ResultStore::new();
        store.set_success(1, 2, 500, 10.0);
        store.set_fail(1, 2, 0, 20.0, WINDOW);
        let result = store.get(1, 2).unwrap();
        assert_eq!(result.success_amount, 0);
    }

    #[test]
    fn test_larger_fail_suppressed_inside_window() {
        let mut store = ResultStore::new();
        store.set_fail(1, 2, 100, 10.0, WINDOW);
        // larger amount, within the window: dropped
        store.set_fail(1, 2, 900, 30_000.0, WINDOW);
        assert_eq!(store.get(1, 2).unwrap().fail_amount, 100);
        // same again outside the window: recorded
        store.set_fail(1, 2, 900, 80_000.0, WINDOW);
        assert_eq!(store.get(1, 2).unwrap().fail_amount, 900);
        // smaller amounts always pass
        store.set_fail(1, 2, 50, 80_100.0, WINDOW);
        assert_eq!(store.get(1, 2).unwrap().fail_amount, 50);
    }
}
