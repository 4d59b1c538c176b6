use crate::SimTime;

// Routing constants, taken from the lnd pathfinding model
// (lnd-v0.10.0-beta, routing/pathfind.go)
pub const RISK_FACTOR: u64 = 15;
pub const PAYMENT_ATTEMPT_PENALTY: f64 = 100_000.0;
pub const APRIORI_WEIGHT: f64 = 0.5;
pub const APRIORI_HOP_PROBABILITY: f64 = 0.6;
pub const PREV_SUCCESS_PROBABILITY: f64 = 0.95;
// Half life of the time-decayed failure penalty
pub const PENALTY_HALF_LIFE_HOURS: f64 = 1.0;
// Paths whose cumulative success probability falls below this are pruned
pub const PROBABILITY_LIMIT: f64 = 0.01;
// Below this probability an edge is considered unusable
pub const MIN_PROBABILITY: f64 = 1e-5;
pub const HOPS_LIMIT: usize = 27;
pub const FINAL_TIMELOCK: u32 = 40;
pub const TIMELOCK_LIMIT: u32 = 2016 + FINAL_TIMELOCK;

// 3 seconds waiting for a node not responding (tcp default retransmission time)
pub const OFFLINE_LATENCY_MS: SimTime = 3000.0;
// The time it takes for a node to find a route
pub const ROUTING_LATENCY_MS: SimTime = 500.0;
// Delay for events a node schedules to itself (deserialize + bookkeeping)
pub const LOCAL_EVENT_DELAY_MS: SimTime = 10.0;

// Network propagation delay, gamma distributed (shape, scale), in ms
pub const DELAY_GAMMA_ALPHA: f64 = 6.40;
pub const DELAY_GAMMA_BETA: f64 = 4.35;

// A new failure for a node pair with a larger amount is dropped when it
// lands inside this window after the previous one
pub const DEFAULT_FAIL_SUPPRESSION_WINDOW_MS: SimTime = 60_000.0;
pub const DEFAULT_PAYMENTS_EXPIRE_AFTER_MS: SimTime = 10_000.0;
// Submarine swap payments expire after this many block times
pub const SWAP_EXPIRY_BLOCK_TIMES: f64 = 10.0;

// Payment ids are sender * FACTOR + start_time_ms, so both the node count
// and the simulated duration must stay below ID_SPACE_LIMIT
pub const PAYMENT_ID_SENDER_FACTOR: u64 = 1_000_000_000;
pub const ID_SPACE_LIMIT: f64 = 1e10;

// Reverse waterfall: withdraw at least up to this base wallet amount
pub const BASE_WALLET_AMOUNT: u64 = 25_000;
// Maximum delay before retrying to generate while a withdrawal is pending
pub const RETRY_GENERATE_MAX_OFFSET_MS: SimTime = 1000.0;

// The tps schedule divides the simulated duration in this many windows
pub const TPS_WINDOWS: usize = 96;

pub const CROSS_BORDER_PROBABILITY: f64 = 0.05;

// Blockchain defaults
pub const DEFAULT_BLOCK_SIZE: u32 = 4;
pub const DEFAULT_BLOCK_TIME_MS: SimTime = 60_000.0;
// Congestion is accounted over windows of this many blocks
pub const BLOCK_CONGESTION_PERIOD: usize = 100;
