use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use plasma_common::{config::ID_SPACE_LIMIT, SimTime};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("submarine-swap-threshold must be in (0.5, 1], is: {0}")]
    InvalidSwapThreshold(f64),

    #[error("block-congestion-rate must be in [0.0, 1.0], is: {0}")]
    InvalidCongestionRate(f64),

    #[error("duration of {0} ms exceeds the payment id space (1e10 ms)")]
    DurationTooLong(SimTime),

    #[error("block-size must be positive")]
    ZeroBlockSize,
}

/// Command line interface of the simulator.
#[derive(Debug, Clone, Parser)]
#[command(name = "plasma-sim", version, about = "Tiered payment-channel network simulator")]
pub struct CliArgs {
    /// Input directory with topologies
    #[clap(long, default_value_t = String::from("./data_in"))]
    pub input_dir: String,

    /// Output directory to store the simulation results
    #[clap(long, default_value_t = String::from("./data_out"))]
    pub output_dir: String,

    /// Read known paths from the input directory. If not, paths are
    /// calculated during the simulation time
    #[clap(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub use_known_paths: bool,

    /// Global network-wide transactions per second to generate
    #[clap(long, default_value_t = 20)]
    pub tps: u32,

    /// Configuration file for shaping the transaction generator.
    /// If given, overrides --tps
    #[clap(long)]
    pub tps_cfg: Option<String>,

    /// Enables automatic deposits to custodians
    #[clap(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub waterfall: bool,

    /// Enables automatic withdrawals from custodians
    #[clap(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub reverse_waterfall: bool,

    /// Enables liquidity swaps between intermediaries
    #[clap(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub submarine_swaps: bool,

    /// The balance threshold that triggers a submarine swap, as a fraction
    /// of the channel capacity
    #[clap(long, default_value_t = 0.9)]
    pub submarine_swap_threshold: f64,

    /// The maximum number of transactions included in a block
    #[clap(long, default_value_t = 4)]
    pub block_size: u32,

    /// The blockchain block time in ms
    #[clap(long, default_value_t = 60_000)]
    pub block_time: u64,

    /// The block congestion rate, where 0.0 means empty blocks and 1.0
    /// means full blocks
    #[clap(long, default_value_t = 0.0)]
    pub block_congestion_rate: f64,

    /// Simulated duration in ms
    #[clap(long, default_value_t = 86_400_000)]
    pub duration: u64,

    /// Master seed of the per-LP random streams
    #[clap(long, default_value_t = 42)]
    pub seed: u64,

    /// Force a sequential simulation: every node runs on partition 0
    #[clap(long)]
    pub sequential: bool,

    /// Events processed per partition between GVT rounds
    #[clap(long, default_value_t = 1024)]
    pub gvt_interval: usize,

    /// Payment timeout in ms
    #[clap(long, default_value_t = 10_000)]
    pub payments_expire_after: u64,

    /// Window under which a repeated failure for a larger amount carries
    /// no new routing information
    #[clap(long, default_value_t = 60_000)]
    pub fail_suppression_window: u64,

    /// Log level (off, error, warn, info, debug, trace)
    #[clap(long, default_value_t = String::from("info"))]
    pub log_level: String,
}

/// Resolved simulation parameters, shared immutably with every LP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub use_known_paths: bool,
    pub tps: u32,
    pub waterfall: bool,
    pub reverse_waterfall: bool,
    pub submarine_swaps: bool,
    pub submarine_swap_threshold: f64,
    pub block_size: u32,
    pub block_time_ms: SimTime,
    pub block_congestion_rate: f64,
    pub duration_ms: SimTime,
    pub payments_expire_after_ms: SimTime,
    pub fail_suppression_window_ms: SimTime,
}

impl SimConfig {
    pub fn from_args(args: &CliArgs) -> Self {
        SimConfig {
            use_known_paths: args.use_known_paths,
            tps: args.tps,
            waterfall: args.waterfall,
            reverse_waterfall: args.reverse_waterfall,
            submarine_swaps: args.submarine_swaps,
            submarine_swap_threshold: args.submarine_swap_threshold,
            block_size: args.block_size,
            block_time_ms: args.block_time as SimTime,
            block_congestion_rate: args.block_congestion_rate,
            duration_ms: args.duration as SimTime,
            payments_expire_after_ms: args.payments_expire_after as SimTime,
            fail_suppression_window_ms: args.fail_suppression_window as SimTime,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.submarine_swap_threshold <= 0.5 || self.submarine_swap_threshold > 1.0 {
            return Err(ConfigError::InvalidSwapThreshold(self.submarine_swap_threshold));
        }
        if !(0.0..=1.0).contains(&self.block_congestion_rate) {
            return Err(ConfigError::InvalidCongestionRate(self.block_congestion_rate));
        }
        if self.duration_ms >= ID_SPACE_LIMIT {
            return Err(ConfigError::DurationTooLong(self.duration_ms));
        }
        if self.block_size == 0 {
            return Err(ConfigError::ZeroBlockSize);
        }
        Ok(())
    }
}

#[cfg(test)]
pub fn test_config() -> SimConfig {
    SimConfig {
        use_known_paths: false,
        tps: 0,
        waterfall: true,
        reverse_waterfall: true,
        submarine_swaps: true,
        submarine_swap_threshold: 0.9,
        block_size: 4,
        block_time_ms: 60_000.0,
        block_congestion_rate: 0.0,
        duration_ms: 60_000.0,
        payments_expire_after_ms: 10_000.0,
        fail_suppression_window_ms: 60_000.0,
    }
}
