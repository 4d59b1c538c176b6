use std::{fs, path::Path, str::FromStr, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use fern::colors::{Color, ColoredLevelConfig};
use log::{debug, info};

use plasma_kernel::{Executor, ExecutorConfig};
use plasma_simulator::{
    config::{CliArgs, SimConfig},
    load::{load_network, load_path_table, load_tps_schedule, NodeIndex, PathTable},
    output::write_outputs,
    sim::{build_lps, sweep_pending_payments},
};

fn setup_logger(level: &str) -> Result<()> {
    let level = log::LevelFilter::from_str(level)
        .with_context(|| format!("invalid log level {:?}", level))?;
    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Magenta)
        .trace(Color::BrightBlack);
    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} [{}] [{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()?;
    Ok(())
}

fn main() -> Result<()> {
    let args = CliArgs::parse();
    setup_logger(&args.log_level)?;

    let cfg = SimConfig::from_args(&args);
    cfg.validate()?;
    debug!("resolved config: {}", serde_json::to_string(&cfg)?);

    if args.tps_cfg.is_none() {
        info!("tps: {} network-wide transactions per second", cfg.tps);
    } else {
        info!("tps-cfg: {}", args.tps_cfg.as_deref().unwrap_or_default());
    }
    info!("input-dir: {}", args.input_dir);
    info!("output-dir: {}", args.output_dir);

    if args.sequential {
        info!("sequential run: all nodes forced onto partition 0");
    }

    let input_dir = Path::new(&args.input_dir);
    let network = Arc::new(
        load_network(input_dir, args.sequential)
            .with_context(|| format!("loading the topology from {}", args.input_dir))?,
    );
    let index = Arc::new(NodeIndex::build(&network));
    let paths = Arc::new(if cfg.use_known_paths {
        load_path_table(input_dir, &network).context("loading the known paths")?
    } else {
        PathTable::new()
    });
    let rates = Arc::new(
        load_tps_schedule(
            args.tps_cfg.as_deref().map(Path::new),
            cfg.tps,
            index.num_end_users,
        )
        .context("loading the tps profile")?,
    );

    info!(
        "simulating {} nodes ({} end users) for {} ms",
        network.nodes.len(),
        index.num_end_users,
        cfg.duration_ms
    );

    let cfg = Arc::new(cfg);
    let lps = build_lps(&network, &index, &paths, &rates, &cfg);
    let executor = Executor::new(
        ExecutorConfig {
            end_time: cfg.duration_ms,
            seed: args.seed,
            gvt_interval: args.gvt_interval,
        },
        lps,
    );

    let run = executor.run();
    let (mut lps, mut journals) = (run.lps, run.journals);

    let generator_rollbacks: u64 = lps
        .iter()
        .filter_map(|lp| match lp {
            plasma_simulator::sim::SimLp::Node(node) => Some(node.rollback_count),
            _ => None,
        })
        .sum();
    debug!("{} node events were rolled back in the generators", generator_rollbacks);

    sweep_pending_payments(&mut lps, &mut journals, &network, &cfg, cfg.duration_ms);

    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating the output directory {}", args.output_dir))?;
    write_outputs(Path::new(&args.output_dir), &network, &lps, &journals)
        .context("writing the simulation results")?;

    let completed: usize = journals.iter().map(|journal| journal.payments.len()).sum();
    info!(
        "done: {} payments recorded, {} events committed, {} rollbacks",
        completed, run.stats.committed, run.stats.rollbacks
    );
    Ok(())
}
