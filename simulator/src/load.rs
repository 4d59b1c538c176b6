use std::{
    fs,
    path::Path,
    str::FromStr,
};

use indexmap::IndexMap;
use log::{debug, warn};
use thiserror::Error;

use plasma_common::{
    config::TPS_WINDOWS,
    network::{Channel, Country, Edge, Network, Node, NodeKind, Policy, NUM_COUNTRIES},
    NodeId,
};

use crate::routing::PathHop;

pub const NODES_FILE: &str = "plasma_network_nodes.csv";
pub const CHANNELS_FILE: &str = "plasma_network_channels.csv";
pub const EDGES_FILE: &str = "plasma_network_edges.csv";
pub const PATHS_FILE: &str = "plasma_paths.csv";

/// Precomputed paths between custodian pairs, keyed (source, target).
pub type PathTable = IndexMap<(NodeId, NodeId), Vec<PathHop>>;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read {file}: {source}")]
    Io {
        file: String,
        source: std::io::Error,
    },

    #[error("{file}:{line}: {reason}")]
    Malformed {
        file: String,
        line: usize,
        reason: String,
    },

    #[error("user {0} has wallet cap = 0")]
    ZeroWalletCap(NodeId),

    #[error("the number of nodes ({0}) exceeds the payment id space")]
    TooManyNodes(usize),
}

fn read_to_string(path: &Path) -> Result<String, LoadError> {
    fs::read_to_string(path).map_err(|source| LoadError::Io {
        file: path.display().to_string(),
        source,
    })
}

fn malformed(file: &Path, line: usize, reason: impl Into<String>) -> LoadError {
    LoadError::Malformed {
        file: file.display().to_string(),
        line,
        reason: reason.into(),
    }
}

fn parse_field<T: FromStr>(
    file: &Path,
    line: usize,
    fields: &[&str],
    index: usize,
    name: &str,
) -> Result<T, LoadError> {
    let raw = fields
        .get(index)
        .ok_or_else(|| malformed(file, line, format!("missing column {}", name)))?;
    raw.trim()
        .parse::<T>()
        .map_err(|_| malformed(file, line, format!("invalid {}: {:?}", name, raw)))
}

/// Load the network topology from the three csv files of `input_dir`.
/// When `force_single_partition` is set every node is mapped to
/// partition 0 (sequential execution).
pub fn load_network(input_dir: &Path, force_single_partition: bool) -> Result<Network, LoadError> {
    let mut network = Network::default();

    let nodes_path = input_dir.join(NODES_FILE);
    for (line_no, line) in read_to_string(&nodes_path)?.lines().enumerate().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        let id: NodeId = parse_field(&nodes_path, line_no, &fields, 0, "id")?;
        let label = fields
            .get(1)
            .ok_or_else(|| malformed(&nodes_path, line_no, "missing column label"))?
            .trim()
            .to_string();
        let country: Country = parse_field(&nodes_path, line_no, &fields, 2, "country")?;
        let partition: usize = parse_field(&nodes_path, line_no, &fields, 3, "partition")?;
        let custodian: i64 = parse_field(&nodes_path, line_no, &fields, 4, "intermediary")?;

        if id as usize != network.nodes.len() {
            return Err(malformed(
                &nodes_path,
                line_no,
                format!("node ids must be dense and ordered, got {}", id),
            ));
        }
        let kind = NodeKind::from_label(&label)
            .ok_or_else(|| malformed(&nodes_path, line_no, format!("node type not recognized: {}", label)))?;
        network.nodes.push(Node {
            id,
            label,
            kind,
            country,
            partition: if force_single_partition { 0 } else { partition },
            custodian: if custodian < 0 { None } else { Some(custodian as NodeId) },
            open_edges: Vec::new(),
        });
    }

    if network.nodes.len() as f64 >= plasma_common::config::ID_SPACE_LIMIT {
        return Err(LoadError::TooManyNodes(network.nodes.len()));
    }

    let channels_path = input_dir.join(CHANNELS_FILE);
    for (line_no, line) in read_to_string(&channels_path)?.lines().enumerate().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        let id = parse_field(&channels_path, line_no, &fields, 0, "id")?;
        if id as usize != network.channels.len() {
            return Err(malformed(
                &channels_path,
                line_no,
                format!("channel ids must be dense and ordered, got {}", id),
            ));
        }
        network.channels.push(Channel {
            id,
            edge1: parse_field(&channels_path, line_no, &fields, 1, "edge1")?,
            edge2: parse_field(&channels_path, line_no, &fields, 2, "edge2")?,
            node1: parse_field(&channels_path, line_no, &fields, 3, "node1")?,
            node2: parse_field(&channels_path, line_no, &fields, 4, "node2")?,
            capacity: parse_field(&channels_path, line_no, &fields, 5, "capacity")?,
            is_private: parse_field::<u8>(&channels_path, line_no, &fields, 6, "is_private")? != 0,
        });
    }

    let edges_path = input_dir.join(EDGES_FILE);
    for (line_no, line) in read_to_string(&edges_path)?.lines().enumerate().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        let id = parse_field(&edges_path, line_no, &fields, 0, "id")?;
        if id as usize != network.edges.len() {
            return Err(malformed(
                &edges_path,
                line_no,
                format!("edge ids must be dense and ordered, got {}", id),
            ));
        }
        let channel_id = parse_field(&edges_path, line_no, &fields, 1, "channel_id")?;
        let counter_edge_id = parse_field(&edges_path, line_no, &fields, 2, "counter_edge_id")?;
        let from: NodeId = parse_field(&edges_path, line_no, &fields, 3, "from")?;
        let to: NodeId = parse_field(&edges_path, line_no, &fields, 4, "to")?;
        let balance = parse_field(&edges_path, line_no, &fields, 5, "balance")?;
        let policy = Policy {
            fee_base: parse_field(&edges_path, line_no, &fields, 6, "fee_base")?,
            fee_proportional: parse_field(&edges_path, line_no, &fields, 7, "fee_proportional")?,
            min_htlc: parse_field(&edges_path, line_no, &fields, 8, "min_htlc")?,
            timelock: parse_field(&edges_path, line_no, &fields, 9, "timelock")?,
        };
        if from as usize >= network.nodes.len() || to as usize >= network.nodes.len() {
            return Err(malformed(&edges_path, line_no, "edge endpoint out of range"));
        }
        network
            .edges
            .push(Edge::new(id, channel_id, counter_edge_id, from, to, balance, policy));
        network.nodes[from as usize].open_edges.push(id);
    }

    for node in &network.nodes {
        if node.kind == NodeKind::EndUser && network.wallet_cap(node) == 0 {
            return Err(LoadError::ZeroWalletCap(node.id));
        }
    }

    debug!(
        "loaded network: {} nodes, {} channels, {} edges",
        network.nodes.len(),
        network.channels.len(),
        network.edges.len()
    );
    Ok(network)
}

/// Load the precomputed custodian-to-custodian paths. Each row is
/// `src,target,"[edge_id,edge_id,...]"`.
pub fn load_path_table(input_dir: &Path, network: &Network) -> Result<PathTable, LoadError> {
    let paths_path = input_dir.join(PATHS_FILE);
    let mut table = PathTable::new();
    for (line_no, line) in read_to_string(&paths_path)?.lines().enumerate().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let mut fields = line.splitn(3, ',');
        let src: NodeId = fields
            .next()
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(|| malformed(&paths_path, line_no, "invalid src"))?;
        let target: NodeId = fields
            .next()
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(|| malformed(&paths_path, line_no, "invalid target"))?;
        let raw_path = fields
            .next()
            .ok_or_else(|| malformed(&paths_path, line_no, "missing path column"))?;

        let mut hops = Vec::new();
        let cleaned = raw_path.trim().trim_matches('"');
        let cleaned = cleaned
            .trim_start_matches('[')
            .trim_end_matches(']');
        for token in cleaned.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            let edge_id = token
                .parse()
                .map_err(|_| malformed(&paths_path, line_no, format!("invalid edge id: {:?}", token)))?;
            if edge_id as usize >= network.edges.len() {
                return Err(malformed(&paths_path, line_no, "path edge out of range"));
            }
            let edge = network.edge(edge_id);
            hops.push(PathHop {
                sender: edge.from,
                receiver: edge.to,
                edge: edge_id,
            });
        }
        table.insert((src, target), hops);
    }
    debug!("loaded {} known paths", table.len());
    Ok(table)
}

/// The per-user payment rate for each of the 96 windows of the simulation.
/// Either a constant from `tps`, or read from a profile file with one rate
/// per line (`#` comments allowed); short files keep their last value.
pub fn load_tps_schedule(
    tps_cfg: Option<&Path>,
    tps: u32,
    num_end_users: usize,
) -> Result<[f64; TPS_WINDOWS], LoadError> {
    let mut rates = [0.0; TPS_WINDOWS];
    if num_end_users == 0 {
        warn!("no end users in the topology, the load generator is off");
        return Ok(rates);
    }

    let Some(path) = tps_cfg else {
        let rate = tps as f64 / num_end_users as f64;
        rates = [rate; TPS_WINDOWS];
        return Ok(rates);
    };

    let mut count = 0;
    for (line_no, line) in read_to_string(path)?.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let value: u32 = line
            .parse()
            .map_err(|_| malformed(path, line_no, format!("invalid rate: {:?}", line)))?;
        if count >= TPS_WINDOWS {
            warn!(
                "too many rates in {}, keeping only the first {}",
                path.display(),
                TPS_WINDOWS
            );
            break;
        }
        rates[count] = value as f64 / num_end_users as f64;
        count += 1;
    }

    if count == 0 {
        return Err(malformed(path, 0, "no valid transaction rates found"));
    }
    if count < TPS_WINDOWS {
        warn!(
            "only {} rates in {}, repeating the last value {} times",
            count,
            path.display(),
            TPS_WINDOWS - count
        );
        let last = rates[count - 1];
        for rate in rates.iter_mut().skip(count) {
            *rate = last;
        }
    }
    Ok(rates)
}

/// Nodes indexed by kind and country, used by the load generator to sample
/// payment receivers.
#[derive(Debug, Default)]
pub struct NodeIndex {
    pub users: Vec<Vec<NodeId>>,
    pub merchants: Vec<Vec<NodeId>>,
    pub num_end_users: usize,
}

impl NodeIndex {
    pub fn build(network: &Network) -> Self {
        let mut index = NodeIndex {
            users: vec![Vec::new(); NUM_COUNTRIES],
            merchants: vec![Vec::new(); NUM_COUNTRIES],
            num_end_users: 0,
        };
        for node in &network.nodes {
            match node.kind {
                NodeKind::EndUser => {
                    index.users[node.country.index()].push(node.id);
                    index.num_end_users += 1;
                }
                NodeKind::Merchant => index.merchants[node.country.index()].push(node.id),
                _ => {}
            }
        }
        index
    }
}
