use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};

use plasma_common::{network::Network, payments::PaymentErrorKind};

use crate::sim::{SimJournal, SimLp};

/* Final values of nodes, channels, edges and payments, one set of csv
   files per partition, plus the blockchain ledger. */

fn create(output_dir: &Path, name: String) -> io::Result<BufWriter<File>> {
    Ok(BufWriter::new(File::create(output_dir.join(name))?))
}

fn write_nodes(output_dir: &Path, net: &Network, partition: usize) -> io::Result<()> {
    let mut out = create(output_dir, format!("nodes_output_{}.csv", partition))?;
    writeln!(out, "id,open_edges")?;
    for node in &net.nodes {
        if node.partition != partition {
            continue;
        }
        if node.open_edges.is_empty() {
            writeln!(out, "{},-1", node.id)?;
        } else {
            let edges: Vec<String> = node.open_edges.iter().map(|id| id.to_string()).collect();
            writeln!(out, "{},{}", node.id, edges.join("-"))?;
        }
    }
    out.flush()
}

fn write_channels(output_dir: &Path, net: &Network, partition: usize) -> io::Result<()> {
    let mut out = create(output_dir, format!("channels_output_{}.csv", partition))?;
    writeln!(out, "id,edge1,edge2,node1,node2,capacity,is_private")?;
    for channel in &net.channels {
        let node1 = net.node(channel.node1);
        if node1.partition != partition {
            continue;
        }
        let node2 = net.node(channel.node2);
        writeln!(
            out,
            "{},{},{},{},{},{},{}",
            channel.id,
            channel.edge1,
            channel.edge2,
            node1.label,
            node2.label,
            channel.capacity,
            channel.is_private as u8
        )?;
    }
    out.flush()
}

fn write_edges(output_dir: &Path, net: &Network, partition: usize) -> io::Result<()> {
    let mut out = create(output_dir, format!("edges_output_{}.csv", partition))?;
    writeln!(
        out,
        "id,channel_id,counter_edge_id,from_node_id,to_node_id,from_node_label,to_node_label,\
         balance,fee_base,fee_proportional,min_htlc,timelock,tot_flows"
    )?;
    for edge in &net.edges {
        let from = net.node(edge.from);
        if from.partition != partition {
            continue;
        }
        let to = net.node(edge.to);
        writeln!(
            out,
            "{},{},{},{},{},{},{},{},{},{},{},{},{}",
            edge.id,
            edge.channel_id,
            edge.counter_edge_id,
            edge.from,
            edge.to,
            from.label,
            to.label,
            edge.balance(),
            edge.policy.fee_base,
            edge.policy.fee_proportional,
            edge.policy.min_htlc,
            edge.policy.timelock,
            edge.tot_flows()
        )?;
    }
    out.flush()
}

fn write_payments(
    output_dir: &Path,
    net: &Network,
    journal: &SimJournal,
    partition: usize,
) -> io::Result<()> {
    let mut out = create(output_dir, format!("payments_output_{}.csv", partition))?;
    writeln!(
        out,
        "id,type,sender_id,receiver_id,amount,start_time,end_time,is_success,\
         no_balance_count,offline_node_count,timeout_exp,attempts,first_no_balance_error,\
         route,route_ids,total_fee"
    )?;
    for payment in &journal.payments {
        let sender = net.node(payment.sender);
        let receiver = net.node(payment.receiver);
        write!(
            out,
            "{},{},{},{},{},{:.0},{:.0},{},{},{},{},{},",
            payment.id,
            payment.kind as u8,
            sender.label,
            receiver.label,
            payment.amount,
            payment.start_time,
            payment.end_time,
            payment.is_success as u8,
            payment.no_balance_count,
            payment.offline_node_count,
            payment.is_timeout as u8,
            payment.attempts,
        )?;

        // the hop that first ran out of liquidity, when one did
        let no_balance_hop = payment.error.as_ref().and_then(|error| {
            (!payment.is_success && error.kind == PaymentErrorKind::NoBalance)
                .then_some(error)
                .and_then(|error| error.hop.map(|hop| (hop, error.time)))
        });
        match no_balance_hop {
            Some((hop, time)) => write!(
                out,
                "{}:{:.0}:{}->{},",
                hop.edge_id,
                time,
                net.node(hop.from).label,
                net.node(hop.to).label
            )?,
            None => write!(out, ",")?,
        }

        match &payment.route {
            None => writeln!(out, ",-1,")?,
            Some(route) => {
                let labels: Vec<String> = route
                    .hops
                    .iter()
                    .map(|hop| {
                        format!("{}->{}", net.node(hop.from).label, net.node(hop.to).label)
                    })
                    .collect();
                let edge_ids: Vec<String> = route
                    .hops
                    .iter()
                    .map(|hop| hop.edge_id.to_string())
                    .collect();
                writeln!(
                    out,
                    "{},{},{}",
                    labels.join("-"),
                    edge_ids.join("-"),
                    route.total_fee
                )?;
            }
        }
    }
    out.flush()
}

fn write_blockchain(output_dir: &Path, net: &Network, lps: &[SimLp]) -> io::Result<()> {
    let Some(SimLp::Chain(chain)) = lps.iter().find(|lp| matches!(lp, SimLp::Chain(_))) else {
        return Ok(());
    };
    let mut out = create(output_dir, "blockchain_output_0.csv".to_string())?;
    writeln!(
        out,
        "confirmed,block_height,block_time,tx_type,tx_sender,tx_receiver,tx_amount,\
         tx_start_time,tx_originator"
    )?;
    for (height, block) in chain.blocks.iter().enumerate() {
        for entry in &block.txs {
            writeln!(
                out,
                "1,{},{:.2},{},{},{},{},{:.2},{}",
                height,
                block.confirmation_time,
                entry.tx.kind,
                net.node(entry.tx.sender).label,
                net.node(entry.tx.receiver).label,
                entry.tx.amount,
                entry.tx.start_time,
                entry.tx.originator
            )?;
        }
    }
    // still pending at the end of the run
    for entry in &chain.mempool {
        writeln!(
            out,
            "0,,,{},{},{},{},{:.2},{}",
            entry.tx.kind,
            net.node(entry.tx.sender).label,
            net.node(entry.tx.receiver).label,
            entry.tx.amount,
            entry.tx.start_time,
            entry.tx.originator
        )?;
    }
    out.flush()
}

pub fn write_outputs(
    output_dir: &Path,
    net: &Network,
    lps: &[SimLp],
    journals: &[SimJournal],
) -> io::Result<()> {
    for (partition, journal) in journals.iter().enumerate() {
        write_nodes(output_dir, net, partition)?;
        write_channels(output_dir, net, partition)?;
        write_edges(output_dir, net, partition)?;
        write_payments(output_dir, net, journal, partition)?;
    }
    write_blockchain(output_dir, net, lps)
}
