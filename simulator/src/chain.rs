use std::{collections::VecDeque, sync::Arc};

use log::debug;

use plasma_common::{
    blockchain::BcTx,
    config::BLOCK_CONGESTION_PERIOD,
    SimTime,
};
use plasma_kernel::{Event, EventCtx};

use crate::{
    config::SimConfig,
    delays::{exponential_delay, gamma_delay},
    message::{decode_tx, schedule_tx, EventKind},
};

/// A transaction waiting in the mempool or sitting in a block. The uid is
/// the id of the broadcast event that carried it in, so two broadcasts of
/// the same logical tx stay distinguishable and a reverse handler removes
/// exactly its own entry.
#[derive(Debug, Clone)]
pub struct MempoolEntry {
    pub uid: u64,
    pub tx: BcTx,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub confirmation_time: SimTime,
    pub txs: Vec<MempoolEntry>,
}

/// The single blockchain logical process: a mempool and an append-only
/// chain, producing a block every (exponentially jittered) block time.
pub struct ChainLp {
    pub(crate) id: u64,
    pub(crate) cfg: Arc<SimConfig>,
    pub mempool: VecDeque<MempoolEntry>,
    pub blocks: Vec<Block>,
}

impl ChainLp {
    pub fn new(id: u64, cfg: Arc<SimConfig>) -> Self {
        ChainLp {
            id,
            cfg,
            mempool: VecDeque::new(),
            blocks: Vec::new(),
        }
    }

    /// Transactions admitted into the next block. Congestion is spread
    /// over 100-block windows: a floor per block, with the remainder
    /// spilling one extra tx into the first blocks of each window.
    pub fn available_block_size(&self) -> usize {
        let period = BLOCK_CONGESTION_PERIOD;
        let txs_in_period = period * self.cfg.block_size as usize;
        let available_in_period =
            (txs_in_period as f64 * (1.0 - self.cfg.block_congestion_rate)) as usize;
        let per_block = available_in_period / period;
        let remainder = available_in_period % period;
        let block_number_in_period = self.blocks.len() % period;
        per_block + usize::from(block_number_in_period < remainder)
    }

    fn schedule_tick(&self, ctx: &mut EventCtx<'_>) {
        let delay = exponential_delay(ctx.rng(), self.cfg.block_time_ms)
            .round()
            .max(1.0);
        ctx.schedule(self.id, delay, EventKind::TickTockNextBlock.code(), plasma_kernel::Payload::empty());
    }

    pub fn on_start(&mut self, ctx: &mut EventCtx<'_>) {
        self.schedule_tick(ctx);
    }

    pub fn forward(&mut self, ev: &Event, ctx: &mut EventCtx<'_>) {
        let kind = match EventKind::from_code(ev.kind) {
            Some(kind) => kind,
            None => panic!("blockchain: unknown event code {}", ev.kind),
        };
        match kind {
            EventKind::TickTockNextBlock => {
                let mut block = Block {
                    confirmation_time: ctx.now(),
                    txs: Vec::new(),
                };
                let available = self.available_block_size();

                while !self.mempool.is_empty() && block.txs.len() < available {
                    let entry = self.mempool.pop_front().unwrap();

                    // everyone involved learns about the confirmation
                    let sender_delay = gamma_delay(ctx.rng());
                    schedule_tx(ctx, entry.tx.sender, sender_delay, EventKind::BcTxConfirmed, &entry.tx);
                    let receiver_delay = gamma_delay(ctx.rng());
                    schedule_tx(
                        ctx,
                        entry.tx.receiver,
                        receiver_delay,
                        EventKind::BcTxConfirmed,
                        &entry.tx,
                    );

                    block.txs.push(entry);
                }

                debug!(
                    "block {} confirmed with {} txs at {:.0}",
                    self.blocks.len(),
                    block.txs.len(),
                    ctx.now()
                );
                self.blocks.push(block);
                self.schedule_tick(ctx);
            }
            EventKind::BcTxBroadcast => {
                let tx = decode_tx(ev);
                self.mempool.push_back(MempoolEntry { uid: ev.id, tx });
            }
            other => panic!("blockchain: unhandled forward event {}", other),
        }
    }

    pub fn reverse(&mut self, ev: &Event) {
        let kind = match EventKind::from_code(ev.kind) {
            Some(kind) => kind,
            None => panic!("blockchain: unknown event code {}", ev.kind),
        };
        match kind {
            EventKind::TickTockNextBlock => {
                // LIFO rollback guarantees this undoes the latest block:
                // its txs go back onto the mempool head in their old order
                let block = match self.blocks.pop() {
                    Some(block) => block,
                    None => panic!("blockchain: tick-tock reversed with no block on the chain"),
                };
                for entry in block.txs.into_iter().rev() {
                    self.mempool.push_front(entry);
                }
            }
            EventKind::BcTxBroadcast => {
                match self.mempool.iter().rposition(|entry| entry.uid == ev.id) {
                    Some(position) => {
                        self.mempool.remove(position);
                    }
                    None => {
                        panic!("blockchain: broadcast tx not found in the mempool during reverse")
                    }
                }
            }
            other => panic!("blockchain: unhandled reverse event {}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plasma_common::blockchain::BcTxKind;
    use plasma_kernel::{Bitfield, Payload};

    fn test_chain(block_size: u32, congestion: f64) -> ChainLp {
        let mut cfg = crate::config::test_config();
        cfg.block_size = block_size;
        cfg.block_congestion_rate = congestion;
        ChainLp::new(100, Arc::new(cfg))
    }

    fn tx(n: u64) -> BcTx {
        BcTx {
            kind: BcTxKind::PrepareHtlc,
            sender: n,
            receiver: n + 1,
            amount: 100,
            start_time: 1.0,
            originator: n,
        }
    }

    #[test]
    fn test_congestion_throughput_over_a_period() {
        // congestion 0.37 on block size 4: 252 txs per 100 blocks, the
        // first 52 blocks carry one extra
        let mut chain = test_chain(4, 0.37);
        let mut confirmed = 0;
        for block_number in 0..100 {
            let available = chain.available_block_size();
            if block_number < 52 {
                assert_eq!(available, 3);
            } else {
                assert_eq!(available, 2);
            }
            confirmed += available;
            chain.blocks.push(Block {
                confirmation_time: block_number as SimTime,
                txs: Vec::new(),
            });
        }
        assert_eq!(confirmed, 252);

        // a congestion-free chain admits full blocks
        let free = test_chain(4, 0.0);
        assert_eq!(free.available_block_size(), 4);
    }

    fn run_forward(chain: &mut ChainLp, ev: &Event) {
        let mut bf = Bitfield::default();
        let mut out = Vec::new();
        let mut rng = plasma_kernel::ReversibleRng::new(1, 100);
        let mut ctx = plasma_kernel::EventCtx::new(ev.recv_time, 100, &mut bf, &mut rng, &mut out);
        chain.forward(ev, &mut ctx);
    }

    #[test]
    fn test_broadcast_reverse_removes_the_right_copy() {
        let mut chain = test_chain(4, 0.0);
        // two broadcasts of the same logical tx, different event uids
        let ev1 = Event {
            id: 7,
            src: 0,
            dest: 100,
            send_time: 0.0,
            recv_time: 10.0,
            kind: EventKind::BcTxBroadcast.code(),
            payload: Payload::new(plasma_common::serializer::Serializer::to_bytes(&tx(1))),
        };
        let ev2 = Event {
            id: 8,
            ..ev1.clone()
        };
        run_forward(&mut chain, &ev1);
        run_forward(&mut chain, &ev2);
        assert_eq!(chain.mempool.len(), 2);

        chain.reverse(&ev1);
        assert_eq!(chain.mempool.len(), 1);
        assert_eq!(chain.mempool[0].uid, 8);
    }

    #[test]
    fn test_tick_tock_reverse_restores_mempool_order() {
        let mut chain = test_chain(2, 0.0);
        for (uid, n) in [(1u64, 10u64), (2, 20), (3, 30)] {
            chain.mempool.push_back(MempoolEntry { uid, tx: tx(n) });
        }

        let tick = Event {
            id: 50,
            src: 100,
            dest: 100,
            send_time: 0.0,
            recv_time: 60_000.0,
            kind: EventKind::TickTockNextBlock.code(),
            payload: Payload::empty(),
        };
        run_forward(&mut chain, &tick);
        // block size 2: the two oldest txs were confirmed
        assert_eq!(chain.blocks.len(), 1);
        assert_eq!(chain.blocks[0].txs.len(), 2);
        assert_eq!(chain.mempool.len(), 1);

        chain.reverse(&tick);
        assert_eq!(chain.blocks.len(), 0);
        let uids: Vec<u64> = chain.mempool.iter().map(|entry| entry.uid).collect();
        assert_eq!(uids, vec![1, 2, 3]);
    }
}
