use strum::Display;

use crate::{
    serializer::{Reader, ReaderError, Serializer, Writer},
    NodeId, SimTime,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[repr(u8)]
pub enum BcTxKind {
    PrepareHtlc = 0,
    ClaimHtlc = 1,
}

impl BcTxKind {
    fn from_u8(value: u8) -> Result<BcTxKind, ReaderError> {
        match value {
            0 => Ok(BcTxKind::PrepareHtlc),
            1 => Ok(BcTxKind::ClaimHtlc),
            _ => Err(ReaderError::InvalidValue("BcTxKind")),
        }
    }
}

/// An on-chain transaction backing a submarine swap. It lives in the
/// blockchain LP's mempool until it is confirmed in exactly one block.
#[derive(Debug, Clone, PartialEq)]
pub struct BcTx {
    pub kind: BcTxKind,
    pub sender: NodeId,
    pub receiver: NodeId,
    pub amount: u64,
    pub start_time: SimTime,
    pub originator: NodeId,
}

impl Serializer for BcTx {
    fn write(&self, writer: &mut Writer) {
        writer.write_u8(self.kind as u8);
        writer.write_u64(self.sender);
        writer.write_u64(self.receiver);
        writer.write_u64(self.amount);
        writer.write_f64(self.start_time);
        writer.write_u64(self.originator);
    }

    fn read(reader: &mut Reader) -> Result<BcTx, ReaderError> {
        Ok(BcTx {
            kind: BcTxKind::from_u8(reader.read_u8()?)?,
            sender: reader.read_u64()?,
            receiver: reader.read_u64()?,
            amount: reader.read_u64()?,
            start_time: reader.read_f64()?,
            originator: reader.read_u64()?,
        })
    }

    fn size(&self) -> usize {
        1 + 8 + 8 + 8 + 8 + 8
    }
}
