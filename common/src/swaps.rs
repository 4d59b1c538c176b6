use strum::Display;

use crate::{
    serializer::{Reader, ReaderError, Serializer, Writer},
    NodeId, SimTime,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[repr(u8)]
pub enum SwapState {
    Requested = 0,
    L1Prepared = 1,
    L1Claimed = 2,
}

impl SwapState {
    fn from_u8(value: u8) -> Result<SwapState, ReaderError> {
        match value {
            0 => Ok(SwapState::Requested),
            1 => Ok(SwapState::L1Prepared),
            2 => Ok(SwapState::L1Claimed),
            _ => Err(ReaderError::InvalidValue("SwapState")),
        }
    }
}

/// An atomic rebalancing between two intermediaries: the submarine sender
/// pays off-chain, the submarine receiver commits the on-chain side.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmarineSwap {
    pub submarine_sender: NodeId,
    pub submarine_receiver: NodeId,
    pub amount: u64,
    pub trigger_payment_id: u64,
    pub start_time: SimTime,
    pub state: SwapState,
}

impl Serializer for SubmarineSwap {
    fn write(&self, writer: &mut Writer) {
        writer.write_u64(self.submarine_sender);
        writer.write_u64(self.submarine_receiver);
        writer.write_u64(self.amount);
        writer.write_u64(self.trigger_payment_id);
        writer.write_f64(self.start_time);
        writer.write_u8(self.state as u8);
    }

    fn read(reader: &mut Reader) -> Result<SubmarineSwap, ReaderError> {
        Ok(SubmarineSwap {
            submarine_sender: reader.read_u64()?,
            submarine_receiver: reader.read_u64()?,
            amount: reader.read_u64()?,
            trigger_payment_id: reader.read_u64()?,
            start_time: reader.read_f64()?,
            state: SwapState::from_u8(reader.read_u8()?)?,
        })
    }

    fn size(&self) -> usize {
        8 + 8 + 8 + 8 + 8 + 1
    }
}
