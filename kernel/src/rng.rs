use rand::{Error, RngCore};

const GOLDEN_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

// SplitMix64 finalizer
fn mix(mut z: u64) -> u64 {
    z ^= z >> 30;
    z = z.wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z ^= z >> 27;
    z = z.wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// A counter-based pseudo-random stream that can be stepped backwards.
///
/// Every LP owns one. The executor snapshots the draw counter around each
/// forward handler and rewinds it by the recorded delta when the handler is
/// reversed, so a rolled-back handler leaves the stream exactly where it
/// found it.
#[derive(Debug, Clone)]
pub struct ReversibleRng {
    base: u64,
    count: u64,
}

impl ReversibleRng {
    /// Independent stream `stream` of the master seed.
    pub fn new(seed: u64, stream: u64) -> Self {
        ReversibleRng {
            base: mix(seed).wrapping_add(mix(stream.wrapping_mul(GOLDEN_GAMMA))),
            count: 0,
        }
    }

    /// Number of values drawn so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Undo the last `n` draws.
    pub fn rewind(&mut self, n: u64) {
        if n > self.count {
            panic!("rng rewind of {} draws past stream start ({})", n, self.count);
        }
        self.count -= n;
    }
}

impl RngCore for ReversibleRng {
    fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        let value = mix(self.base.wrapping_add(self.count.wrapping_mul(GOLDEN_GAMMA)));
        self.count += 1;
        value
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.next_u64().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_rewind_restores_stream() {
        let mut rng = ReversibleRng::new(42, 7);
        let before: Vec<u64> = (0..5).map(|_| rng.next_u64()).collect();
        let position = rng.count();

        let _ = rng.gen_range(0..100u64);
        let _: f64 = rng.gen();
        let consumed = rng.count() - position;
        rng.rewind(consumed);
        assert_eq!(rng.count(), position);

        // the stream replays identically from the rewound position
        rng.rewind(5);
        let replay: Vec<u64> = (0..5).map(|_| rng.next_u64()).collect();
        assert_eq!(before, replay);
    }

    #[test]
    fn test_streams_are_independent() {
        let mut a = ReversibleRng::new(42, 0);
        let mut b = ReversibleRng::new(42, 1);
        assert_ne!(a.next_u64(), b.next_u64());
    }

    #[test]
    #[should_panic(expected = "rewind")]
    fn test_rewind_past_start_is_fatal() {
        let mut rng = ReversibleRng::new(1, 1);
        rng.rewind(1);
    }
}
