/// TCP sequence number, 32 bits, relative to an implicit 64-bit zero point.
///
/// The actual sequence number space is finite, though very large, ranging
/// from 0 to 2^32 - 1. All arithmetic dealing with sequence numbers is
/// performed modulo 2^32, so the numbers keep their ordering as they cycle
/// from 2^32 - 1 back to 0. Converting back to a 64-bit stream offset is
/// only well defined relative to a recent reference point; `unwrap` takes
/// that reference as its checkpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Wrap32(u32);

impl Wrap32 {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    /// Wrap an absolute sequence number around `zero`.
    pub fn wrap(n: u64, zero: Wrap32) -> Wrap32 {
        Wrap32(zero.0.wrapping_add(n as u32))
    }

    /// Invert `wrap`: of all absolute sequence numbers mapping to `self`,
    /// return the one closest to `checkpoint`, ties broken toward the
    /// smaller value.
    pub fn unwrap(self, zero: Wrap32, checkpoint: u64) -> u64 {
        let offset = self.0.wrapping_sub(zero.0) as u64;
        if checkpoint <= offset {
            return offset;
        }
        // Candidates are offset + k * 2^32; round the gap to the nearest
        // multiple of 2^32, half toward zero.
        let gap = checkpoint - offset;
        let mut steps = gap >> 32;
        if (gap & 0xffff_ffff) > 0x8000_0000 {
            steps += 1;
        }
        offset + (steps << 32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    const TWO_POW_32: u64 = 1 << 32;

    #[test]
    fn wrap_basics() {
        assert_eq!(Wrap32::wrap(0, Wrap32::new(0)), Wrap32::new(0));
        assert_eq!(Wrap32::wrap(3, Wrap32::new(u32::MAX)), Wrap32::new(2));
        assert_eq!(
            Wrap32::wrap(TWO_POW_32 + 7, Wrap32::new(10)),
            Wrap32::new(17)
        );
    }

    #[test]
    fn unwrap_near_checkpoint() {
        // Offset past a zero point close to the wrap boundary.
        assert_eq!(Wrap32::new(5).unwrap(Wrap32::new(0xffff_fffe), 0), 7);
        // The minimizer one lap up from the raw offset.
        assert_eq!(
            Wrap32::new(u32::MAX).unwrap(Wrap32::new(0), 2 * TWO_POW_32 + 5),
            2 * TWO_POW_32 - 1
        );
        assert_eq!(
            Wrap32::new(u32::MAX).unwrap(Wrap32::new(0), TWO_POW_32 + 5),
            TWO_POW_32 - 1
        );
    }

    #[test]
    fn unwrap_ties_break_low() {
        // Checkpoint exactly halfway between two candidates.
        assert_eq!(Wrap32::new(0).unwrap(Wrap32::new(0), 1 << 31), 0);
        assert_eq!(
            Wrap32::new(0).unwrap(Wrap32::new(0), TWO_POW_32 + (1 << 31)),
            TWO_POW_32
        );
        // One past the midpoint goes up.
        assert_eq!(
            Wrap32::new(0).unwrap(Wrap32::new(0), (1 << 31) + 1),
            TWO_POW_32
        );
    }

    #[test]
    fn unwrap_is_the_inverse_of_wrap() {
        let mut rng = StdRng::seed_from_u64(0x5e90);
        for _ in 0..10_000 {
            let zero = Wrap32::new(rng.gen());
            let raw = Wrap32::new(rng.gen());
            let checkpoint: u64 = rng.gen();
            let n = raw.unwrap(zero, checkpoint);
            assert_eq!(Wrap32::wrap(n, zero), raw);
        }
    }

    #[test]
    fn unwrap_result_is_nearest_candidate() {
        let mut rng = StdRng::seed_from_u64(17);
        for _ in 0..10_000 {
            let zero = Wrap32::new(rng.gen());
            let raw = Wrap32::new(rng.gen());
            let checkpoint = rng.gen::<u64>() >> 1;
            let n = raw.unwrap(zero, checkpoint);
            let distance = n.abs_diff(checkpoint);
            // No neighboring candidate may be closer, and ties go low.
            assert!(n.checked_add(TWO_POW_32).unwrap().abs_diff(checkpoint) >= distance);
            if let Some(below) = n.checked_sub(TWO_POW_32) {
                assert!(below.abs_diff(checkpoint) > distance);
            }
        }
    }
}
